//! ISO-8601 date normalization
//!
//! String leaves that look like ISO date-times are promoted to native BSON
//! timestamps on the way in, at any nesting depth. On the way out, timestamps
//! render as RFC 3339 UTC strings with millisecond precision, so reads are
//! stable across round trips.

use bson::{Bson, Document};
use chrono::SecondsFormat;
use serde_json::{Map, Value};

/// Cheap shape check before handing the string to chrono:
/// `YYYY-MM-DDTHH:MM:SS` + optional `.fff` + optional `Z`/`±hh:mm`/`±hhmm`.
fn is_iso_shape(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() < 19 {
        return false;
    }

    let digit = |i: usize| b[i].is_ascii_digit();
    let head_ok = digit(0)
        && digit(1)
        && digit(2)
        && digit(3)
        && b[4] == b'-'
        && digit(5)
        && digit(6)
        && b[7] == b'-'
        && digit(8)
        && digit(9)
        && b[10] == b'T'
        && digit(11)
        && digit(12)
        && b[13] == b':'
        && digit(14)
        && digit(15)
        && b[16] == b':'
        && digit(17)
        && digit(18);
    if !head_ok {
        return false;
    }

    let mut rest = &b[19..];

    // Optional fractional seconds
    if rest.first() == Some(&b'.') {
        let tail = &rest[1..];
        let digits = tail.iter().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return false;
        }
        rest = &tail[digits..];
    }

    // Optional zone designator
    match rest {
        [] | [b'Z'] => true,
        [sign, h1, h2, b':', m1, m2] | [sign, h1, h2, m1, m2] => {
            matches!(sign, b'+' | b'-')
                && h1.is_ascii_digit()
                && h2.is_ascii_digit()
                && m1.is_ascii_digit()
                && m2.is_ascii_digit()
        }
        _ => false,
    }
}

/// Parse an ISO-8601 date-time string into a BSON timestamp.
///
/// Returns None for strings that are not date-shaped or are date-shaped but
/// not a real instant (month 13 and friends), so callers can pass those
/// through verbatim. Zone-less strings are taken as UTC.
pub fn parse_iso_datetime(value: &str) -> Option<bson::DateTime> {
    if !is_iso_shape(value) {
        return None;
    }

    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(bson::DateTime::from_chrono(parsed));
    }

    // Offsets without a colon are valid ISO-8601 but not RFC 3339
    if let Ok(parsed) = chrono::DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(bson::DateTime::from_chrono(parsed));
    }

    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| bson::DateTime::from_chrono(naive.and_utc()))
}

/// Render a BSON timestamp as an RFC 3339 UTC string
pub fn render_timestamp(dt: bson::DateTime) -> String {
    dt.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Convert a JSON value to BSON, promoting date-shaped strings to timestamps
pub fn promote_json(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else if let Some(f) = n.as_f64() {
                Bson::Double(f)
            } else {
                Bson::Null
            }
        }
        Value::String(s) => match parse_iso_datetime(&s) {
            Some(dt) => Bson::DateTime(dt),
            None => Bson::String(s),
        },
        Value::Array(values) => Bson::Array(values.into_iter().map(promote_json).collect()),
        Value::Object(map) => Bson::Document(promote_map(map)),
    }
}

/// Convert a JSON object to a BSON document, promoting dates at every depth
pub fn promote_map(map: Map<String, Value>) -> Document {
    let mut doc = Document::new();
    for (key, value) in map {
        doc.insert(key, promote_json(value));
    }
    doc
}

/// Convert stored BSON back to JSON, rendering timestamps as RFC 3339 strings
pub fn render_bson(value: Bson) -> Value {
    match value {
        Bson::DateTime(dt) => Value::String(render_timestamp(dt)),
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::Number(i.into()),
        Bson::Int64(i) => Value::Number(i.into()),
        Bson::Double(d) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s),
        Bson::Array(values) => Value::Array(values.into_iter().map(render_bson).collect()),
        Bson::Document(doc) => Value::Object(render_document(doc)),
        other => other.into_relaxed_extjson(),
    }
}

/// Convert a stored BSON document back to a JSON object
pub fn render_document(doc: Document) -> Map<String, Value> {
    doc.into_iter().map(|(k, v)| (k, render_bson(v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_iso_variants() {
        for sample in [
            "2024-03-05T12:30:45",
            "2024-03-05T12:30:45Z",
            "2024-03-05T12:30:45.123Z",
            "2024-03-05T12:30:45+02:00",
            "2024-03-05T12:30:45.5-0700",
        ] {
            assert!(parse_iso_datetime(sample).is_some(), "rejected {}", sample);
        }
    }

    #[test]
    fn rejects_non_dates() {
        for sample in [
            "not a date",
            "2024-03-05",
            "12:30:45",
            "2024-03-05T12:30",
            "2024-03-05T12:30:45.",
            "2024-03-05T12:30:45Zx",
            "2024-03-05T12:30:45+2:00",
            "20240305T123045Z",
            "",
        ] {
            assert!(parse_iso_datetime(sample).is_none(), "accepted {}", sample);
        }
    }

    #[test]
    fn date_shaped_but_impossible_passes_through() {
        assert!(parse_iso_datetime("2024-13-45T99:99:99Z").is_none());
    }

    #[test]
    fn zone_less_is_utc() {
        let bare = parse_iso_datetime("2024-03-05T12:30:45").unwrap();
        let zulu = parse_iso_datetime("2024-03-05T12:30:45Z").unwrap();
        assert_eq!(bare, zulu);
    }

    #[test]
    fn offsets_normalize_to_the_same_instant() {
        let zulu = parse_iso_datetime("2024-03-05T10:30:45Z").unwrap();
        let with_colon = parse_iso_datetime("2024-03-05T12:30:45+02:00").unwrap();
        let without_colon = parse_iso_datetime("2024-03-05T12:30:45+0200").unwrap();
        assert_eq!(zulu, with_colon);
        assert_eq!(zulu, without_colon);
    }

    #[test]
    fn promotes_dates_at_depth() {
        let value = json!({
            "title": "deep",
            "meta": {
                "dueAt": "2024-03-05T12:30:45Z",
                "history": [ { "at": "2023-01-01T00:00:00.250Z" } ],
            },
        });

        let Value::Object(map) = value else { unreachable!() };
        let doc = promote_map(map);

        let meta = doc.get_document("meta").unwrap();
        assert!(matches!(meta.get("dueAt"), Some(Bson::DateTime(_))));

        let history = meta.get_array("history").unwrap();
        let Bson::Document(entry) = &history[0] else {
            panic!("expected document")
        };
        assert!(matches!(entry.get("at"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn non_matching_strings_survive_verbatim() {
        let Value::Object(map) = json!({ "note": "due 2024-03-05", "when": "soon" }) else {
            unreachable!()
        };
        let doc = promote_map(map);
        assert_eq!(doc.get_str("note").unwrap(), "due 2024-03-05");
        assert_eq!(doc.get_str("when").unwrap(), "soon");
    }

    #[test]
    fn numbers_keep_integer_and_float_forms() {
        let Value::Object(map) = json!({ "count": 42, "ratio": 0.5 }) else {
            unreachable!()
        };
        let doc = promote_map(map);
        assert_eq!(doc.get_i64("count").unwrap(), 42);
        assert_eq!(doc.get_f64("ratio").unwrap(), 0.5);
    }

    #[test]
    fn round_trip_renders_rfc3339_millis() {
        let Value::Object(map) = json!({ "at": "2024-03-05T12:30:45Z", "note": "keep" }) else {
            unreachable!()
        };
        let rendered = render_document(promote_map(map));

        assert_eq!(rendered["at"], json!("2024-03-05T12:30:45.000Z"));
        assert_eq!(rendered["note"], json!("keep"));
    }

    #[test]
    fn rendered_output_reparses_to_same_instant() {
        let first = parse_iso_datetime("2024-03-05T12:30:45.123+0100").unwrap();
        let rendered = render_timestamp(first);
        let second = parse_iso_datetime(&rendered).unwrap();
        assert_eq!(first, second);
    }
}
