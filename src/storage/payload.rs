//! Payload partitioning
//!
//! Splits an incoming JSON object into the record id, the root fields, and
//! the named child groups, enforcing the reserved-key and field-name rules
//! before anything is written.

use serde_json::{Map, Value};

use crate::types::{DepotError, Result};

/// One named child group from a payload's `collection` array
#[derive(Debug, Clone)]
pub struct ChildGroup {
    pub name: String,
    pub members: Vec<Map<String, Value>>,
}

/// A payload split into its reserved and free parts
#[derive(Debug, Clone)]
pub struct Partitioned {
    /// Caller-chosen record id, when the payload carried a usable `id`
    pub record_id: Option<String>,
    /// Every non-reserved top-level key
    pub fields: Map<String, Value>,
    /// Child groups from the reserved `collection` key, in payload order
    pub groups: Vec<ChildGroup>,
}

/// Partition a payload into record id, root fields, and child groups
pub fn partition(payload: Value) -> Result<Partitioned> {
    let Value::Object(mut map) = payload else {
        return Err(DepotError::InvalidPayload(
            "Payload must be a JSON object".to_string(),
        ));
    };

    let record_id = match map.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) => {
            return Err(DepotError::InvalidPayload(
                "Record id must be a string".to_string(),
            ));
        }
    };

    let groups = match map.remove("collection") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => parse_groups(entries)?,
        Some(_) => {
            return Err(DepotError::InvalidPayload(
                "Collection must be an array of groups".to_string(),
            ));
        }
    };

    validate_field_names(&map)?;
    for group in &groups {
        for member in &group.members {
            validate_field_names(member)?;
        }
    }

    Ok(Partitioned {
        record_id,
        fields: map,
        groups,
    })
}

fn parse_groups(entries: Vec<Value>) -> Result<Vec<ChildGroup>> {
    let mut groups = Vec::with_capacity(entries.len());

    for entry in entries {
        let Value::Object(mut group) = entry else {
            return Err(DepotError::InvalidPayload(
                "Collection groups must be objects".to_string(),
            ));
        };

        let name = match group.remove("name") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => {
                return Err(DepotError::InvalidPayload(
                    "Collection group name must be a non-empty string".to_string(),
                ));
            }
        };

        let Some(Value::Array(data)) = group.remove("data") else {
            return Err(DepotError::InvalidPayload(format!(
                "Collection group '{}' data must be an array",
                name
            )));
        };

        let mut members = Vec::with_capacity(data.len());
        for item in data {
            let Value::Object(member) = item else {
                return Err(DepotError::InvalidPayload(format!(
                    "Collection group '{}' members must be objects",
                    name
                )));
            };
            members.push(member);
        }

        groups.push(ChildGroup { name, members });
    }

    Ok(groups)
}

/// Document-store path constraints: no `$` prefix, no `.` anywhere, at any
/// nesting depth
fn validate_field_names(map: &Map<String, Value>) -> Result<()> {
    for (key, value) in map {
        if key.starts_with('$') || key.contains('.') {
            return Err(DepotError::InvalidPayload(format!(
                "Invalid field name '{}'",
                key
            )));
        }
        validate_value_names(value)?;
    }
    Ok(())
}

fn validate_value_names(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => validate_field_names(map),
        Value::Array(values) => {
            for item in values {
                validate_value_names(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_reserved_keys_from_fields() {
        let parts = partition(json!({
            "id": "r1",
            "name": "widget",
            "count": 3,
            "collection": [ { "name": "tags", "data": [ { "v": "a" } ] } ],
        }))
        .unwrap();

        assert_eq!(parts.record_id.as_deref(), Some("r1"));
        assert_eq!(parts.fields.len(), 2);
        assert_eq!(parts.fields["name"], json!("widget"));
        assert!(!parts.fields.contains_key("collection"));
        assert_eq!(parts.groups.len(), 1);
        assert_eq!(parts.groups[0].name, "tags");
        assert_eq!(parts.groups[0].members.len(), 1);
    }

    #[test]
    fn missing_and_empty_ids_are_absent() {
        assert!(partition(json!({ "a": 1 })).unwrap().record_id.is_none());
        assert!(partition(json!({ "id": "" })).unwrap().record_id.is_none());
        assert!(partition(json!({ "id": null })).unwrap().record_id.is_none());
    }

    #[test]
    fn numeric_id_is_coerced() {
        let parts = partition(json!({ "id": 42 })).unwrap();
        assert_eq!(parts.record_id.as_deref(), Some("42"));
    }

    #[test]
    fn non_string_ids_are_rejected() {
        assert!(partition(json!({ "id": true })).is_err());
        assert!(partition(json!({ "id": ["x"] })).is_err());
        assert!(partition(json!({ "id": { "nested": 1 } })).is_err());
    }

    #[test]
    fn rejects_non_object_payloads() {
        for payload in [json!([1, 2]), json!("text"), json!(7), json!(null)] {
            let err = partition(payload).unwrap_err();
            assert!(matches!(err, DepotError::InvalidPayload(_)));
        }
    }

    #[test]
    fn null_collection_means_no_groups() {
        let parts = partition(json!({ "collection": null, "a": 1 })).unwrap();
        assert!(parts.groups.is_empty());
        assert_eq!(parts.fields.len(), 1);
    }

    #[test]
    fn malformed_groups_are_rejected() {
        // Not an array
        assert!(partition(json!({ "collection": { "name": "x" } })).is_err());
        // Group not an object
        assert!(partition(json!({ "collection": ["tags"] })).is_err());
        // Missing name
        assert!(partition(json!({ "collection": [ { "data": [] } ] })).is_err());
        // Empty name
        assert!(partition(json!({ "collection": [ { "name": "", "data": [] } ] })).is_err());
        // Missing data
        assert!(partition(json!({ "collection": [ { "name": "tags" } ] })).is_err());
        // Data not an array
        assert!(partition(json!({ "collection": [ { "name": "tags", "data": {} } ] })).is_err());
        // Member not an object
        assert!(
            partition(json!({ "collection": [ { "name": "tags", "data": [ "plain" ] } ] }))
                .is_err()
        );
    }

    #[test]
    fn rejects_unsafe_field_names() {
        assert!(partition(json!({ "$where": 1 })).is_err());
        assert!(partition(json!({ "a.b": 1 })).is_err());
        assert!(partition(json!({ "ok": { "$nested": 1 } })).is_err());
        assert!(partition(json!({ "ok": [ { "bad.key": 1 } ] })).is_err());
        assert!(partition(json!({
            "collection": [ { "name": "tags", "data": [ { "$v": 1 } ] } ],
        }))
        .is_err());
    }

    #[test]
    fn dollar_and_dot_allowed_in_values() {
        let parts = partition(json!({ "price": "$10.50", "path": "a.b.c" })).unwrap();
        assert_eq!(parts.fields["price"], json!("$10.50"));
        assert_eq!(parts.fields["path"], json!("a.b.c"));
    }
}
