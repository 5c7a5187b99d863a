//! App secret validation
//!
//! Every storage request presents an `X-App-Secret` header that must match
//! the secret provisioned for the namespace it addresses.

use crate::auth::NamespaceDirectory;
use crate::types::Result;

/// Header carrying the application secret
pub const APP_SECRET_HEADER: &str = "x-app-secret";

/// Outcome of validating one request against the namespace directory
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Authorized,
    /// Header missing or empty
    MissingSecret,
    /// No such namespace
    UnknownNamespace,
    /// Secret matches neither the current secret nor its legacy alias
    InvalidSecret,
    /// Namespace exists and the secret matches, but it is not serving
    Disabled { message: String },
}

impl AuthOutcome {
    /// HTTP status and error message for rejected requests
    pub fn rejection(&self) -> Option<(u16, &str)> {
        match self {
            AuthOutcome::Authorized => None,
            AuthOutcome::MissingSecret => Some((401, "App secret is required")),
            AuthOutcome::UnknownNamespace => Some((401, "Invalid namespace")),
            AuthOutcome::InvalidSecret => Some((401, "Invalid app secret")),
            AuthOutcome::Disabled { message } => Some((403, message)),
        }
    }
}

/// Validate a presented app secret for one namespace
pub async fn validate_app_secret(
    directory: &dyn NamespaceDirectory,
    namespace_id: &str,
    presented: Option<&str>,
) -> Result<AuthOutcome> {
    let Some(presented) = presented.filter(|s| !s.is_empty()) else {
        return Ok(AuthOutcome::MissingSecret);
    };

    let Some(namespace) = directory.fetch(namespace_id).await? else {
        return Ok(AuthOutcome::UnknownNamespace);
    };

    if !namespace.matches_secret(presented) {
        return Ok(AuthOutcome::InvalidSecret);
    }

    if !namespace.is_active() {
        let message = namespace
            .disabled_message
            .unwrap_or_else(|| "Namespace is not active".to_string());
        return Ok(AuthOutcome::Disabled { message });
    }

    Ok(AuthOutcome::Authorized)
}
