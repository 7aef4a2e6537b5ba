//! Request error taxonomy.
//!
//! Every handler failure resolves to one of these variants, and every
//! variant resolves to a structured body; no error crosses the router as
//! a panic or an unserialized type.

use catalog::StoreError;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed required field in a request body.
    #[error("{0}")]
    Validation(String),
    /// Artist or record lookup miss.
    #[error("{0}")]
    NotFound(String),
    /// Known action, wrong HTTP verb.
    #[error("Method not allowed")]
    MethodNotAllowed,
    /// Dev-only action outside the dev environment.
    #[error("Forbidden")]
    Forbidden,
    /// Store, blob, or third-party API failure.
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    /// The wire shape of this error. Lookup and upstream failures share the
    /// `{status: "error", message}` shape; the verb and permission gates
    /// keep their numeric inner status.
    pub fn body(&self) -> Value {
        match self {
            ApiError::Validation(message)
            | ApiError::NotFound(message)
            | ApiError::Upstream(message) => {
                json!({ "status": "error", "message": message })
            }
            ApiError::MethodNotAllowed => {
                json!({ "status": 405, "error": "Method not allowed" })
            }
            ApiError::Forbidden => {
                json!({ "status": 403, "error": "Forbidden" })
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_bodies() {
        let err = ApiError::Validation("Missing 'artist_id' argument".into());
        assert_eq!(
            err.body(),
            json!({"status": "error", "message": "Missing 'artist_id' argument"})
        );
        assert_eq!(
            ApiError::MethodNotAllowed.body(),
            json!({"status": 405, "error": "Method not allowed"})
        );
        assert_eq!(
            ApiError::Forbidden.body(),
            json!({"status": 403, "error": "Forbidden"})
        );
    }

    #[test]
    fn test_store_errors_map_to_upstream() {
        let err: ApiError = StoreError::Request("timeout".into()).into();
        assert!(matches!(err, ApiError::Upstream(_)));
    }
}
