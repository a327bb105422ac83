use serde_json::Value;
use thiserror::Error;

/// Main error type for REST client operations.
///
/// Only synchronous failures are represented here. HTTP-level failures are
/// delivered as data through the error-callback chain and never surface as a
/// `RestError`, except when no handler at all is available.
#[derive(Debug, Error)]
pub enum RestError {
    /// A method with the same name is already registered
    #[error("method {name} is already defined")]
    DuplicateMethod { name: String },

    /// No method registered under that name
    #[error("no method named {name}")]
    UnknownMethod { name: String },

    /// Method descriptor without any URL template
    #[error("method {method} has no URL template")]
    MissingTemplate { method: String },

    /// A parameter listed in `expects` was not supplied
    #[error("missing parameter {parameter} for method {method}")]
    MissingParameter { method: String, parameter: String },

    /// Auto-validation found placeholders left in the URL
    #[error("missing parameter/s {} for method {method}", .placeholders.join(","))]
    UnresolvedPlaceholders {
        method: String,
        placeholders: Vec<String>,
    },

    /// A transport error occurred and nobody was there to handle it
    #[error("no error handler / callback for: {url}")]
    NoErrorHandler { url: String },

    /// Model errors
    #[error("model {name} is already defined")]
    DuplicateModel { name: String },

    #[error("no model named {name}")]
    UnknownModel { name: String },

    #[error("no collection named {name}")]
    UnknownCollection { name: String },

    #[error("model {model} has no {operation} method configured")]
    UnsupportedSync { model: String, operation: String },

    /// Collection content must be a JSON array
    #[error("no array specified for collection {name}")]
    NotAnArray { name: String },

    /// A promise was settled through its reject path
    #[error("request rejected: {0}")]
    Rejected(Value),

    /// A promise was dropped without being settled
    #[error("promise abandoned before being settled")]
    Abandoned,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Runtime setup for a timed promise wait failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RestError {
    /// Check if this error comes from parameter validation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RestError::MissingParameter { .. } | RestError::UnresolvedPlaceholders { .. }
        )
    }

    /// Check if this error comes from an invalid configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RestError::DuplicateMethod { .. }
                | RestError::UnknownMethod { .. }
                | RestError::MissingTemplate { .. }
                | RestError::DuplicateModel { .. }
                | RestError::UnknownModel { .. }
                | RestError::UnknownCollection { .. }
                | RestError::UnsupportedSync { .. }
                | RestError::NotAnArray { .. }
        )
    }

    /// Name of the method involved, if any
    pub fn method(&self) -> Option<&str> {
        match self {
            RestError::DuplicateMethod { name } | RestError::UnknownMethod { name } => Some(name),
            RestError::MissingTemplate { method }
            | RestError::MissingParameter { method, .. }
            | RestError::UnresolvedPlaceholders { method, .. } => Some(method),
            _ => None,
        }
    }
}

/// Result type for REST operations
pub type Result<T> = std::result::Result<T, RestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_message() {
        let error = RestError::MissingParameter {
            method: "createUser".to_string(),
            parameter: "name".to_string(),
        };
        assert_eq!(error.to_string(), "missing parameter name for method createUser");
        assert!(error.is_validation());
        assert!(!error.is_configuration());
        assert_eq!(error.method(), Some("createUser"));
    }

    #[test]
    fn test_unresolved_placeholders_message() {
        let error = RestError::UnresolvedPlaceholders {
            method: "getPost".to_string(),
            placeholders: vec!["<userId>".to_string(), "<postId>".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "missing parameter/s <userId>,<postId> for method getPost"
        );
    }

    #[test]
    fn test_no_error_handler_names_url() {
        let error = RestError::NoErrorHandler {
            url: "https://api.test/users/7".to_string(),
        };
        assert!(error.to_string().contains("https://api.test/users/7"));
        assert!(error.method().is_none());
    }

    #[test]
    fn test_duplicate_is_configuration() {
        let error = RestError::DuplicateMethod {
            name: "getUser".to_string(),
        };
        assert!(error.is_configuration());
        assert!(!error.is_validation());
    }

    #[test]
    fn test_io_error_converts() {
        fn runtime() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no timer"))?;
            Ok(())
        }
        let error = runtime().unwrap_err();
        assert!(matches!(error, RestError::Io(_)));
        assert_eq!(error.to_string(), "I/O error: no timer");
        assert!(!error.is_configuration());
    }
}
