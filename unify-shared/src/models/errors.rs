//! Error body returned by the REST backend.

use serde::{Deserialize, Serialize};

/// Error body returned by the REST backend.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// The main error message
    #[serde(alias = "err", alias = "error")]
    pub message: String,
    /// Optional additional details about the error
    #[serde(default)]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response with just a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Creates a new error response with message and details.
    #[must_use]
    pub fn with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Best-effort decoding of an error body; falls back to the raw text.
    #[must_use]
    pub fn from_body(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self::new(body.trim()))
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.message, details),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ErrorResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_display() {
        let error_no_details = ErrorResponse::new("Simple error");
        assert_eq!(format!("{error_no_details}"), "Simple error");

        let error_with_details = ErrorResponse::with_details("Main error", "Additional info");
        assert_eq!(
            format!("{error_with_details}"),
            "Main error: Additional info"
        );
    }

    #[test]
    fn test_from_body_accepts_err_key() {
        let error = ErrorResponse::from_body(r#"{"err":"Invalid token."}"#);
        assert_eq!(error.message, "Invalid token.");
        assert_eq!(error.details, None);
    }

    #[test]
    fn test_from_body_falls_back_to_text() {
        let error = ErrorResponse::from_body("Bad Gateway\n");
        assert_eq!(error.message, "Bad Gateway");
    }
}
