//! Unified Error Type System
//!
//! Centralized error type for the whole crate. Every variant carries a stable
//! machine-readable code and an HTTP status so that route failures can be
//! rendered as the uniform `{code, message, data: {status}}` envelope.
//!
//! ## Error Families
//!
//! - **Request preconditions**: missing target, disabled feature, forbidden actor
//! - **Upstream**: transport failures, malformed bodies, structured API errors
//! - **Result shape**: no usable choices, invalid images
//! - **System**: storage, configuration, serialization
//!
//! Credential problems never surface here at request time; they are collected
//! as [`SettingsError`]s while saving settings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum QuillError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Transport-level failure, passed through unchanged from the HTTP client
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    // -------------------------------------------------------------------------
    // Request Preconditions
    // -------------------------------------------------------------------------
    #[error("{0}")]
    PostIdRequired(String),

    /// Feature disabled, provider unauthenticated, or access denied.
    /// Always safe to show verbatim.
    #[error("{0}")]
    NotEnabled(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    PromptRequired(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// Missing or rejected credentials. Only produced during settings
    /// verification.
    #[error("{0}")]
    AuthRequired(String),

    // -------------------------------------------------------------------------
    // Upstream Errors
    // -------------------------------------------------------------------------
    #[error("Invalid JSON: {reason}")]
    InvalidResponseFormat { reason: String, body: String },

    /// Structured error payload returned by the upstream API
    #[error("{message}")]
    Upstream { code: u16, message: String },

    #[error("{0}")]
    NoChoicesReturned(String),

    // -------------------------------------------------------------------------
    // Image Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    InvalidImage(String),

    #[error("{0}")]
    NoValidMetadata(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    /// Catch-all raised at the classification boundary
    #[error("{0}")]
    RequestFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, QuillError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl QuillError {
    pub fn not_enabled(message: impl Into<String>) -> Self {
        Self::NotEnabled(message.into())
    }

    pub fn post_id_required(message: impl Into<String>) -> Self {
        Self::PostIdRequired(message.into())
    }

    pub fn no_choices(provider_name: &str) -> Self {
        Self::NoChoicesReturned(format!("No choices were returned from {}.", provider_name))
    }

    pub fn upstream(code: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            code,
            message: message.into(),
        }
    }

    /// Stable error code used in envelopes and diagnostics.
    ///
    /// Upstream errors use the HTTP status they were returned with.
    pub fn code(&self) -> String {
        match self {
            Self::PostIdRequired(_) => "post_id_required".to_string(),
            Self::NotEnabled(_) => "not_enabled".to_string(),
            Self::Forbidden(_) => "rest_forbidden".to_string(),
            Self::PromptRequired(_) => "prompt_required".to_string(),
            Self::InvalidParam(_) => "rest_invalid_param".to_string(),
            Self::AuthRequired(_) => "auth".to_string(),
            Self::InvalidResponseFormat { .. } => "invalid_response_format".to_string(),
            Self::Upstream { code, .. } => code.to_string(),
            Self::NoChoicesReturned(_) => "no_choices".to_string(),
            Self::InvalidImage(_) => "invalid".to_string(),
            Self::NoValidMetadata(_) => "no_valid_metadata".to_string(),
            Self::RequestFailed(_) => "request_failed".to_string(),
            Self::Transport(_) => "http_request_failed".to_string(),
            Self::Config(_) => "config".to_string(),
            Self::Io(_) | Self::Database(_) | Self::Storage(_) => "storage".to_string(),
            Self::Json(_) | Self::Yaml(_) => "serialization".to_string(),
        }
    }

    /// HTTP status for the error envelope
    pub fn status(&self) -> u16 {
        match self {
            Self::PostIdRequired(_) | Self::PromptRequired(_) | Self::InvalidParam(_) => 400,
            Self::AuthRequired(_) => 401,
            Self::Forbidden(_) | Self::NotEnabled(_) => 403,
            Self::InvalidImage(_) | Self::NoValidMetadata(_) => 422,
            Self::Transport(_) | Self::InvalidResponseFormat { .. } | Self::Upstream { .. } => 502,
            _ => 500,
        }
    }

    /// Whether the failure originated upstream and might succeed on a
    /// manual re-run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::InvalidResponseFormat { .. } | Self::Upstream { .. }
        )
    }

    /// Convert an unexpected runtime failure into the classification
    /// boundary error. Typed request and upstream errors pass through.
    pub fn into_request_failed(self) -> Self {
        match self {
            Self::Io(_) | Self::Database(_) | Self::Json(_) | Self::Yaml(_) | Self::Storage(_)
            | Self::Config(_) => Self::RequestFailed(self.to_string()),
            other => other,
        }
    }
}

// =============================================================================
// Error Envelope
// =============================================================================

/// Uniform failure body returned by every endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub data: ErrorData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub status: u16,
}

impl From<&QuillError> for ErrorEnvelope {
    fn from(err: &QuillError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            data: ErrorData {
                status: err.status(),
            },
        }
    }
}

// =============================================================================
// Settings Error
// =============================================================================

/// Field-level notice attached to a settings save response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsError {
    pub code: String,
    pub message: String,
}

impl SettingsError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a credential notice from a verification failure
    pub fn from_auth_failure(err: &QuillError) -> Self {
        Self::new("classifai-auth", err.to_string())
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
    /// Add lazily built context to an error
    fn with_context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| QuillError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| QuillError::Storage(format!("{}: {}", f(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(QuillError::post_id_required("x").code(), "post_id_required");
        assert_eq!(QuillError::not_enabled("x").code(), "not_enabled");
        assert_eq!(QuillError::upstream(401, "bad key").code(), "401");
        assert_eq!(QuillError::no_choices("xAI").code(), "no_choices");
    }

    #[test]
    fn test_envelope_from_error() {
        let err = QuillError::not_enabled("Title generation not currently enabled.");
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.code, "not_enabled");
        assert_eq!(envelope.message, "Title generation not currently enabled.");
        assert_eq!(envelope.data.status, 403);
    }

    #[test]
    fn test_upstream_display_is_message() {
        let err = QuillError::upstream(429, "Rate limit reached");
        assert_eq!(err.to_string(), "Rate limit reached");
        assert!(err.is_transient());
    }

    #[test]
    fn test_into_request_failed() {
        let err = QuillError::Storage("term insert failed".to_string()).into_request_failed();
        assert_eq!(err.code(), "request_failed");
        assert!(err.to_string().contains("term insert failed"));

        let already = QuillError::RequestFailed("boom".to_string()).into_request_failed();
        assert_eq!(already.to_string(), "boom");
    }

    #[test]
    fn test_into_request_failed_keeps_upstream_errors() {
        let err = QuillError::upstream(401, "Unauthorized").into_request_failed();
        assert!(matches!(err, QuillError::Upstream { code: 401, .. }));
        assert_eq!(err.status(), 502);

        let err = QuillError::InvalidResponseFormat {
            reason: "expected value".to_string(),
            body: "<html>".to_string(),
        }
        .into_request_failed();
        assert_eq!(err.code(), "invalid_response_format");
    }

    #[test]
    fn test_no_choices_message() {
        assert_eq!(
            QuillError::no_choices("xAI").to_string(),
            "No choices were returned from xAI."
        );
    }
}
