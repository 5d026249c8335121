//! Unified application error types for devpulse.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
///
/// The first group is observable to clients on the wire (`loginError` /
/// `error` frames); the rest are internal and collapse to `INTERNAL`
/// before leaving the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Malformed JSON, unknown message type, or missing required fields.
    InvalidFrame,
    /// Bad token, taken username, or failed resume.
    AuthFailure,
    /// The operation requires an authenticated identity.
    Forbidden,
    /// The requested resource (invite code, channel) was not found.
    NotFound,
    /// The channel is at its member capacity.
    FullChannel,
    /// The caller is already a member of the channel.
    AlreadyMember,
    /// A uniqueness conflict occurred (duplicate key, concurrent insert).
    Conflict,
    /// An internal server error occurred.
    Internal,
    /// A database error occurred.
    Database,
    /// A cache/broker error occurred.
    Cache,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An external identity-provider error occurred.
    ExternalService,
}

impl ErrorKind {
    /// The code sent to clients in `error` frames.
    ///
    /// Transient downstream kinds are deliberately collapsed so that
    /// infrastructure detail never leaks onto the wire.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::InvalidFrame => "INVALID_FRAME",
            Self::AuthFailure => "AUTH_FAILURE",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::FullChannel => "FULL_CHANNEL",
            Self::AlreadyMember => "ALREADY_MEMBER",
            Self::Conflict
            | Self::Internal
            | Self::Database
            | Self::Cache
            | Self::Configuration
            | Self::Serialization
            | Self::ExternalService => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFrame => write!(f, "INVALID_FRAME"),
            Self::AuthFailure => write!(f, "AUTH_FAILURE"),
            Self::Forbidden => write!(f, "FORBIDDEN"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::FullChannel => write!(f, "FULL_CHANNEL"),
            Self::AlreadyMember => write!(f, "ALREADY_MEMBER"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::Database => write!(f, "DATABASE"),
            Self::Cache => write!(f, "CACHE"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::ExternalService => write!(f, "EXTERNAL_SERVICE"),
        }
    }
}

/// The unified application error used throughout devpulse.
///
/// All crate-specific errors are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls. This provides a single error type for
/// the entire application boundary.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid-frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidFrame, message)
    }

    /// Create an authentication-failure error.
    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailure, message)
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a full-channel error.
    pub fn full_channel(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FullChannel, message)
    }

    /// Create an already-member error.
    pub fn already_member(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyMember, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cache, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an external-service error.
    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.kind {
            ErrorKind::InvalidFrame => StatusCode::BAD_REQUEST,
            ErrorKind::AuthFailure => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::FullChannel | ErrorKind::AlreadyMember => StatusCode::CONFLICT,
            _ => {
                tracing::error!(error = %self.message, "Internal server error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.kind.wire_code(),
            "message": self.message,
        });

        (status, Json(body)).into_response()
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
