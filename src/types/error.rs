//! Error types for the trainer gateway
//!
//! Every failure a handler can produce is one `GatewayError` variant, and
//! each variant owns its HTTP status and machine-readable code.

use hyper::StatusCode;

use crate::ledger::{LedgerError, RejectCode};

/// Main error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed or missing input. Never reaches the ledger.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    /// Role insufficient or caller identity not enrolled
    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    /// Second declaration against an already converged scope
    #[error("{0}")]
    AlreadyConverged(String),

    /// Write-once record already exists
    #[error("{0}")]
    Conflict(String),

    /// Verifiable credential rejected (signature, validity window, job id)
    #[error("Credential rejected: {0}")]
    Credential(String),

    /// No signing material provisioned for the resolved ledger identity
    #[error("Identity not provisioned: {0}")]
    IdentityResolution(String),

    /// Ledger transport or consensus failure
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Credential(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::IdentityResolution(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyConverged(_) => StatusCode::CONFLICT,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code emitted alongside the message in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_ERROR",
            Self::Authorization(_) => "AUTHORIZATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyConverged(_) => "ALREADY_CONVERGED",
            Self::Conflict(_) => "CONFLICT",
            Self::Credential(_) => "CREDENTIAL_INVALID",
            Self::IdentityResolution(_) => "IDENTITY_NOT_PROVISIONED",
            Self::Ledger(_) => "LEDGER_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// Implement From conversions for common error types

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected { code, message } => match code {
                RejectCode::InvalidArgument => Self::Validation(message),
                RejectCode::NotFound => Self::NotFound(message),
                RejectCode::NotAuthorized => Self::Authorization(message),
                RejectCode::AlreadyConverged => Self::AlreadyConverged(message),
                RejectCode::AlreadyExists => Self::Conflict(message),
            },
            LedgerError::NoReplicas => Self::Config(err.to_string()),
            other => Self::Ledger(other.to_string()),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for GatewayError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for GatewayError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Authentication(format!("JWT error: {}", err))
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
