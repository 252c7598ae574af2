//! Typed failures of the auth operations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Categories of auth failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Login exchange rejected with a detail message
    InvalidCredentials,
    /// Response body missing expected fields or not JSON
    MalformedResponse,
    /// Transport-level failure (no response)
    NetworkFailure,
    /// Request exceeded the configured timeout
    Timeout,
    /// Stored token expired locally
    TokenExpired,
    /// Backend no longer accepts the stored token
    VerificationRejected,
    /// Token could not be persisted after a successful exchange
    StorageFailure,
    /// Caller cancelled the attempt
    Cancelled,
    /// A newer attempt started before this one finished
    Superseded,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::NetworkFailure => "network_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::VerificationRejected => "verification_rejected",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Superseded => "superseded",
        };
        f.write_str(label)
    }
}

/// Auth failure with a user-facing message and optional diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub kind: ErrorKind,
    /// One-line message suitable for a notification
    pub message: String,
    /// Diagnostic details (raw body, transport error); never shown to users
    pub details: Option<String>,
}

impl AuthError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Backend rejected the password; `detail` is shown verbatim.
    pub fn invalid_credentials(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCredentials, detail)
    }

    pub fn malformed(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, "Server returned invalid response")
            .with_details(details)
    }

    pub fn network(details: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::NetworkFailure,
            "An error occurred during authentication",
        )
        .with_details(details)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "The server took too long to respond")
    }

    pub fn token_expired() -> Self {
        Self::new(ErrorKind::TokenExpired, "Session token expired")
    }

    pub fn verification_rejected(details: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::VerificationRejected,
            "Your session has expired. Please log in again.",
        )
        .with_details(details)
    }

    pub fn storage(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageFailure, "Could not save the session on this device")
            .with_details(details)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Request cancelled")
    }

    pub fn superseded() -> Self {
        Self::new(
            ErrorKind::Superseded,
            "Superseded by a newer authentication attempt",
        )
    }

    /// Classifies a transport error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout().with_details(err.to_string())
        } else if err.is_decode() {
            Self::malformed(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AuthError {}

/// Result type for auth operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;
