//! Authentication error types.

use thiserror::Error;

/// Why a refresh exchange did not produce a new access credential.
///
/// Cloneable so a single outcome can be handed to every queued request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshCause {
    /// Server answered with a non-success status
    #[error("server rejected refresh (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Refresh endpoint could not be reached
    #[error("network error: {0}")]
    Network(String),

    /// Exchange exceeded the configured bound
    #[error("refresh timed out")]
    Timeout,

    /// Success status but no usable access credential in the body
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),

    /// Initiating request was dropped before the refresh settled
    #[error("refresh was cancelled")]
    Cancelled,
}

/// Authentication error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No refresh credential was stored when a refresh was needed
    #[error("No refresh credential available")]
    NoRefreshCredential,

    /// Refresh exchange failed; the session has been cleared
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[from] RefreshCause),

    /// Protected call rejected again after its single retry
    #[error("Authorization failed: {message}")]
    AuthorizationFailure { message: String },

    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success response from a typed helper
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Session not found
    #[error("Not logged in")]
    NotLoggedIn,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(String),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error ends the session.
    ///
    /// A cancelled refresh leaves the stored credentials untouched.
    pub fn is_terminal(&self) -> bool {
        match self {
            AuthError::NoRefreshCredential => true,
            AuthError::RefreshFailed(cause) => *cause != RefreshCause::Cancelled,
            _ => false,
        }
    }

    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) => true,
            AuthError::RefreshFailed(RefreshCause::Network(_) | RefreshCause::Timeout) => true,
            AuthError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<credential_storage::StorageError> for AuthError {
    fn from(err: credential_storage::StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Json(err.to_string())
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::InvalidUrl(err.to_string())
    }
}

impl From<client_config::CoreError> for AuthError {
    fn from(err: client_config::CoreError) -> Self {
        AuthError::Config(err.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_failures_are_terminal() {
        assert!(AuthError::NoRefreshCredential.is_terminal());
        assert!(AuthError::RefreshFailed(RefreshCause::Timeout).is_terminal());
        assert!(AuthError::RefreshFailed(RefreshCause::Network("refused".to_string())).is_terminal());
    }

    #[test]
    fn test_cancelled_refresh_is_not_terminal() {
        assert!(!AuthError::RefreshFailed(RefreshCause::Cancelled).is_terminal());
    }

    #[test]
    fn test_request_failures_are_not_terminal() {
        assert!(!AuthError::Network("reset".to_string()).is_terminal());
        assert!(!AuthError::AuthorizationFailure {
            message: "denied".to_string()
        }
        .is_terminal());
        assert!(!AuthError::Api {
            status: 403,
            message: "forbidden".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn test_is_transient() {
        assert!(AuthError::Network("reset".to_string()).is_transient());
        assert!(AuthError::RefreshFailed(RefreshCause::Timeout).is_transient());
        assert!(AuthError::Api {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!AuthError::RefreshFailed(RefreshCause::Rejected {
            status: 401,
            message: "expired".to_string()
        })
        .is_transient());
        assert!(!AuthError::NotLoggedIn.is_transient());
    }

    #[test]
    fn test_refresh_cause_converts() {
        let err: AuthError = RefreshCause::MalformedResponse("missing access".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Token refresh failed: malformed refresh response: missing access"
        );
    }
}
