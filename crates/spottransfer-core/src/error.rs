//! Error types for Spottransfer core operations.
//!
//! Errors are grouped by domain:
//! - [`TransferError`] for user input and re-entrancy rejections of the transfer flow
//! - [`AuthError`] for the authorization popup flow
//! - [`BackendError`] for HTTP exchanges with the transfer backend
//! - [`FileSystemError`] for configuration file access
//!
//! Quota exhaustion and session expiry are not errors: they are response
//! signals handled by the orchestrator (see [`crate::transfer`]).

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Fallback message surfaced when the backend gives no error text.
pub const GENERIC_TRANSFER_FAILURE: &str = "Transfer failed";

/// Fallback message surfaced when authentication completion fails.
pub const GENERIC_AUTH_FAILURE: &str = "Authentication failed. Please try again.";

/// Errors that can occur in Spottransfer core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transfer flow rejected or aborted.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Authorization flow failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Backend exchange failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// File system operation failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the transfer flow before or while it runs.
#[derive(Debug, Error)]
pub enum TransferError {
    /// No playlist URL was entered.
    #[error("Please enter a Spotify playlist URL")]
    EmptyUrl,

    /// The playlist URL does not have the expected shape.
    #[error("{reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A transfer session is already live.
    #[error("A transfer is already in progress")]
    AlreadyInProgress,
}

/// Errors raised by the authorization flow.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization popup could not be opened.
    #[error("Failed to open authorization window: {0}")]
    LaunchFailed(String),

    /// The popup was closed before the completion message arrived.
    #[error("Authorization window was closed before completing")]
    PopupClosed,

    /// No completion message arrived in time.
    #[error("Authorization timed out after {secs}s")]
    TimedOut {
        /// Timeout that elapsed, in seconds.
        secs: u64,
    },

    /// The completion listener could not be started or stopped unexpectedly.
    #[error("Authorization listener failed: {0}")]
    Listener(String),

    /// The backend rejected the completion state.
    #[error("{0}")]
    Rejected(String),
}

/// Errors raised while talking to the transfer backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The configured base URL or an endpoint URL is invalid.
    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// The request never produced a response (connection, TLS, body read).
    #[error("Request to {endpoint} failed: {reason}")]
    Request {
        /// Endpoint path.
        endpoint: String,
        /// Transport failure.
        reason: String,
    },

    /// The response body was not the expected JSON.
    #[error("Invalid response from {endpoint}: {reason}")]
    Decode {
        /// Endpoint path.
        endpoint: String,
        /// Decode failure.
        reason: String,
    },

    /// The backend answered 401: the session is missing or expired.
    #[error("{message}")]
    Unauthorized {
        /// Endpoint path.
        endpoint: String,
        /// Server supplied message.
        message: String,
    },

    /// The backend answered with a non-success status.
    #[error("{message}")]
    Status {
        /// Endpoint path.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Server supplied message, or a generic fallback.
        message: String,
    },
}

impl BackendError {
    /// Whether this error comes from the transport or body decoding rather
    /// than from an explicit server answer.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Decode { .. })
    }
}

/// File system errors.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Reading a file failed.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// File path.
        path: PathBuf,
        /// Failure reason.
        reason: String,
    },

    /// Writing a file failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// File path.
        path: PathBuf,
        /// Failure reason.
        reason: String,
    },

    /// Creating a directory failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory path.
        path: PathBuf,
        /// Failure reason.
        reason: String,
    },
}

/// Coarse error category, used by front ends to pick a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected user input.
    InvalidInput,
    /// Rejected because an equivalent flow is live.
    Busy,
    /// Authorization problem.
    Auth,
    /// Backend answered with an error.
    Backend,
    /// Backend could not be reached or understood.
    Network,
    /// Local configuration, file or serialization problem.
    Local,
}

impl Error {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transfer(TransferError::AlreadyInProgress) => ErrorKind::Busy,
            Self::Transfer(_) => ErrorKind::InvalidInput,
            Self::Auth(_) | Self::Backend(BackendError::Unauthorized { .. }) => ErrorKind::Auth,
            Self::Backend(BackendError::Status { .. }) => ErrorKind::Backend,
            Self::Backend(_) => ErrorKind::Network,
            Self::FileSystem(_) | Self::Configuration(_) | Self::Io(_) | Self::Serialization(_) => {
                ErrorKind::Local
            }
        }
    }

    /// The message shown to the user for this error.
    ///
    /// Server supplied messages are passed through untouched; empty ones fall
    /// back to a generic text.
    #[must_use]
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            GENERIC_TRANSFER_FAILURE.to_string()
        } else {
            message
        }
    }

    /// Shorthand for an invalid playlist URL rejection.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transfer(TransferError::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_url_message() {
        let err = Error::from(TransferError::EmptyUrl);
        assert_eq!(err.to_string(), "Please enter a Spotify playlist URL");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_status_error_passes_server_message() {
        let err = Error::from(BackendError::Status {
            endpoint: "/transfer".to_string(),
            status: 400,
            message: "Playlist is empty or has no accessible tracks".to_string(),
        });
        assert_eq!(
            err.user_message(),
            "Playlist is empty or has no accessible tracks"
        );
        assert_eq!(err.kind(), ErrorKind::Backend);
    }

    #[test]
    fn test_blank_message_falls_back() {
        let err = Error::from(BackendError::Status {
            endpoint: "/transfer".to_string(),
            status: 500,
            message: "  ".to_string(),
        });
        assert_eq!(err.user_message(), GENERIC_TRANSFER_FAILURE);
    }

    #[test]
    fn test_transport_classification() {
        let request = BackendError::Request {
            endpoint: "/transfer_track".to_string(),
            reason: "connection refused".to_string(),
        };
        let unauthorized = BackendError::Unauthorized {
            endpoint: "/transfer_track".to_string(),
            message: "Session expired".to_string(),
        };
        assert!(request.is_transport());
        assert!(!unauthorized.is_transport());
        assert_eq!(Error::from(request).kind(), ErrorKind::Network);
        assert_eq!(Error::from(unauthorized).kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_busy_kind() {
        let err = Error::from(TransferError::AlreadyInProgress);
        assert_eq!(err.kind(), ErrorKind::Busy);
    }

    #[test]
    fn test_file_system_error_display() {
        let err = Error::from(FileSystemError::ReadFailed {
            path: PathBuf::from("/test/config.json"),
            reason: "permission denied".to_string(),
        });
        assert!(err.to_string().contains("/test/config.json"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
