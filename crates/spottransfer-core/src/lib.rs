//! `Spottransfer` Core Library
//!
//! This crate provides the core functionality for moving a Spotify playlist
//! to `YouTube` through the transfer backend:
//! - Playlist link validation
//! - The authorization popup flow and its one-shot completion listener
//! - The per-track transfer orchestrator with quota and session handling
//! - An HTTP backend client keeping the session cookie and anti-forgery token
//! - Client configuration management
//! - Completion and quota report markup
//!
//! # Error Handling
//!
//! Errors are typed per domain. See the [`error`] module for details.
//!
//! ```rust,ignore
//! use spottransfer_core::{Error, Result};
//!
//! fn do_something() -> Result<()> {
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod playlist_url;
pub mod report;
pub mod session;
pub mod transfer;

pub use api::{ResolvedPlaylist, TrackOutcome, TrackResponse};
pub use auth::{
    AUTH_COMPLETE, AuthMessage, AuthMessageListener, AuthOptions, AuthOutcome, AuthPopup,
    AuthorizationFlow, CALLBACK_PATH, PopupLauncher, SystemBrowser,
};
pub use backend::{HttpBackend, TransferBackend, extract_csrf_token};
pub use config::{AppConfig, AuthConfig, SavedSession, default_log_directory};
pub use error::{
    AuthError, BackendError, Error, ErrorKind, FileSystemError, Result, TransferError,
};
pub use playlist_url::{MAX_PLAYLIST_URL_LEN, PlaylistUrlValidation, validate_playlist_url};
pub use report::{COMPLETION_ALL_TRANSFERRED, escape_html, html_document, write_html_report};
pub use session::{InProgressFlag, InProgressGuard, TransferSession};
pub use transfer::{
    DEFAULT_TRACK_DELAY, TrackStatus, TransferEvent, TransferOptions, TransferOrchestrator,
    TransferOutcome, TransferPhase, TransferProgress, TransferReport,
};
