//! Spotify playlist link validation.
//!
//! Validation happens before any network call, so a malformed link never
//! reaches the backend.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result, TransferError};

/// Longest playlist link accepted.
pub const MAX_PLAYLIST_URL_LEN: usize = 500;

/// Accepted playlist link shape. Query strings (e.g. `?si=...`) are allowed.
pub const PLAYLIST_URL_PATTERN: &str = r"^https://open\.spotify\.com/playlist/([A-Za-z0-9]+)(\?.*)?$";

/// Result of playlist link validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistUrlValidation {
    /// Whether the link is acceptable.
    pub is_valid: bool,
    /// The Spotify playlist ID, if valid.
    pub playlist_id: Option<String>,
    /// Error text, if invalid.
    pub error_message: Option<String>,
}

impl PlaylistUrlValidation {
    /// Create a successful validation result.
    #[must_use]
    pub const fn valid(playlist_id: String) -> Self {
        Self {
            is_valid: true,
            playlist_id: Some(playlist_id),
            error_message: None,
        }
    }

    /// Create a failed validation result.
    #[must_use]
    pub const fn invalid(error_message: String) -> Self {
        Self {
            is_valid: false,
            playlist_id: None,
            error_message: Some(error_message),
        }
    }
}

/// Validate a Spotify playlist link.
///
/// ```rust
/// use spottransfer_core::playlist_url::validate_playlist_url;
///
/// let result = validate_playlist_url("https://open.spotify.com/playlist/abc123?si=xyz");
/// assert!(result.is_valid);
/// assert_eq!(result.playlist_id.as_deref(), Some("abc123"));
///
/// let result = validate_playlist_url("https://open.spotify.com/album/abc123");
/// assert!(!result.is_valid);
/// ```
#[must_use]
pub fn validate_playlist_url(url: &str) -> PlaylistUrlValidation {
    let url = url.trim();

    if url.is_empty() {
        return PlaylistUrlValidation::invalid(TransferError::EmptyUrl.to_string());
    }

    if url.len() > MAX_PLAYLIST_URL_LEN {
        return PlaylistUrlValidation::invalid("Playlist URL is too long".to_string());
    }

    let Ok(pattern) = Regex::new(PLAYLIST_URL_PATTERN) else {
        return PlaylistUrlValidation::invalid("Invalid Spotify playlist URL".to_string());
    };

    match pattern
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
    {
        Some(playlist_id) => PlaylistUrlValidation::valid(playlist_id),
        None => PlaylistUrlValidation::invalid("Invalid Spotify playlist URL".to_string()),
    }
}

/// Check a submitted link and return the trimmed form to send.
///
/// Emptiness is always checked; the shape check only runs when
/// `check_shape` is set.
pub fn check_submission(url: &str, check_shape: bool) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(TransferError::EmptyUrl.into());
    }

    if check_shape {
        let validation = validate_playlist_url(trimmed);
        if let Some(playlist_id) = &validation.playlist_id {
            debug!("Submitting Spotify playlist {}", playlist_id);
        }
        if !validation.is_valid {
            return Err(Error::invalid_url(
                trimmed,
                validation
                    .error_message
                    .unwrap_or_else(|| "Invalid Spotify playlist URL".to_string()),
            ));
        }
    }

    Ok(trimmed.to_string())
}
