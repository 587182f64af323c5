//! Wire types exchanged with the transfer backend.
//!
//! All bodies are JSON. Response types are lenient: missing fields default so
//! that partial answers (for example `{"quota_exceeded": true}`) still decode.

use serde::{Deserialize, Serialize};

/// Endpoint paths on the backend.
pub mod endpoints {
    /// Page load; carries the CSRF meta tag and sets the session cookie.
    pub const INDEX: &str = "/";
    /// Playlist resolve call.
    pub const TRANSFER: &str = "/transfer";
    /// Per-track transfer call.
    pub const TRANSFER_TRACK: &str = "/transfer_track";
    /// Authorization completion call.
    pub const COMPLETE_AUTH: &str = "/complete_auth";
    /// Authorization start page, loaded in the popup.
    pub const AUTHORIZE: &str = "/authorize";
    /// Session teardown.
    pub const DISCONNECT: &str = "/disconnect";
}

/// Header carrying the anti-forgery token on state-changing requests.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Prefix of the error text the backend uses for an expired session.
pub const SESSION_EXPIRED_MARKER: &str = "Session expired";

/// Body of the playlist resolve call.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveRequest<'a> {
    /// The source playlist link.
    pub playlist_url: &'a str,
}

/// Successful answer of the playlist resolve call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPlaylist {
    /// Identifier of the target playlist, required by every per-track call.
    pub playlist_id: String,
    /// Display name of the source playlist.
    #[serde(default)]
    pub playlist_name: String,
    /// Track count as reported by the backend.
    #[serde(default)]
    pub total_tracks: usize,
    /// Ordered track names ("Title - Artist, Artist").
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Body of a per-track call.
#[derive(Debug, Clone, Serialize)]
pub struct TrackRequest<'a> {
    /// Track name to search for.
    pub track_name: &'a str,
    /// Target playlist identifier.
    pub playlist_id: &'a str,
}

/// Answer of a per-track call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackResponse {
    /// Whether the track was added to the target playlist.
    #[serde(default)]
    pub success: bool,
    /// Whether a match was found.
    #[serde(default)]
    pub found: bool,
    /// Upstream quota was exhausted; no further tracks can be processed.
    #[serde(default)]
    pub quota_exceeded: bool,
    /// Error text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Informational message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Classification of a per-track answer, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackOutcome {
    /// The backend reports the session is gone.
    SessionExpired,
    /// The backend reports upstream quota exhaustion.
    QuotaExceeded,
    /// Matched and added.
    Added,
    /// Not matched, not added, or failed.
    NotFound,
}

impl TrackResponse {
    /// The normalized answer used when a per-track call fails in transport.
    #[must_use]
    pub fn not_found() -> Self {
        Self::default()
    }

    /// Whether the error text signals an expired session.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|error| error.trim_start().starts_with(SESSION_EXPIRED_MARKER))
    }

    /// Classify the answer. Session expiry wins over quota, quota over success.
    #[must_use]
    pub fn outcome(&self) -> TrackOutcome {
        if self.is_session_expired() {
            TrackOutcome::SessionExpired
        } else if self.quota_exceeded {
            TrackOutcome::QuotaExceeded
        } else if self.success && self.found {
            TrackOutcome::Added
        } else {
            TrackOutcome::NotFound
        }
    }
}

/// Body of the authorization completion call.
#[derive(Debug, Clone, Serialize)]
pub struct CompleteAuthRequest<'a> {
    /// Opaque state token received from the popup.
    pub state: &'a str,
}

/// Answer of the authorization completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompleteAuthResponse {
    /// Whether the backend accepted the state.
    #[serde(default)]
    pub success: bool,
    /// Error text on rejection.
    #[serde(default)]
    pub error: Option<String>,
}

/// Generic error body returned with non-success statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    /// Server supplied error text.
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Extract the error text from a raw body, if it is JSON with an `error` field.
    #[must_use]
    pub fn message_from(body: &str) -> Option<String> {
        serde_json::from_str::<Self>(body)
            .ok()
            .and_then(|parsed| parsed.error)
            .filter(|message| !message.trim().is_empty())
    }
}
