//! Transfer session state and re-entrancy guards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::ResolvedPlaylist;
use crate::transfer::TransferProgress;

// =============================================================================
// In-progress guards
// =============================================================================

/// Shared "a flow is running" flag.
///
/// Cloning shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct InProgressFlag(Arc<AtomicBool>);

impl InProgressFlag {
    /// Create a cleared flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag if it is clear. The returned guard clears it on drop.
    #[must_use]
    pub fn try_acquire(&self) -> Option<InProgressGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InProgressGuard(Arc::clone(&self.0)))
    }

    /// Whether a guard is currently live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Holds an [`InProgressFlag`] set until dropped.
#[derive(Debug)]
pub struct InProgressGuard(Arc<AtomicBool>);

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Transfer session
// =============================================================================

/// State of one transfer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    /// The submitted playlist link.
    pub playlist_url: String,
    /// Target playlist identifier.
    pub playlist_id: String,
    /// Source playlist display name.
    pub playlist_name: String,
    /// Track count as reported by the backend.
    pub total_tracks: usize,
    tracks: Vec<String>,
    added_count: usize,
    not_found_count: usize,
    not_found: Vec<String>,
}

impl TransferSession {
    /// Start a session from a resolve answer. Counts start at zero.
    #[must_use]
    pub fn new(playlist_url: impl Into<String>, resolved: ResolvedPlaylist) -> Self {
        Self {
            playlist_url: playlist_url.into(),
            playlist_id: resolved.playlist_id,
            playlist_name: resolved.playlist_name,
            total_tracks: resolved.total_tracks,
            tracks: resolved.tracks,
            added_count: 0,
            not_found_count: 0,
            not_found: Vec::new(),
        }
    }

    /// Ordered track names.
    #[must_use]
    pub fn tracks(&self) -> &[String] {
        &self.tracks
    }

    /// Number of tracks that will be processed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether there is nothing to process.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks added so far.
    #[must_use]
    pub const fn added_count(&self) -> usize {
        self.added_count
    }

    /// Tracks not found so far, including those folded in on early stop.
    #[must_use]
    pub const fn not_found_count(&self) -> usize {
        self.not_found_count
    }

    /// Names of tracks that were not found or never attempted.
    #[must_use]
    pub fn not_found(&self) -> &[String] {
        &self.not_found
    }

    /// Record a successful add.
    pub const fn record_added(&mut self) {
        self.added_count += 1;
    }

    /// Record a track that was not found.
    pub fn record_not_found(&mut self, track: &str) {
        self.not_found_count += 1;
        self.not_found.push(track.to_string());
    }

    /// Fold `tracks[from..]` into the not-found outcome. Returns how many were folded.
    pub fn fold_remaining(&mut self, from: usize) -> usize {
        let remaining = self.tracks.get(from..).unwrap_or_default();
        self.not_found.extend(remaining.iter().cloned());
        self.not_found_count += remaining.len();
        remaining.len()
    }

    /// Progress after `current` tracks have been processed.
    #[must_use]
    pub fn progress(&self, current: usize) -> TransferProgress {
        TransferProgress {
            current,
            total: self.tracks.len(),
            added: self.added_count,
            not_found: self.not_found_count,
        }
    }

    /// Give up the not-found list.
    #[must_use]
    pub fn into_not_found(self) -> Vec<String> {
        self.not_found
    }
}
