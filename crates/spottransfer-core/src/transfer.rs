//! Transfer orchestrator for migrating a playlist track by track.
//!
//! The orchestrator resolves a playlist through the backend, then issues one
//! per-track request at a time, strictly in order. Progress is published as a
//! stream of [`TransferEvent`]s so that rendering stays out of the loop.
//!
//! Two backend signals end a session early:
//! - quota exhaustion: the current and all later tracks are folded into the
//!   not-found list and a partial report is produced
//! - session expiry: the backend page is reloaded and the flow stops so the
//!   user can authorize again
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use spottransfer_core::backend::HttpBackend;
//! use spottransfer_core::transfer::{TransferOrchestrator, TransferOptions};
//! use tokio::sync::mpsc;
//!
//! let backend = Arc::new(HttpBackend::connect("http://localhost:5000").await?);
//! let orchestrator = TransferOrchestrator::new(backend, TransferOptions::default());
//! let (tx, mut rx) = mpsc::unbounded_channel();
//!
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//!
//! let report = orchestrator
//!     .run("https://open.spotify.com/playlist/abc123", &tx)
//!     .await?;
//! println!("Added {} of {}", report.added, report.total_tracks);
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::api::{TrackOutcome, TrackResponse};
use crate::backend::TransferBackend;
use crate::error::{BackendError, Error, Result, TransferError};
use crate::playlist_url::check_submission;
use crate::session::{InProgressFlag, TransferSession};

/// Default pause between two per-track calls.
pub const DEFAULT_TRACK_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// Transfer Options
// =============================================================================

/// Configuration options for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Pause between two per-track calls.
    pub track_delay: Duration,
    /// Whether the playlist link is shape-checked before submission.
    pub validate_url: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            track_delay: DEFAULT_TRACK_DELAY,
            validate_url: true,
        }
    }
}

impl TransferOptions {
    /// Set the pause between per-track calls.
    #[must_use]
    pub const fn with_track_delay(mut self, track_delay: Duration) -> Self {
        self.track_delay = track_delay;
        self
    }

    /// Enable or disable link shape validation.
    #[must_use]
    pub const fn with_url_validation(mut self, validate_url: bool) -> Self {
        self.validate_url = validate_url;
        self
    }
}

// =============================================================================
// Phases and Progress
// =============================================================================

/// Current phase of the transfer flow.
///
/// A terminal phase stays published until the next submission; the
/// orchestrator is idle again as soon as [`TransferOrchestrator::is_running`]
/// turns false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TransferPhase {
    /// Nothing submitted yet.
    #[default]
    Idle,
    /// Waiting for the playlist resolve call.
    Resolving,
    /// Processing tracks.
    Transferring,
    /// Every track was processed.
    Completed,
    /// Stopped early on upstream quota exhaustion.
    QuotaExceeded,
    /// Stopped because the backend session expired.
    SessionExpired,
    /// Aborted on an error.
    Failed,
}

impl TransferPhase {
    /// Whether the phase ends a session.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::QuotaExceeded | Self::SessionExpired | Self::Failed
        )
    }
}

impl std::fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Resolving => write!(f, "Resolving"),
            Self::Transferring => write!(f, "Transferring"),
            Self::Completed => write!(f, "Completed"),
            Self::QuotaExceeded => write!(f, "Quota exceeded"),
            Self::SessionExpired => write!(f, "Session expired"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Counters after a number of processed tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransferProgress {
    /// Tracks processed so far.
    pub current: usize,
    /// Tracks in the session.
    pub total: usize,
    /// Tracks added.
    pub added: usize,
    /// Tracks not found.
    pub not_found: usize,
}

impl TransferProgress {
    /// Completion percentage (0.0 - 100.0). Zero when there are no tracks.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64) * 100.0
        }
    }

    /// Completion percentage rounded for display.
    #[must_use]
    pub fn rounded_percent(&self) -> u8 {
        self.percent().round().clamp(0.0, 100.0) as u8
    }
}

/// Per-track result shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    /// Matched and added.
    Added,
    /// Not matched or failed.
    NotFound,
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "Added"),
            Self::NotFound => write!(f, "Not found"),
        }
    }
}

// =============================================================================
// Events and Report
// =============================================================================

/// Events published while a transfer runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferEvent {
    /// The playlist resolve call was sent.
    Resolving,
    /// The playlist was resolved; counters start at zero.
    Resolved {
        /// Source playlist name.
        playlist_name: String,
        /// Track count reported by the backend.
        total_tracks: usize,
    },
    /// A per-track call is about to be sent.
    Searching {
        /// Zero-based track index.
        index: usize,
        /// Track name.
        track: String,
    },
    /// A track was processed.
    TrackProcessed {
        /// Zero-based track index.
        index: usize,
        /// Track name.
        track: String,
        /// What happened to it.
        status: TrackStatus,
        /// Counters after this track.
        progress: TransferProgress,
    },
    /// Upstream quota ran out; the session ends with a partial report.
    QuotaExceeded {
        /// Tracks processed before the quota signal.
        processed: usize,
        /// Tracks added.
        added: usize,
        /// Track count reported by the backend.
        total_tracks: usize,
        /// Tracks never attempted, now counted as not found.
        remaining: usize,
        /// Counters including the folded tracks.
        progress: TransferProgress,
    },
    /// The backend session expired; authorization is required again.
    SessionExpired {
        /// Server supplied message.
        message: String,
    },
    /// Final report of a completed or quota-stopped session.
    Completed(TransferReport),
    /// The flow aborted.
    Failed {
        /// Message shown to the user.
        message: String,
    },
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    /// Every track was processed.
    Completed,
    /// Stopped early on quota exhaustion.
    QuotaExceeded {
        /// Tracks processed before the signal.
        processed: usize,
        /// Tracks folded into the not-found list.
        remaining: usize,
    },
    /// Stopped on session expiry.
    SessionExpired,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    /// Source playlist name.
    pub playlist_name: String,
    /// Track count reported by the backend.
    pub total_tracks: usize,
    /// Tracks added.
    pub added: usize,
    /// Tracks not found, including those never attempted.
    pub not_found_count: usize,
    /// Names of tracks not found, in processing order.
    pub not_found: Vec<String>,
    /// How the session ended.
    pub outcome: TransferOutcome,
}

impl TransferReport {
    fn from_session(session: TransferSession, outcome: TransferOutcome) -> Self {
        Self {
            playlist_name: session.playlist_name.clone(),
            total_tracks: session.total_tracks,
            added: session.added_count(),
            not_found_count: session.not_found_count(),
            not_found: session.into_not_found(),
            outcome,
        }
    }

    /// Whether no track ended up in the not-found list.
    #[must_use]
    pub fn all_transferred(&self) -> bool {
        self.not_found.is_empty()
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives one transfer session at a time against a backend.
pub struct TransferOrchestrator<B: TransferBackend> {
    backend: Arc<B>,
    options: TransferOptions,
    in_progress: InProgressFlag,
    phase_tx: watch::Sender<TransferPhase>,
}

impl<B: TransferBackend> TransferOrchestrator<B> {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(backend: Arc<B>, options: TransferOptions) -> Self {
        let (phase_tx, _) = watch::channel(TransferPhase::Idle);
        Self {
            backend,
            options,
            in_progress: InProgressFlag::new(),
            phase_tx,
        }
    }

    /// Options in use.
    #[must_use]
    pub const fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Whether a session is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_progress.is_active()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> TransferPhase {
        *self.phase_tx.borrow()
    }

    /// Observe phase changes.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<TransferPhase> {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: TransferPhase) {
        debug!("Transfer phase: {}", phase);
        self.phase_tx.send_replace(phase);
    }

    /// Run a transfer of `playlist_url`, publishing progress on `events`.
    ///
    /// Returns the report for completed and quota-stopped sessions as well as
    /// for session expiry (with [`TransferOutcome::SessionExpired`]).
    ///
    /// # Errors
    ///
    /// - [`TransferError::EmptyUrl`] / [`TransferError::InvalidUrl`] before any
    ///   network call
    /// - [`TransferError::AlreadyInProgress`] if a session is running
    /// - the backend error that aborted the flow; a [`TransferEvent::Failed`]
    ///   is published first
    pub async fn run(
        &self,
        playlist_url: &str,
        events: &mpsc::UnboundedSender<TransferEvent>,
    ) -> Result<TransferReport> {
        let playlist_url = check_submission(playlist_url, self.options.validate_url)?;

        let Some(_guard) = self.in_progress.try_acquire() else {
            debug!("Transfer already in progress, ignoring submit");
            return Err(TransferError::AlreadyInProgress.into());
        };

        match self.drive(&playlist_url, events).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let message = e.user_message();
                error!("Transfer failed: {}", message);
                self.set_phase(TransferPhase::Failed);
                let _ = events.send(TransferEvent::Failed { message });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        playlist_url: &str,
        events: &mpsc::UnboundedSender<TransferEvent>,
    ) -> Result<TransferReport> {
        self.set_phase(TransferPhase::Resolving);
        let _ = events.send(TransferEvent::Resolving);

        let resolved = self.backend.resolve_playlist(playlist_url).await?;
        let mut session = TransferSession::new(playlist_url, resolved);
        info!(
            "Resolved playlist '{}' with {} tracks",
            session.playlist_name,
            session.len()
        );
        self.set_phase(TransferPhase::Transferring);
        let _ = events.send(TransferEvent::Resolved {
            playlist_name: session.playlist_name.clone(),
            total_tracks: session.total_tracks,
        });

        let tracks = session.tracks().to_vec();
        for (index, track) in tracks.iter().enumerate() {
            let _ = events.send(TransferEvent::Searching {
                index,
                track: track.clone(),
            });

            let response = match self
                .backend
                .transfer_track(track, &session.playlist_id)
                .await
            {
                Ok(response) => response,
                Err(Error::Backend(BackendError::Unauthorized { message, .. })) => {
                    TrackResponse {
                        error: Some(message),
                        ..TrackResponse::not_found()
                    }
                }
                Err(Error::Backend(e)) if e.is_transport() => {
                    warn!("Track '{}' failed, counting as not found: {}", track, e);
                    TrackResponse::not_found()
                }
                Err(e) => return Err(e),
            };

            match response.outcome() {
                TrackOutcome::SessionExpired => {
                    let message = response
                        .error
                        .unwrap_or_else(|| "Session expired".to_string());
                    return Ok(self.expire(session, message, events).await);
                }
                TrackOutcome::QuotaExceeded => {
                    return Ok(self.stop_on_quota(session, index, events));
                }
                TrackOutcome::Added => {
                    session.record_added();
                    debug!("Added '{}'", track);
                    publish_processed(&session, index, track, TrackStatus::Added, events);
                }
                TrackOutcome::NotFound => {
                    session.record_not_found(track);
                    debug!("Not found '{}'", track);
                    publish_processed(&session, index, track, TrackStatus::NotFound, events);
                }
            }

            if index + 1 < tracks.len() && !self.options.track_delay.is_zero() {
                tokio::time::sleep(self.options.track_delay).await;
            }
        }

        info!(
            "Transfer completed: {} added, {} not found",
            session.added_count(),
            session.not_found_count()
        );
        self.set_phase(TransferPhase::Completed);
        let report = TransferReport::from_session(session, TransferOutcome::Completed);
        let _ = events.send(TransferEvent::Completed(report.clone()));
        Ok(report)
    }

    fn stop_on_quota(
        &self,
        mut session: TransferSession,
        index: usize,
        events: &mpsc::UnboundedSender<TransferEvent>,
    ) -> TransferReport {
        let remaining = session.fold_remaining(index);
        warn!(
            "Quota exceeded after {} tracks, {} remaining",
            index, remaining
        );
        self.set_phase(TransferPhase::QuotaExceeded);
        let _ = events.send(TransferEvent::QuotaExceeded {
            processed: index,
            added: session.added_count(),
            total_tracks: session.total_tracks,
            remaining,
            progress: session.progress(index),
        });

        let report = TransferReport::from_session(
            session,
            TransferOutcome::QuotaExceeded {
                processed: index,
                remaining,
            },
        );
        let _ = events.send(TransferEvent::Completed(report.clone()));
        report
    }

    async fn expire(
        &self,
        session: TransferSession,
        message: String,
        events: &mpsc::UnboundedSender<TransferEvent>,
    ) -> TransferReport {
        warn!("Backend session expired: {}", message);
        if let Err(e) = self.backend.reload().await {
            warn!("Failed to reload backend page: {}", e);
        }
        self.set_phase(TransferPhase::SessionExpired);
        let _ = events.send(TransferEvent::SessionExpired { message });
        TransferReport::from_session(session, TransferOutcome::SessionExpired)
    }
}

fn publish_processed(
    session: &TransferSession,
    index: usize,
    track: &str,
    status: TrackStatus,
    events: &mpsc::UnboundedSender<TransferEvent>,
) {
    let _ = events.send(TransferEvent::TrackProcessed {
        index,
        track: track.to_string(),
        status,
        progress: session.progress(index + 1),
    });
}

impl<B: TransferBackend> std::fmt::Debug for TransferOrchestrator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferOrchestrator")
            .field("options", &self.options)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
