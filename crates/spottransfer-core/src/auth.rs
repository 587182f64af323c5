//! Authorization popup flow.
//!
//! The backend serves an authorization page that, once the user grants
//! access, hands an opaque state token back to the opener. Natively the
//! opener is a one-shot local HTTP listener whose URL is passed to the page
//! as the `opener` query parameter. The first well-formed completion message
//! is delivered; everything after it is refused.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use spottransfer_core::auth::{AuthOptions, AuthorizationFlow, SystemBrowser};
//!
//! let flow = AuthorizationFlow::new(backend, Arc::new(SystemBrowser), AuthOptions::default());
//! match flow.begin().await? {
//!     AuthOutcome::Authorized => println!("Connected"),
//!     AuthOutcome::AlreadyInProgress => println!("Finish the open authorization window first"),
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::TransferBackend;
use crate::error::{AuthError, Error, GENERIC_AUTH_FAILURE, Result};
use crate::session::InProgressFlag;

/// Message type announcing a finished authorization.
pub const AUTH_COMPLETE: &str = "auth_complete";

/// Path of the completion listener.
pub const CALLBACK_PATH: &str = "/auth_complete";

// =============================================================================
// Completion message
// =============================================================================

/// Message sent by the authorization page to its opener.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMessage {
    /// Message type; only [`AUTH_COMPLETE`] is acted upon.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Opaque state token.
    #[serde(default)]
    pub state: Option<String>,
}

impl AuthMessage {
    /// The state token if this is a completion message carrying one.
    #[must_use]
    pub fn completion_state(&self) -> Option<&str> {
        if self.kind != AUTH_COMPLETE {
            return None;
        }
        self.state.as_deref().filter(|state| !state.is_empty())
    }
}

// =============================================================================
// Completion listener
// =============================================================================

type MessageSlot = Arc<Mutex<Option<oneshot::Sender<String>>>>;

const RECEIVED_PAGE: &str =
    "<!doctype html><title>Authorized</title><p>Authorization received. You can close this window.</p>";
const IGNORED_PAGE: &str = "<!doctype html><title>Ignored</title><p>Unexpected message.</p>";
const GONE_PAGE: &str =
    "<!doctype html><title>Already completed</title><p>Authorization was already received.</p>";

/// One-shot local listener for the authorization completion message.
///
/// Dropping the listener shuts the server down.
pub struct AuthMessageListener {
    local_addr: SocketAddr,
    message_rx: Option<oneshot::Receiver<String>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
}

impl AuthMessageListener {
    /// Bind the listener and start serving.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Listener`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::Listener(format!("Failed to bind to {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::Listener(e.to_string()))?;

        let (message_tx, message_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let slot: MessageSlot = Arc::new(Mutex::new(Some(message_tx)));

        let app = Router::new()
            .route(CALLBACK_PATH, get(receive_query).post(receive_json))
            .with_state(slot);

        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!("Authorization listener stopped: {}", e);
            }
        });

        debug!("Authorization listener bound on {}", local_addr);
        Ok(Self {
            local_addr,
            message_rx: Some(message_rx),
            shutdown_tx: Some(shutdown_tx),
            server,
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL the authorization page should send its completion message to.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}{CALLBACK_PATH}", self.local_addr)
    }

    /// Wait for the state token. Resolves at most once.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Listener`] if the token was already taken or the
    /// server went away.
    pub async fn next_state(&mut self) -> Result<String> {
        let receiver = self.message_rx.take().ok_or_else(|| {
            AuthError::Listener("completion message already consumed".to_string())
        })?;
        receiver.await.map_err(|_| {
            AuthError::Listener("listener closed before completion".to_string()).into()
        })
    }

    /// Stop serving.
    pub fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
            debug!("Authorization listener on {} shut down", self.local_addr);
        }
    }

    /// Whether the server task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.server.is_finished()
    }
}

impl Drop for AuthMessageListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AuthMessageListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMessageListener")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

async fn receive_json(
    State(slot): State<MessageSlot>,
    Json(message): Json<AuthMessage>,
) -> (StatusCode, Html<&'static str>) {
    deliver(&slot, &message).await
}

async fn receive_query(
    State(slot): State<MessageSlot>,
    Query(message): Query<AuthMessage>,
) -> (StatusCode, Html<&'static str>) {
    deliver(&slot, &message).await
}

async fn deliver(slot: &MessageSlot, message: &AuthMessage) -> (StatusCode, Html<&'static str>) {
    let Some(state) = message.completion_state() else {
        debug!("Ignoring message of type '{}'", message.kind);
        return (StatusCode::BAD_REQUEST, Html(IGNORED_PAGE));
    };

    match slot.lock().await.take() {
        Some(sender) => {
            info!("Authorization completion message received");
            let _ = sender.send(state.to_string());
            (StatusCode::OK, Html(RECEIVED_PAGE))
        }
        None => (StatusCode::GONE, Html(GONE_PAGE)),
    }
}

// =============================================================================
// Popup
// =============================================================================

/// Handle on an opened authorization popup.
pub trait AuthPopup: Send + Sync {
    /// Whether the user closed the popup.
    fn is_closed(&self) -> bool;

    /// Bring the popup to the front.
    fn focus(&self);
}

/// Opens authorization popups.
pub trait PopupLauncher: Send + Sync {
    /// Open `url` in a new popup.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::LaunchFailed`] if nothing could be opened.
    fn open(&self, url: &str) -> Result<Box<dyn AuthPopup>>;
}

/// Opens the authorization page in the system browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

/// A system browser tab. Closure cannot be observed, so it never reports closed.
#[derive(Debug)]
struct BrowserTab {
    url: String,
}

impl AuthPopup for BrowserTab {
    fn is_closed(&self) -> bool {
        false
    }

    fn focus(&self) {
        debug!("Authorization page already open at {}", self.url);
    }
}

impl PopupLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<Box<dyn AuthPopup>> {
        webbrowser::open(url).map_err(|e| AuthError::LaunchFailed(e.to_string()))?;
        Ok(Box::new(BrowserTab {
            url: url.to_string(),
        }))
    }
}

// =============================================================================
// Authorization flow
// =============================================================================

/// Settings of the authorization flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthOptions {
    /// How often the popup is checked for closure.
    pub poll_interval: Duration,
    /// How long to wait for the completion message.
    pub timeout: Duration,
    /// Local address of the completion listener.
    pub callback_addr: SocketAddr,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(300),
            callback_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
        }
    }
}

/// Result of [`AuthorizationFlow::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The backend accepted the state token and the page was reloaded.
    Authorized,
    /// Another authorization is running; its popup was refocused.
    AlreadyInProgress,
}

/// Runs the authorization popup flow, one at a time.
pub struct AuthorizationFlow<B: TransferBackend> {
    backend: Arc<B>,
    launcher: Arc<dyn PopupLauncher>,
    options: AuthOptions,
    in_progress: InProgressFlag,
    popup: Mutex<Option<Arc<dyn AuthPopup>>>,
}

impl<B: TransferBackend> AuthorizationFlow<B> {
    /// Create a flow.
    #[must_use]
    pub fn new(backend: Arc<B>, launcher: Arc<dyn PopupLauncher>, options: AuthOptions) -> Self {
        Self {
            backend,
            launcher,
            options,
            in_progress: InProgressFlag::new(),
            popup: Mutex::new(None),
        }
    }

    /// Whether an authorization is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_progress.is_active()
    }

    /// Start an authorization, or refocus the popup of the one running.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the popup could not be opened, was closed,
    /// timed out, or the backend rejected the state. The flow can be retried.
    pub async fn begin(&self) -> Result<AuthOutcome> {
        let Some(_guard) = self.in_progress.try_acquire() else {
            info!("Authorization already in progress");
            if let Some(popup) = self.popup.lock().await.as_ref()
                && !popup.is_closed()
            {
                popup.focus();
            }
            return Ok(AuthOutcome::AlreadyInProgress);
        };

        let result = self.authorize().await;
        *self.popup.lock().await = None;

        match result {
            Ok(()) => Ok(AuthOutcome::Authorized),
            Err(e) => {
                error!("Authorization failed: {}", e);
                Err(e)
            }
        }
    }

    async fn authorize(&self) -> Result<()> {
        let mut listener = AuthMessageListener::bind(self.options.callback_addr).await?;
        let url = self.backend.authorize_url(&listener.url())?;

        info!("Opening authorization page");
        let popup: Arc<dyn AuthPopup> = Arc::from(self.launcher.open(&url)?);
        *self.popup.lock().await = Some(Arc::clone(&popup));

        let state = tokio::select! {
            state = listener.next_state() => state?,
            () = wait_for_close(popup.as_ref(), self.options.poll_interval) => {
                return Err(AuthError::PopupClosed.into());
            }
            () = tokio::time::sleep(self.options.timeout) => {
                return Err(AuthError::TimedOut {
                    secs: self.options.timeout.as_secs(),
                }
                .into());
            }
        };
        drop(listener);

        if let Err(e) = self.backend.complete_auth(&state).await {
            warn!("Authorization completion rejected: {}", e);
            return Err(Error::Auth(AuthError::Rejected(
                GENERIC_AUTH_FAILURE.to_string(),
            )));
        }

        self.backend.reload().await?;
        info!("Authorization complete");
        Ok(())
    }
}

impl<B: TransferBackend> std::fmt::Debug for AuthorizationFlow<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationFlow")
            .field("options", &self.options)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

async fn wait_for_close(popup: &dyn AuthPopup, poll_interval: Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        if popup.is_closed() {
            debug!("Authorization popup closed");
            return;
        }
    }
}
