//! Command implementations.
//!
//! Each command builds an [`HttpBackend`] for the configured backend, restoring
//! the saved session cookies first, since every invocation is a new process.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use colored::Colorize;
use spottransfer_core::playlist_url::check_submission;
use spottransfer_core::{
    AppConfig, AuthOutcome, AuthPopup, AuthorizationFlow, ErrorKind, HttpBackend,
    PopupLauncher, SavedSession, SystemBrowser, TransferBackend, TransferOrchestrator,
    TransferOutcome, TransferReport, write_html_report,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::render::{TerminalRenderer, render_events};

/// Exit code when the backend session expired during a transfer.
const EXIT_SESSION_EXPIRED: u8 = 2;

/// Resolved settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration, overrides applied.
    pub config: AppConfig,
    /// Config file in use.
    pub config_path: PathBuf,
    /// File holding the saved backend session.
    pub session_path: PathBuf,
}

/// What `transfer` was asked to do.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Playlist link as typed.
    pub playlist_url: String,
    /// Run the authorization flow first.
    pub authorize: bool,
    /// Where to write an HTML report, if anywhere.
    pub html_report: Option<PathBuf>,
}

// =============================================================================
// Popup
// =============================================================================

/// Opens the authorization page in the system browser, or asks the user to
/// open it when no browser can be launched.
#[derive(Debug, Clone, Copy, Default)]
struct TerminalBrowser;

/// A page the user opens by hand.
#[derive(Debug)]
struct ManualTab {
    url: String,
}

impl AuthPopup for ManualTab {
    fn is_closed(&self) -> bool {
        false
    }

    fn focus(&self) {
        eprintln!("Open this link to continue: {}", self.url.cyan());
    }
}

impl PopupLauncher for TerminalBrowser {
    fn open(&self, url: &str) -> spottransfer_core::Result<Box<dyn AuthPopup>> {
        eprintln!("Connecting your YouTube account...");
        match SystemBrowser.open(url) {
            Ok(popup) => {
                eprintln!("If the browser did not open, visit: {}", url.cyan());
                Ok(popup)
            }
            Err(e) => {
                warn!("Could not launch a browser: {}", e);
                let tab = ManualTab {
                    url: url.to_string(),
                };
                tab.focus();
                Ok(Box::new(tab))
            }
        }
    }
}

// =============================================================================
// Session helpers
// =============================================================================

/// Create the backend client, seed it with the saved session and load the page.
async fn connect(ctx: &Context) -> Result<Arc<HttpBackend>> {
    let backend = HttpBackend::new(&ctx.config.backend_url)
        .with_context(|| format!("Invalid backend URL {}", ctx.config.backend_url))?;
    restore_session(&backend, &ctx.session_path);
    backend.reload().await.with_context(|| {
        format!(
            "Failed to reach the transfer backend at {}",
            backend.base_url()
        )
    })?;
    Ok(Arc::new(backend))
}

fn restore_session(backend: &HttpBackend, session_path: &Path) {
    match SavedSession::load_for(session_path, backend.base_url()) {
        Ok(Some(session)) => backend.restore_cookies(&session.cookie),
        Ok(None) => {}
        Err(e) => warn!("Ignoring unreadable saved session: {}", e),
    }
}

fn save_session(backend: &HttpBackend, session_path: &Path) {
    let Some(cookie) = backend.cookie_header() else {
        return;
    };
    let session = SavedSession {
        backend_url: backend.base_url().to_string(),
        cookie,
    };
    if let Err(e) = session.save_to(session_path) {
        warn!("Failed to save session: {}", e);
    }
}

fn clear_session(session_path: &Path) {
    if let Err(e) = SavedSession::clear(session_path) {
        warn!("Failed to clear saved session: {}", e);
    }
}

/// Run the authorization flow and persist the resulting session.
async fn run_authorization(ctx: &Context, backend: &Arc<HttpBackend>) -> Result<bool> {
    let flow = AuthorizationFlow::new(
        Arc::clone(backend),
        Arc::new(TerminalBrowser),
        ctx.config.auth_options()?,
    );

    match flow.begin().await {
        Ok(AuthOutcome::Authorized) => {
            save_session(backend, &ctx.session_path);
            println!("{}", "YouTube account connected.".green());
            Ok(true)
        }
        Ok(AuthOutcome::AlreadyInProgress) => Ok(false),
        Err(e) => {
            eprintln!("{}", e.user_message().red().bold());
            Ok(false)
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// `authorize`: connect a YouTube account.
pub async fn authorize(ctx: &Context) -> Result<ExitCode> {
    let backend = connect(ctx).await?;
    Ok(if run_authorization(ctx, &backend).await? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// `transfer`: move a playlist, rendering progress live.
pub async fn transfer(ctx: &Context, request: &TransferRequest) -> Result<ExitCode> {
    if let Err(e) = check_submission(&request.playlist_url, ctx.config.validate_playlist_url) {
        eprintln!("{}", e.user_message().red().bold());
        return Ok(ExitCode::FAILURE);
    }

    let backend = connect(ctx).await?;

    if request.authorize && !run_authorization(ctx, &backend).await? {
        return Ok(ExitCode::FAILURE);
    }

    let orchestrator =
        TransferOrchestrator::new(Arc::clone(&backend), ctx.config.transfer_options());
    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_events(TerminalRenderer::stdout(), rx));

    let result = orchestrator.run(&request.playlist_url, &tx).await;
    drop(tx);
    match renderer.await {
        Ok(Ok(renderer)) => drop(renderer.into_inner()),
        Ok(Err(e)) => warn!("Progress display failed: {}", e),
        Err(e) => warn!("Progress display task failed: {}", e),
    }

    match result {
        Ok(report) => {
            if matches!(report.outcome, TransferOutcome::SessionExpired) {
                clear_session(&ctx.session_path);
                return Ok(exit_code_for(&report));
            }

            save_session(&backend, &ctx.session_path);
            if let Some(path) = &request.html_report {
                write_html_report(&report, path)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                println!("Report written to {}", path.display());
            }
            Ok(exit_code_for(&report))
        }
        Err(e) => {
            match e.kind() {
                // Rejected before the flow started, so nothing was rendered.
                ErrorKind::InvalidInput | ErrorKind::Busy => {
                    eprintln!("{}", e.user_message().red().bold());
                }
                _ => info!("Transfer aborted: {}", e),
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Exit status of a finished transfer.
fn exit_code_for(report: &TransferReport) -> ExitCode {
    match report.outcome {
        TransferOutcome::Completed | TransferOutcome::QuotaExceeded { .. } => ExitCode::SUCCESS,
        TransferOutcome::SessionExpired => ExitCode::from(EXIT_SESSION_EXPIRED),
    }
}

/// `disconnect`: clear the backend session and forget the saved one.
pub async fn disconnect(ctx: &Context) -> Result<ExitCode> {
    let backend = HttpBackend::new(&ctx.config.backend_url)
        .with_context(|| format!("Invalid backend URL {}", ctx.config.backend_url))?;
    restore_session(&backend, &ctx.session_path);

    let result = backend.disconnect().await;
    clear_session(&ctx.session_path);

    match result {
        Ok(()) => {
            println!("{}", "Disconnected.".green());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!(
                "{} {}",
                "Local session cleared, but the backend could not be reached:".yellow(),
                e
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

/// `config show`: print the effective configuration.
pub fn config_show(ctx: &Context) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&ctx.config)?);
    Ok(ExitCode::SUCCESS)
}

/// `config path`: print where the config file lives.
pub fn config_path(ctx: &Context) -> ExitCode {
    println!("{}", ctx.config_path.display());
    ExitCode::SUCCESS
}

/// `config init`: write a default config file.
pub fn config_init(path: &Path, force: bool) -> Result<ExitCode> {
    if path.exists() && !force {
        eprintln!(
            "{} {} (use --force to overwrite)",
            "Config file already exists:".yellow(),
            path.display()
        );
        return Ok(ExitCode::FAILURE);
    }

    AppConfig::default()
        .save_to(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(outcome: TransferOutcome) -> TransferReport {
        TransferReport {
            playlist_name: "Mix".to_string(),
            total_tracks: 1,
            added: 1,
            not_found_count: 0,
            not_found: Vec::new(),
            outcome,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            exit_code_for(&report(TransferOutcome::Completed)),
            ExitCode::SUCCESS
        );
        assert_eq!(
            exit_code_for(&report(TransferOutcome::QuotaExceeded {
                processed: 1,
                remaining: 0
            })),
            ExitCode::SUCCESS
        );
        assert_eq!(
            exit_code_for(&report(TransferOutcome::SessionExpired)),
            ExitCode::from(EXIT_SESSION_EXPIRED)
        );
    }

    #[test]
    fn test_config_init_respects_force() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");

        assert_eq!(config_init(&path, false).unwrap(), ExitCode::SUCCESS);
        assert!(AppConfig::load_from(&path).is_ok());

        assert_eq!(config_init(&path, false).unwrap(), ExitCode::FAILURE);
        assert_eq!(config_init(&path, true).unwrap(), ExitCode::SUCCESS);
    }

    #[test]
    fn test_session_saved_and_restored() {
        let temp_dir = TempDir::new().unwrap();
        let session_path = temp_dir.path().join("session.json");

        let first = HttpBackend::new("http://localhost:5000").unwrap();
        first.restore_cookies("session=abc");
        save_session(&first, &session_path);
        assert!(session_path.exists());

        let second = HttpBackend::new("http://localhost:5000/").unwrap();
        restore_session(&second, &session_path);
        assert_eq!(second.cookie_header().as_deref(), Some("session=abc"));

        let other = HttpBackend::new("http://127.0.0.1:9000").unwrap();
        restore_session(&other, &session_path);
        assert!(other.cookie_header().is_none());

        clear_session(&session_path);
        assert!(!session_path.exists());
    }

    #[test]
    fn test_nothing_saved_without_cookies() {
        let temp_dir = TempDir::new().unwrap();
        let session_path = temp_dir.path().join("session.json");

        let backend = HttpBackend::new("http://localhost:5000").unwrap();
        save_session(&backend, &session_path);
        assert!(!session_path.exists());
    }

    #[tokio::test]
    async fn test_bad_playlist_url_rejected_before_backend_contact() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = Context {
            config: AppConfig {
                backend_url: "http://127.0.0.1:1".to_string(),
                ..AppConfig::default()
            },
            config_path: temp_dir.path().join("config.json"),
            session_path: temp_dir.path().join("session.json"),
        };

        for playlist_url in ["not a playlist", "   "] {
            let request = TransferRequest {
                playlist_url: playlist_url.to_string(),
                authorize: true,
                html_report: Some(temp_dir.path().join("report.html")),
            };
            let code = transfer(&ctx, &request).await.unwrap();
            assert_eq!(code, ExitCode::FAILURE);
        }
        assert!(!temp_dir.path().join("report.html").exists());
        assert!(!ctx.session_path.exists());
    }

    #[tokio::test]
    async fn test_invalid_backend_url_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = Context {
            config: AppConfig {
                backend_url: "not a url".to_string(),
                ..AppConfig::default()
            },
            config_path: temp_dir.path().join("config.json"),
            session_path: temp_dir.path().join("session.json"),
        };
        assert!(disconnect(&ctx).await.is_err());
    }
}
