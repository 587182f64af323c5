//! Terminal rendering of transfer progress.
//!
//! The orchestrator publishes [`TransferEvent`]s; this module turns them into
//! a progress panel (an `indicatif` bar with a percentage prefix and a status
//! message) plus persistent colored lines for per-track results and reports.

use std::io::{self, Write};

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use spottransfer_core::report::{
    COMPLETION_ALL_TRANSFERRED, COMPLETION_TITLE, QUOTA_TITLE, not_found_heading, quota_lines,
};
use spottransfer_core::{TrackStatus, TransferEvent, TransferProgress, TransferReport};
use tokio::sync::mpsc;
use tracing::debug;

/// Label of the idle submit control.
pub const SUBMIT_LABEL: &str = "Start Transfer";

/// Label of the submit control while a transfer runs.
pub const SUBMIT_BUSY_LABEL: &str = "Transfer in Progress...";

const BAR_TEMPLATE: &str = "{prefix:>4} [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

/// Submit label for the given state.
#[must_use]
pub const fn submit_label(busy: bool) -> &'static str {
    if busy { SUBMIT_BUSY_LABEL } else { SUBMIT_LABEL }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Renders transfer events to a terminal.
pub struct TerminalRenderer<W: Write> {
    out: W,
    bar: ProgressBar,
    panel_visible: bool,
    busy: bool,
    progress: TransferProgress,
    status: String,
}

impl TerminalRenderer<io::Stdout> {
    /// Reports on stdout, progress panel on stderr.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout(), ProgressDrawTarget::stderr())
    }
}

impl<W: Write> TerminalRenderer<W> {
    /// Create a renderer writing persistent lines to `out` and drawing the
    /// progress panel on `target`.
    pub fn new(out: W, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target);
        bar.set_style(bar_style());
        Self {
            out,
            bar,
            panel_visible: false,
            busy: false,
            progress: TransferProgress::default(),
            status: String::new(),
        }
    }

    /// Whether the progress panel is shown.
    #[must_use]
    pub const fn panel_visible(&self) -> bool {
        self.panel_visible
    }

    /// Counters last displayed.
    #[must_use]
    pub const fn progress(&self) -> TransferProgress {
        self.progress
    }

    /// Status message last displayed.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Current submit label.
    #[must_use]
    pub const fn submit_label(&self) -> &'static str {
        submit_label(self.busy)
    }

    /// Consume the renderer, returning its output sink.
    pub fn into_inner(self) -> W {
        self.bar.finish_and_clear();
        self.out
    }

    /// Render one event.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the output fails.
    pub fn handle(&mut self, event: &TransferEvent) -> io::Result<()> {
        match event {
            TransferEvent::Resolving => {
                self.set_busy(true);
                self.show_panel(0);
                self.set_status("Fetching playlist from Spotify...".to_string());
            }
            TransferEvent::Resolved {
                playlist_name,
                total_tracks,
            } => {
                self.show_panel(*total_tracks);
                self.update_progress(TransferProgress {
                    total: *total_tracks,
                    ..TransferProgress::default()
                });
                self.set_status(format!(
                    "Found playlist: {playlist_name}. Starting transfer..."
                ));
            }
            TransferEvent::Searching { track, .. } => {
                self.set_status(format!("Searching: {track}"));
            }
            TransferEvent::TrackProcessed {
                track,
                status,
                progress,
                ..
            } => {
                self.update_progress(*progress);
                let line = format!("{status}: {track}");
                self.set_status(line.clone());
                let line = match status {
                    TrackStatus::Added => line.green(),
                    TrackStatus::NotFound => line.yellow(),
                };
                self.print_line(&line.to_string())?;
            }
            TransferEvent::QuotaExceeded {
                processed,
                added,
                total_tracks,
                remaining,
                progress,
            } => {
                self.update_progress(*progress);
                self.print_quota_banner(*processed, *added, *total_tracks, *remaining)?;
            }
            TransferEvent::Completed(report) => {
                self.set_status(COMPLETION_TITLE.to_string());
                self.bar.finish();
                self.print_report(report)?;
                self.set_busy(false);
            }
            TransferEvent::SessionExpired { message } => {
                self.hide_panel();
                self.print_line(&message.red().bold().to_string())?;
                self.print_line("Run `spottransfer authorize` and try again.")?;
                self.set_busy(false);
            }
            TransferEvent::Failed { message } => {
                self.hide_panel();
                self.print_line(&message.red().bold().to_string())?;
                self.set_busy(false);
            }
        }
        Ok(())
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
        debug!("Submit control: {}", submit_label(busy));
    }

    fn show_panel(&mut self, total: usize) {
        if !self.panel_visible {
            self.bar.reset();
            self.panel_visible = true;
        }
        self.bar.set_length(total as u64);
    }

    fn hide_panel(&mut self) {
        self.bar.finish_and_clear();
        self.panel_visible = false;
    }

    fn update_progress(&mut self, progress: TransferProgress) {
        self.progress = progress;
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.current as u64);
        self.bar
            .set_prefix(format!("{}%", progress.rounded_percent()));
        self.refresh_message();
    }

    fn set_status(&mut self, status: String) {
        self.status = status;
        self.refresh_message();
    }

    fn refresh_message(&self) {
        self.bar.set_message(format!(
            "added {} | not found {} | {}",
            self.progress.added, self.progress.not_found, self.status
        ));
    }

    /// Write a line above the progress panel.
    fn print_line(&mut self, line: &str) -> io::Result<()> {
        let out = &mut self.out;
        self.bar.suspend(|| writeln!(out, "{line}"))
    }

    fn print_quota_banner(
        &mut self,
        processed: usize,
        added: usize,
        total_tracks: usize,
        remaining: usize,
    ) -> io::Result<()> {
        self.print_line("")?;
        self.print_line(&QUOTA_TITLE.red().bold().to_string())?;
        for line in quota_lines(processed, added, total_tracks, remaining) {
            self.print_line(&line)?;
        }
        Ok(())
    }

    fn print_report(&mut self, report: &TransferReport) -> io::Result<()> {
        self.print_line("")?;
        self.print_line(&COMPLETION_TITLE.green().bold().to_string())?;
        self.print_line(&format!(
            "Added: {} | Not found: {} | Total: {}",
            report.added, report.not_found_count, report.total_tracks
        ))?;

        if report.all_transferred() {
            self.print_line(&COMPLETION_ALL_TRANSFERRED.green().to_string())?;
        } else {
            self.print_line(&not_found_heading(report.not_found.len()).bold().to_string())?;
            for track in &report.not_found {
                self.print_line(&format!("  - {track}"))?;
            }
        }
        self.out.flush()
    }
}

/// Render events until the sender side is dropped.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub async fn render_events<W: Write>(
    mut renderer: TerminalRenderer<W>,
    mut events: mpsc::UnboundedReceiver<TransferEvent>,
) -> io::Result<TerminalRenderer<W>> {
    while let Some(event) = events.recv().await {
        renderer.handle(&event)?;
    }
    Ok(renderer)
}
