//! Completion and quota report texts and markup.
//!
//! Plain-text lines are shared by every front end; the HTML renderers escape
//! all interpolated text.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{Error, FileSystemError, Result};
use crate::transfer::{TransferOutcome, TransferReport};

/// Status shown when a session finishes.
pub const COMPLETION_TITLE: &str = "Transfer Complete!";

/// Message shown when no track ended up in the not-found list.
pub const COMPLETION_ALL_TRANSFERRED: &str = "All tracks transferred successfully.";

/// Heading of the quota banner.
pub const QUOTA_TITLE: &str = "YouTube API quota exceeded";

/// Reminder of when the upstream quota resets.
pub const QUOTA_RESET_NOTE: &str = "The YouTube Data API quota resets daily at midnight Pacific Time (PST/PDT). You can continue transferring the remaining tracks tomorrow.";

/// Escape text for inclusion in HTML element content or attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Heading of the not-found listing.
#[must_use]
pub fn not_found_heading(count: usize) -> String {
    format!("Tracks Not Found ({count})")
}

/// Body lines of the quota banner.
#[must_use]
pub fn quota_lines(
    processed: usize,
    added: usize,
    total_tracks: usize,
    remaining: usize,
) -> Vec<String> {
    vec![
        format!("Successfully transferred {added} out of {total_tracks} tracks."),
        format!("Processed {processed} tracks before quota limit was reached."),
        format!(
            "Remaining {remaining} tracks were not completed and have been added to the \"Not Found\" list."
        ),
        QUOTA_RESET_NOTE.to_string(),
    ]
}

/// Quota banner markup.
#[must_use]
pub fn quota_html(processed: usize, added: usize, total_tracks: usize, remaining: usize) -> String {
    let lines = quota_lines(processed, added, total_tracks, remaining);
    let mut html = format!(
        "<div class=\"error-box\">\n  <strong>{}</strong>\n",
        escape_html(QUOTA_TITLE)
    );
    for line in &lines {
        let _ = writeln!(html, "  <p>{}</p>", escape_html(line));
    }
    html.push_str("</div>\n");
    html
}

/// Completion report markup: either the success note or the not-found listing.
#[must_use]
pub fn completion_html(not_found: &[String]) -> String {
    if not_found.is_empty() {
        return format!(
            "<div class=\"info-box\">{}</div>\n",
            escape_html(COMPLETION_ALL_TRANSFERRED)
        );
    }

    let mut html = format!(
        "<div class=\"not-found-section\">\n  <h3>{}</h3>\n  <div class=\"not-found-list\">\n",
        escape_html(&not_found_heading(not_found.len()))
    );
    for track in not_found {
        let _ = writeln!(html, "    <div>{}</div>", escape_html(track));
    }
    html.push_str("  </div>\n</div>\n");
    html
}

/// Standalone HTML document for a finished session.
#[must_use]
pub fn html_document(report: &TransferReport) -> String {
    let title = if report.playlist_name.is_empty() {
        COMPLETION_TITLE.to_string()
    } else {
        format!("{COMPLETION_TITLE} {}", report.playlist_name)
    };

    let mut body = format!(
        "<h1>{}</h1>\n<p>Added: {} &middot; Not found: {}</p>\n",
        escape_html(&title),
        report.added,
        report.not_found_count
    );
    if let TransferOutcome::QuotaExceeded {
        processed,
        remaining,
    } = report.outcome
    {
        body.push_str(&quota_html(
            processed,
            report.added,
            report.total_tracks,
            remaining,
        ));
    }
    body.push_str(&completion_html(&report.not_found));

    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{body}</body>\n</html>\n",
        escape_html(&title)
    )
}

/// Write [`html_document`] to `path`.
///
/// # Errors
///
/// Returns [`FileSystemError::WriteFailed`] if the file cannot be written.
pub fn write_html_report(report: &TransferReport, path: &Path) -> Result<()> {
    fs::write(path, html_document(report)).map_err(|e| {
        Error::FileSystem(FileSystemError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })?;
    info!("Wrote transfer report to {}", path.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn report(not_found: &[&str], outcome: TransferOutcome) -> TransferReport {
        TransferReport {
            playlist_name: "Mix <2024>".to_string(),
            total_tracks: 5,
            added: 5 - not_found.len(),
            not_found_count: not_found.len(),
            not_found: not_found.iter().map(ToString::to_string).collect(),
            outcome,
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Rock" & 'Roll'</b>"#),
            "&lt;b&gt;&quot;Rock&quot; &amp; &#39;Roll&#39;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_completion_all_transferred() {
        let html = completion_html(&[]);
        assert!(html.contains(COMPLETION_ALL_TRANSFERRED));
        assert!(!html.contains("Tracks Not Found"));
    }

    #[test]
    fn test_completion_lists_escaped_tracks() {
        let html = completion_html(&[
            "<script>alert(1)</script> - X".to_string(),
            "B - Y".to_string(),
        ]);
        assert!(html.contains("Tracks Not Found (2)"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt; - X"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("<div>B - Y</div>"));
    }

    #[test]
    fn test_quota_lines() {
        let lines = quota_lines(2, 2, 5, 3);
        assert_eq!(lines[0], "Successfully transferred 2 out of 5 tracks.");
        assert_eq!(lines[1], "Processed 2 tracks before quota limit was reached.");
        assert_eq!(
            lines[2],
            "Remaining 3 tracks were not completed and have been added to the \"Not Found\" list."
        );
        assert!(lines[3].contains("midnight Pacific Time"));
    }

    #[test]
    fn test_quota_html_escapes_quotes() {
        let html = quota_html(2, 2, 5, 3);
        assert!(html.contains("<strong>YouTube API quota exceeded</strong>"));
        assert!(html.contains("&quot;Not Found&quot;"));
    }

    #[test]
    fn test_document_with_quota() {
        let html = html_document(&report(
            &["T3", "T4", "T5"],
            TransferOutcome::QuotaExceeded {
                processed: 2,
                remaining: 3,
            },
        ));
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains("Mix &lt;2024&gt;"));
        assert!(html.contains("error-box"));
        assert!(html.contains("Tracks Not Found (3)"));
    }

    #[test]
    fn test_document_completed() {
        let html = html_document(&report(&[], TransferOutcome::Completed));
        assert!(!html.contains("error-box"));
        assert!(html.contains(COMPLETION_ALL_TRANSFERRED));
    }

    #[test]
    fn test_write_html_report() {
        let temp_dir = tempfile::TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("report.html");
        write_html_report(&report(&["A"], TransferOutcome::Completed), &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("<div>A</div>"));
    }

    #[test]
    fn test_write_html_report_bad_path() {
        let temp_dir = tempfile::TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("missing").join("report.html");
        assert!(matches!(
            write_html_report(&report(&[], TransferOutcome::Completed), &path),
            Err(Error::FileSystem(FileSystemError::WriteFailed { .. }))
        ));
    }
}
