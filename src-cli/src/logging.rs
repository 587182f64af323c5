//! Log setup for the command line client.
//!
//! Two sinks are installed: a human readable layer on stderr, quiet by default
//! so it does not fight with the progress panel, and a JSON file under the
//! data directory that keeps a bounded number of rotated files.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt};

/// Crates whose events are logged at the configured levels; everything else
/// stays at `warn`.
const OWN_TARGETS: [&str; 2] = ["spottransfer", "spottransfer_core"];

/// When a new log file is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    /// One file per hour.
    Hourly,
    /// One file per day.
    Daily,
}

impl LogRotation {
    fn rolling(self) -> Rotation {
        match self {
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
        }
    }
}

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory holding the log files.
    pub directory: PathBuf,
    /// File name prefix; rotation appends the period.
    pub file_prefix: String,
    /// Most detailed level shown on stderr.
    pub console_level: Level,
    /// Most detailed level written to the file.
    pub file_level: Level,
    /// File rotation period.
    pub rotation: LogRotation,
    /// Rotated files kept on disk.
    pub retained_files: usize,
    /// Colored stderr output.
    pub color: bool,
    /// Show targets, source files and span lifecycles on stderr.
    pub source_locations: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::quiet()
    }
}

impl LoggingConfig {
    /// Only warnings and errors on stderr; a week of daily files.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            directory: spottransfer_core::default_log_directory(),
            file_prefix: "spottransfer".to_string(),
            console_level: Level::WARN,
            file_level: Level::DEBUG,
            rotation: LogRotation::Daily,
            retained_files: 7,
            color: io::stderr().is_terminal(),
            source_locations: false,
        }
    }

    /// Debug output on stderr with source locations; a day of hourly files.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            console_level: Level::DEBUG,
            file_level: Level::TRACE,
            rotation: LogRotation::Hourly,
            retained_files: 24,
            source_locations: true,
            ..Self::quiet()
        }
    }

    /// Preset for the `--verbose` flag.
    #[must_use]
    pub fn for_verbosity(verbose: bool) -> Self {
        if verbose {
            Self::verbose()
        } else {
            Self::quiet()
        }
    }

    /// Log into `directory` instead of the data directory.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }
}

/// Keeps the background file writer alive; pending lines are flushed on drop.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

/// Install the global subscriber.
///
/// `RUST_LOG`, when set, replaces the stderr filter.
///
/// # Errors
///
/// Fails if the log directory or file cannot be created, a filter does not
/// parse, or a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    std::fs::create_dir_all(&config.directory).map_err(|source| {
        LoggingError::CreateDirectory {
            path: config.directory.clone(),
            source,
        }
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(config.rotation.rolling())
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .max_log_files(config.retained_files.max(1))
        .build(&config.directory)?;
    let (writer, worker) = tracing_appender::non_blocking(appender);

    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => own_crates_at(config.console_level)?,
    };

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.color)
        .with_target(config.source_locations)
        .with_file(config.source_locations)
        .with_line_number(config.source_locations)
        .with_span_events(if config.source_locations {
            fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE
        } else {
            fmt::format::FmtSpan::NONE
        })
        .with_filter(console_filter);

    let file = fmt::layer()
        .json()
        .with_writer(writer)
        .with_current_span(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(own_crates_at(config.file_level)?);

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()?;

    Ok(LoggingGuard { _worker: worker })
}

/// `warn` for dependencies, `level` for this workspace.
fn own_crates_at(level: Level) -> Result<EnvFilter, LoggingError> {
    let level = LevelFilter::from_level(level);
    OWN_TARGETS
        .iter()
        .try_fold(EnvFilter::new("warn"), |filter, target| {
            Ok(filter.add_directive(format!("{target}={level}").parse()?))
        })
}

/// Logging setup failures.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("Failed to create log directory {path}: {source}")]
    CreateDirectory {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },

    /// The log file could not be opened.
    #[error("Failed to open log file: {0}")]
    OpenFile(#[from] InitError),

    /// A filter directive was rejected.
    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    /// Another subscriber is already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}
