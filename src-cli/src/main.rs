//! spottransfer - move a Spotify playlist to `YouTube` from the terminal.
//!
//! This is the command line entry point; the transfer logic lives in
//! `spottransfer-core`.

mod app;
mod logging;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use spottransfer_core::{AppConfig, SavedSession};
use tracing::{debug, info};

use app::{Context, TransferRequest};
use logging::LoggingConfig;

/// Command-line arguments for spottransfer
#[derive(Parser, Debug)]
#[command(name = "spottransfer")]
#[command(about = "Move a Spotify playlist to YouTube through the transfer backend")]
#[command(version)]
struct Cli {
    /// Base URL of the transfer backend
    #[arg(long, global = true, env = "SPOTTRANSFER_BACKEND_URL")]
    backend_url: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect a YouTube account
    Authorize,
    /// Transfer a Spotify playlist
    Transfer(TransferArgs),
    /// Clear the backend session
    Disconnect,
    /// Inspect or create the config file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
struct TransferArgs {
    /// Spotify playlist link
    url: String,

    /// Connect a YouTube account before transferring
    #[arg(long)]
    authorize: bool,

    /// Pause between tracks, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Skip the playlist link shape check
    #[arg(long)]
    no_validate: bool,

    /// Also write the report as an HTML page
    #[arg(long, value_name = "PATH")]
    html_report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let _logging = logging::init(&LoggingConfig::for_verbosity(cli.verbose))
        .context("Failed to initialize logging")?;
    info!("Starting spottransfer {}", env!("CARGO_PKG_VERSION"));

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AppConfig::config_file_path);

    // `config init` must work without a readable config file.
    if let Command::Config(ConfigCommand::Init { force }) = cli.command {
        return app::config_init(&config_path, force);
    }

    let ctx = Context {
        config: load_config(&cli)?,
        config_path,
        session_path: SavedSession::default_path(),
    };
    debug!("Effective config: {:?}", ctx.config);

    match cli.command {
        Command::Authorize => app::authorize(&ctx).await,
        Command::Transfer(args) => {
            let request = TransferRequest {
                playlist_url: args.url,
                authorize: args.authorize,
                html_report: args.html_report,
            };
            app::transfer(&ctx, &request).await
        }
        Command::Disconnect => app::disconnect(&ctx).await,
        Command::Config(ConfigCommand::Show) => app::config_show(&ctx),
        Command::Config(ConfigCommand::Path) => Ok(app::config_path(&ctx)),
        Command::Config(ConfigCommand::Init { .. }) => Ok(ExitCode::SUCCESS),
    }
}

/// Load the config file and apply command line overrides.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load().context("Failed to load config")?,
    };

    if let Some(backend_url) = &cli.backend_url {
        config.backend_url.clone_from(backend_url);
    }
    if let Command::Transfer(args) = &cli.command {
        if let Some(delay_ms) = args.delay_ms {
            config.track_delay_ms = delay_ms;
        }
        if args.no_validate {
            config.validate_playlist_url = false;
        }
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_transfer_flags() {
        let cli = Cli::try_parse_from([
            "spottransfer",
            "transfer",
            "https://open.spotify.com/playlist/abc123",
            "--authorize",
            "--delay-ms",
            "250",
            "--no-validate",
            "--html-report",
            "report.html",
        ])
        .unwrap();

        let Command::Transfer(args) = cli.command else {
            panic!("expected transfer");
        };
        assert_eq!(args.url, "https://open.spotify.com/playlist/abc123");
        assert!(args.authorize);
        assert_eq!(args.delay_ms, Some(250));
        assert!(args.no_validate);
        assert_eq!(args.html_report, Some(PathBuf::from("report.html")));
    }

    #[test]
    fn test_parse_config_init_force() {
        let cli = Cli::try_parse_from(["spottransfer", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Init { force: true })
        ));
    }

    #[test]
    fn test_overrides_applied() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        AppConfig::default().save_to(&path).unwrap();

        let cli = Cli::try_parse_from([
            "spottransfer",
            "--config",
            path.to_str().unwrap(),
            "--backend-url",
            "https://transfer.example.com",
            "transfer",
            "https://open.spotify.com/playlist/abc123",
            "--delay-ms",
            "0",
            "--no-validate",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.backend_url, "https://transfer.example.com");
        assert_eq!(config.track_delay_ms, 0);
        assert!(!config.validate_playlist_url);
    }

    #[test]
    fn test_bad_backend_override_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        AppConfig::default().save_to(&path).unwrap();

        let cli = Cli::try_parse_from([
            "spottransfer",
            "--config",
            path.to_str().unwrap(),
            "--backend-url",
            "ftp://backend",
            "disconnect",
        ])
        .unwrap();
        assert!(load_config(&cli).is_err());
    }
}
