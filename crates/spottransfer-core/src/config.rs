//! Client configuration management.
//!
//! Handles loading, saving and validating the client settings: where the
//! transfer backend lives, how the transfer loop is paced, and how the
//! authorization popup is watched.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::AuthOptions;
use crate::error::{Error, FileSystemError, Result};
use crate::transfer::TransferOptions;

/// Application directory name under the platform config directory.
pub const APP_DIR_NAME: &str = "spottransfer";

/// Default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

/// Default local address of the authorization callback listener.
pub const DEFAULT_CALLBACK_ADDR: &str = "127.0.0.1:8765";

const fn default_true() -> bool {
    true
}

const fn default_track_delay_ms() -> u64 {
    100
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_timeout_secs() -> u64 {
    300
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_callback_addr() -> String {
    DEFAULT_CALLBACK_ADDR.to_string()
}

/// Authorization popup settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    /// How often the popup is checked for closure, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long to wait for the completion message, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Local address the completion listener binds to.
    #[serde(default = "default_callback_addr")]
    pub callback_addr: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
            callback_addr: default_callback_addr(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Base URL of the transfer backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Pause between two per-track calls, in milliseconds.
    #[serde(default = "default_track_delay_ms")]
    pub track_delay_ms: u64,
    /// Whether playlist links are shape-checked before submission.
    #[serde(default = "default_true")]
    pub validate_playlist_url: bool,
    /// Authorization popup settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            track_delay_ms: default_track_delay_ms(),
            validate_playlist_url: true,
            auth: AuthConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, or create defaults if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        if !config_path.exists() {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path) {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or fails validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Self = read_json(path, "config")?;
        config.validate()?;

        info!("Loaded config from {}", path.display());
        debug!("Backend URL: {}", config.backend_url);

        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to an explicit path, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        write_json(path, self)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        let backend = self.backend_url.trim();
        if !(backend.starts_with("http://") || backend.starts_with("https://")) {
            return Err(Error::Configuration(format!(
                "Backend URL must start with http:// or https://: {}",
                self.backend_url
            )));
        }

        if self.auth.poll_interval_ms == 0 {
            return Err(Error::Configuration(
                "Authorization poll interval must be greater than zero".to_string(),
            ));
        }

        if self.auth.timeout_secs == 0 {
            return Err(Error::Configuration(
                "Authorization timeout must be greater than zero".to_string(),
            ));
        }

        self.callback_addr()?;
        Ok(())
    }

    /// Parsed callback listener address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the address does not parse.
    pub fn callback_addr(&self) -> Result<SocketAddr> {
        self.auth.callback_addr.parse().map_err(|e| {
            Error::Configuration(format!(
                "Invalid callback address '{}': {e}",
                self.auth.callback_addr
            ))
        })
    }

    /// Transfer loop options derived from this configuration.
    #[must_use]
    pub const fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            track_delay: Duration::from_millis(self.track_delay_ms),
            validate_url: self.validate_playlist_url,
        }
    }

    /// Authorization flow options derived from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the callback address is invalid.
    pub fn auth_options(&self) -> Result<AuthOptions> {
        Ok(AuthOptions {
            poll_interval: Duration::from_millis(self.auth.poll_interval_ms),
            timeout: Duration::from_secs(self.auth.timeout_secs),
            callback_addr: self.callback_addr()?,
        })
    }

    /// Get the path to the default config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

// =============================================================================
// Saved session
// =============================================================================

/// Backend session cookies kept between invocations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedSession {
    /// Backend the cookies belong to.
    pub backend_url: String,
    /// Cookies as a `Cookie` header value.
    pub cookie: String,
}

impl SavedSession {
    /// Default location of the session file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        app_config_dir().join("session.json")
    }

    /// Load a saved session. A missing file yields `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("No saved session at {}", path.display());
            return Ok(None);
        }

        read_json(path, "session").map(Some)
    }

    /// Load the saved session for `backend_url`, ignoring sessions of other backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_for(path: &Path, backend_url: &str) -> Result<Option<Self>> {
        let wanted = backend_url.trim().trim_end_matches('/');
        Ok(Self::load_from(path)?.filter(|session| {
            let matches = session.backend_url.trim_end_matches('/') == wanted;
            if !matches {
                debug!(
                    "Saved session belongs to {}, not {}",
                    session.backend_url, wanted
                );
            }
            matches
        }))
    }

    /// Write the session file, readable by the owner only on Unix.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        write_json(path, self)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
                warn!("Failed to restrict session file permissions: {}", e);
            }
        }

        debug!("Saved session to {}", path.display());
        Ok(())
    }

    /// Remove the session file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Cleared saved session");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::FileSystem(FileSystemError::WriteFailed {
                path: path.to_path_buf(),
                reason: format!("Failed to remove session file: {e}"),
            })),
        }
    }
}

/// Read and parse a JSON file; `what` names it in error messages.
fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::FileSystem(FileSystemError::ReadFailed {
            path: path.to_path_buf(),
            reason: format!("Cannot read {what} file: {e}"),
        })
    })?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Configuration(format!("Malformed {what} file: {e}")))
}

/// Serialize `value` as pretty JSON to `path`, creating parent directories.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            Error::FileSystem(FileSystemError::CreateDirFailed {
                path: parent.to_path_buf(),
                reason: format!("Failed to create config directory: {e}"),
            })
        })?;
    }

    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).map_err(|e| {
        Error::FileSystem(FileSystemError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })
}

fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(APP_DIR_NAME)
}

/// Get the path to the config file.
fn config_file_path() -> PathBuf {
    app_config_dir().join("config.json")
}

/// Directory holding rotating log files.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("logs")
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.backend_url, "http://localhost:5000");
        assert_eq!(config.track_delay_ms, 100);
        assert!(config.validate_playlist_url);
        assert_eq!(config.auth.poll_interval_ms, 500);
        assert_eq!(config.auth.timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"backend_url": "https://transfer.example.com"}"#)
                .expect("Should deserialize");
        assert_eq!(config.backend_url, "https://transfer.example.com");
        assert_eq!(config.track_delay_ms, 100);
        assert_eq!(config.auth, AuthConfig::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("nested").join("config.json");

        let config = AppConfig {
            track_delay_ms: 250,
            validate_playlist_url: false,
            ..Default::default()
        };
        config.save_to(&path).expect("Should save");
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path).expect("Should load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let result = AppConfig::load_from(&temp_dir.path().join("absent.json"));
        assert!(matches!(
            result,
            Err(Error::FileSystem(FileSystemError::ReadFailed { .. }))
        ));
    }

    #[test]
    fn test_load_malformed_file() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").expect("Should write");

        let result = AppConfig::load_from(&path);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_scheme = AppConfig {
            backend_url: "ftp://backend".to_string(),
            ..Default::default()
        };
        assert!(bad_scheme.validate().is_err());

        let mut zero_poll = AppConfig::default();
        zero_poll.auth.poll_interval_ms = 0;
        assert!(zero_poll.validate().is_err());

        let mut zero_timeout = AppConfig::default();
        zero_timeout.auth.timeout_secs = 0;
        assert!(zero_timeout.validate().is_err());

        let mut bad_addr = AppConfig::default();
        bad_addr.auth.callback_addr = "localhost".to_string();
        assert!(bad_addr.validate().is_err());
    }

    #[test]
    fn test_option_conversions() {
        let config = AppConfig {
            track_delay_ms: 20,
            ..Default::default()
        };
        let transfer = config.transfer_options();
        assert_eq!(transfer.track_delay, Duration::from_millis(20));
        assert!(transfer.validate_url);

        let auth = config.auth_options().expect("Should convert");
        assert_eq!(auth.poll_interval, Duration::from_millis(500));
        assert_eq!(auth.timeout, Duration::from_secs(300));
        assert_eq!(auth.callback_addr.port(), 8765);
    }

    #[test]
    fn test_config_file_path_ends_with_app_dir() {
        let path = AppConfig::config_file_path();
        assert!(path.ends_with("spottransfer/config.json"));
        assert!(SavedSession::default_path().ends_with("spottransfer/session.json"));
    }

    mod saved_session_tests {
        use super::*;

        fn session() -> SavedSession {
            SavedSession {
                backend_url: "http://localhost:5000".to_string(),
                cookie: "session=abc".to_string(),
            }
        }

        #[test]
        fn test_missing_file_is_none() {
            let temp_dir = TempDir::new().expect("Should create temp dir");
            let loaded = SavedSession::load_from(&temp_dir.path().join("session.json"))
                .expect("Should load");
            assert!(loaded.is_none());
        }

        #[test]
        fn test_save_load_and_clear() {
            let temp_dir = TempDir::new().expect("Should create temp dir");
            let path = temp_dir.path().join("session.json");

            session().save_to(&path).expect("Should save");
            let loaded = SavedSession::load_from(&path).expect("Should load");
            assert_eq!(loaded, Some(session()));

            SavedSession::clear(&path).expect("Should clear");
            assert!(!path.exists());
            SavedSession::clear(&path).expect("Clearing twice is fine");
        }

        #[test]
        fn test_malformed_session_file_is_configuration_error() {
            let temp_dir = TempDir::new().expect("Should create temp dir");
            let path = temp_dir.path().join("session.json");
            fs::write(&path, "{not json").expect("Should write");

            let err = SavedSession::load_from(&path).expect_err("Should reject");
            assert!(matches!(err, Error::Configuration(ref message)
                if message.starts_with("Malformed session file")));
        }

        #[cfg(unix)]
        #[test]
        fn test_session_file_is_private() {
            use std::os::unix::fs::PermissionsExt;

            let temp_dir = TempDir::new().expect("Should create temp dir");
            let path = temp_dir.path().join("session.json");
            session().save_to(&path).expect("Should save");

            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        #[test]
        fn test_load_for_other_backend_is_none() {
            let temp_dir = TempDir::new().expect("Should create temp dir");
            let path = temp_dir.path().join("session.json");
            session().save_to(&path).expect("Should save");

            let same =
                SavedSession::load_for(&path, "http://localhost:5000/").expect("Should load");
            assert!(same.is_some());
            let other = SavedSession::load_for(&path, "https://elsewhere.example.com")
                .expect("Should load");
            assert!(other.is_none());
        }
    }
}
