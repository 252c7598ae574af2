//! Configuration management for CareConnect.
//!
//! Loads configuration from ${CARECONNECT_HOME}/config.toml with sensible
//! defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment override for `server_url`.
pub const SERVER_URL_ENV: &str = "CARECONNECT_SERVER_URL";

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for CareConnect configuration and session data.
    //!
    //! CARECONNECT_HOME resolution order:
    //! 1. CARECONNECT_HOME environment variable (if set)
    //! 2. ~/.config/careconnect (default)

    use std::path::PathBuf;

    /// Returns the CareConnect home directory.
    pub fn careconnect_home() -> PathBuf {
        if let Ok(home) = std::env::var("CARECONNECT_HOME")
            && !home.trim().is_empty()
        {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".careconnect"),
            |h| h.join(".config").join("careconnect"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        careconnect_home().join("config.toml")
    }

    /// Returns the default session storage file.
    pub fn session_path() -> PathBuf {
        careconnect_home().join("session.json")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend root URL
    pub server_url: String,
    /// Prefix of the auth routes
    pub auth_prefix: String,
    /// Per-request timeout in seconds (0 falls back to the default)
    pub request_timeout_secs: u64,
    /// Early-expiry buffer in seconds, applied everywhere
    pub expiry_buffer_secs: u64,
    /// Login page path
    pub login_path: String,
    /// Landing path after login when no return path was carried
    pub default_redirect: String,
    /// Path prefixes that require authentication
    pub protected_paths: Vec<String>,
    /// Session storage file override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: Self::DEFAULT_SERVER_URL.to_string(),
            auth_prefix: Self::DEFAULT_AUTH_PREFIX.to_string(),
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            expiry_buffer_secs: 0,
            login_path: "/AdminLogin".to_string(),
            default_redirect: "/AdminDashboard".to_string(),
            protected_paths: [
                "/AdminDashboard",
                "/Admin",
                "/CaregiverProfile",
                "/ClientProfile",
                "/LocationMatching",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            session_file: None,
        }
    }
}

impl Config {
    pub const DEFAULT_SERVER_URL: &'static str = "http://localhost:8000";
    pub const DEFAULT_AUTH_PREFIX: &'static str = "/api/auth";
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

    /// Loads configuration from the default path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the commented default template to `path`.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Resolves the backend root URL with precedence: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the chosen URL is not a valid absolute URL.
    pub fn resolve_server_url(&self) -> Result<String> {
        if let Ok(env_url) = std::env::var(SERVER_URL_ENV) {
            let trimmed = env_url.trim();
            if !trimmed.is_empty() {
                validate_url(trimmed)?;
                return Ok(trimmed.trim_end_matches('/').to_string());
            }
        }

        let trimmed = self.server_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }

        Ok(Self::DEFAULT_SERVER_URL.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        match self.request_timeout_secs {
            0 => Duration::from_secs(Self::DEFAULT_REQUEST_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.expiry_buffer_secs)
    }

    /// Session storage file: `session_file` if set, else the home default.
    pub fn session_path(&self) -> PathBuf {
        self.session_file.clone().unwrap_or_else(paths::session_path)
    }
}

fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid CareConnect server URL: {url}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.expiry_buffer(), Duration::ZERO);
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let parsed: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "expiry_buffer_secs = 300\nrequest_timeout_secs = 0\nsession_file = \"/tmp/s.json\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.expiry_buffer(), Duration::from_secs(300));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.session_path(), PathBuf::from("/tmp/s.json"));
        assert_eq!(config.login_path, "/AdminLogin");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "server_url = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::init(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("server_url"));

        let err = Config::init(&path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_invalid_server_url_is_rejected() {
        let config = Config {
            server_url: "not a url".to_string(),
            ..Config::default()
        };
        // Only meaningful when the env override is absent.
        if std::env::var(SERVER_URL_ENV).is_err() {
            assert!(config.resolve_server_url().is_err());
        }
    }

    #[test]
    fn test_server_url_trailing_slash_is_trimmed() {
        let config = Config {
            server_url: "http://example.test:8000/".to_string(),
            ..Config::default()
        };
        if std::env::var(SERVER_URL_ENV).is_err() {
            assert_eq!(
                config.resolve_server_url().unwrap(),
                "http://example.test:8000"
            );
        }
    }
}
