//! Configuration types and loading
//!
//! Precedence: `--config` / `CONFIG_PATH` env (resolved by clap) >
//! `board-cli.toml` in the working directory. Every field has a default, so a
//! missing file at the default location is not an error. `API_BASE` overrides
//! `api.base_url`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file used when neither `--config` nor `CONFIG_PATH` is given.
pub const DEFAULT_CONFIG_PATH: &str = "board-cli.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request transport timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on one renewal call. 0 waits indefinitely.
    #[serde(default = "default_timeout")]
    pub refresh_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            refresh_timeout_secs: default_timeout(),
        }
    }
}

/// Cookie file name used next to `storage_path` when `cookie_path` is unset.
pub const DEFAULT_COOKIE_FILE: &str = "cookies.json";

/// Where the signed-in session is kept between invocations
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Session file. Without one the session lasts for a single command.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    /// Refresh cookie file. Defaults to `cookies.json` beside `storage_path`.
    #[serde(default)]
    pub cookie_path: Option<PathBuf>,
}

impl SessionConfig {
    /// Where the refresh cookie is persisted, if anywhere.
    pub fn cookie_file(&self) -> Option<PathBuf> {
        self.cookie_path.clone().or_else(|| {
            self.storage_path
                .as_ref()
                .map(|p| p.with_file_name(DEFAULT_COOKIE_FILE))
        })
    }
}

fn default_base_url() -> String {
    session_auth::DEFAULT_API_BASE.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Load `board-cli.toml` if present, otherwise start from defaults.
    pub fn load_default() -> common::Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Option<Duration> {
        match self.api.refresh_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn finish(mut self) -> common::Result<Self> {
        if let Ok(base) = std::env::var("API_BASE") {
            self.api.base_url = base;
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(self)
    }
}
