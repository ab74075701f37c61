//! Project settings loaded from `qaflow.yml`
//!
//! Every field has a default, so a missing file or a partial file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "qaflow.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding every artifact of the run
    pub workspace: PathBuf,
    pub api_base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub agents_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub script_concurrency: usize,
    pub max_source_bytes: usize,
    pub virtual_users: u32,
    pub duration_secs: u64,
    pub k6_binary: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            api_base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            agents_dir: PathBuf::from("agents"),
            request_timeout_secs: 60,
            run_timeout_secs: 180,
            script_concurrency: 4,
            max_source_bytes: 200_000,
            virtual_users: 1,
            duration_secs: 3,
            k6_binary: "k6".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from `qaflow.yml` in the current
    /// directory when no path is given. Only an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            debug!("no {} found, using default settings", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let settings = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        settings.validate()?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.script_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "script_concurrency must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 || self.run_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn test_duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Agents directory, relative paths resolved against the workspace
    pub fn agents_path(&self) -> PathBuf {
        if self.agents_dir.is_absolute() {
            self.agents_dir.clone()
        } else {
            self.workspace.join(&self.agents_dir)
        }
    }
}
