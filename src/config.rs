//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `AI_HOSPITAL_*` environment variables, then CLI flags (applied by the
//! binary through the `with_*` overrides).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HospitalError, Result};
use crate::language::{Doctor, Language};

pub const DEFAULT_CONFIG_FILE: &str = "ai-hospital.toml";
pub const ENV_DATA_URL: &str = "AI_HOSPITAL_DATA_URL";
pub const ENV_AGENT_URL: &str = "AI_HOSPITAL_AGENT_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL for auth, case catalog and dialogue history.
    pub data_api_url: String,
    /// Base URL for the chat, reset and summary endpoints.
    pub agent_api_url: String,
    pub chat_timeout_secs: u64,
    /// First-chunk guard for the summary/diagnosis request, which thinks longer.
    pub summary_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub read_retries: u32,
    pub retry_backoff_ms: u64,
    pub playback_interval_secs: u64,
    pub language: Language,
    pub doctor: Doctor,
    pub state_dir: PathBuf,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_api_url: "http://localhost:8000".to_string(),
            agent_api_url: "http://localhost:5000".to_string(),
            chat_timeout_secs: 30,
            summary_timeout_secs: 120,
            connect_timeout_secs: 10,
            read_retries: 3,
            retry_backoff_ms: 1_000,
            playback_interval_secs: 5,
            language: Language::Zh,
            doctor: Doctor::DeepSeekR1,
            state_dir: PathBuf::from(".ai-hospital"),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] when it exists.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HospitalError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| HospitalError::Config(e.to_string()))
    }

    /// Apply environment overrides through `lookup` so tests need not touch
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATA_URL).filter(|v| !v.trim().is_empty()) {
            self.data_api_url = url;
        }
        if let Some(url) = lookup(ENV_AGENT_URL).filter(|v| !v.trim().is_empty()) {
            self.agent_api_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("data_api_url", &self.data_api_url), ("agent_api_url", &self.agent_api_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(HospitalError::Config(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.chat_timeout_secs == 0 || self.summary_timeout_secs == 0 {
            return Err(HospitalError::Config("timeouts must be non-zero".into()));
        }
        if self.playback_interval_secs == 0 {
            return Err(HospitalError::Config("playback_interval_secs must be non-zero".into()));
        }
        Ok(())
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_doctor(mut self, doctor: Doctor) -> Self {
        self.doctor = doctor;
        self
    }

    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn playback_interval(&self) -> Duration {
        Duration::from_secs(self.playback_interval_secs)
    }
}
