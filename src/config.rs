/// Detector configuration
///
/// Resolved once at startup, either from environment variables or from a
/// JSON file, and validated before the detector is built.

use crate::profile::{ArchClass, CapabilityProfile};
use crate::strategy::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Wake word used when none is configured
pub const DEFAULT_WAKE_WORD: &str = "bumblebee";

pub const ENV_ACCESS_KEY: &str = "PVPORCUPINE_ACCESS_KEY";
pub const ENV_WAKE_WORD: &str = "WAKE_WORD";
pub const ENV_DEVICE_INDEX: &str = "AUDIO_DEVICE_INDEX";
pub const ENV_API_ONLY: &str = "WAKEWORD_API_ONLY";
pub const ENV_ARCH: &str = "WAKEWORD_ARCH";
pub const ENV_CUSTOM_MODEL: &str = "WAKEWORD_CUSTOM_MODEL";
pub const ENV_LIBRARY_PATH: &str = "PORCUPINE_LIBRARY_PATH";
pub const ENV_USE_SYSTEM_LIBS: &str = "WAKEWORD_USE_SYSTEM_LIBS";
pub const ENV_FALLBACKS: &str = "WAKEWORD_FALLBACKS";
pub const ENV_RETRY_BUDGET: &str = "WAKEWORD_RETRY_BUDGET";
pub const ENV_RETRY_DELAY_MS: &str = "WAKEWORD_RETRY_DELAY_MS";
pub const ENV_CONFIG_FILE: &str = "WAKEWORD_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Everything the detector needs to acquire a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Engine access credential
    pub access_key: String,

    /// Primary wake word label
    #[serde(default = "default_wake_word")]
    pub wake_word: String,

    #[serde(default)]
    pub profile: CapabilityProfile,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_wake_word() -> String {
    DEFAULT_WAKE_WORD.to_string()
}

impl DetectorConfig {
    /// Load from `WAKEWORD_CONFIG` if set, otherwise from the environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var(ENV_CONFIG_FILE) {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment-shaped)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let access_key = get(ENV_ACCESS_KEY).ok_or(ConfigError::Missing(ENV_ACCESS_KEY))?;
        let wake_word = get(ENV_WAKE_WORD).unwrap_or_else(default_wake_word);

        let arch = match get(ENV_ARCH).as_deref().map(str::trim) {
            None | Some("auto") => ArchClass::detect(),
            Some("standard") => ArchClass::Standard,
            Some("constrained") => ArchClass::Constrained,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: ENV_ARCH,
                    value: other.to_string(),
                })
            }
        };

        let profile = CapabilityProfile {
            arch,
            api_only: parse_flag(ENV_API_ONLY, get(ENV_API_ONLY))?,
            custom_model_path: get(ENV_CUSTOM_MODEL).map(PathBuf::from),
            library_path: get(ENV_LIBRARY_PATH).map(PathBuf::from),
            use_system_libraries: parse_flag(ENV_USE_SYSTEM_LIBS, get(ENV_USE_SYSTEM_LIBS))?,
            fallback_keywords: get(ENV_FALLBACKS)
                .map(|list| parse_keyword_list(&list))
                .unwrap_or_default(),
            device_index: parse_number(ENV_DEVICE_INDEX, get(ENV_DEVICE_INDEX))?.unwrap_or(0),
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            primary_retries: parse_number(ENV_RETRY_BUDGET, get(ENV_RETRY_BUDGET))?
                .unwrap_or(defaults.primary_retries),
            retry_delay: parse_number(ENV_RETRY_DELAY_MS, get(ENV_RETRY_DELAY_MS))?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
        };

        let mut config = Self {
            access_key,
            wake_word,
            profile,
            retry,
        };
        config.normalize();
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.normalize();
        Ok(config)
    }

    /// Bring keyword labels into the lowercase form backends advertise
    ///
    /// The credential is left untouched.
    pub fn normalize(&mut self) {
        self.wake_word = normalize_keyword(&self.wake_word);
        self.profile.fallback_keywords = self
            .profile
            .fallback_keywords
            .iter()
            .map(|k| normalize_keyword(k))
            .filter(|k| !k.is_empty())
            .collect();
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key.trim().is_empty() {
            return Err(ConfigError::Validation("Access key is required".to_string()));
        }

        if self.wake_word.trim().is_empty() {
            return Err(ConfigError::Validation("Wake word must not be empty".to_string()));
        }

        if let Some(path) = &self.profile.custom_model_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "Custom model path must not be empty".to_string(),
                ));
            }
            if !path.exists() {
                // Only skipped at acquisition time, not fatal here.
                warn!("Custom keyword model not found: {}", path.display());
            }
        }

        Ok(())
    }
}

fn parse_flag(key: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: v }),
        },
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { key, value: v })
        })
        .transpose()
}

fn normalize_keyword(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Split a comma-separated keyword list, dropping blanks
pub fn parse_keyword_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(normalize_keyword)
        .filter(|k| !k.is_empty())
        .collect()
}
