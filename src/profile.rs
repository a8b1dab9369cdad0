/// Capability profile and candidate descriptors
///
/// The profile is a read-only snapshot of the environment taken once at
/// startup. Candidates are the single-attempt descriptors the acquisition
/// strategy derives from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// CPU/platform class, as far as native engine compatibility is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchClass {
    /// Desktop-class targets where the stock native library loads
    Standard,

    /// ARM-class targets that need alternate initialization paths
    Constrained,
}

impl ArchClass {
    /// Classify the architecture this binary was compiled for
    pub fn detect() -> Self {
        Self::from_arch(std::env::consts::ARCH)
    }

    /// Classify an architecture name as reported by `std::env::consts::ARCH`
    pub fn from_arch(arch: &str) -> Self {
        match arch {
            "arm" | "aarch64" => ArchClass::Constrained,
            _ => ArchClass::Standard,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ArchClass::Standard => "standard",
            ArchClass::Constrained => "constrained",
        }
    }
}

impl Default for ArchClass {
    fn default() -> Self {
        Self::detect()
    }
}

/// Environment facts the acquisition strategy decides on
///
/// Built once and never mutated afterwards; the strategy only borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityProfile {
    /// Architecture class of the host
    pub arch: ArchClass,

    /// Use only the default (cloud) backend
    pub api_only: bool,

    /// Custom keyword model file (.ppn)
    pub custom_model_path: Option<PathBuf>,

    /// Alternate native library for constrained hosts
    pub library_path: Option<PathBuf>,

    /// Pair fallback keywords with `library_path` on constrained hosts
    pub use_system_libraries: bool,

    /// Fallback keyword labels, tried in order
    pub fallback_keywords: Vec<String>,

    /// Preferred input device index
    pub device_index: usize,
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self {
            arch: ArchClass::detect(),
            api_only: false,
            custom_model_path: None,
            library_path: None,
            use_system_libraries: false,
            fallback_keywords: Vec::new(),
            device_index: 0,
        }
    }
}

impl CapabilityProfile {
    /// Custom model path, only if it is configured and exists on disk
    pub fn existing_custom_model(&self) -> Option<&Path> {
        self.custom_model_path
            .as_deref()
            .filter(|path| path.is_file())
    }
}

/// Where an engine gets its keyword from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordSource {
    /// A label from the backend's built-in set
    Builtin(String),

    /// A custom keyword model file
    ModelFile(PathBuf),
}

impl KeywordSource {
    /// Label recorded as the session's active keyword
    ///
    /// Model files are named after their file stem, so `hey_kiosk.ppn`
    /// becomes `hey_kiosk`.
    pub fn label(&self) -> String {
        match self {
            KeywordSource::Builtin(label) => label.clone(),
            KeywordSource::ModelFile(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

impl fmt::Display for KeywordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordSource::Builtin(label) => write!(f, "keyword '{}'", label),
            KeywordSource::ModelFile(path) => write!(f, "model file {}", path.display()),
        }
    }
}

/// One acquisition attempt: credential, keyword source, optional library
#[derive(Clone, PartialEq, Eq)]
pub struct CandidateConfig {
    pub access_key: String,
    pub keyword: KeywordSource,
    pub library_path: Option<PathBuf>,
}

impl CandidateConfig {
    pub fn builtin(access_key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            keyword: KeywordSource::Builtin(label.into()),
            library_path: None,
        }
    }

    pub fn model_file(access_key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            access_key: access_key.into(),
            keyword: KeywordSource::ModelFile(path.into()),
            library_path: None,
        }
    }

    pub fn with_library(mut self, library_path: Option<PathBuf>) -> Self {
        self.library_path = library_path;
        self
    }
}

// Keeps credentials out of logs.
impl fmt::Debug for CandidateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateConfig")
            .field("access_key", &"<redacted>")
            .field("keyword", &self.keyword)
            .field("library_path", &self.library_path)
            .finish()
    }
}
