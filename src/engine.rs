/// Keyword spotting engine seam
///
/// The inference engine is a black box: it is built from a candidate
/// configuration, reports the frame geometry it needs, and classifies one
/// frame of 16-bit PCM at a time.

use crate::audio_buffer::AudioSample;
use crate::profile::CandidateConfig;
use thiserror::Error;
use tracing::info;

/// Keyword label every backend is expected to ship
pub const UNIVERSAL_KEYWORD: &str = "porcupine";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine construction failed for {source_desc}: {reason}")]
    ConstructFailed { source_desc: String, reason: String },

    #[error("Unknown built-in keyword: {0}")]
    UnknownKeyword(String),

    #[error("Frame processing failed: {0}")]
    ProcessFailed(String),

    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidFrameLength { expected: usize, actual: usize },
}

/// A constructed inference engine
///
/// Native resources are released when the value is dropped.
pub trait KeywordEngine {
    /// Samples per frame the engine consumes
    fn frame_length(&self) -> usize;

    /// Sample rate the engine expects, in Hz
    fn sample_rate(&self) -> u32;

    /// Classify one frame
    ///
    /// Returns the index of the matched keyword, or `None` for no match.
    fn process(&mut self, frame: &[AudioSample]) -> Result<Option<usize>, EngineError>;
}

/// Factory for engines plus the label set it advertises
pub trait EngineBackend {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Built-in keyword labels this backend can construct
    fn available_keywords(&self) -> Vec<String>;

    /// Construct an engine for one candidate
    fn create(&self, candidate: &CandidateConfig) -> Result<Box<dyn KeywordEngine>, EngineError>;

    fn is_available(&self, label: &str) -> bool {
        self.available_keywords().iter().any(|k| k == label)
    }
}

/// Log and return the backend's advertised wake words
pub fn list_wake_words(backend: &dyn EngineBackend) -> Vec<String> {
    let keywords = backend.available_keywords();

    info!("Available wake words ({}):", backend.name());
    for (i, keyword) in keywords.iter().enumerate() {
        info!("  {}. {}", i + 1, keyword);
    }

    keywords
}
