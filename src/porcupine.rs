/// Porcupine engine backend
///
/// Wraps the Picovoice Porcupine SDK. Built-in keywords are addressed by
/// their lowercase labels; custom `.ppn` models and an alternate native
/// library path are passed straight through to the SDK builder.

use crate::audio_buffer::AudioSample;
use crate::engine::{EngineBackend, EngineError, KeywordEngine};
use crate::profile::{CandidateConfig, KeywordSource};
use pv_porcupine::{BuiltinKeywords, Porcupine, PorcupineBuilder};
use tracing::{debug, info};

const BUILTIN_KEYWORDS: &[(&str, BuiltinKeywords)] = &[
    ("alexa", BuiltinKeywords::Alexa),
    ("americano", BuiltinKeywords::Americano),
    ("blueberry", BuiltinKeywords::Blueberry),
    ("bumblebee", BuiltinKeywords::Bumblebee),
    ("computer", BuiltinKeywords::Computer),
    ("grapefruit", BuiltinKeywords::Grapefruit),
    ("grasshopper", BuiltinKeywords::Grasshopper),
    ("hey google", BuiltinKeywords::HeyGoogle),
    ("hey siri", BuiltinKeywords::HeySiri),
    ("jarvis", BuiltinKeywords::Jarvis),
    ("ok google", BuiltinKeywords::OkGoogle),
    ("picovoice", BuiltinKeywords::Picovoice),
    ("porcupine", BuiltinKeywords::Porcupine),
    ("terminator", BuiltinKeywords::Terminator),
];

fn builtin(label: &str) -> Option<BuiltinKeywords> {
    BUILTIN_KEYWORDS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, keyword)| keyword.clone())
}

/// Backend that constructs Porcupine instances
#[derive(Debug, Default)]
pub struct PorcupineBackend;

impl EngineBackend for PorcupineBackend {
    fn name(&self) -> &str {
        "porcupine"
    }

    fn available_keywords(&self) -> Vec<String> {
        BUILTIN_KEYWORDS
            .iter()
            .map(|(name, _)| name.to_string())
            .collect()
    }

    fn create(&self, candidate: &CandidateConfig) -> Result<Box<dyn KeywordEngine>, EngineError> {
        let mut builder = match &candidate.keyword {
            KeywordSource::Builtin(label) => {
                let keyword = builtin(label).ok_or_else(|| EngineError::UnknownKeyword(label.clone()))?;
                PorcupineBuilder::new_with_keywords(candidate.access_key.clone(), &[keyword])
            }
            KeywordSource::ModelFile(path) => {
                PorcupineBuilder::new_with_keyword_paths(candidate.access_key.clone(), &[path.clone()])
            }
        };

        if let Some(library) = &candidate.library_path {
            debug!("Using Porcupine library {}", library.display());
            builder.library_path(library);
        }

        let porcupine = builder.init().map_err(|e| EngineError::ConstructFailed {
            source_desc: candidate.keyword.to_string(),
            reason: e.to_string(),
        })?;

        info!(
            "Porcupine initialized for {} ({} Hz, {} samples/frame)",
            candidate.keyword,
            porcupine.sample_rate(),
            porcupine.frame_length()
        );

        Ok(Box::new(PorcupineEngine { inner: porcupine }))
    }
}

/// A live Porcupine instance; dropping it frees the native handle
pub struct PorcupineEngine {
    inner: Porcupine,
}

impl KeywordEngine for PorcupineEngine {
    fn frame_length(&self) -> usize {
        self.inner.frame_length() as usize
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn process(&mut self, frame: &[AudioSample]) -> Result<Option<usize>, EngineError> {
        let expected = self.frame_length();
        if frame.len() != expected {
            return Err(EngineError::InvalidFrameLength {
                expected,
                actual: frame.len(),
            });
        }

        let index = self
            .inner
            .process(frame)
            .map_err(|e| EngineError::ProcessFailed(e.to_string()))?;

        // Negative index means no keyword matched.
        Ok(usize::try_from(index).ok())
    }
}
