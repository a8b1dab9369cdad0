/// Kiosk wake-word library
///
/// Acquires a keyword spotting engine and a capture device over an ordered
/// fallback ladder, then runs the per-frame detection step the assistant
/// polls from its main loop.

pub mod audio_buffer;
pub mod capture;
pub mod config;
pub mod detector;
pub mod device;
pub mod engine;
pub mod pipeline;
#[cfg(feature = "porcupine")]
pub mod porcupine;
pub mod profile;
pub mod session;
pub mod strategy;

// Re-export main types
pub use audio_buffer::{AudioSample, FrameRing, SAMPLE_RATE};
pub use capture::{CpalDeviceProvider, WavReplayProvider};
pub use config::{ConfigError, DetectorConfig};
pub use detector::{DetectorStats, WakeWordDetector};
pub use device::{CaptureDevice, DeviceError, DeviceProvider, DeviceSelector, StreamRequest};
pub use engine::{list_wake_words, EngineBackend, EngineError, KeywordEngine, UNIVERSAL_KEYWORD};
pub use pipeline::{strip_wake_word, Assistant, MotionCue, TurnOutcome};
#[cfg(feature = "porcupine")]
pub use porcupine::PorcupineBackend;
pub use profile::{ArchClass, CandidateConfig, CapabilityProfile, KeywordSource};
pub use session::{AttemptError, BoundSession, SessionStats};
pub use strategy::{AcquisitionError, AcquisitionPath, AcquisitionPlan, AcquisitionStrategy, RetryPolicy};
