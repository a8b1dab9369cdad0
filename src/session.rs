/// Bound session: one open device paired with one constructed engine
///
/// `bind` is the only way to create a session and either returns both
/// halves or neither. `listen` is the single detection step and `close`
/// tears the pair down device-first.

use crate::audio_buffer::AudioSample;
use crate::device::{open_with_fallback, CaptureDevice, DeviceError, DeviceProvider};
use crate::engine::{EngineBackend, EngineError, KeywordEngine};
use crate::profile::CandidateConfig;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Keyword index the engine reports for the session's own keyword
const SESSION_KEYWORD_INDEX: usize = 0;

/// Why one acquisition attempt failed
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("Engine construction failed: {0}")]
    EngineConstructFailed(#[from] EngineError),

    #[error("Device open failed: {0}")]
    DeviceOpenFailed(#[from] DeviceError),
}

struct Binding {
    device: Box<dyn CaptureDevice>,
    engine: Box<dyn KeywordEngine>,
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub read_faults: u64,
    pub consecutive_read_faults: u64,
    pub engine_faults: u64,
    pub triggers: u64,
}

/// Live (device, engine) pair plus the keyword it was built for
pub struct BoundSession {
    binding: Option<Binding>,
    active_keyword: String,
    frame: Vec<AudioSample>,
    stats: SessionStats,
}

impl BoundSession {
    /// Construct the engine for `candidate`, then open a device at its geometry
    ///
    /// If no device can be opened the engine is dropped before returning.
    pub fn bind(
        backend: &dyn EngineBackend,
        devices: &dyn DeviceProvider,
        candidate: &CandidateConfig,
        device_index: usize,
    ) -> Result<Self, AttemptError> {
        let engine = backend.create(candidate)?;
        let frame_length = engine.frame_length();
        let sample_rate = engine.sample_rate();

        let device = match open_with_fallback(devices, device_index, sample_rate, frame_length) {
            Ok(device) => device,
            Err(e) => {
                drop(engine);
                debug!("Released engine for {} after device failure", candidate.keyword);
                return Err(e.into());
            }
        };

        Ok(Self {
            binding: Some(Binding { device, engine }),
            active_keyword: candidate.keyword.label(),
            frame: vec![0; frame_length],
            stats: SessionStats::default(),
        })
    }

    /// Run one detection step
    ///
    /// Reads exactly one frame and returns true only when the engine reports
    /// the session's keyword. Read and engine faults are logged and count as
    /// no trigger.
    pub fn listen(&mut self) -> bool {
        let Some(binding) = self.binding.as_mut() else {
            return false;
        };

        if let Err(e) = binding.device.read_frame(&mut self.frame) {
            self.stats.read_faults += 1;
            self.stats.consecutive_read_faults += 1;
            warn!("Frame read fault: {}", e);
            return false;
        }
        self.stats.frames_processed += 1;
        self.stats.consecutive_read_faults = 0;

        match binding.engine.process(&self.frame) {
            Ok(Some(SESSION_KEYWORD_INDEX)) => {
                self.stats.triggers += 1;
                info!("Wake word '{}' detected", self.active_keyword);
                true
            }
            Ok(Some(other)) => {
                trace!("Ignoring keyword index {}", other);
                false
            }
            Ok(None) => false,
            Err(e) => {
                self.stats.engine_faults += 1;
                warn!("Wake word detection error: {}", e);
                false
            }
        }
    }

    /// Close the device, then release the engine
    ///
    /// Calling this more than once is a no-op.
    pub fn close(&mut self) {
        if let Some(Binding { device, engine }) = self.binding.take() {
            drop(device);
            drop(engine);
            info!("Wake word session for '{}' closed", self.active_keyword);
        }
    }

    pub fn is_open(&self) -> bool {
        self.binding.is_some()
    }

    /// Label of the keyword this session listens for
    pub fn active_keyword(&self) -> &str {
        &self.active_keyword
    }

    pub fn frame_length(&self) -> usize {
        self.frame.len()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

impl Drop for BoundSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for BoundSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundSession")
            .field("active_keyword", &self.active_keyword)
            .field("open", &self.is_open())
            .field("frame_length", &self.frame.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceSelector, StreamRequest};
    use crate::profile::KeywordSource;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    struct LoggedDevice {
        log: Log,
        reads: usize,
        fault_on: Option<usize>,
    }

    impl CaptureDevice for LoggedDevice {
        fn read_frame(&mut self, frame: &mut [AudioSample]) -> Result<(), DeviceError> {
            let n = self.reads;
            self.reads += 1;
            if self.fault_on == Some(n) {
                return Err(DeviceError::ReadFault("overflow".to_string()));
            }
            frame.fill(n as i16);
            Ok(())
        }
    }

    impl Drop for LoggedDevice {
        fn drop(&mut self) {
            self.log.lock().unwrap().push("device closed".to_string());
        }
    }

    /// Reports the index scripted for the frame value it sees
    struct ScriptedEngine {
        log: Log,
        script: Vec<Result<Option<usize>, ()>>,
    }

    impl KeywordEngine for ScriptedEngine {
        fn frame_length(&self) -> usize {
            4
        }

        fn sample_rate(&self) -> u32 {
            16000
        }

        fn process(&mut self, frame: &[AudioSample]) -> Result<Option<usize>, EngineError> {
            let n = frame[0] as usize;
            match self.script.get(n).cloned().unwrap_or(Ok(None)) {
                Ok(hit) => Ok(hit),
                Err(()) => Err(EngineError::ProcessFailed("native error".to_string())),
            }
        }
    }

    impl Drop for ScriptedEngine {
        fn drop(&mut self) {
            self.log.lock().unwrap().push("engine released".to_string());
        }
    }

    struct Backend {
        log: Log,
        script: Vec<Result<Option<usize>, ()>>,
    }

    impl EngineBackend for Backend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn available_keywords(&self) -> Vec<String> {
            vec!["bumblebee".to_string()]
        }

        fn create(&self, _: &CandidateConfig) -> Result<Box<dyn KeywordEngine>, EngineError> {
            self.log.lock().unwrap().push("engine created".to_string());
            Ok(Box::new(ScriptedEngine {
                log: Arc::clone(&self.log),
                script: self.script.clone(),
            }))
        }
    }

    struct Devices {
        log: Log,
        available: bool,
        fault_on: Option<usize>,
    }

    impl DeviceProvider for Devices {
        fn open(&self, request: &StreamRequest) -> Result<Box<dyn CaptureDevice>, DeviceError> {
            if !self.available {
                return Err(DeviceError::OpenFailed {
                    device: request.device,
                    reason: "unplugged".to_string(),
                });
            }
            assert_eq!(request.frame_length, 4);
            assert_eq!(request.sample_rate, 16000);
            assert_eq!(request.device, DeviceSelector::Index(1));
            self.log.lock().unwrap().push("device opened".to_string());
            Ok(Box::new(LoggedDevice {
                log: Arc::clone(&self.log),
                reads: 0,
                fault_on: self.fault_on,
            }))
        }
    }

    fn fixture(script: Vec<Result<Option<usize>, ()>>, available: bool, fault_on: Option<usize>) -> (Backend, Devices, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let backend = Backend { log: Arc::clone(&log), script };
        let devices = Devices { log: Arc::clone(&log), available, fault_on };
        (backend, devices, log)
    }

    #[test]
    fn test_bind_records_active_keyword() {
        let (backend, devices, _log) = fixture(vec![], true, None);
        let candidate = CandidateConfig::builtin("key", "bumblebee");

        let session = BoundSession::bind(&backend, &devices, &candidate, 1).unwrap();
        assert_eq!(session.active_keyword(), "bumblebee");
        assert_eq!(session.frame_length(), 4);
        assert!(session.is_open());
    }

    #[test]
    fn test_device_failure_releases_engine() {
        let (backend, devices, log) = fixture(vec![], false, None);
        let candidate = CandidateConfig::builtin("key", "bumblebee");

        let result = BoundSession::bind(&backend, &devices, &candidate, 1);
        assert!(matches!(result, Err(AttemptError::DeviceOpenFailed(_))));
        assert_eq!(*log.lock().unwrap(), vec!["engine created", "engine released"]);
    }

    #[test]
    fn test_listen_fires_only_on_index_zero() {
        let script = vec![Ok(None), Ok(Some(1)), Ok(Some(0)), Ok(None)];
        let (backend, devices, _log) = fixture(script, true, None);
        let candidate = CandidateConfig::builtin("key", "bumblebee");
        let mut session = BoundSession::bind(&backend, &devices, &candidate, 1).unwrap();

        let events: Vec<bool> = (0..4).map(|_| session.listen()).collect();
        assert_eq!(events, vec![false, false, true, false]);
        assert_eq!(session.stats().triggers, 1);
        assert_eq!(session.stats().frames_processed, 4);
    }

    #[test]
    fn test_read_fault_is_not_a_trigger_and_session_survives() {
        let script = vec![Ok(Some(0)), Ok(Some(0))];
        let (backend, devices, _log) = fixture(script, true, Some(0));
        let candidate = CandidateConfig::builtin("key", "bumblebee");
        let mut session = BoundSession::bind(&backend, &devices, &candidate, 1).unwrap();

        assert!(!session.listen());
        assert!(session.is_open());
        assert_eq!(session.stats().consecutive_read_faults, 1);
        assert!(session.listen());
        assert_eq!(session.stats().read_faults, 1);
        assert_eq!(session.stats().consecutive_read_faults, 0);
    }

    #[test]
    fn test_engine_fault_is_not_a_trigger() {
        let (backend, devices, _log) = fixture(vec![Err(())], true, None);
        let candidate = CandidateConfig::builtin("key", "bumblebee");
        let mut session = BoundSession::bind(&backend, &devices, &candidate, 1).unwrap();

        assert!(!session.listen());
        assert_eq!(session.stats().engine_faults, 1);
    }

    #[test]
    fn test_close_is_device_first_and_idempotent() {
        let (backend, devices, log) = fixture(vec![], true, None);
        let candidate = CandidateConfig {
            access_key: "key".to_string(),
            keyword: KeywordSource::Builtin("bumblebee".to_string()),
            library_path: None,
        };
        let mut session = BoundSession::bind(&backend, &devices, &candidate, 1).unwrap();

        session.close();
        session.close();
        assert!(!session.is_open());
        assert!(!session.listen());
        drop(session);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["engine created", "device opened", "device closed", "engine released"]
        );
    }
}
