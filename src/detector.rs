/// Wake-word detector
///
/// Owns the engine backend, the device provider and at most one bound
/// session. Acquisition happens once at startup; afterwards the caller polls
/// `listen` from its own loop and calls `cleanup` when it is done.

use crate::config::DetectorConfig;
use crate::device::DeviceProvider;
use crate::engine::{list_wake_words, EngineBackend};
use crate::session::{BoundSession, SessionStats};
use crate::strategy::{AcquisitionError, AcquisitionStrategy};
use tracing::{debug, info};

/// Detector statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub frames_processed: u64,
    pub read_faults: u64,
    pub consecutive_read_faults: u64,
    pub engine_faults: u64,
    pub wake_words_detected: u64,
    pub is_bound: bool,
}

/// Main wake-word detector
pub struct WakeWordDetector {
    config: DetectorConfig,
    backend: Box<dyn EngineBackend>,
    devices: Box<dyn DeviceProvider>,
    session: Option<BoundSession>,
}

impl WakeWordDetector {
    /// Create a detector; nothing is opened until `acquire`
    pub fn new(
        config: DetectorConfig,
        backend: Box<dyn EngineBackend>,
        devices: Box<dyn DeviceProvider>,
    ) -> Self {
        info!("Initializing wake-word detector");
        info!("Wake word: {}", config.wake_word);
        info!(
            "Architecture: {}, API-only: {}",
            config.profile.arch.name(),
            config.profile.api_only
        );

        Self {
            config,
            backend,
            devices,
            session: None,
        }
    }

    /// Labels the backend can build directly
    pub fn list_wake_words(&self) -> Vec<String> {
        list_wake_words(self.backend.as_ref())
    }

    /// Bind a session for the configured wake word
    ///
    /// Fails with `AlreadyBound` if a session is live; call `cleanup` first.
    pub fn acquire(&mut self) -> Result<(), AcquisitionError> {
        if self.session.is_some() {
            return Err(AcquisitionError::AlreadyBound);
        }

        let strategy = AcquisitionStrategy::new(
            self.backend.as_ref(),
            self.devices.as_ref(),
            self.config.access_key.as_str(),
        )
        .with_policy(self.config.retry);

        let session = strategy.acquire(&self.config.profile, &self.config.wake_word)?;
        info!("Listening for '{}'", session.active_keyword());
        self.session = Some(session);
        Ok(())
    }

    /// One detection step; false when no session is bound
    pub fn listen(&mut self) -> bool {
        self.session.as_mut().map_or(false, BoundSession::listen)
    }

    /// Label of the keyword the bound session listens for
    pub fn active_keyword(&self) -> Option<&str> {
        self.session.as_ref().map(BoundSession::active_keyword)
    }

    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }

    /// Close the device, release the engine and forget the session
    ///
    /// Safe to call before `acquire` and safe to call repeatedly.
    pub fn cleanup(&mut self) {
        match self.session.take() {
            Some(mut session) => {
                session.close();
                info!("Wake-word detector cleaned up");
            }
            None => debug!("Cleanup requested with no bound session"),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Get current statistics
    pub fn stats(&self) -> DetectorStats {
        let session = self.session.as_ref().map(BoundSession::stats).unwrap_or(SessionStats::default());

        DetectorStats {
            frames_processed: session.frames_processed,
            read_faults: session.read_faults,
            consecutive_read_faults: session.consecutive_read_faults,
            engine_faults: session.engine_faults,
            wake_words_detected: session.triggers,
            is_bound: self.session.is_some(),
        }
    }
}

impl Drop for WakeWordDetector {
    fn drop(&mut self) {
        self.cleanup();
    }
}
