/// Audio capture device seam
///
/// A capture device is an open, mono, fixed-rate input stream that hands
/// out one PCM frame per read. Dropping the device closes the stream.

use crate::audio_buffer::AudioSample;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to open input device {device}: {reason}")]
    OpenFailed { device: DeviceSelector, reason: String },

    #[error("Input device index {0} not found")]
    NotFound(usize),

    #[error("No default input device available")]
    NoDefaultDevice,

    #[error("Unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("Frame read fault: {0}")]
    ReadFault(String),

    #[error("Timed out waiting for a frame")]
    ReadTimeout,

    #[error("Input stream ended")]
    EndOfStream,
}

/// Which input device to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Device at this index in the host's input list
    Index(usize),

    /// Platform default input device
    Default,
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Index(i) => write!(f, "#{}", i),
            DeviceSelector::Default => write!(f, "default"),
        }
    }
}

/// Stream geometry requested by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub device: DeviceSelector,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_length: usize,
}

impl StreamRequest {
    /// Mono stream at the given rate and frame length
    pub fn mono(device: DeviceSelector, sample_rate: u32, frame_length: usize) -> Self {
        Self {
            device,
            sample_rate,
            channels: 1,
            frame_length,
        }
    }

    /// Real-time duration of one frame
    pub fn frame_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.frame_length as f64 / self.sample_rate.max(1) as f64)
    }
}

/// An open input stream
pub trait CaptureDevice {
    /// Block until `frame` is filled with the next samples
    fn read_frame(&mut self, frame: &mut [AudioSample]) -> Result<(), DeviceError>;
}

/// Opens capture devices
pub trait DeviceProvider {
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn CaptureDevice>, DeviceError>;
}

/// Open the preferred device, falling back once to the platform default
pub fn open_with_fallback(
    provider: &dyn DeviceProvider,
    preferred_index: usize,
    sample_rate: u32,
    frame_length: usize,
) -> Result<Box<dyn CaptureDevice>, DeviceError> {
    let request = StreamRequest::mono(DeviceSelector::Index(preferred_index), sample_rate, frame_length);

    match provider.open(&request) {
        Ok(device) => {
            debug!("Opened input device #{} ({} Hz, {} samples/frame)", preferred_index, sample_rate, frame_length);
            Ok(device)
        }
        Err(e) => {
            warn!("Input device #{} unavailable ({}), trying default device", preferred_index, e);

            let fallback = StreamRequest {
                device: DeviceSelector::Default,
                ..request
            };
            let device = provider.open(&fallback)?;
            debug!("Opened default input device");
            Ok(device)
        }
    }
}
