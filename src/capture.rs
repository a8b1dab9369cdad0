/// Concrete capture devices
///
/// `CpalDeviceProvider` opens live microphones through cpal; the stream
/// callback writes into a `FrameRing` and reads block until a full frame is
/// buffered. `WavReplayProvider` serves frames from a WAV file so the
/// detector can be exercised against recordings.

use crate::audio_buffer::{downmix_to_mono, f32_to_i16, u16_to_i16, AudioSample, FrameRing};
use crate::device::{CaptureDevice, DeviceError, DeviceProvider, DeviceSelector, StreamRequest};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Opens microphones on the default cpal host
pub struct CpalDeviceProvider {
    host: cpal::Host,
}

impl CpalDeviceProvider {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn select(&self, selector: DeviceSelector) -> Result<cpal::Device, DeviceError> {
        match selector {
            DeviceSelector::Index(index) => self
                .host
                .input_devices()
                .map_err(|e| DeviceError::OpenFailed {
                    device: selector,
                    reason: e.to_string(),
                })?
                .nth(index)
                .ok_or(DeviceError::NotFound(index)),
            DeviceSelector::Default => self
                .host
                .default_input_device()
                .ok_or(DeviceError::NoDefaultDevice),
        }
    }
}

impl Default for CpalDeviceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProvider for CpalDeviceProvider {
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        let device = self.select(request.device)?;
        let capture = CpalCapture::open(&device, request)?;
        Ok(Box::new(capture))
    }
}

/// Live microphone stream
pub struct CpalCapture {
    // Dropping the stream stops the callback.
    _stream: Stream,
    ring: Arc<FrameRing>,
    faulted: Arc<AtomicBool>,
    read_timeout: Duration,
}

impl CpalCapture {
    fn open(device: &cpal::Device, request: &StreamRequest) -> Result<Self, DeviceError> {
        let open_failed = |reason: String| DeviceError::OpenFailed {
            device: request.device,
            reason,
        };

        let rate = SampleRate(request.sample_rate);
        let configs: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| open_failed(e.to_string()))?
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .collect();
        let supported = select_input_config(&configs, request.channels)
            .ok_or_else(|| {
                DeviceError::UnsupportedFormat(format!(
                    "no input config at {} Hz",
                    request.sample_rate
                ))
            })?
            .with_sample_rate(rate);

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let channels = usize::from(config.channels);

        let ring = Arc::new(
            FrameRing::for_frames(request.frame_length)
                .map_err(|e| open_failed(e.to_string()))?,
        );
        let faulted = Arc::new(AtomicBool::new(false));

        let fault_flag = Arc::clone(&faulted);
        let on_error = move |err: cpal::StreamError| {
            error!("Audio capture error: {}", err);
            fault_flag.store(true, Ordering::Release);
        };

        let writer = Arc::clone(&ring);
        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    writer.write(&downmix_to_mono(data, channels));
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    writer.write(&downmix_to_mono(&f32_to_i16(data), channels));
                },
                on_error,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    writer.write(&downmix_to_mono(&u16_to_i16(data), channels));
                },
                on_error,
                None,
            ),
            other => return Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
        }
        .map_err(|e| open_failed(e.to_string()))?;

        stream.play().map_err(|e| open_failed(e.to_string()))?;

        info!(
            "Capture stream open on {} ({}, {} Hz, {} ch {:?})",
            device.name().unwrap_or_default(),
            request.device,
            request.sample_rate,
            channels,
            sample_format
        );

        Ok(Self {
            _stream: stream,
            ring,
            faulted,
            read_timeout: request.frame_duration(),
        })
    }
}

impl CaptureDevice for CpalCapture {
    fn read_frame(&mut self, frame: &mut [AudioSample]) -> Result<(), DeviceError> {
        if self.faulted.swap(false, Ordering::AcqRel) {
            return Err(DeviceError::ReadFault("stream reported an error".to_string()));
        }

        if !self.ring.wait_for_frame(self.read_timeout) {
            return Err(DeviceError::ReadTimeout);
        }

        self.ring
            .read_into(frame)
            .map_err(|e| DeviceError::ReadFault(e.to_string()))
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        debug!("Closing capture stream");
    }
}

/// Pick the input config to capture from
///
/// Prefers an exact channel match; otherwise takes the narrowest config,
/// whose frames are downmixed to mono in the stream callback. Among equal
/// channel counts the first sample format cpal can deliver wins.
fn select_input_config(
    configs: &[SupportedStreamConfigRange],
    channels: u16,
) -> Option<SupportedStreamConfigRange> {
    let deliverable = |c: &&SupportedStreamConfigRange| {
        matches!(
            c.sample_format(),
            SampleFormat::I16 | SampleFormat::F32 | SampleFormat::U16
        )
    };

    configs
        .iter()
        .filter(deliverable)
        .find(|c| c.channels() == channels)
        .or_else(|| {
            configs
                .iter()
                .filter(deliverable)
                .filter(|c| c.channels() > 0)
                .min_by_key(|c| c.channels())
        })
        .cloned()
}

/// Serves frames from a mono 16-bit WAV file
pub struct WavReplayProvider {
    path: PathBuf,
}

impl WavReplayProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DeviceProvider for WavReplayProvider {
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        let open_failed = |reason: String| DeviceError::OpenFailed {
            device: request.device,
            reason,
        };

        let reader = hound::WavReader::open(&self.path).map_err(|e| open_failed(e.to_string()))?;
        let spec = reader.spec();

        if spec.channels != request.channels
            || spec.sample_rate != request.sample_rate
            || spec.bits_per_sample != 16
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(DeviceError::UnsupportedFormat(format!(
                "{} is {} ch / {} Hz / {}-bit, need {} ch / {} Hz / 16-bit",
                self.path.display(),
                spec.channels,
                spec.sample_rate,
                spec.bits_per_sample,
                request.channels,
                request.sample_rate
            )));
        }

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| open_failed(e.to_string()))?;

        info!("Replaying {} ({} samples)", self.path.display(), samples.len());

        Ok(Box::new(WavReplay { samples, position: 0 }))
    }
}

/// Frames from a decoded WAV file; ends when the file runs out
pub struct WavReplay {
    samples: Vec<AudioSample>,
    position: usize,
}

impl CaptureDevice for WavReplay {
    fn read_frame(&mut self, frame: &mut [AudioSample]) -> Result<(), DeviceError> {
        let end = self.position + frame.len();
        if end > self.samples.len() {
            return Err(DeviceError::EndOfStream);
        }

        frame.copy_from_slice(&self.samples[self.position..end]);
        self.position = end;
        Ok(())
    }
}
