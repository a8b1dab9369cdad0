/// Capture frame ring
///
/// Bounded ring of 16-bit PCM samples between the audio callback thread
/// (producer) and the detection loop (consumer). Holds a handful of frames;
/// when the consumer falls behind, the oldest samples are dropped.

use cache_padded::CachePadded;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{trace, warn};

/// Audio sample format (16-bit PCM)
pub type AudioSample = i16;

/// Sample rate most keyword engines run at
pub const SAMPLE_RATE: u32 = 16000;

/// Number of frames the ring can hold before dropping
pub const RING_FRAMES: usize = 8;

#[derive(Error, Debug)]
pub enum FrameRingError {
    #[error("Ring underflow: attempted to read {0} samples, but only {1} available")]
    Underflow(usize, usize),

    #[error("Invalid ring size: {0}")]
    InvalidSize(usize),
}

type RingBuffer = HeapRb<AudioSample>;
type RingProducer = <RingBuffer as Split>::Prod;
type RingConsumer = <RingBuffer as Split>::Cons;

/// Ring buffer for capture frames
///
/// Producer and consumer halves sit behind separate locks so the callback
/// thread only contends with the reader when it has to drop samples. Each
/// write signals `written` so a reader can block until a frame is buffered.
pub struct FrameRing {
    producer: CachePadded<Mutex<RingProducer>>,
    consumer: CachePadded<Mutex<RingConsumer>>,
    waiting: Mutex<()>,
    written: Condvar,
    frame_length: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FrameRing {
    /// Ring sized for `RING_FRAMES` frames of `frame_length` samples
    pub fn for_frames(frame_length: usize) -> Result<Self, FrameRingError> {
        if frame_length == 0 {
            return Err(FrameRingError::InvalidSize(frame_length));
        }

        let (producer, consumer) = RingBuffer::new(frame_length * RING_FRAMES).split();

        Ok(Self {
            producer: CachePadded::new(Mutex::new(producer)),
            consumer: CachePadded::new(Mutex::new(consumer)),
            waiting: Mutex::new(()),
            written: Condvar::new(),
            frame_length,
        })
    }

    /// Append samples, dropping the oldest ones if the ring is full
    ///
    /// Returns the number of samples written.
    pub fn write(&self, samples: &[AudioSample]) -> usize {
        let mut producer = lock(&self.producer);

        let capacity = producer.capacity().get();
        // Only the newest `capacity` samples can ever be kept.
        let samples = &samples[samples.len().saturating_sub(capacity)..];

        let vacant = producer.vacant_len();
        if samples.len() > vacant {
            let to_drop = samples.len() - vacant;
            lock(&self.consumer).skip(to_drop);
            warn!("Frame ring full, dropped {} oldest samples", to_drop);
        }

        let written = producer.push_slice(samples);
        drop(producer);

        // Taking `waiting` orders the notify after a reader's frame check.
        let _waiting = lock(&self.waiting);
        self.written.notify_all();
        written
    }

    /// Block until a full frame is buffered or `timeout` passes
    ///
    /// Returns whether a frame is available.
    pub fn wait_for_frame(&self, timeout: Duration) -> bool {
        let waiting = lock(&self.waiting);
        let (_waiting, result) = self
            .written
            .wait_timeout_while(waiting, timeout, |_| !self.has_frame())
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out() || self.has_frame()
    }

    /// Fill `frame` from the ring, or fail without consuming anything
    pub fn read_into(&self, frame: &mut [AudioSample]) -> Result<(), FrameRingError> {
        let mut consumer = lock(&self.consumer);
        let available = consumer.occupied_len();

        if frame.len() > available {
            return Err(FrameRingError::Underflow(frame.len(), available));
        }

        let read = consumer.pop_slice(frame);
        trace!("Read {} samples from frame ring", read);
        Ok(())
    }

    /// Whether at least one full frame is buffered
    pub fn has_frame(&self) -> bool {
        self.len() >= self.frame_length
    }

    pub fn len(&self) -> usize {
        lock(&self.consumer).occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        lock(&self.consumer).capacity().get()
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }
}

/// Convert normalized float samples to 16-bit PCM
pub fn f32_to_i16(samples: &[f32]) -> Vec<AudioSample> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as AudioSample)
        .collect()
}

/// Average interleaved `channels`-wide samples down to one channel
///
/// A trailing partial chunk is averaged over the samples it has.
pub fn downmix_to_mono(samples: &[AudioSample], channels: usize) -> Vec<AudioSample> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| i32::from(s)).sum();
            (sum / chunk.len() as i32) as AudioSample
        })
        .collect()
}

/// Convert unsigned 16-bit samples (midpoint 32768) to signed PCM
pub fn u16_to_i16(samples: &[u16]) -> Vec<AudioSample> {
    samples
        .iter()
        .map(|&s| (s as i32 - 32768) as AudioSample)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ring_creation() {
        let ring = FrameRing::for_frames(512).unwrap();
        assert_eq!(ring.capacity(), 512 * RING_FRAMES);
        assert_eq!(ring.frame_length(), 512);
        assert!(ring.is_empty());
        assert!(!ring.has_frame());
    }

    #[test]
    fn test_zero_frame_length_rejected() {
        assert!(matches!(
            FrameRing::for_frames(0),
            Err(FrameRingError::InvalidSize(0))
        ));
    }

    #[test]
    fn test_write_and_read_frame() {
        let ring = FrameRing::for_frames(4).unwrap();
        ring.write(&[1, 2, 3, 4, 5, 6]);
        assert!(ring.has_frame());

        let mut frame = [0i16; 4];
        ring.read_into(&mut frame).unwrap();
        assert_eq!(frame, [1, 2, 3, 4]);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_partial_frame_underflow_consumes_nothing() {
        let ring = FrameRing::for_frames(4).unwrap();
        ring.write(&[7, 8]);

        let mut frame = [0i16; 4];
        match ring.read_into(&mut frame) {
            Err(FrameRingError::Underflow(requested, available)) => {
                assert_eq!(requested, 4);
                assert_eq!(available, 2);
            }
            other => panic!("Expected Underflow error, got {:?}", other),
        }
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_overflow_keeps_newest_samples() {
        let ring = FrameRing::for_frames(2).unwrap();
        let capacity = ring.capacity();

        let first: Vec<i16> = vec![1; capacity];
        ring.write(&first);
        ring.write(&[2, 2]);
        assert_eq!(ring.len(), capacity);

        let mut all = vec![0i16; capacity];
        ring.read_into(&mut all).unwrap();
        assert_eq!(&all[capacity - 2..], &[2, 2]);
        assert_eq!(all[0], 1);
    }

    #[test]
    fn test_oversized_write_is_truncated_to_capacity() {
        let ring = FrameRing::for_frames(1).unwrap();
        let capacity = ring.capacity();

        let samples: Vec<i16> = (0..(capacity as i16 * 2)).collect();
        ring.write(&samples);
        assert_eq!(ring.len(), capacity);

        let mut frame = [0i16; 1];
        ring.read_into(&mut frame).unwrap();
        assert_eq!(frame[0], capacity as i16);
    }

    #[test]
    fn test_wait_for_frame_times_out_on_partial_frame() {
        let ring = FrameRing::for_frames(4).unwrap();
        ring.write(&[1, 2]);

        let started = std::time::Instant::now();
        assert!(!ring.wait_for_frame(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_wait_for_frame_wakes_on_write() {
        let ring = std::sync::Arc::new(FrameRing::for_frames(4).unwrap());
        let writer = std::sync::Arc::clone(&ring);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            writer.write(&[1, 2, 3, 4]);
        });

        assert!(ring.wait_for_frame(Duration::from_secs(5)));
        assert!(ring.has_frame());
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_frame_returns_immediately_when_buffered() {
        let ring = FrameRing::for_frames(2).unwrap();
        ring.write(&[5, 6, 7]);
        assert!(ring.wait_for_frame(Duration::ZERO));
    }

    #[test]
    fn test_downmix_to_mono() {
        assert_eq!(downmix_to_mono(&[100, 300, -50, 50, 7, 9], 2), vec![200, 0, 8]);
        assert_eq!(downmix_to_mono(&[i16::MAX, i16::MAX], 2), vec![i16::MAX]);
        assert_eq!(downmix_to_mono(&[i16::MIN, i16::MIN, i16::MIN, 0], 4), vec![-24576]);
        assert_eq!(downmix_to_mono(&[1, 2, 3], 1), vec![1, 2, 3]);
        assert_eq!(downmix_to_mono(&[10, 20, 30, 40, 50], 2), vec![15, 35, 50]);
    }

    #[test]
    fn test_sample_conversions() {
        let pcm = f32_to_i16(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(pcm[0], 0);
        assert_eq!(pcm[1], i16::MAX);
        assert_eq!(pcm[2], -i16::MAX);
        assert_eq!(pcm[3], i16::MAX);

        let half = f32_to_i16(&[0.5])[0] as f32 / i16::MAX as f32;
        assert_relative_eq!(half, 0.5, epsilon = 0.001);

        assert_eq!(u16_to_i16(&[32768, 0, 65535]), vec![0, i16::MIN, i16::MAX]);
    }
}
