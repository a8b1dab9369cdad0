/// Kiosk assistant wake-word service
///
/// Acquires a wake word session, then polls the detector until Ctrl+C.
/// Set `WAKEWORD_REPLAY_WAV` to run against a recording instead of a
/// microphone.

use anyhow::Context;
use kiosk_wakeword::{
    CpalDeviceProvider, DetectorConfig, DeviceProvider, EngineBackend, WakeWordDetector,
    WavReplayProvider,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

const ENV_REPLAY_WAV: &str = "WAKEWORD_REPLAY_WAV";

/// Consecutive read faults after which a finished replay stops the loop
const REPLAY_END_FAULTS: u64 = 3;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kiosk_wakeword=debug".parse().unwrap()),
        )
        .init();

    info!("Starting kiosk wake-word service");

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Kiosk wake-word service stopped");
}

async fn run() -> anyhow::Result<()> {
    let config = DetectorConfig::load().context("Failed to load configuration")?;
    let replay = std::env::var(ENV_REPLAY_WAV).ok();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_on_signal = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stopping...");
            stop_on_signal.store(true, Ordering::Release);
        }
    });

    // Capture streams are not Send on every platform, so the detector is
    // built and driven entirely on the blocking thread.
    tokio::task::spawn_blocking(move || poll_loop(config, replay, &stop))
        .await
        .context("Detection loop panicked")?
}

fn poll_loop(config: DetectorConfig, replay: Option<String>, stop: &AtomicBool) -> anyhow::Result<()> {
    let backend = engine_backend()?;
    let devices: Box<dyn DeviceProvider> = match &replay {
        Some(path) => {
            info!("Replaying audio from {}", path);
            Box::new(WavReplayProvider::new(path))
        }
        None => Box::new(CpalDeviceProvider::new()),
    };

    let mut detector = WakeWordDetector::new(config, backend, devices);
    detector.list_wake_words();
    detector.acquire().context("No wake word engine could be acquired")?;

    let wake_word = detector.active_keyword().unwrap_or_default().to_string();
    info!("System ready - say '{}' to start (Ctrl+C to exit)", wake_word);

    while !stop.load(Ordering::Acquire) {
        if detector.listen() {
            info!("Wake word '{}' detected", wake_word);
        }

        if replay.is_some() && detector.stats().consecutive_read_faults >= REPLAY_END_FAULTS {
            info!("Replay finished");
            break;
        }
    }

    let stats = detector.stats();
    info!(
        "Processed {} frames, {} read faults, detected {} wake words",
        stats.frames_processed, stats.read_faults, stats.wake_words_detected
    );
    if stats.engine_faults > 0 {
        warn!("{} frames failed inside the engine", stats.engine_faults);
    }

    detector.cleanup();
    Ok(())
}

#[cfg(feature = "porcupine")]
fn engine_backend() -> anyhow::Result<Box<dyn EngineBackend>> {
    Ok(Box::new(kiosk_wakeword::PorcupineBackend))
}

#[cfg(not(feature = "porcupine"))]
fn engine_backend() -> anyhow::Result<Box<dyn EngineBackend>> {
    anyhow::bail!("Built without a keyword engine; rebuild with `--features porcupine`")
}
