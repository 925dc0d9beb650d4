//! Microphone capture via `cpal`.
//!
//! [`MicCapture`] opens the default input device at a fixed Whisper-friendly
//! format (16 kHz, mono, 16-bit signed PCM, 1024-frame blocks) and streams
//! raw PCM chunks into an internal [`PcmRing`].
//!
//! `cpal::Stream` is not `Send`, so the stream is built and owned by the
//! worker thread: the cpal callback forwards each delivered block over an
//! mpsc channel and the worker appends it to the ring until told to stop.
//! [`MicCapture::start`] blocks on a handshake with the worker so open
//! failures surface synchronously to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::buffer::PcmRing;
use crate::audio::source::{
    publish_capturing, settle_after_capture, CaptureError, CaptureSource, CaptureState,
};
use crate::config::AudioConfig;

/// How long `start` waits for the worker to open the device.
const START_TIMEOUT: Duration = Duration::from_secs(10);
/// How long `stop` waits for the worker to wind down before abandoning it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Worker poll interval; bounds how quickly a stop request is honored.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// MicCapture
// ---------------------------------------------------------------------------

/// Continuous microphone capture into a bounded in-memory ring buffer.
///
/// # Example
///
/// ```rust,no_run
/// use live_context::audio::{CaptureSource, MicCapture};
/// use live_context::config::AudioConfig;
///
/// let mic = MicCapture::new(AudioConfig::default());
/// mic.start().unwrap();
/// let last_five = mic.audio_window(5.0); // mono f32 in [-1, 1]
/// mic.stop();
/// # let _ = last_five;
/// ```
pub struct MicCapture {
    config: AudioConfig,
    ring: Arc<PcmRing>,
    state: Arc<Mutex<CaptureState>>,
    stop_flag: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    thread: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

impl MicCapture {
    /// Create an idle capture source.  No device is touched until
    /// [`start`](CaptureSource::start).
    pub fn new(config: AudioConfig) -> Self {
        let ring = Arc::new(PcmRing::new(
            config.sample_rate,
            config.chunk_frames,
            config.max_buffer_secs,
        ));
        Self {
            config,
            ring,
            state: Arc::new(Mutex::new(CaptureState::Idle)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CaptureState {
        *self.state.lock().unwrap()
    }
}

impl CaptureSource for MicCapture {
    fn start(&self) -> Result<(), CaptureError> {
        // Serializes concurrent starts and makes idempotence trivial.
        let mut worker_slot = self.worker.lock().unwrap();
        if worker_slot.is_some() && self.state().is_capturing() {
            return Ok(());
        }

        self.stop_flag.store(false, Ordering::SeqCst);

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let config = self.config.clone();
        let ring = Arc::clone(&self.ring);
        let state = Arc::clone(&self.state);
        let stop_flag = Arc::clone(&self.stop_flag);

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                worker_main(config, ring, state, stop_flag, ready_tx, done_tx);
            })
            .map_err(|e| CaptureError::StreamFailure(format!("spawn failed: {e}")))?;

        match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(())) => {
                *worker_slot = Some(Worker { thread, done_rx });
                log::info!("microphone capture started");
                Ok(())
            }
            Ok(Err(e)) => {
                // Worker has already released everything; reap it quickly.
                let _ = thread.join();
                log::warn!("microphone capture failed to start: {e}");
                Err(e)
            }
            Err(_) => {
                // Worker is wedged inside the host API — abandon it.
                self.stop_flag.store(true, Ordering::SeqCst);
                log::warn!("timed out opening microphone stream");
                Err(CaptureError::Timeout("opening microphone stream".into()))
            }
        }
    }

    fn stop(&self) {
        let worker = match self.worker.lock().unwrap().take() {
            Some(w) => w,
            None => return, // never started, or already stopped
        };

        self.stop_flag.store(true, Ordering::SeqCst);

        match worker.done_rx.recv_timeout(JOIN_TIMEOUT) {
            Ok(()) => {
                let _ = worker.thread.join();
                log::info!("microphone capture stopped");
            }
            Err(_) => {
                // Wedged device read; abandon the thread rather than hang.
                log::warn!("microphone worker did not stop within {JOIN_TIMEOUT:?}; abandoning");
            }
        }
    }

    fn is_capturing(&self) -> bool {
        self.state().is_capturing()
    }

    fn audio_window(&self, seconds: f32) -> Vec<f32> {
        self.ring.window(seconds)
    }

    fn clear_buffer(&self) {
        self.ring.clear();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Worker thread body: build the stream, pump chunks into the ring, tear
/// everything down on exit.
fn worker_main(
    config: AudioConfig,
    ring: Arc<PcmRing>,
    state: Arc<Mutex<CaptureState>>,
    stop_flag: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<Result<(), CaptureError>>,
    done_tx: mpsc::Sender<()>,
) {
    let error_flag = Arc::new(AtomicBool::new(false));

    let (stream, chunk_rx) = match build_stream(&config, Arc::clone(&error_flag)) {
        Ok(pair) => pair,
        Err(e) => {
            // Whatever was allocated is dropped before reporting the error;
            // state stays Idle so a later start can retry.
            let _ = ready_tx.send(Err(e));
            let _ = done_tx.send(());
            return;
        }
    };

    if !publish_capturing(&state, &stop_flag) {
        // start() timed out and moved on while the device was opening; tear
        // down quietly without touching the state it settled on.
        if let Err(e) = stream.pause() {
            log::warn!("failed to pause abandoned microphone stream: {e}");
        }
        drop(stream);
        let _ = done_tx.send(());
        return;
    }
    let _ = ready_tx.send(Ok(()));

    let mut failed = false;
    loop {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }
        if error_flag.load(Ordering::SeqCst) {
            log::error!("microphone stream failed mid-capture");
            failed = true;
            break;
        }

        match chunk_rx.recv_timeout(POLL_INTERVAL) {
            Ok(bytes) => ring.append(bytes),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("microphone stream dropped its channel");
                failed = true;
                break;
            }
        }
    }

    // Teardown order: stop stream, then drop stream (closes it), then drop
    // the device handle it captured.  Each step is best-effort.
    if let Err(e) = stream.pause() {
        log::warn!("failed to pause microphone stream: {e}");
    }
    drop(stream);

    settle_after_capture(&state, failed);
    let _ = done_tx.send(());
}

/// Open the default input device at the fixed capture format and start the
/// stream.  The returned receiver yields raw little-endian i16 PCM chunks.
fn build_stream(
    config: &AudioConfig,
    error_flag: Arc<AtomicBool>,
) -> Result<(cpal::Stream, mpsc::Receiver<Vec<u8>>), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into()))?;

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.chunk_frames),
    };

    let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>();

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let bytes: Vec<u8> = data.iter().flat_map(|s| s.to_le_bytes()).collect();
                // Ignore send errors; the worker may already be gone.
                let _ = chunk_tx.send(bytes);
            },
            move |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
                error_flag.store(true, Ordering::SeqCst);
            },
            None, // no timeout
        )
        .map_err(|e| CaptureError::StreamFailure(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| CaptureError::StreamFailure(format!("failed to start input stream: {e}")))?;

    Ok((stream, chunk_rx))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // Hardware-dependent paths (start against a real device) are exercised
    // manually; these cover the contract that must hold without a device.

    #[test]
    fn new_source_is_idle_and_empty() {
        let mic = MicCapture::new(AudioConfig::default());
        assert_eq!(mic.state(), CaptureState::Idle);
        assert!(!mic.is_capturing());
        assert!(mic.audio_window(5.0).is_empty());
    }

    #[test]
    fn stop_before_start_is_a_noop() {
        let mic = MicCapture::new(AudioConfig::default());
        mic.stop();
        mic.stop(); // and twice in a row
        assert_eq!(mic.state(), CaptureState::Idle);
    }

    #[test]
    fn clear_buffer_on_idle_source() {
        let mic = MicCapture::new(AudioConfig::default());
        mic.clear_buffer();
        assert!(mic.audio_window(1.0).is_empty());
    }

    #[test]
    fn mic_capture_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MicCapture>();
    }
}
