//! System-audio capture via the host's loopback path.
//!
//! [`LoopbackCapture`] records what the machine is playing (calls, meetings,
//! any application audio) rather than the microphone.  It opens the default
//! *output* device and builds an input stream on it — the WASAPI-style
//! loopback arrangement — which on gated platforms is the step that triggers
//! the system-audio / screen-recording permission prompt.  The handshake is
//! therefore bounded generously (30 s) and a timeout or an explicit denial
//! parks the source in [`CaptureState::PermissionDenied`] rather than
//! `Failed`: the user has to grant a permission, not retry the stream.
//!
//! Unlike the microphone path, the delivered format is whatever the host
//! negotiated.  Each callback block is forwarded with its format description
//! and normalized off the delivery thread by [`crate::audio::decode`]
//! (f32/i16/i32 widths, channel downmix, linear resample, clamp) before it
//! lands in the [`FloatRing`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::buffer::FloatRing;
use crate::audio::decode::{self, ChunkFormat, RawChunk, SampleLayout, SamplePayload};
use crate::audio::source::{
    publish_capturing, settle_after_capture, CaptureError, CaptureSource, CaptureState,
};
use crate::config::AudioConfig;

/// Bound on the permission-gated open handshake.
const PERMISSION_TIMEOUT: Duration = Duration::from_secs(30);
/// How long `stop` waits for the worker before abandoning it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Worker poll interval; bounds how quickly a stop request is honored.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// LoopbackCapture
// ---------------------------------------------------------------------------

/// Continuous system-audio capture into a bounded in-memory ring buffer.
///
/// Public contract is identical to [`crate::audio::MicCapture`] so callers
/// can swap sources transparently.
pub struct LoopbackCapture {
    config: AudioConfig,
    ring: Arc<FloatRing>,
    state: Arc<Mutex<CaptureState>>,
    stop_flag: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    thread: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

impl LoopbackCapture {
    /// Create an idle capture source.  No host API is touched until
    /// [`start`](CaptureSource::start).
    pub fn new(config: AudioConfig) -> Self {
        let ring = Arc::new(FloatRing::new(config.sample_rate, config.max_buffer_secs));
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

impl CaptureSource for LoopbackCapture {
    fn start(&self) -> Result<(), CaptureError> {
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
            .name("loopback-capture".into())
            .spawn(move || {
                worker_main(config, ring, state, stop_flag, ready_tx, done_tx);
            })
            .map_err(|e| CaptureError::StreamFailure(format!("spawn failed: {e}")))?;

        match ready_rx.recv_timeout(PERMISSION_TIMEOUT) {
            Ok(Ok(())) => {
                *worker_slot = Some(Worker { thread, done_rx });
                log::info!("system audio capture started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                log::warn!("system audio capture failed to start: {e}");
                Err(e)
            }
            Err(_) => {
                // Most likely an unanswered permission prompt.  Park the
                // source in PermissionDenied and abandon the worker.
                self.stop_flag.store(true, Ordering::SeqCst);
                *self.state.lock().unwrap() = CaptureState::PermissionDenied;
                log::warn!(
                    "timed out waiting for system audio access; capture disabled until permission is granted"
                );
                Err(CaptureError::Timeout(
                    "waiting for system audio access".into(),
                ))
            }
        }
    }

    fn stop(&self) {
        let worker = match self.worker.lock().unwrap().take() {
            Some(w) => w,
            None => return,
        };

        self.stop_flag.store(true, Ordering::SeqCst);

        match worker.done_rx.recv_timeout(JOIN_TIMEOUT) {
            Ok(()) => {
                let _ = worker.thread.join();
                log::info!("system audio capture stopped");
            }
            Err(_) => {
                log::warn!("loopback worker did not stop within {JOIN_TIMEOUT:?}; abandoning");
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

fn worker_main(
    config: AudioConfig,
    ring: Arc<FloatRing>,
    state: Arc<Mutex<CaptureState>>,
    stop_flag: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<Result<(), CaptureError>>,
    done_tx: mpsc::Sender<()>,
) {
    let error_flag = Arc::new(AtomicBool::new(false));
    let target_rate = config.sample_rate;

    let (stream, chunk_rx) = match build_stream(Arc::clone(&error_flag)) {
        Ok(pair) => pair,
        Err(e) => {
            if matches!(e, CaptureError::PermissionDenied(_)) {
                *state.lock().unwrap() = CaptureState::PermissionDenied;
            }
            let _ = ready_tx.send(Err(e));
            let _ = done_tx.send(());
            return;
        }
    };

    if !publish_capturing(&state, &stop_flag) {
        // start() hit the permission timeout and parked the source in
        // PermissionDenied; the late grant must not resurrect the stream.
        if let Err(e) = stream.pause() {
            log::warn!("failed to pause abandoned loopback stream: {e}");
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
            log::error!("system audio stream failed mid-capture");
            failed = true;
            break;
        }

        match chunk_rx.recv_timeout(POLL_INTERVAL) {
            Ok(raw) => {
                // Normalization runs here, never on the host's delivery
                // thread and never under the ring lock.
                let samples = decode::decode(&raw, target_rate);
                if !samples.is_empty() {
                    ring.append(samples);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("system audio stream dropped its channel");
                failed = true;
                break;
            }
        }
    }

    if let Err(e) = stream.pause() {
        log::warn!("failed to pause loopback stream: {e}");
    }
    drop(stream);

    settle_after_capture(&state, failed);
    let _ = done_tx.send(());
}

/// Open the default output device in loopback and start the stream.
///
/// The negotiated sample format decides which typed callback is installed;
/// every delivered block crosses the channel tagged with its format so the
/// worker can normalize it.
fn build_stream(
    error_flag: Arc<AtomicBool>,
) -> Result<(cpal::Stream, mpsc::Receiver<RawChunk>), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("no default output device".into()))?;

    let supported = device
        .default_output_config()
        .map_err(map_host_error)?;

    let sample_format = supported.sample_format();
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let stream_config: cpal::StreamConfig = supported.into();

    let format = ChunkFormat {
        sample_rate,
        channels,
        layout: SampleLayout::Interleaved, // cpal always delivers interleaved
    };

    let (chunk_tx, chunk_rx) = mpsc::channel::<RawChunk>();

    let err_cb = {
        let error_flag = Arc::clone(&error_flag);
        move |err: cpal::StreamError| {
            log::error!("cpal loopback stream error: {err}");
            error_flag.store(true, Ordering::SeqCst);
        }
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = chunk_tx.send(RawChunk {
                    payload: SamplePayload::F32(data.to_vec()),
                    format,
                });
            },
            err_cb,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = chunk_tx.send(RawChunk {
                    payload: SamplePayload::I16(data.to_vec()),
                    format,
                });
            },
            err_cb,
            None,
        ),
        cpal::SampleFormat::I32 => device.build_input_stream(
            &stream_config,
            move |data: &[i32], _: &cpal::InputCallbackInfo| {
                let _ = chunk_tx.send(RawChunk {
                    payload: SamplePayload::I32(data.to_vec()),
                    format,
                });
            },
            err_cb,
            None,
        ),
        other => {
            return Err(CaptureError::StreamFailure(format!(
                "unsupported loopback sample format: {other:?}"
            )))
        }
    }
    .map_err(map_build_error)?;

    stream
        .play()
        .map_err(|e| CaptureError::StreamFailure(format!("failed to start loopback stream: {e}")))?;

    Ok((stream, chunk_rx))
}

/// Map a config-query failure onto the capture taxonomy.
fn map_host_error(err: cpal::DefaultStreamConfigError) -> CaptureError {
    let msg = err.to_string();
    if is_permission_error(&msg) {
        CaptureError::PermissionDenied(msg)
    } else {
        CaptureError::DeviceUnavailable(msg)
    }
}

/// Map a stream-build failure onto the capture taxonomy.
fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    let msg = err.to_string();
    if is_permission_error(&msg) {
        CaptureError::PermissionDenied(msg)
    } else {
        CaptureError::StreamFailure(msg)
    }
}

/// Hosts report capture-permission refusals with backend-specific messages;
/// this is the best signal cpal gives us.
fn is_permission_error(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    lower.contains("permission") || lower.contains("denied") || lower.contains("not permitted")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
