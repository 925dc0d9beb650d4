//! Sliding-window transcription loop.
//!
//! [`ContextExtractor`] repeatedly pulls the most recent few seconds of
//! audio from a [`CaptureSource`], gates it on RMS energy, transcribes it,
//! and publishes the result as a labeled context string:
//!
//! ```text
//! every interval (measured from cycle start):
//!   window ── empty? ──▶ skip
//!     │
//!   RMS below threshold? ──▶ skip (engine never invoked)
//!     │
//!   transcribe ─▶ join segments ── empty? ──▶ skip (keep previous context)
//!     │
//!   publish `[YOU]: "…"` wholesale
//! ```
//!
//! The published slot always holds the result of the most recently
//! *completed* cycle.  A slow engine call simply delays the next window —
//! cycles overlap or get skipped, they are never queued, which is the
//! loop's backpressure policy.  A failed cycle is logged and the loop
//! carries on after a short backoff; nothing propagates to
//! [`get_context`](ContextExtractor::get_context) callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::{CaptureSource, EnergyGate};
use crate::config::ContextConfig;
use crate::stt::engine::MIN_AUDIO_SAMPLES;
use crate::stt::{SttEngine, SttError};

/// Sleep slice granularity; bounds how quickly a stop request is honored.
const SLEEP_SLICE: Duration = Duration::from_millis(100);
/// Pause after a failed cycle before trying again.
const ERROR_BACKOFF: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// ContextExtractor
// ---------------------------------------------------------------------------

/// Timer-driven consumer that keeps the latest transcript published.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use live_context::audio::{CaptureSource, MicCapture};
/// use live_context::config::{AudioConfig, ContextConfig};
/// use live_context::context::ContextExtractor;
/// use live_context::stt::{SttEngine, TranscribeParams, WhisperEngine};
///
/// let mic: Arc<dyn CaptureSource> = Arc::new(MicCapture::new(AudioConfig::default()));
/// mic.start().unwrap();
///
/// let engine: Arc<dyn SttEngine> =
///     Arc::new(WhisperEngine::load("models/ggml-small.bin", TranscribeParams::default()).unwrap());
///
/// let extractor = ContextExtractor::new(mic, engine, ContextConfig::default());
/// extractor.start();
/// // …
/// println!("{}", extractor.get_context());
/// extractor.stop();
/// ```
pub struct ContextExtractor {
    source: Arc<dyn CaptureSource>,
    engine: Arc<dyn SttEngine>,
    config: ContextConfig,
    gate: EnergyGate,
    /// Latest published context string; overwritten wholesale each
    /// successful cycle, empty before the first one.
    slot: Arc<Mutex<String>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    thread: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

impl ContextExtractor {
    /// Create an idle extractor over the given source and engine.
    pub fn new(
        source: Arc<dyn CaptureSource>,
        engine: Arc<dyn SttEngine>,
        config: ContextConfig,
    ) -> Self {
        let gate = EnergyGate::new(config.energy_threshold);
        Self {
            source,
            engine,
            config,
            gate,
            slot: Arc::new(Mutex::new(String::new())),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Start the background transcription thread.  No-op while running.
    pub fn start(&self) {
        let mut worker_slot = self.worker.lock().unwrap();
        if worker_slot.is_some() && self.running.load(Ordering::SeqCst) {
            log::warn!("context extractor is already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);

        let (done_tx, done_rx) = mpsc::channel::<()>();
        let source = Arc::clone(&self.source);
        let engine = Arc::clone(&self.engine);
        let config = self.config.clone();
        let gate = self.gate;
        let slot = Arc::clone(&self.slot);
        let running = Arc::clone(&self.running);

        let spawned = std::thread::Builder::new()
            .name("context-extract".into())
            .spawn(move || {
                loop_main(source, engine, config, gate, slot, running);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(thread) => {
                *worker_slot = Some(Worker { thread, done_rx });
                log::info!("context extraction started");
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                log::error!("failed to spawn context thread: {e}");
            }
        }
    }

    /// Signal the background thread to stop and wait for it (bounded).
    ///
    /// Safe to call at any time, any number of times.
    pub fn stop(&self) {
        let worker = match self.worker.lock().unwrap().take() {
            Some(w) => w,
            None => return,
        };

        self.running.store(false, Ordering::SeqCst);

        // The loop sleeps in short slices, so three intervals is plenty
        // unless a model call is wedged — in which case we abandon it.
        let wait = Duration::from_secs_f32((self.config.interval_secs * 3.0).max(1.0));
        match worker.done_rx.recv_timeout(wait) {
            Ok(()) => {
                let _ = worker.thread.join();
                log::info!("context extraction stopped");
            }
            Err(_) => {
                log::warn!("context worker did not stop within {wait:?}; abandoning");
            }
        }
    }

    /// Latest published context string, e.g. `[YOU]: "hello world"`.
    ///
    /// Non-blocking (beyond the slot lock) and thread-safe.  Returns an
    /// empty string before the first successful cycle.
    pub fn get_context(&self) -> String {
        self.slot.lock().unwrap().clone()
    }

    /// `true` while the background thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Loop internals
// ---------------------------------------------------------------------------

/// What a single cycle did; drives logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// The capture source had no audio yet.
    NoAudio,
    /// The buffer is still ramping up; less audio than the engine's minimum.
    Filling,
    /// The window's RMS was below the energy threshold.
    Silent,
    /// The engine ran but produced no text; previous context kept.
    NoText,
    /// A new context string was published.
    Published,
}

fn loop_main(
    source: Arc<dyn CaptureSource>,
    engine: Arc<dyn SttEngine>,
    config: ContextConfig,
    gate: EnergyGate,
    slot: Arc<Mutex<String>>,
    running: Arc<AtomicBool>,
) {
    let interval = Duration::from_secs_f32(config.interval_secs.max(0.0));
    log::debug!("entering context loop (interval {interval:?})");

    while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        match run_cycle(&*source, &*engine, &gate, &config, &slot) {
            Ok(CycleOutcome::Published) => {
                log::debug!("context updated");
            }
            Ok(outcome) => {
                log::trace!("cycle skipped: {outcome:?}");
            }
            Err(e) => {
                // A single bad cycle must never end the session.
                log::warn!("transcription cycle failed: {e}");
                sleep_while_running(&running, ERROR_BACKOFF);
            }
        }

        // Next cycle is due `interval` after this one *started*, so model
        // latency does not accumulate as drift.
        let deadline = cycle_start + interval;
        while running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    log::debug!("context loop exited");
}

/// One cycle: window → energy gate → transcribe → publish.
fn run_cycle(
    source: &dyn CaptureSource,
    engine: &dyn SttEngine,
    gate: &EnergyGate,
    config: &ContextConfig,
    slot: &Mutex<String>,
) -> Result<CycleOutcome, SttError> {
    let audio = source.audio_window(config.window_seconds);
    if audio.is_empty() {
        return Ok(CycleOutcome::NoAudio);
    }

    // Just-started capture: wait out the first half second instead of
    // bouncing off the engine's minimum-length guard every cycle.
    if audio.len() < MIN_AUDIO_SAMPLES {
        return Ok(CycleOutcome::Filling);
    }

    // Energy gate first — the whole point is never paying for inference
    // on silence.
    if !gate.is_speech(&audio) {
        return Ok(CycleOutcome::Silent);
    }

    let segments = engine.transcribe(&audio)?;

    let text = segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() {
        // Do not overwrite a previously good context with nothing.
        return Ok(CycleOutcome::NoText);
    }

    let labeled = format!("[{}]: \"{}\"", config.speaker_label, text);
    *slot.lock().unwrap() = labeled;

    Ok(CycleOutcome::Published)
}

/// Sleep `total` in short slices, returning early once `running` clears.
fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::CaptureError;
    use crate::stt::MockSttEngine;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Capture source whose window is whatever the test injected.
    struct StubSource {
        samples: Mutex<Vec<f32>>,
        capturing: AtomicBool,
    }

    impl StubSource {
        fn with_samples(samples: Vec<f32>) -> Self {
            Self {
                samples: Mutex::new(samples),
                capturing: AtomicBool::new(true),
            }
        }

        fn empty() -> Self {
            Self::with_samples(Vec::new())
        }
    }

    impl CaptureSource for StubSource {
        fn start(&self) -> Result<(), CaptureError> {
            self.capturing.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.capturing.store(false, Ordering::SeqCst);
        }

        fn is_capturing(&self) -> bool {
            self.capturing.load(Ordering::SeqCst)
        }

        fn audio_window(&self, _seconds: f32) -> Vec<f32> {
            self.samples.lock().unwrap().clone()
        }

        fn clear_buffer(&self) {
            self.samples.lock().unwrap().clear();
        }
    }

    /// 440 Hz sine at 16 kHz with RMS ≈ 0.1 (amplitude 0.1·√2).
    fn sine_440(seconds: f32) -> Vec<f32> {
        let amp = 0.1 * 2.0_f32.sqrt();
        let n = (16_000.0 * seconds) as usize;
        (0..n)
            .map(|i| amp * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin())
            .collect()
    }

    fn cycle_once(
        source: &dyn CaptureSource,
        engine: &dyn SttEngine,
        slot: &Mutex<String>,
    ) -> Result<CycleOutcome, SttError> {
        let config = ContextConfig::default();
        let gate = EnergyGate::new(config.energy_threshold);
        run_cycle(source, engine, &gate, &config, slot)
    }

    // -----------------------------------------------------------------------
    // Single-cycle behaviour
    // -----------------------------------------------------------------------

    /// Sine injection end to end: the window is the right size and shape,
    /// one cycle publishes the engine's text under the speaker label.
    #[test]
    fn sine_window_publishes_labeled_text() {
        let samples = sine_440(5.0);
        assert_eq!(samples.len(), 80_000);
        assert!(samples.iter().all(|&s| (-1.0..=1.0).contains(&s)));

        let source = StubSource::with_samples(samples);
        let engine = MockSttEngine::with_segments(&["hello"]);
        let slot = Mutex::new(String::new());

        let outcome = cycle_once(&source, &engine, &slot).unwrap();
        assert_eq!(outcome, CycleOutcome::Published);
        assert_eq!(slot.lock().unwrap().as_str(), "[YOU]: \"hello\"");
        assert_eq!(engine.calls(), 1);
    }

    /// Silence never reaches the engine — verified via the call counter.
    #[test]
    fn silent_window_never_invokes_engine() {
        let source = StubSource::with_samples(vec![0.0; 192_000]); // 12 s of silence
        let engine = MockSttEngine::with_segments(&["should never appear"]);
        let slot = Mutex::new(String::new());

        let outcome = cycle_once(&source, &engine, &slot).unwrap();
        assert_eq!(outcome, CycleOutcome::Silent);
        assert_eq!(engine.calls(), 0);
        assert_eq!(slot.lock().unwrap().as_str(), "");
    }

    /// Loud audio during buffer ramp-up is skipped quietly, not reported as
    /// a failure over and over until half a second has accumulated.
    #[test]
    fn ramp_up_window_skips_without_error() {
        let source = StubSource::with_samples(sine_440(0.25)); // 4 000 samples
        let engine = MockSttEngine::with_segments(&["too early"]);
        let slot = Mutex::new(String::new());

        let outcome = cycle_once(&source, &engine, &slot).unwrap();
        assert_eq!(outcome, CycleOutcome::Filling);
        assert_eq!(engine.calls(), 0);
        assert_eq!(slot.lock().unwrap().as_str(), "");
    }

    #[test]
    fn empty_window_skips_cycle() {
        let source = StubSource::empty();
        let engine = MockSttEngine::with_segments(&["x"]);
        let slot = Mutex::new(String::new());

        let outcome = cycle_once(&source, &engine, &slot).unwrap();
        assert_eq!(outcome, CycleOutcome::NoAudio);
        assert_eq!(engine.calls(), 0);
    }

    /// Whitespace-only segments must not clobber the previous context.
    #[test]
    fn empty_transcript_keeps_previous_context() {
        let source = StubSource::with_samples(sine_440(5.0));
        let engine = MockSttEngine::with_segments(&["  ", ""]);
        let slot = Mutex::new(String::from("[YOU]: \"earlier words\""));

        let outcome = cycle_once(&source, &engine, &slot).unwrap();
        assert_eq!(outcome, CycleOutcome::NoText);
        assert_eq!(slot.lock().unwrap().as_str(), "[YOU]: \"earlier words\"");
    }

    /// Segments are trimmed and space-joined into one string.
    #[test]
    fn segments_are_trimmed_and_joined() {
        let source = StubSource::with_samples(sine_440(5.0));
        let engine = MockSttEngine::with_segments(&[" we were ", "", " saying "]);
        let slot = Mutex::new(String::new());

        cycle_once(&source, &engine, &slot).unwrap();
        assert_eq!(slot.lock().unwrap().as_str(), "[YOU]: \"we were saying\"");
    }

    /// An engine failure surfaces as Err from the cycle (the loop logs it
    /// and continues) and leaves the context untouched.
    #[test]
    fn engine_failure_leaves_context_untouched() {
        let source = StubSource::with_samples(sine_440(5.0));
        let engine = MockSttEngine::err(SttError::Transcription("boom".into()));
        let slot = Mutex::new(String::from("previous"));

        let result = cycle_once(&source, &engine, &slot);
        assert!(result.is_err());
        assert_eq!(slot.lock().unwrap().as_str(), "previous");
    }

    /// The speaker label comes from configuration.
    #[test]
    fn speaker_label_is_configurable() {
        let source = StubSource::with_samples(sine_440(5.0));
        let engine = MockSttEngine::with_segments(&["offer accepted"]);
        let slot = Mutex::new(String::new());

        let config = ContextConfig {
            speaker_label: "THEM".into(),
            ..ContextConfig::default()
        };
        let gate = EnergyGate::new(config.energy_threshold);
        run_cycle(&source, &engine, &gate, &config, &slot).unwrap();

        assert_eq!(slot.lock().unwrap().as_str(), "[THEM]: \"offer accepted\"");
    }

    // -----------------------------------------------------------------------
    // Loop lifecycle
    // -----------------------------------------------------------------------

    /// Capture the loop's log output when a test runs with RUST_LOG set.
    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn fast_config() -> ContextConfig {
        ContextConfig {
            interval_secs: 0.05,
            ..ContextConfig::default()
        }
    }

    #[test]
    fn get_context_is_empty_before_first_cycle() {
        let extractor = ContextExtractor::new(
            Arc::new(StubSource::empty()),
            Arc::new(MockSttEngine::with_segments(&["x"])),
            ContextConfig::default(),
        );
        assert_eq!(extractor.get_context(), "");
        assert!(!extractor.is_running());
    }

    #[test]
    fn loop_publishes_and_stops_cleanly() {
        init_logging();
        let extractor = ContextExtractor::new(
            Arc::new(StubSource::with_samples(sine_440(5.0))),
            Arc::new(MockSttEngine::with_segments(&["hello"])),
            fast_config(),
        );

        extractor.start();
        assert!(extractor.is_running());

        // A handful of 50 ms intervals is ample for at least one cycle.
        std::thread::sleep(Duration::from_millis(400));
        assert!(extractor.get_context().contains("hello"));

        extractor.stop();
        assert!(!extractor.is_running());
        // Context survives stop (the slot is simply no longer written).
        assert!(extractor.get_context().contains("hello"));
    }

    #[test]
    fn start_twice_is_idempotent() {
        let extractor = ContextExtractor::new(
            Arc::new(StubSource::empty()),
            Arc::new(MockSttEngine::with_segments(&["x"])),
            fast_config(),
        );

        extractor.start();
        extractor.start(); // no second worker, no panic
        assert!(extractor.is_running());
        extractor.stop();
    }

    #[test]
    fn stop_before_start_and_double_stop_are_noops() {
        let extractor = ContextExtractor::new(
            Arc::new(StubSource::empty()),
            Arc::new(MockSttEngine::with_segments(&["x"])),
            fast_config(),
        );

        extractor.stop();
        extractor.start();
        extractor.stop();
        extractor.stop();
        assert!(!extractor.is_running());
    }

    /// A persistently failing engine must not kill the loop.
    #[test]
    fn loop_survives_engine_failures() {
        init_logging();
        let extractor = ContextExtractor::new(
            Arc::new(StubSource::with_samples(sine_440(5.0))),
            Arc::new(MockSttEngine::err(SttError::Transcription("boom".into()))),
            fast_config(),
        );

        extractor.start();
        std::thread::sleep(Duration::from_millis(300));
        // Still running, context still empty, no panic anywhere.
        assert!(extractor.is_running());
        assert_eq!(extractor.get_context(), "");
        extractor.stop();
    }
}
