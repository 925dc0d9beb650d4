//! Capture source contract shared by both audio paths.
//!
//! [`CaptureSource`] is the interface the transcription loop consumes.  It is
//! object-safe and `Send + Sync` so a source can sit behind an
//! `Arc<dyn CaptureSource>` and be polled from the loop thread while its own
//! worker thread keeps appending audio.
//!
//! [`CaptureState`] is the little state machine every source runs:
//!
//! ```text
//! Idle ──start ok──▶ Capturing ──stop──▶ Idle
//!      ──start err─▶ Idle (mic) / PermissionDenied (loopback, denial/timeout)
//! Capturing ──device error──▶ Failed
//! ```
//!
//! `PermissionDenied` and `Failed` are terminal until a fresh `start` is
//! attempted; nothing auto-retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use thiserror::Error;

// ---------------------------------------------------------------------------
// CaptureState
// ---------------------------------------------------------------------------

/// Lifecycle state of a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No capture running.  Initial state; also the state after a clean stop.
    Idle,

    /// The worker thread is running and audio is flowing into the ring buffer.
    Capturing,

    /// The host denied access to the audio content (or the permission
    /// handshake timed out).  The remedy is an OS permission grant, not a
    /// retry, which is why this is distinct from [`Failed`](Self::Failed).
    PermissionDenied,

    /// The stream died mid-capture (device unplugged, host error).
    Failed,
}

impl CaptureState {
    /// Returns `true` while audio is actively being captured.
    pub fn is_capturing(&self) -> bool {
        matches!(self, CaptureState::Capturing)
    }

    /// A short human-readable label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Capturing => "capturing",
            CaptureState::PermissionDenied => "permission denied",
            CaptureState::Failed => "failed",
        }
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        CaptureState::Idle
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors surfaced by [`CaptureSource::start`].
///
/// Mid-capture failures are *not* reported through this type: the worker
/// thread handles them locally and flips the source to
/// [`CaptureState::Failed`], observable via [`CaptureSource::is_capturing`].
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// No suitable audio device exists on the host.
    #[error("no audio device available: {0}")]
    DeviceUnavailable(String),

    /// The host refused access to the audio content.
    #[error("audio capture permission denied: {0}")]
    PermissionDenied(String),

    /// The stream could not be opened or started.
    #[error("audio stream failure: {0}")]
    StreamFailure(String),

    /// A bounded wait on the host elapsed (permission prompt or stream
    /// startup never completed).
    #[error("timed out {0}")]
    Timeout(String),
}

// ---------------------------------------------------------------------------
// CaptureSource
// ---------------------------------------------------------------------------

/// Common contract of the microphone and system-loopback sources.
///
/// The two implementations differ in how audio arrives (blocking device
/// reads vs. host-pushed callbacks) but expose an identical shape so the
/// transcription loop can swap sources transparently.
pub trait CaptureSource: Send + Sync {
    /// Begin capturing into the internal ring buffer.
    ///
    /// Idempotent: a no-op `Ok(())` while already capturing.  On failure the
    /// source holds no device resources and the error says what went wrong.
    fn start(&self) -> Result<(), CaptureError>;

    /// Stop capturing and release device resources.
    ///
    /// Safe to call at any time, any number of times, including before
    /// `start` ever succeeded.  Never blocks indefinitely: the worker join
    /// is timeout-bounded and the thread is abandoned if it is wedged.
    fn stop(&self);

    /// `true` while audio is actively flowing into the buffer.
    fn is_capturing(&self) -> bool;

    /// The most recent `seconds` of audio as normalized mono f32 samples.
    ///
    /// Returns an empty vector when nothing has been captured (or, for the
    /// loopback source, when permission was denied).
    fn audio_window(&self, seconds: f32) -> Vec<f32>;

    /// Discard all buffered audio.
    fn clear_buffer(&self);
}

// Compile-time assertion: Arc<dyn CaptureSource> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: std::sync::Arc<dyn CaptureSource>) {}
};

// ---------------------------------------------------------------------------
// Worker state transitions
// ---------------------------------------------------------------------------

/// Publish `Capturing`, unless the owner has already given up on this worker.
///
/// `start` may time out and park the source in a terminal state (e.g.
/// `PermissionDenied`) while the worker is still wedged inside the host API;
/// such an abandoned worker must not clobber that state when it finally
/// comes back.  The stop flag is checked under the state lock, the same lock
/// the abandoning `start` writes under, so the two cannot interleave.
///
/// Returns `false` when the worker was abandoned and must exit without
/// touching the state again.
pub(crate) fn publish_capturing(state: &Mutex<CaptureState>, stop_flag: &AtomicBool) -> bool {
    let mut st = state.lock().unwrap();
    if stop_flag.load(Ordering::SeqCst) {
        return false;
    }
    *st = CaptureState::Capturing;
    true
}

/// Settle the final state on worker exit: `Failed` after a mid-capture
/// error, `Idle` after a clean stop — but only if the state is still the
/// `Capturing` this worker published.  Anything else was written by the
/// owner after abandoning the worker and must persist.
pub(crate) fn settle_after_capture(state: &Mutex<CaptureState>, failed: bool) {
    let mut st = state.lock().unwrap();
    if *st == CaptureState::Capturing {
        *st = if failed {
            CaptureState::Failed
        } else {
            CaptureState::Idle
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(CaptureState::default(), CaptureState::Idle);
    }

    #[test]
    fn only_capturing_reports_capturing() {
        assert!(CaptureState::Capturing.is_capturing());
        assert!(!CaptureState::Idle.is_capturing());
        assert!(!CaptureState::PermissionDenied.is_capturing());
        assert!(!CaptureState::Failed.is_capturing());
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(CaptureState::Idle.label(), "idle");
        assert_eq!(CaptureState::Capturing.label(), "capturing");
        assert_eq!(CaptureState::PermissionDenied.label(), "permission denied");
        assert_eq!(CaptureState::Failed.label(), "failed");
    }

    #[test]
    fn abandoned_worker_cannot_publish_capturing() {
        let state = Mutex::new(CaptureState::PermissionDenied);
        let stop_flag = AtomicBool::new(true); // owner gave up and set this
        assert!(!publish_capturing(&state, &stop_flag));
        assert_eq!(*state.lock().unwrap(), CaptureState::PermissionDenied);
    }

    #[test]
    fn live_worker_publishes_capturing() {
        let state = Mutex::new(CaptureState::Idle);
        let stop_flag = AtomicBool::new(false);
        assert!(publish_capturing(&state, &stop_flag));
        assert_eq!(*state.lock().unwrap(), CaptureState::Capturing);
    }

    #[test]
    fn settle_transitions_only_from_capturing() {
        let state = Mutex::new(CaptureState::Capturing);
        settle_after_capture(&state, false);
        assert_eq!(*state.lock().unwrap(), CaptureState::Idle);

        let state = Mutex::new(CaptureState::Capturing);
        settle_after_capture(&state, true);
        assert_eq!(*state.lock().unwrap(), CaptureState::Failed);

        // A terminal state written by the owner survives a late worker exit.
        let state = Mutex::new(CaptureState::PermissionDenied);
        settle_after_capture(&state, false);
        assert_eq!(*state.lock().unwrap(), CaptureState::PermissionDenied);
    }

    #[test]
    fn capture_error_display() {
        let e = CaptureError::DeviceUnavailable("no default input".into());
        assert!(e.to_string().contains("no default input"));

        let e = CaptureError::Timeout("waiting for permission".into());
        assert!(e.to_string().contains("timed out"));
    }
}
