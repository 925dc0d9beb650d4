//! STT (Speech-to-Text) engine module.
//!
//! [`SttEngine`] is the boundary the transcription loop depends on; segments
//! come back time-aligned and fully drained.  [`WhisperEngine`] is the
//! whisper.cpp-backed production implementation.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use live_context::stt::{SttEngine, TranscribeParams, WhisperEngine};
//!
//! let params = TranscribeParams::default(); // language = "en", Greedy { best_of: 1 }
//! let engine = WhisperEngine::load("models/ggml-small.bin", params)
//!     .expect("model file missing");
//!
//! // audio: 16 kHz, mono, f32 PCM from the audio module
//! let audio: Vec<f32> = vec![0.0; 16_000]; // 1 s of silence
//! let segments = engine.transcribe(&audio).unwrap();
//! for seg in segments {
//!     println!("[{}..{}ms] {}", seg.start_ms, seg.end_ms, seg.text);
//! }
//! ```

pub mod engine;
pub mod transcribe;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{SttEngine, SttError, WhisperEngine};
pub use transcribe::{SamplingStrategy, Segment, TranscribeParams, TranscriptionResult};

// test-only re-export so the context test module can import MockSttEngine
// without `use live_context::stt::engine::MockSttEngine`.
#[cfg(test)]
pub use engine::MockSttEngine;
