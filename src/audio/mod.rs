//! Audio capture pipeline — two sources, one buffer contract.
//!
//! ```text
//! Microphone ─▶ cpal i16 callback ─▶ raw PCM chunks (mpsc) ─▶ PcmRing
//! System out ─▶ cpal loopback cb  ─▶ RawChunk (mpsc) ─▶ decode ─▶ FloatRing
//! ```
//!
//! Both [`MicCapture`] and [`LoopbackCapture`] implement [`CaptureSource`],
//! holding roughly the last 30 seconds of audio in memory and serving
//! normalized mono f32 windows to the transcription loop.  [`EnergyGate`]
//! decides whether a window is worth transcribing at all.

pub mod buffer;
pub mod capture;
pub mod decode;
pub mod energy;
pub mod loopback;
pub mod source;
pub mod vad;

pub use buffer::{FloatRing, PcmRing};
pub use capture::MicCapture;
pub use decode::{downmix_interleaved, resample_linear, ChunkFormat, RawChunk, SampleLayout, SamplePayload};
pub use energy::{rms, EnergyGate};
pub use loopback::LoopbackCapture;
pub use source::{CaptureError, CaptureSource, CaptureState};
pub use vad::VadDetector;
