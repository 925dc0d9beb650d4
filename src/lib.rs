//! live-context — continuous in-memory audio capture and transcription.
//!
//! Captures live audio (microphone or system loopback) into a bounded
//! in-memory ring buffer and periodically transcribes the most recent few
//! seconds with Whisper, gated by an RMS energy check so silence never
//! reaches the model.  The latest transcript is published as a labeled
//! context string that downstream consumers poll.
//!
//! Nothing is ever written to disk: audio lives only in the ring buffer and
//! transcripts only in the published context slot.
//!
//! # Architecture
//!
//! ```text
//! Microphone ──▶ MicCapture ───▶ PcmRing   ─┐
//!                                           ├─▶ ContextExtractor ─▶ get_context()
//! System out ──▶ LoopbackCapture ─▶ FloatRing ┘        │
//!                                              SttEngine (Whisper)
//! ```
//!
//! Both capture sources implement [`audio::CaptureSource`], so the extractor
//! is agnostic about where the audio comes from.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use live_context::audio::{CaptureSource, MicCapture};
//! use live_context::config::{AppConfig, AppPaths};
//! use live_context::context::ContextExtractor;
//! use live_context::stt::{SttEngine, TranscribeParams, WhisperEngine};
//!
//! let config = AppConfig::load().unwrap();
//! let paths = AppPaths::new();
//!
//! let mic = Arc::new(MicCapture::new(config.audio.clone()));
//! mic.start().unwrap();
//!
//! let model = paths.model_file(&config.stt.model);
//! let engine: Arc<dyn SttEngine> =
//!     Arc::new(WhisperEngine::load(model, TranscribeParams::default()).unwrap());
//!
//! let extractor = ContextExtractor::new(mic.clone(), engine, config.context.clone());
//! extractor.start();
//!
//! // ... later, from any thread:
//! println!("{}", extractor.get_context()); // e.g. `[YOU]: "hello world"`
//!
//! extractor.stop();
//! mic.stop();
//! ```

pub mod audio;
pub mod config;
pub mod context;
pub mod stt;
