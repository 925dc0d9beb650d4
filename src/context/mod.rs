//! Live conversation context.
//!
//! Sits on top of [`crate::audio`] and [`crate::stt`]: a background loop
//! re-transcribes the trailing window of captured audio on a fixed cadence
//! and keeps the latest labeled transcript available to readers.

pub mod extractor;

pub use extractor::ContextExtractor;
