//! Voice-activity trimming for engine input.
//!
//! The energy gate decides whether a window is worth transcribing at all;
//! [`VadDetector`] then cuts the silent lead-in and tail-out off the windows
//! that pass, so Whisper spends its time on speech and has less quiet audio
//! to hallucinate text into.
//!
//! Audio is scored in 30 ms frames (480 samples at 16 kHz) against an RMS
//! threshold; the clip is trimmed to the span between the first and last
//! voiced frame.

use crate::audio::energy::rms;

/// 30 ms at the 16 kHz engine rate.
const FRAME_SAMPLES: usize = 480;

// ---------------------------------------------------------------------------
// VadDetector
// ---------------------------------------------------------------------------

/// Frame-based silence trimmer applied before inference.
///
/// # Example
///
/// ```rust
/// use live_context::audio::VadDetector;
///
/// let vad = VadDetector::new(0.01);
///
/// let mut audio = vec![0.0_f32; 480];     // 30 ms of silence
/// audio.extend(vec![0.5_f32; 480]);       // 30 ms of speech
/// audio.extend(vec![0.0_f32; 480]);       // 30 ms of silence
///
/// assert_eq!(vad.trim_silence(&audio).len(), 480);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct VadDetector {
    /// Frames with RMS at or below this are treated as silence.
    threshold: f32,
}

impl VadDetector {
    /// Create a detector with the given per-frame RMS threshold.
    ///
    /// `0.01` suits quiet rooms; raise it in noisy environments.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// RMS threshold currently in use.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn is_voiced(&self, frame: &[f32]) -> bool {
        rms(frame) > self.threshold
    }

    /// Trim leading and trailing silence from `audio`.
    ///
    /// Returns a sub-slice of the input (no allocation), empty when the
    /// whole clip is silent.  Trim boundaries are frame-aligned, so up to
    /// 30 ms of silence can remain on either side.
    pub fn trim_silence<'a>(&self, audio: &'a [f32]) -> &'a [f32] {
        if audio.is_empty() {
            return audio;
        }

        let frames = (audio.len() + FRAME_SAMPLES - 1) / FRAME_SAMPLES;
        let frame = |i: usize| {
            let s = i * FRAME_SAMPLES;
            let e = ((i + 1) * FRAME_SAMPLES).min(audio.len());
            &audio[s..e]
        };

        let first = match (0..frames).find(|&i| self.is_voiced(frame(i))) {
            Some(f) => f,
            None => return &audio[0..0],
        };
        let last = (0..frames)
            .rfind(|&i| self.is_voiced(frame(i)))
            .unwrap_or(first);

        let start = first * FRAME_SAMPLES;
        let end = ((last + 1) * FRAME_SAMPLES).min(audio.len());
        &audio[start..end]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(lead: usize, voiced: usize, tail: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; lead];
        v.extend(vec![0.5_f32; voiced]);
        v.extend(vec![0.0_f32; tail]);
        v
    }

    #[test]
    fn trims_leading_and_trailing_silence() {
        let vad = VadDetector::new(0.01);
        let audio = signal(FRAME_SAMPLES, FRAME_SAMPLES, FRAME_SAMPLES);
        assert_eq!(vad.trim_silence(&audio).len(), FRAME_SAMPLES);
    }

    #[test]
    fn all_silence_trims_to_empty() {
        let vad = VadDetector::new(0.01);
        let audio = vec![0.0_f32; FRAME_SAMPLES * 3];
        assert!(vad.trim_silence(&audio).is_empty());
    }

    #[test]
    fn all_voice_is_untouched() {
        let vad = VadDetector::new(0.01);
        let audio = vec![0.5_f32; FRAME_SAMPLES * 2];
        assert_eq!(vad.trim_silence(&audio).len(), audio.len());
    }

    #[test]
    fn empty_input_stays_empty() {
        let vad = VadDetector::new(0.01);
        assert!(vad.trim_silence(&[]).is_empty());
    }

    #[test]
    fn interior_silence_is_preserved() {
        // speech – pause – speech: the pause between voiced frames stays.
        let vad = VadDetector::new(0.01);
        let mut audio = signal(FRAME_SAMPLES, FRAME_SAMPLES, 0);
        audio.extend(vec![0.0_f32; FRAME_SAMPLES]);
        audio.extend(vec![0.5_f32; FRAME_SAMPLES]);
        audio.extend(vec![0.0_f32; FRAME_SAMPLES]);
        assert_eq!(vad.trim_silence(&audio).len(), FRAME_SAMPLES * 3);
    }

    #[test]
    fn partial_last_frame_is_handled() {
        // Length not divisible by the frame size; voiced audio runs to the end.
        let vad = VadDetector::new(0.01);
        let audio = signal(FRAME_SAMPLES, FRAME_SAMPLES + 100, 0);
        assert_eq!(vad.trim_silence(&audio).len(), FRAME_SAMPLES + 100);
    }

    #[test]
    fn threshold_getter() {
        assert!((VadDetector::new(0.05).threshold() - 0.05).abs() < 1e-7);
    }
}
