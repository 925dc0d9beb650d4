//! RMS energy gate.
//!
//! The transcription loop checks each window's root-mean-square amplitude
//! before invoking the STT engine.  Windows below the threshold are treated
//! as silence and skipped entirely — this is the primary cost-control
//! mechanism, and it also keeps Whisper from hallucinating text in quiet
//! rooms.

// ---------------------------------------------------------------------------
// rms
// ---------------------------------------------------------------------------

/// Root-mean-square amplitude of `samples`.  Empty input has zero energy.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_sq.sqrt()
}

// ---------------------------------------------------------------------------
// EnergyGate
// ---------------------------------------------------------------------------

/// Threshold-based speech/silence classifier.
///
/// # Example
///
/// ```rust
/// use live_context::audio::EnergyGate;
///
/// let gate = EnergyGate::new(0.003);
/// assert!(!gate.is_speech(&vec![0.0; 16_000]));
/// assert!(gate.is_speech(&vec![0.1; 16_000]));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EnergyGate {
    threshold: f32,
}

impl EnergyGate {
    /// Create a gate with the given RMS threshold.
    ///
    /// `0.003` works well for conversational audio; raise it in noisy
    /// environments.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// RMS threshold currently in use.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Returns `true` when the window's RMS is at or above the threshold.
    pub fn is_speech(&self, samples: &[f32]) -> bool {
        rms(samples) >= self.threshold
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_zero_rms() {
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn silence_has_zero_rms() {
        assert_eq!(rms(&vec![0.0; 1_000]), 0.0);
    }

    #[test]
    fn constant_signal_rms_equals_amplitude() {
        assert!((rms(&vec![0.25; 1_000]) - 0.25).abs() < 1e-6);
        assert!((rms(&vec![-0.25; 1_000]) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn sine_rms_is_amplitude_over_sqrt_two() {
        let amp = 0.5_f32;
        let signal: Vec<f32> = (0..16_000)
            .map(|i| amp * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin())
            .collect();
        let expected = amp / 2.0_f32.sqrt();
        assert!((rms(&signal) - expected).abs() < 1e-3);
    }

    #[test]
    fn gate_blocks_silence() {
        let gate = EnergyGate::new(0.003);
        assert!(!gate.is_speech(&vec![0.0; 16_000]));
        assert!(!gate.is_speech(&[]));
    }

    #[test]
    fn gate_passes_speech_level_audio() {
        let gate = EnergyGate::new(0.003);
        assert!(gate.is_speech(&vec![0.1; 16_000]));
    }

    #[test]
    fn gate_threshold_is_inclusive() {
        let gate = EnergyGate::new(0.25);
        assert!(gate.is_speech(&vec![0.25; 100]));
        assert!(!gate.is_speech(&vec![0.24; 100]));
    }
}
