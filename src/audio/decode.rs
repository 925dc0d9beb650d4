//! Format normalization for host-delivered audio chunks.
//!
//! The loopback source receives audio in whatever format the host negotiated:
//! 32-bit float, 16-bit or 32-bit integer samples, one or more channels,
//! interleaved or planar, at an arbitrary rate.  [`decode`] turns each such
//! chunk into clamped 16 kHz mono f32 samples ready for the ring buffer:
//!
//! 1. integer widths are normalized by their full-scale value,
//! 2. interleaved multi-channel is downmixed by averaging (planar
//!    multi-channel takes the first channel — a deliberate simplification),
//! 3. rates other than the target are resampled by linear interpolation,
//! 4. the result is clamped to `[-1.0, 1.0]`, since host-captured float
//!    samples can slightly exceed range.
//!
//! The microphone path never goes through here — its format is fixed at
//! the device and its int16 samples are inherently bounded.

// ---------------------------------------------------------------------------
// Chunk description
// ---------------------------------------------------------------------------

/// Channel memory layout of a delivered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// Frames of `channels` consecutive samples (`L R L R …`).
    Interleaved,
    /// All samples of channel 0, then all of channel 1, and so on.
    Planar,
}

/// Format description embedded in each delivered chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkFormat {
    /// Source sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels in the chunk.
    pub channels: u16,
    /// Channel layout.
    pub layout: SampleLayout,
}

/// Sample data in one of the formats the host can deliver.
#[derive(Debug, Clone)]
pub enum SamplePayload {
    F32(Vec<f32>),
    I16(Vec<i16>),
    I32(Vec<i32>),
}

/// One block of audio exactly as the host delivered it.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub payload: SamplePayload,
    pub format: ChunkFormat,
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// Normalize a host chunk to clamped mono f32 at `target_rate` Hz.
///
/// Returns an empty vector for empty payloads, zero channels, or a zero
/// source rate (a malformed descriptor is dropped rather than guessed at).
pub fn decode(chunk: &RawChunk, target_rate: u32) -> Vec<f32> {
    let fmt = chunk.format;
    if fmt.channels == 0 || fmt.sample_rate == 0 {
        return Vec::new();
    }

    let samples = payload_to_f32(&chunk.payload);
    if samples.is_empty() {
        return Vec::new();
    }

    let mono = match fmt.layout {
        SampleLayout::Interleaved => downmix_interleaved(&samples, fmt.channels),
        SampleLayout::Planar => first_channel_planar(&samples, fmt.channels),
    };

    let resampled = if fmt.sample_rate != target_rate {
        resample_linear(&mono, fmt.sample_rate, target_rate)
    } else {
        mono
    };

    resampled.into_iter().map(|s| s.clamp(-1.0, 1.0)).collect()
}

/// Convert the payload to f32 by dividing integer samples by full scale.
fn payload_to_f32(payload: &SamplePayload) -> Vec<f32> {
    match payload {
        SamplePayload::F32(v) => v.clone(),
        SamplePayload::I16(v) => v.iter().map(|&s| s as f32 / 32_768.0).collect(),
        SamplePayload::I32(v) => v.iter().map(|&s| s as f32 / 2_147_483_648.0).collect(),
    }
}

// ---------------------------------------------------------------------------
// Channel mixing
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging each frame.
///
/// The output length is `samples.len() / channels`; a trailing partial frame
/// is dropped.  Mono input is returned as-is (no averaging pass).
pub fn downmix_interleaved(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Take the first channel of a planar multi-channel chunk.
fn first_channel_planar(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let per_channel = samples.len() / n as usize;
            samples[..per_channel].to_vec()
        }
    }
}

// ---------------------------------------------------------------------------
// Resampling
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` to `target_rate` Hz using linear
/// interpolation.
///
/// The output length is `ceil(len * target / source)`.  Equal rates and
/// empty input are no-op fast paths.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }
    if samples.is_empty() || source_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
