//! Thread-safe bounded ring buffers for recent audio history.
//!
//! Two variants back the two capture sources:
//!
//! * [`PcmRing`] — stores raw 16-bit signed PCM byte chunks as delivered by
//!   the microphone.  Byte→float conversion is deferred to [`PcmRing::window`]
//!   so the capture path never pays for it.
//! * [`FloatRing`] — stores already-normalized `f32` chunks from the system
//!   loopback source.  Chunk sizes there are irregular, so capacity is
//!   tracked by a running sample count rather than a chunk count.
//!
//! Both buffers own their lock and expose only synchronized operations; a
//! producer appends while a consumer snapshots windows, and neither ever
//! sees a partially written chunk.  When the configured duration cap is
//! exceeded the oldest chunks are evicted first (FIFO).

use std::collections::VecDeque;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// PcmRing
// ---------------------------------------------------------------------------

/// Bounded ring buffer of raw i16 PCM byte chunks (microphone path).
///
/// Capacity is enforced by total buffered bytes, not chunk count: the host
/// may deliver blocks larger or smaller than the requested `chunk_frames`,
/// and the duration cap has to hold for whatever sizes actually arrive.
/// `chunk_frames` only sizes the deque preallocation for the nominal case.
///
/// # Example
///
/// ```rust
/// use live_context::audio::PcmRing;
///
/// let ring = PcmRing::new(16_000, 4, 30.0); // 4-frame chunks, 30 s cap
/// ring.append(vec![0x00, 0x40, 0x00, 0x40, 0x00, 0x40, 0x00, 0x40]); // 4 × 0.5
/// let window = ring.window(1.0);
/// assert_eq!(window.len(), 4);
/// assert!((window[0] - 0.5).abs() < 1e-3);
/// ```
pub struct PcmRing {
    inner: Mutex<PcmInner>,
    sample_rate: u32,
    max_seconds: f32,
    /// Byte capacity: `floor(sample_rate * max_seconds)` samples × 2.
    max_bytes: usize,
}

struct PcmInner {
    chunks: VecDeque<Vec<u8>>,
    /// Total buffered bytes across all chunks (2 bytes per sample).
    total_bytes: usize,
}

impl PcmRing {
    /// Create a ring that holds `max_seconds` of `sample_rate` Hz mono audio,
    /// nominally delivered in blocks of `chunk_frames` samples.
    ///
    /// # Panics
    ///
    /// Panics if `sample_rate`, `chunk_frames` or `max_seconds` is zero.
    pub fn new(sample_rate: u32, chunk_frames: u32, max_seconds: f32) -> Self {
        assert!(sample_rate > 0, "sample_rate must be > 0");
        assert!(chunk_frames > 0, "chunk_frames must be > 0");
        assert!(max_seconds > 0.0, "max_seconds must be > 0");

        let max_samples = (sample_rate as f32 * max_seconds) as usize;
        let nominal_chunks =
            (sample_rate as f32 / chunk_frames as f32 * max_seconds) as usize + 1;

        Self {
            inner: Mutex::new(PcmInner {
                chunks: VecDeque::with_capacity(nominal_chunks),
                total_bytes: 0,
            }),
            sample_rate,
            max_seconds,
            max_bytes: max_samples * 2,
        }
    }

    /// Append one raw PCM chunk, evicting the oldest chunks while the total
    /// buffered bytes exceed the capacity.
    ///
    /// Eviction is whole-chunk: the total may land just under the cap after
    /// an oversized chunk is dropped, but it never stays above it.  A single
    /// chunk larger than the whole capacity is truncated to its tail.
    pub fn append(&self, mut chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        if chunk.len() > self.max_bytes {
            let excess = chunk.len() - self.max_bytes;
            chunk.drain(..excess);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.total_bytes += chunk.len();
        inner.chunks.push_back(chunk);

        while inner.total_bytes > self.max_bytes {
            match inner.chunks.pop_front() {
                Some(old) => inner.total_bytes -= old.len(),
                None => break,
            }
        }
    }

    /// Return the most recent `seconds` of audio as normalized mono f32.
    ///
    /// `seconds` is clamped to the buffer cap.  Returns an empty vector when
    /// `seconds <= 0` or no audio has been captured yet; returns fewer than
    /// `floor(seconds * rate)` samples while the buffer is still ramping up
    /// (never pads with silence).
    ///
    /// The raw bytes are snapshotted under the lock; the int16→float
    /// conversion (`s / 32768.0`, inherently in [-1, 1]) runs outside it.
    pub fn window(&self, seconds: f32) -> Vec<f32> {
        let seconds = seconds.min(self.max_seconds);
        if seconds <= 0.0 {
            return Vec::new();
        }

        let max_samples = (self.sample_rate as f32 * seconds) as usize;
        let wanted_bytes = max_samples * 2;

        // Snapshot the tail chunks under the lock.
        let raw: Vec<u8> = {
            let inner = self.inner.lock().unwrap();
            if inner.chunks.is_empty() {
                return Vec::new();
            }

            // Walk back until we have enough bytes, then copy front-to-back.
            let mut start = inner.chunks.len();
            let mut bytes = 0usize;
            while start > 0 && bytes < wanted_bytes {
                start -= 1;
                bytes += inner.chunks[start].len();
            }

            let mut raw = Vec::with_capacity(bytes);
            for chunk in inner.chunks.iter().skip(start) {
                raw.extend_from_slice(chunk);
            }
            raw
        };

        // Convert outside the lock.  A trailing odd byte (torn sample) is
        // dropped rather than misinterpreted.
        let sample_count = raw.len() / 2;
        let mut samples: Vec<f32> = Vec::with_capacity(sample_count);
        for pair in raw.chunks_exact(2) {
            let s = i16::from_le_bytes([pair[0], pair[1]]);
            samples.push(s as f32 / 32768.0);
        }

        // Trim to exactly the requested number of samples, from the end.
        if samples.len() > max_samples {
            samples.drain(..samples.len() - max_samples);
        }
        samples
    }

    /// Discard all buffered audio.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.chunks.clear();
        inner.total_bytes = 0;
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().total_bytes / 2
    }

    /// Returns `true` when no audio is buffered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().total_bytes == 0
    }

    /// Buffered audio duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// FloatRing
// ---------------------------------------------------------------------------

/// Bounded ring buffer of normalized `f32` chunks (system-loopback path).
///
/// Incoming chunk sizes vary with the host's delivery cadence, so capacity
/// is enforced by a running sample count: on append, whole chunks are
/// evicted from the front while the total exceeds `sample_rate * max_seconds`.
pub struct FloatRing {
    inner: Mutex<FloatInner>,
    sample_rate: u32,
    max_samples: usize,
    max_seconds: f32,
}

struct FloatInner {
    chunks: VecDeque<Vec<f32>>,
    total_samples: usize,
}

impl FloatRing {
    /// Create a ring that holds `max_seconds` of `sample_rate` Hz mono audio.
    ///
    /// # Panics
    ///
    /// Panics if `sample_rate` or `max_seconds` is zero.
    pub fn new(sample_rate: u32, max_seconds: f32) -> Self {
        assert!(sample_rate > 0, "sample_rate must be > 0");
        assert!(max_seconds > 0.0, "max_seconds must be > 0");

        Self {
            inner: Mutex::new(FloatInner {
                chunks: VecDeque::new(),
                total_samples: 0,
            }),
            sample_rate,
            max_samples: (sample_rate as f32 * max_seconds) as usize,
            max_seconds,
        }
    }

    /// Append one chunk of normalized samples, evicting the oldest chunks
    /// while the running total exceeds the capacity.  A single chunk larger
    /// than the whole capacity is truncated to its tail.
    pub fn append(&self, mut chunk: Vec<f32>) {
        if chunk.is_empty() {
            return;
        }
        if chunk.len() > self.max_samples {
            let excess = chunk.len() - self.max_samples;
            chunk.drain(..excess);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.total_samples += chunk.len();
        inner.chunks.push_back(chunk);

        while inner.total_samples > self.max_samples {
            match inner.chunks.pop_front() {
                Some(old) => inner.total_samples -= old.len(),
                None => break,
            }
        }
    }

    /// Return the most recent `seconds` of audio.
    ///
    /// Same contract as [`PcmRing::window`]: clamped to the cap, empty for
    /// `seconds <= 0` or an empty buffer, at most `floor(seconds * rate)`
    /// samples and fewer during ramp-up.
    pub fn window(&self, seconds: f32) -> Vec<f32> {
        let seconds = seconds.min(self.max_seconds);
        if seconds <= 0.0 {
            return Vec::new();
        }

        let wanted = (self.sample_rate as f32 * seconds) as usize;

        let inner = self.inner.lock().unwrap();
        if inner.chunks.is_empty() {
            return Vec::new();
        }

        // Walk back until enough samples are covered, then snapshot-copy.
        let mut start = inner.chunks.len();
        let mut covered = 0usize;
        while start > 0 && covered < wanted {
            start -= 1;
            covered += inner.chunks[start].len();
        }

        let mut samples = Vec::with_capacity(covered);
        for chunk in inner.chunks.iter().skip(start) {
            samples.extend_from_slice(chunk);
        }
        drop(inner);

        if samples.len() > wanted {
            samples.drain(..samples.len() - wanted);
        }
        samples
    }

    /// Discard all buffered audio.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.chunks.clear();
        inner.total_samples = 0;
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().total_samples
    }

    /// Returns `true` when no audio is buffered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().total_samples == 0
    }

    /// Buffered audio duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode i16 samples as little-endian PCM bytes.
    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    // ---- PcmRing -----------------------------------------------------------

    #[test]
    fn pcm_empty_window_is_empty() {
        let ring = PcmRing::new(16_000, 1024, 30.0);
        assert!(ring.window(5.0).is_empty());
        assert!(ring.is_empty());
    }

    #[test]
    fn pcm_zero_and_negative_seconds_return_empty() {
        let ring = PcmRing::new(16_000, 4, 30.0);
        ring.append(pcm_bytes(&[100, 200, 300, 400]));
        assert!(ring.window(0.0).is_empty());
        assert!(ring.window(-1.0).is_empty());
    }

    #[test]
    fn pcm_conversion_divides_by_32768() {
        let ring = PcmRing::new(16_000, 4, 30.0);
        ring.append(pcm_bytes(&[16_384, -16_384, 32_767, -32_768]));
        let w = ring.window(1.0);
        assert_eq!(w.len(), 4);
        assert!((w[0] - 0.5).abs() < 1e-6);
        assert!((w[1] + 0.5).abs() < 1e-6);
        assert!(w[2] < 1.0 && w[2] > 0.999);
        assert!((w[3] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn pcm_window_returns_requested_tail() {
        // 1 s of ramp; ask for the last 0.5 s.
        let rate = 1_000;
        let ring = PcmRing::new(rate, 100, 30.0);
        for block in 0..10 {
            let samples: Vec<i16> = (0..100).map(|i| (block * 100 + i) as i16).collect();
            ring.append(pcm_bytes(&samples));
        }
        let w = ring.window(0.5);
        assert_eq!(w.len(), 500);
        // First returned sample must be sample index 500.
        assert!((w[0] - 500.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn pcm_ramp_up_returns_less_than_requested() {
        let ring = PcmRing::new(16_000, 1024, 30.0);
        ring.append(pcm_bytes(&vec![0i16; 1024])); // 64 ms of audio
        let w = ring.window(5.0);
        assert_eq!(w.len(), 1024); // no padding
    }

    #[test]
    fn pcm_duration_never_exceeds_cap() {
        // 1 s cap, nominal 100-sample chunks at 1 kHz.
        let ring = PcmRing::new(1_000, 100, 1.0);
        for _ in 0..50 {
            ring.append(pcm_bytes(&vec![1i16; 100]));
        }
        assert!(ring.len() <= 1_000);
        assert!(ring.duration_secs() <= 1.0 + 1e-6);
    }

    #[test]
    fn pcm_cap_holds_for_host_sized_chunks() {
        // The host is free to deliver blocks far larger than the requested
        // chunk size; the duration cap must hold regardless.
        let ring = PcmRing::new(1_000, 100, 1.0);
        for _ in 0..11 {
            ring.append(pcm_bytes(&vec![1i16; 1_000])); // 10× the nominal chunk
        }
        assert!(ring.len() <= 1_000, "buffered {} samples", ring.len());
        assert!(ring.duration_secs() <= 1.0 + 1e-6);
    }

    #[test]
    fn pcm_oversized_chunk_keeps_tail() {
        // One chunk longer than the whole buffer: keep its most recent part.
        let ring = PcmRing::new(1_000, 100, 1.0);
        let samples: Vec<i16> = (0..3_000).map(|i| (i % 1_000) as i16).collect();
        ring.append(pcm_bytes(&samples));
        assert_eq!(ring.len(), 1_000);
        let w = ring.window(1.0);
        assert_eq!(w.len(), 1_000);
        // Tail sample survives; the head was truncated away.
        assert!((w[999] - 999.0 / 32768.0).abs() < 1e-6);
        assert!((w[0] - 0.0).abs() < 1e-6); // sample index 2000 → 2000 % 1000
    }

    #[test]
    fn pcm_seconds_clamped_to_cap() {
        let ring = PcmRing::new(1_000, 100, 2.0);
        for _ in 0..30 {
            ring.append(pcm_bytes(&vec![1i16; 100]));
        }
        // Requesting far more than the cap returns at most cap seconds.
        let w = ring.window(100.0);
        assert_eq!(w.len(), 2_000);
    }

    #[test]
    fn pcm_evicts_oldest_first() {
        let ring = PcmRing::new(1_000, 100, 1.0); // 1 000-sample cap
        for block in 0..20i16 {
            ring.append(pcm_bytes(&vec![block; 100]));
        }
        let w = ring.window(1.0);
        // Early blocks were evicted; FIFO order kept across the window.
        assert_eq!(w.len(), 1_000);
        assert!((w[0] - 10.0 / 32768.0).abs() < 1e-6);
        assert!((w[w.len() - 1] - 19.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn pcm_clear_empties_buffer() {
        let ring = PcmRing::new(16_000, 4, 30.0);
        ring.append(pcm_bytes(&[1, 2, 3, 4]));
        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.window(1.0).is_empty());

        // Usable again after clear.
        ring.append(pcm_bytes(&[5, 6, 7, 8]));
        assert_eq!(ring.window(1.0).len(), 4);
    }

    #[test]
    #[should_panic(expected = "max_seconds must be > 0")]
    fn pcm_zero_cap_panics() {
        let _ = PcmRing::new(16_000, 1024, 0.0);
    }

    // ---- FloatRing ---------------------------------------------------------

    #[test]
    fn float_empty_window_is_empty() {
        let ring = FloatRing::new(16_000, 30.0);
        assert!(ring.window(5.0).is_empty());
        assert!(ring.window(0.0).is_empty());
        assert!(ring.window(-3.0).is_empty());
    }

    #[test]
    fn float_window_returns_tail_in_order() {
        let ring = FloatRing::new(1_000, 30.0);
        ring.append((0..500).map(|i| i as f32).collect());
        ring.append((500..1000).map(|i| i as f32).collect());

        let w = ring.window(0.25);
        assert_eq!(w.len(), 250);
        assert_eq!(w[0], 750.0);
        assert_eq!(w[249], 999.0);
    }

    #[test]
    fn float_total_never_exceeds_cap_by_more_than_a_chunk() {
        let ring = FloatRing::new(1_000, 1.0);
        for _ in 0..100 {
            ring.append(vec![0.1; 333]); // irregular chunk size
        }
        // Whole-chunk eviction may leave the total just under the cap.
        assert!(ring.len() <= 1_000);
    }

    #[test]
    fn float_oversized_chunk_keeps_tail() {
        let ring = FloatRing::new(1_000, 1.0);
        let chunk: Vec<f32> = (0..2_500).map(|i| i as f32).collect();
        ring.append(chunk);
        assert_eq!(ring.len(), 1_000);
        let w = ring.window(1.0);
        assert_eq!(w[0], 1_500.0);
        assert_eq!(w[999], 2_499.0);
    }

    #[test]
    fn float_eviction_drops_oldest_chunks() {
        let ring = FloatRing::new(1_000, 1.0);
        ring.append(vec![1.0; 600]);
        ring.append(vec![2.0; 600]); // total 1200 > 1000 → first chunk evicted
        let w = ring.window(1.0);
        assert_eq!(w.len(), 600);
        assert!(w.iter().all(|&s| s == 2.0));
    }

    #[test]
    fn float_ramp_up_returns_available() {
        let ring = FloatRing::new(16_000, 30.0);
        ring.append(vec![0.0; 4_000]); // 0.25 s
        assert_eq!(ring.window(12.0).len(), 4_000);
    }

    #[test]
    fn float_clear_empties_buffer() {
        let ring = FloatRing::new(16_000, 30.0);
        ring.append(vec![0.5; 1_000]);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.duration_secs(), 0.0);
    }

    #[test]
    fn float_duration_secs() {
        let ring = FloatRing::new(16_000, 30.0);
        ring.append(vec![0.0; 8_000]);
        assert!((ring.duration_secs() - 0.5).abs() < 1e-6);
    }

    // ---- Cross-thread use --------------------------------------------------

    #[test]
    fn rings_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PcmRing>();
        assert_send_sync::<FloatRing>();
    }

    #[test]
    fn concurrent_append_and_window() {
        use std::sync::Arc;

        let ring = Arc::new(FloatRing::new(16_000, 2.0));
        let writer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    ring.append(vec![0.25; 512]);
                }
            })
        };

        for _ in 0..50 {
            let w = ring.window(1.0);
            assert!(w.len() <= 16_000);
            assert!(w.iter().all(|&s| s == 0.25));
        }
        writer.join().unwrap();
    }
}
