//! PCM sample formats and the saturating math the mixer is built on.
//!
//! Everything in the engine moves interleaved little-endian PCM bytes:
//! `frame0[ch0], frame0[ch1], ..., frame1[ch0], ...`
//!
//! This module owns the format descriptor ([`PcmSpec`]) and the per-depth
//! byte-level operations:
//! - [`mix_into`]: element-wise saturating add (clipping clamps, never wraps)
//! - [`apply_gain`]: in-place scale with the same clamping
//! - [`sample_to_f32`]: normalization used by the live output backend

use std::fmt;

/// Bit depth of a PCM stream.
///
/// 8-bit audio is unsigned (offset-binary, silence = `0x80`); the wider
/// depths are signed little-endian (silence = `0`). 24-bit samples are
/// packed into exactly 3 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleDepth {
    U8,
    S16,
    S24,
    S32,
}

impl SampleDepth {
    /// Bytes occupied by a single sample at this depth.
    pub fn bytes(self) -> usize {
        match self {
            SampleDepth::U8 => 1,
            SampleDepth::S16 => 2,
            SampleDepth::S24 => 3,
            SampleDepth::S32 => 4,
        }
    }

    /// Bits per sample as stored in container headers.
    pub fn bits(self) -> u16 {
        match self {
            SampleDepth::U8 => 8,
            SampleDepth::S16 => 16,
            SampleDepth::S24 => 24,
            SampleDepth::S32 => 32,
        }
    }

    /// Map a container's bits-per-sample field to a depth.
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(SampleDepth::U8),
            16 => Some(SampleDepth::S16),
            24 => Some(SampleDepth::S24),
            32 => Some(SampleDepth::S32),
            _ => None,
        }
    }

    /// The byte value that encodes silence at this depth.
    pub fn silence_byte(self) -> u8 {
        match self {
            SampleDepth::U8 => 0x80,
            _ => 0,
        }
    }
}

/// Format of an interleaved PCM stream: rate, depth and channel count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmSpec {
    /// Sample rate in Hz.
    pub rate_hz: u32,
    /// Per-sample bit depth.
    pub depth: SampleDepth,
    /// Interleaved channel count (1 = mono, 2 = stereo, ...).
    pub channels: u16,
}

impl PcmSpec {
    pub fn new(rate_hz: u32, depth: SampleDepth, channels: u16) -> Self {
        Self {
            rate_hz,
            depth,
            channels,
        }
    }

    /// Bytes per single sample.
    pub fn sample_bytes(&self) -> usize {
        self.depth.bytes()
    }

    /// Bytes per frame (one sample for every channel).
    pub fn frame_bytes(&self) -> usize {
        self.depth.bytes() * self.channels as usize
    }

    /// Byte length of `frames` whole frames.
    pub fn bytes_for_frames(&self, frames: usize) -> usize {
        frames.saturating_mul(self.frame_bytes())
    }

    /// Whole frames contained in `bytes` (remainder discarded).
    pub fn frames_in(&self, bytes: usize) -> usize {
        let fb = self.frame_bytes();
        if fb == 0 { 0 } else { bytes / fb }
    }
}

impl fmt::Display for PcmSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz / {} ch / {}-bit",
            self.rate_hz,
            self.channels,
            self.depth.bits()
        )
    }
}

/// Saturating element-wise mix of `src` into `dst` at the given depth.
///
/// Both slices hold interleaved PCM; `src` may be shorter than `dst`, in
/// which case only the leading `src.len()` bytes of `dst` are touched.
/// Sums that overflow the depth's numeric range clamp to the nearest rail
/// instead of wrapping. A trailing partial sample (a slice length that is
/// not a multiple of the sample size) is left untouched rather than
/// half-mixed.
pub fn mix_into(depth: SampleDepth, dst: &mut [u8], src: &[u8]) {
    let n = depth.bytes();
    match depth {
        SampleDepth::U8 => {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                // Offset-binary: work on the signed midpoint-relative value.
                let sum = (*d as i16 - 128) + (*s as i16 - 128);
                *d = (sum.clamp(-128, 127) + 128) as u8;
            }
        }
        SampleDepth::S16 => {
            for (d, s) in dst.chunks_exact_mut(n).zip(src.chunks_exact(n)) {
                let a = i16::from_le_bytes([d[0], d[1]]) as i32;
                let b = i16::from_le_bytes([s[0], s[1]]) as i32;
                let sum = (a + b).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                d.copy_from_slice(&sum.to_le_bytes());
            }
        }
        SampleDepth::S24 => {
            for (d, s) in dst.chunks_exact_mut(n).zip(src.chunks_exact(n)) {
                let sum = (read_s24(d) + read_s24(s)).clamp(S24_MIN, S24_MAX);
                write_s24(d, sum);
            }
        }
        SampleDepth::S32 => {
            for (d, s) in dst.chunks_exact_mut(n).zip(src.chunks_exact(n)) {
                let a = i32::from_le_bytes([d[0], d[1], d[2], d[3]]) as i64;
                let b = i32::from_le_bytes([s[0], s[1], s[2], s[3]]) as i64;
                let sum = (a + b).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                d.copy_from_slice(&sum.to_le_bytes());
            }
        }
    }
}

/// Scale interleaved PCM in place, clamping at the depth's rails.
///
/// `gain == 1.0` returns without touching the buffer. Negative gains are
/// treated as zero.
pub fn apply_gain(depth: SampleDepth, buf: &mut [u8], gain: f32) {
    if gain == 1.0 {
        return;
    }
    let gain = if gain.is_finite() && gain > 0.0 { gain } else { 0.0 };
    let n = depth.bytes();
    match depth {
        SampleDepth::U8 => {
            for b in buf.iter_mut() {
                let scaled = (*b as f32 - 128.0) * gain;
                *b = (scaled.round().clamp(-128.0, 127.0) + 128.0) as u8;
            }
        }
        SampleDepth::S16 => {
            for chunk in buf.chunks_exact_mut(n) {
                let v = i16::from_le_bytes([chunk[0], chunk[1]]) as f32 * gain;
                let v = v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                chunk.copy_from_slice(&v.to_le_bytes());
            }
        }
        SampleDepth::S24 => {
            for chunk in buf.chunks_exact_mut(n) {
                let v = read_s24(chunk) as f32 * gain;
                let v = v.round().clamp(S24_MIN as f32, S24_MAX as f32) as i32;
                write_s24(chunk, v);
            }
        }
        SampleDepth::S32 => {
            for chunk in buf.chunks_exact_mut(n) {
                let v = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
                    * gain as f64;
                let v = v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                chunk.copy_from_slice(&v.to_le_bytes());
            }
        }
    }
}

/// Normalize one little-endian sample to `f32` in `[-1.0, 1.0)`.
///
/// `bytes` must hold exactly `depth.bytes()` bytes; callers walk a buffer
/// with `chunks_exact`.
pub fn sample_to_f32(depth: SampleDepth, bytes: &[u8]) -> f32 {
    match depth {
        SampleDepth::U8 => (bytes[0] as f32 - 128.0) / 128.0,
        SampleDepth::S16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32_768.0,
        SampleDepth::S24 => read_s24(bytes) as f32 / 8_388_608.0,
        SampleDepth::S32 => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0
        }
    }
}

const S24_MIN: i32 = -8_388_608;
const S24_MAX: i32 = 8_388_607;

/// Sign-extend a packed 3-byte little-endian sample.
fn read_s24(bytes: &[u8]) -> i32 {
    let raw = (bytes[0] as i32) | ((bytes[1] as i32) << 8) | ((bytes[2] as i32) << 16);
    (raw << 8) >> 8
}

fn write_s24(bytes: &mut [u8], value: i32) {
    let le = value.to_le_bytes();
    bytes[0] = le[0];
    bytes[1] = le[1];
    bytes[2] = le[2];
}
