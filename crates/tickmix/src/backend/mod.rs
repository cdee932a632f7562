//! Output seam between the mixer and whatever consumes audio.
//!
//! The engine is written against [`Backend`] so the same tick loop can
//! feed a live output stream, a WAV file, or nothing at all. Hosts and
//! tests plug in their own implementations the same way.

pub mod cpal;
pub mod null;
pub mod wav_sink;

pub use self::cpal::{CpalBackend, output_device_names};
pub use null::NullBackend;
pub use wav_sink::WavSinkBackend;

use crate::error::Result;
use crate::sample::PcmSpec;

/// A sink for mixed PCM periods.
///
/// `write` must never block: either the whole slice is accepted
/// (`Ok(true)`) or the backend is currently busy (`Ok(false)`) and the
/// caller retries the same bytes next tick. Partial writes are not part
/// of the contract.
pub trait Backend {
    /// Negotiate an output stream for `spec`.
    ///
    /// Returns the period capacity in bytes, which becomes the size of
    /// the device mix buffer. Fails when the exact rate or channel
    /// count cannot be honored; the engine never resamples.
    fn open(&mut self, spec: &PcmSpec) -> Result<usize>;

    /// Hand one mixed period to the backend without blocking.
    fn write(&mut self, frames: &[u8]) -> Result<bool>;

    /// Suspend or resume output. Optional; the default does nothing.
    fn pause(&mut self, paused: bool) -> Result<()> {
        let _ = paused;
        Ok(())
    }

    /// Wait (bounded) for accepted audio to reach its destination.
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }

    /// Tear the stream down. Idempotent.
    fn close(&mut self) {}
}
