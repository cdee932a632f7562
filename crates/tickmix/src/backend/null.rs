//! Backend that accepts everything and plays nothing.
//!
//! The disabled-audio path: when no output device exists (CI, headless
//! servers, a player config with sound off) the engine keeps ticking
//! against this sink instead of special-casing "no audio" everywhere.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::sample::PcmSpec;

/// Discards every period it is handed; never busy.
pub struct NullBackend {
    period_frames: usize,
    writes: u64,
    bytes: u64,
    open: bool,
}

impl NullBackend {
    pub fn new(period_frames: usize) -> Self {
        Self {
            period_frames,
            writes: 0,
            bytes: 0,
            open: false,
        }
    }

    /// Periods accepted so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Total bytes discarded so far.
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes
    }
}

impl Backend for NullBackend {
    fn open(&mut self, spec: &PcmSpec) -> Result<usize> {
        self.open = true;
        Ok(spec.bytes_for_frames(self.period_frames))
    }

    fn write(&mut self, frames: &[u8]) -> Result<bool> {
        if !self.open {
            return Err(Error::Closed);
        }
        self.writes += 1;
        self.bytes += frames.len() as u64;
        Ok(true)
    }

    fn close(&mut self) {
        self.open = false;
    }
}
