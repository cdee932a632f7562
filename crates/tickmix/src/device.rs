//! Mix-ahead PCM device.
//!
//! A [`PcmDevice`] owns one period worth of staging buffer in front of a
//! [`Backend`]. Sources mix into the staging buffer during a tick and a
//! single [`flush`](PcmDevice::flush) hands the period to the backend.
//! When the backend is busy the period is held, further mixing is
//! refused, and the same bytes are offered again on the next flush.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::sample::{mix_into, PcmSpec};

pub struct PcmDevice<B: Backend> {
    backend: B,
    spec: PcmSpec,
    buffer: Vec<u8>,
    fill: usize,
    flushed: bool,
    open: bool,
}

impl<B: Backend> PcmDevice<B> {
    /// Open `backend` for `spec` and size the staging buffer to the
    /// period the backend reports.
    pub fn open(mut backend: B, spec: PcmSpec) -> Result<Self> {
        let capacity = backend.open(&spec)?;
        if capacity == 0 || capacity % spec.frame_bytes() != 0 {
            backend.close();
            return Err(Error::Backend(format!(
                "backend period of {capacity} bytes is not frame aligned for {spec}"
            )));
        }
        Ok(Self {
            backend,
            spec,
            buffer: vec![spec.depth.silence_byte(); capacity],
            fill: 0,
            flushed: true,
            open: true,
        })
    }

    pub fn spec(&self) -> PcmSpec {
        self.spec
    }

    /// Staging capacity in bytes, always a whole number of frames.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes staged since the last accepted flush.
    pub fn fill(&self) -> usize {
        self.fill
    }

    /// `false` while a completed period is waiting for the backend.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Mix `frames` into the front of the staging buffer.
    ///
    /// Returns `false` without touching the buffer when the device is
    /// closed, when the previous period has not been flushed yet, or
    /// when `frames` does not fit in one period.
    pub fn mix(&mut self, frames: &[u8]) -> bool {
        if !self.open || !self.flushed {
            return false;
        }
        if frames.len() > self.buffer.len() {
            tracing::warn!(
                got = frames.len(),
                capacity = self.buffer.len(),
                "mix larger than one period refused"
            );
            return false;
        }
        mix_into(self.spec.depth, &mut self.buffer[..frames.len()], frames);
        self.fill = self.fill.max(frames.len());
        true
    }

    /// Replace the staged period with `frames` instead of mixing.
    ///
    /// Same guards as [`mix`](Self::mix); a shorter `frames` silences
    /// the staged bytes beyond its end.
    pub fn overwrite(&mut self, frames: &[u8]) -> bool {
        if !self.open || !self.flushed {
            return false;
        }
        if frames.len() > self.buffer.len() {
            tracing::warn!(
                got = frames.len(),
                capacity = self.buffer.len(),
                "overwrite larger than one period refused"
            );
            return false;
        }
        if self.fill > frames.len() {
            let silence = self.spec.depth.silence_byte();
            for b in &mut self.buffer[frames.len()..self.fill] {
                *b = silence;
            }
        }
        self.buffer[..frames.len()].copy_from_slice(frames);
        self.fill = frames.len();
        true
    }

    /// Offer the staged period to the backend.
    ///
    /// `Ok(true)` means the period was accepted (or there was nothing
    /// to write) and the buffer is silent again. `Ok(false)` means the
    /// backend was busy; the period is held and the device stays
    /// unflushed until a later flush succeeds.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.open {
            return Err(Error::Closed);
        }
        if self.fill == 0 {
            return Ok(true);
        }
        let accepted = self.backend.write(&self.buffer[..self.fill])?;
        if accepted {
            let silence = self.spec.depth.silence_byte();
            for b in &mut self.buffer[..self.fill] {
                *b = silence;
            }
            self.fill = 0;
            self.flushed = true;
        } else {
            self.flushed = false;
            tracing::trace!(held = self.fill, "output busy, holding period");
        }
        Ok(accepted)
    }

    pub fn pause(&mut self, paused: bool) -> Result<()> {
        if !self.open {
            return Err(Error::Closed);
        }
        self.backend.pause(paused)
    }

    /// Drain queued audio and release the backend. Safe to call twice.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.backend.drain() {
            tracing::warn!("drain failed on close: {e}");
        }
        self.backend.close();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: Backend> Drop for PcmDevice<B> {
    fn drop(&mut self) {
        self.close();
    }
}
