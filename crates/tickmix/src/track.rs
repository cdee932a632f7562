//! A single playing source.
//!
//! Tracks run one decode ahead of the output: the period mixed into the
//! device on a tick was decoded on the previous tick. On a busy tick
//! (device still holding an unflushed period) the track does nothing at
//! all, so the codec never advances past audio that has not been heard.
//!
//! Looping splices at the decode stage. When the codec runs dry mid
//! period and passes remain, the codec is rewound and the same period
//! keeps filling, so iteration boundaries are gapless and torn frames
//! only appear at the natural end of the last pass.

use std::fmt;

use crate::backend::Backend;
use crate::codec::Codec;
use crate::device::PcmDevice;
use crate::error::Result;
use crate::sample::{apply_gain, PcmSpec};

/// Repeat forever when passed as the iteration count.
pub const LOOP_FOREVER: i32 = -1;

pub struct Track {
    codec: Box<dyn Codec>,
    frame: Vec<u8>,
    filled: usize,
    iterations: i32,
    gain: f32,
}

impl Track {
    pub fn new(codec: Box<dyn Codec>) -> Self {
        Self {
            codec,
            frame: Vec::new(),
            filled: 0,
            iterations: 0,
            gain: 1.0,
        }
    }

    pub fn spec(&self) -> PcmSpec {
        self.codec.spec()
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Takes effect from the next decoded period.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Passes left to play. `-1` is forever, `0` is stopped; a pending
    /// final period may still go out after this reaches `0`.
    pub fn iterations(&self) -> i32 {
        self.iterations
    }

    pub fn is_active(&self) -> bool {
        self.iterations != 0 || self.filled > 0
    }

    /// Size the staging period. Called when the track is attached to a
    /// device; a track that was never attached refuses to play.
    pub(crate) fn size_frame(&mut self, bytes: usize) {
        self.frame = vec![self.codec.spec().depth.silence_byte(); bytes];
        self.filled = 0;
    }

    /// Start playback from the top of the source.
    ///
    /// `iterations` of `0` is a stop request and returns `false`, as
    /// does a source that yields no audio at all. On success the first
    /// period is already decoded and waiting for the next tick.
    pub fn play(&mut self, iterations: i32, gain: f32) -> bool {
        if iterations == 0 {
            self.stop(true);
            return false;
        }
        if self.frame.is_empty() {
            tracing::warn!("track is not attached to a device, refusing to play");
            return false;
        }
        if let Err(e) = self.codec.reset() {
            tracing::warn!("rewind failed: {e}");
            return false;
        }
        self.iterations = iterations;
        self.gain = gain;
        self.filled = 0;
        if let Err(e) = self.decode_next() {
            tracing::warn!("decode failed at start of playback: {e}");
            self.iterations = 0;
            self.filled = 0;
            return false;
        }
        if self.filled == 0 {
            self.iterations = 0;
            return false;
        }
        true
    }

    /// Run one tick against `device`.
    ///
    /// Submits the staged period (overwriting instead of mixing when
    /// `exclusive`) and decodes the next one. Returns whether audio was
    /// submitted this tick; a busy device skips the tick entirely.
    pub fn update<B: Backend>(
        &mut self,
        device: &mut PcmDevice<B>,
        exclusive: bool,
    ) -> Result<bool> {
        if self.iterations == 0 && self.filled == 0 {
            return Ok(false);
        }
        if !device.is_flushed() {
            return Ok(false);
        }
        let submitted = if exclusive {
            device.overwrite(&self.frame[..self.filled])
        } else {
            device.mix(&self.frame[..self.filled])
        };
        if !submitted {
            return Ok(false);
        }
        if self.iterations == 0 {
            // Final partial period just went out.
            self.filled = 0;
        } else {
            self.decode_next()?;
        }
        Ok(true)
    }

    /// Stop playback. A graceful stop lets the current pass run to its
    /// natural end; a forced stop also drops the staged period.
    pub fn stop(&mut self, force: bool) {
        if force {
            self.iterations = 0;
            self.filled = 0;
        } else if self.iterations != 0 {
            self.iterations = 1;
        }
    }

    /// Restart the current pass from the top of the source. Iterations
    /// are unchanged; a track with no passes left is not revived.
    pub fn rewind(&mut self) -> Result<()> {
        if self.iterations == 0 {
            return Ok(());
        }
        self.codec.reset()?;
        self.decode_next()
    }

    /// Fill the staging period from the codec, rewinding across
    /// iteration boundaries so loops splice without a gap.
    fn decode_next(&mut self) -> Result<()> {
        self.filled = 0;
        if self.iterations == 0 {
            return Ok(());
        }
        let mut dry_reads = 0u8;
        while self.filled < self.frame.len() {
            let got = self.codec.read(&mut self.frame[self.filled..])?;
            if got > 0 {
                self.filled += got;
                dry_reads = 0;
                continue;
            }
            if self.iterations > 0 {
                self.iterations -= 1;
                if self.iterations == 0 {
                    break;
                }
            }
            dry_reads += 1;
            if dry_reads > 1 {
                tracing::warn!("source produced no audio after rewind, stopping");
                self.iterations = 0;
                break;
            }
            self.codec.reset()?;
        }
        if self.filled > 0 && self.gain != 1.0 {
            let depth = self.codec.spec().depth;
            apply_gain(depth, &mut self.frame[..self.filled], self.gain);
        }
        Ok(())
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("spec", &self.codec.spec())
            .field("iterations", &self.iterations)
            .field("staged", &self.filled)
            .field("gain", &self.gain)
            .finish_non_exhaustive()
    }
}
