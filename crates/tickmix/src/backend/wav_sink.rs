//! Offline render backend: mixed periods go straight into a WAV file.
//!
//! Useful for golden-file tests and for bouncing a mix without touching
//! an audio device. The sink is never busy, so a render loop runs as
//! fast as the codecs can decode.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::sample::{PcmSpec, SampleDepth};

/// Writes every accepted period to a PCM WAV file via `hound`.
pub struct WavSinkBackend {
    path: PathBuf,
    period_frames: usize,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    depth: SampleDepth,
}

impl WavSinkBackend {
    /// Render into `path`, mixing in periods of `period_frames` frames.
    ///
    /// The file is created on `open`, once the stream format is known.
    pub fn create(path: impl AsRef<Path>, period_frames: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            period_frames,
            writer: None,
            depth: SampleDepth::S16,
        }
    }
}

impl Backend for WavSinkBackend {
    fn open(&mut self, spec: &PcmSpec) -> Result<usize> {
        let wav_spec = hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.rate_hz,
            bits_per_sample: spec.depth.bits(),
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&self.path, wav_spec)
            .map_err(|e| Error::Backend(format!("create {}: {e}", self.path.display())))?;
        self.writer = Some(writer);
        self.depth = spec.depth;
        tracing::info!(path = %self.path.display(), %spec, "rendering to wav file");
        Ok(spec.bytes_for_frames(self.period_frames))
    }

    fn write(&mut self, frames: &[u8]) -> Result<bool> {
        let writer = self.writer.as_mut().ok_or(Error::Closed)?;
        let result = match self.depth {
            SampleDepth::U8 => frames
                .iter()
                .try_for_each(|b| writer.write_sample((*b as i16 - 128) as i8)),
            SampleDepth::S16 => frames
                .chunks_exact(2)
                .try_for_each(|c| writer.write_sample(i16::from_le_bytes([c[0], c[1]]))),
            SampleDepth::S24 => frames.chunks_exact(3).try_for_each(|c| {
                let raw = (c[0] as i32) | ((c[1] as i32) << 8) | ((c[2] as i32) << 16);
                writer.write_sample((raw << 8) >> 8)
            }),
            SampleDepth::S32 => frames.chunks_exact(4).try_for_each(|c| {
                writer.write_sample(i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            }),
        };
        result.map_err(|e| Error::Backend(format!("wav sink write: {e}")))?;
        Ok(true)
    }

    fn drain(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| Error::Backend(format!("wav sink flush: {e}")))?;
        }
        Ok(())
    }

    fn close(&mut self) {
        // Finalization rewrites the header with the true data length;
        // failures here are logged since close cannot report them.
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                tracing::warn!(path = %self.path.display(), "wav sink finalize failed: {e}");
            }
        }
    }
}
