//! Hand-rolled RIFF/WAVE container parser for uncompressed PCM.
//!
//! Only plain PCM (format tag 1) at 8/16/24/32 bits is accepted; the
//! engine mixes these depths natively so no conversion happens here.
//! Chunk walking follows the RIFF rules: unknown chunks are skipped and
//! odd-sized chunks carry a pad byte.

use std::io::{Read, Seek, SeekFrom};

use crate::codec::{Codec, read_full};
use crate::error::{Error, Result};
use crate::sample::{PcmSpec, SampleDepth};

const MAX_CHANNELS: u16 = 255;

/// Streaming reader for the data chunk of a PCM WAV file.
pub struct WavCodec<R> {
    source: R,
    spec: PcmSpec,
    data_start: u64,
    data_len: u64,
    pos: u64,
}

impl<R: Read + Seek> WavCodec<R> {
    /// Validate the container and position the stream at the first sample.
    ///
    /// The descriptor is only trusted after both the outer `RIFF` magic
    /// and the nested `WAVE` form type check out, and the `fmt ` chunk
    /// must appear before `data`. A source that is not a WAV file fails
    /// with [`Error::FormatMismatch`]; a WAV file the engine cannot mix
    /// (compressed, exotic depth) fails with [`Error::InvalidStream`].
    pub fn open(mut source: R) -> Result<Self> {
        source.seek(SeekFrom::Start(0))?;

        let mut header = [0u8; 12];
        if read_full(&mut source, &mut header)? < header.len() {
            return Err(Error::FormatMismatch);
        }
        if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
            return Err(Error::FormatMismatch);
        }

        let mut spec: Option<PcmSpec> = None;
        loop {
            let mut chunk_header = [0u8; 8];
            match read_full(&mut source, &mut chunk_header)? {
                0 => break,
                8 => {}
                _ => return Err(Error::InvalidStream("truncated chunk header".into())),
            }
            let chunk_id = [
                chunk_header[0],
                chunk_header[1],
                chunk_header[2],
                chunk_header[3],
            ];
            let chunk_len = u32::from_le_bytes([
                chunk_header[4],
                chunk_header[5],
                chunk_header[6],
                chunk_header[7],
            ]) as u64;

            match &chunk_id {
                b"fmt " => {
                    spec = Some(parse_fmt_chunk(&mut source, chunk_len)?);
                    skip_pad(&mut source, chunk_len)?;
                }
                b"data" => {
                    let spec = spec
                        .ok_or_else(|| Error::InvalidStream("data chunk before fmt".into()))?;
                    let data_start = source.stream_position()?;
                    // Clamp to whole frames so a sloppy writer can never
                    // make us emit a torn frame at the end.
                    let frame_bytes = spec.frame_bytes() as u64;
                    let data_len = chunk_len - chunk_len % frame_bytes;
                    return Ok(Self {
                        source,
                        spec,
                        data_start,
                        data_len,
                        pos: 0,
                    });
                }
                _ => {
                    source.seek(SeekFrom::Current(chunk_len as i64))?;
                    skip_pad(&mut source, chunk_len)?;
                }
            }
        }

        Err(Error::InvalidStream("missing data chunk".into()))
    }
}

impl<R: Read + Seek> Codec for WavCodec<R> {
    fn spec(&self) -> PcmSpec {
        self.spec
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = (self.data_len - self.pos) as usize;
        let frame_bytes = self.spec.frame_bytes();
        let want = remaining.min(buf.len());
        let want = want - want % frame_bytes;
        if want == 0 {
            return Ok(0);
        }

        let got = read_full(&mut self.source, &mut buf[..want])?;
        let whole = got - got % frame_bytes;
        self.pos += whole as u64;
        if got < want {
            // The source is shorter than its header claimed; pin the
            // stream length to what actually exists so later reads and
            // resets stay consistent.
            self.data_len = self.pos;
        }
        Ok(whole)
    }

    fn reset(&mut self) -> Result<()> {
        self.source.seek(SeekFrom::Start(self.data_start))?;
        self.pos = 0;
        Ok(())
    }
}

/// Parse the 16-byte PCM descriptor at the head of a `fmt ` chunk.
fn parse_fmt_chunk<R: Read + Seek>(source: &mut R, chunk_len: u64) -> Result<PcmSpec> {
    if chunk_len < 16 {
        return Err(Error::InvalidStream("fmt chunk too short".into()));
    }
    let mut fields = [0u8; 16];
    if read_full(source, &mut fields)? < fields.len() {
        return Err(Error::InvalidStream("truncated fmt chunk".into()));
    }

    let format_tag = u16::from_le_bytes([fields[0], fields[1]]);
    let channels = u16::from_le_bytes([fields[2], fields[3]]);
    let rate_hz = u32::from_le_bytes([fields[4], fields[5], fields[6], fields[7]]);
    let block_align = u16::from_le_bytes([fields[12], fields[13]]);
    let bits = u16::from_le_bytes([fields[14], fields[15]]);

    if format_tag != 1 {
        return Err(Error::InvalidStream(format!(
            "unsupported wav encoding (format tag {format_tag})"
        )));
    }
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(Error::InvalidStream(format!(
            "unsupported channel count {channels}"
        )));
    }
    if rate_hz == 0 {
        return Err(Error::InvalidStream("zero sample rate".into()));
    }
    let depth = SampleDepth::from_bits(bits)
        .ok_or_else(|| Error::InvalidStream(format!("unsupported bit depth {bits}")))?;

    let spec = PcmSpec::new(rate_hz, depth, channels);
    if block_align != 0 && block_align as usize != spec.frame_bytes() {
        return Err(Error::InvalidStream(format!(
            "block align {block_align} does not match {channels}x{bits}-bit frames"
        )));
    }

    let extra = chunk_len - 16;
    if extra > 0 {
        source.seek(SeekFrom::Current(extra as i64))?;
    }
    Ok(spec)
}

/// Skip the pad byte after an odd-sized chunk.
fn skip_pad<R: Seek>(source: &mut R, chunk_len: u64) -> Result<()> {
    if chunk_len % 2 == 1 {
        source.seek(SeekFrom::Current(1))?;
    }
    Ok(())
}
