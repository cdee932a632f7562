//! Symphonia-backed codec for compressed formats (FLAC, MP3, Vorbis).
//!
//! The engine stays byte-oriented: whatever Symphonia decodes is handed
//! out as interleaved signed 16-bit little-endian PCM at the stream's
//! native rate and channel count. Decoded packets that overrun the
//! caller's buffer are carried over to the next `read`, so no sample is
//! ever dropped at a period boundary.
//!
//! WAV and AIFF readers are deliberately not registered; plain PCM
//! containers belong to [`crate::codec::WavCodec`], and probing one here
//! reports [`Error::FormatMismatch`] instead of succeeding by accident.

use std::io::{self, Read, Seek, SeekFrom};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::sample::{PcmSpec, SampleDepth};

const MAX_CHANNELS: usize = 255;

/// Decodes FLAC/MP3/Vorbis streams into interleaved S16 PCM bytes.
pub struct CompressedCodec {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: PcmSpec,
    pending: Vec<u8>,
    pending_pos: usize,
    eos: bool,
}

impl CompressedCodec {
    /// Probe `source` and set up a decoder for its default audio track.
    ///
    /// Probing is non-destructive: a source Symphonia does not recognize
    /// (including WAV, which is intentionally unregistered) fails with
    /// [`Error::FormatMismatch`] before any decoding state exists.
    pub fn open<R>(source: R) -> Result<Self>
    where
        R: Read + Seek + Send + Sync + 'static,
    {
        let bridge = SourceBridge::new(source)?;
        let mss = MediaSourceStream::new(Box::new(bridge), Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| match e {
                // A source too short to probe cannot be one of our formats.
                SymphoniaError::IoError(ref io_err)
                    if io_err.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    Error::FormatMismatch
                }
                other => other.into(),
            })?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| Error::InvalidStream("no default audio track".into()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let channels = codec_params
            .channels
            .ok_or_else(|| Error::InvalidStream("unknown channel layout".into()))?
            .count();
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(Error::InvalidStream(format!(
                "unsupported channel count {channels}"
            )));
        }
        let rate_hz = codec_params
            .sample_rate
            .ok_or_else(|| Error::InvalidStream("unknown sample rate".into()))?;

        let decoder =
            symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

        Ok(Self {
            format,
            decoder,
            track_id,
            spec: PcmSpec::new(rate_hz, SampleDepth::S16, channels as u16),
            pending: Vec::new(),
            pending_pos: 0,
            eos: false,
        })
    }

    /// Decode packets until one yields audio, refilling `pending`.
    ///
    /// Returns `Ok(false)` at end of stream. Corrupt packets are skipped
    /// the way a resilient player would, rather than aborting playback.
    fn refill_pending(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(e) => {
                    tracing::debug!("packet read ended stream: {e}");
                    return Ok(false);
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!("skipping undecodable packet: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if decoded.frames() == 0 {
                continue;
            }

            let mut sample_buf = SampleBuffer::<i16>::new(decoded.frames() as u64, *decoded.spec());
            sample_buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending_pos = 0;
            self.pending.extend(
                sample_buf
                    .samples()
                    .iter()
                    .flat_map(|s| s.to_le_bytes()),
            );
            return Ok(true);
        }
    }
}

impl Codec for CompressedCodec {
    fn spec(&self) -> PcmSpec {
        self.spec
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.pending_pos < self.pending.len() {
                let take = (buf.len() - written).min(self.pending.len() - self.pending_pos);
                buf[written..written + take]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
                self.pending_pos += take;
                written += take;
                continue;
            }
            if self.eos {
                break;
            }
            if !self.refill_pending()? {
                self.eos = true;
            }
        }
        Ok(written)
    }

    fn reset(&mut self) -> Result<()> {
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::new(0, 0.0),
                    track_id: None,
                },
            )
            .map_err(|e| Error::Decode(format!("rewind failed: {e}")))?;
        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.eos = false;
        Ok(())
    }
}

/// Adapts any `Read + Seek` stream to Symphonia's [`MediaSource`].
///
/// The total length is captured once at construction (seek to end,
/// position restored) so `byte_len` never disturbs the read cursor
/// mid-decode.
struct SourceBridge<R> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> SourceBridge<R> {
    fn new(mut inner: R) -> io::Result<Self> {
        let pos = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(Self { inner, len })
    }
}

impl<R: Read + Seek> Read for SourceBridge<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Seek> Seek for SourceBridge<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl<R: Read + Seek + Send + Sync> MediaSource for SourceBridge<R> {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes() -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in [0i16, 1000, -1000, 500] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn wav_source_is_a_format_mismatch() {
        let opened = CompressedCodec::open(Cursor::new(wav_bytes()));
        assert!(matches!(opened, Err(Error::FormatMismatch)));
    }

    #[test]
    fn garbage_is_a_format_mismatch() {
        let noise: Vec<u8> = (0u16..256).map(|i| (i * 7 % 251) as u8).collect();
        let opened = CompressedCodec::open(Cursor::new(noise));
        assert!(matches!(opened, Err(Error::FormatMismatch)));
    }

    #[test]
    fn truncated_source_is_a_format_mismatch() {
        let opened = CompressedCodec::open(Cursor::new(vec![0x66u8, 0x4C]));
        assert!(matches!(opened, Err(Error::FormatMismatch)));
    }

    #[test]
    fn bridge_reports_length_and_restores_position() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3, 4, 5]);
        cursor.set_position(2);
        let bridge = SourceBridge::new(cursor).unwrap();
        assert_eq!(bridge.byte_len(), Some(5));
        assert!(bridge.is_seekable());
        assert_eq!(bridge.inner.position(), 2);
    }

    #[test]
    fn bridge_maps_all_seek_origins() {
        let mut bridge = SourceBridge::new(Cursor::new(vec![0u8; 10])).unwrap();
        assert_eq!(bridge.seek(SeekFrom::Start(4)).unwrap(), 4);
        assert_eq!(bridge.seek(SeekFrom::Current(3)).unwrap(), 7);
        assert_eq!(bridge.seek(SeekFrom::Current(-5)).unwrap(), 2);
        assert_eq!(bridge.seek(SeekFrom::End(-1)).unwrap(), 9);
        assert_eq!(bridge.stream_position().unwrap(), 9);
    }

    #[test]
    fn bridge_reads_through() {
        let mut bridge = SourceBridge::new(Cursor::new(vec![7u8, 8, 9])).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(bridge.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [7, 8]);
    }
}
