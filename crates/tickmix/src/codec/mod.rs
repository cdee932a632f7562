//! Decode seam: pulling interleaved PCM bytes out of audio containers.
//!
//! A [`Codec`] is a synchronous, pull-based byte source. The engine never
//! spawns decode threads; tracks ask for exactly one device period per
//! tick, which keeps per-tick work bounded.
//!
//! Two implementations ship with the crate:
//! - [`WavCodec`]: hand-rolled RIFF/WAVE parser for uncompressed PCM
//! - [`CompressedCodec`]: Symphonia-backed FLAC/MP3/Vorbis decoding

pub mod compressed;
pub mod wav;

pub use compressed::CompressedCodec;
pub use wav::WavCodec;

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::sample::PcmSpec;

/// A pull-based PCM byte source bound to one audio stream.
///
/// Implementations decode on demand; every call does a bounded amount of
/// work. A `read` that returns fewer bytes than requested signals end of
/// stream, after which further reads return 0 until [`Codec::reset`].
pub trait Codec {
    /// Output format of the decoded stream.
    fn spec(&self) -> PcmSpec;

    /// Fill `buf` with the next interleaved PCM bytes.
    ///
    /// Returns the number of bytes written. Anything short of
    /// `buf.len()` means the stream ended inside this call. Two full
    /// passes separated by a [`Codec::reset`] yield identical bytes.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Rewind so the next `read` starts at the first sample.
    fn reset(&mut self) -> Result<()>;
}

/// Probe `source` and open whichever codec recognizes it.
///
/// The leading magic decides the route: `RIFF` goes to the WAV parser,
/// everything else to Symphonia. Either way the chosen codec fully
/// validates the stream; an unrecognized or truncated source fails with
/// [`Error::FormatMismatch`] and nothing else happens.
pub fn open_source<R>(mut source: R) -> Result<Box<dyn Codec>>
where
    R: Read + Seek + Send + Sync + 'static,
{
    source.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 4];
    let got = read_full(&mut source, &mut magic)?;
    source.seek(SeekFrom::Start(0))?;
    if got < magic.len() {
        return Err(Error::FormatMismatch);
    }
    if &magic == b"RIFF" {
        Ok(Box::new(WavCodec::open(source)?))
    } else {
        Ok(Box::new(CompressedCodec::open(source)?))
    }
}

/// Read until `buf` is full or the source ends, returning bytes read.
///
/// Like `read_exact` but a clean EOF is reported through the count
/// instead of an error.
pub(crate) fn read_full<R: Read>(source: &mut R, mut buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while !buf.is_empty() {
        match source.read(buf) {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                buf = &mut buf[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
