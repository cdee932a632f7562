//! Engine error type shared by codecs, devices and backends.

use crate::sample::PcmSpec;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the mixing engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source is not in a format this codec understands.
    ///
    /// This is the recoverable probe failure: the source was examined and
    /// rejected before any state changed, so the caller may try another
    /// codec or report an unsupported file.
    #[error("unrecognized container format")]
    FormatMismatch,

    /// The container matched but its contents are malformed or unsupported.
    #[error("invalid stream: {0}")]
    InvalidStream(String),

    /// Decoding failed after a successful open.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The backend cannot run at the requested rate/channel count.
    ///
    /// The engine never resamples; hosts must open the device at a rate
    /// the hardware (or sink) actually supports.
    #[error("backend negotiated {negotiated} Hz, requested {requested} Hz")]
    RateMismatch { requested: u32, negotiated: u32 },

    /// A track's PCM format does not match the device it is loaded into.
    #[error("track format {track} does not match device format {device}")]
    SpecMismatch { track: PcmSpec, device: PcmSpec },

    /// The backend failed outside the normal busy/accepted protocol.
    #[error("backend error: {0}")]
    Backend(String),

    /// The device or backend has already been closed.
    #[error("device is closed")]
    Closed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<symphonia::core::errors::Error> for Error {
    fn from(e: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error as SymphoniaError;
        match e {
            SymphoniaError::Unsupported(_) => Error::FormatMismatch,
            SymphoniaError::IoError(io) => Error::Io(io),
            other => Error::Decode(other.to_string()),
        }
    }
}
