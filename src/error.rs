//! Error types for decoding operations.
//!
//! Every failure surfaces through [`Error`] from the outermost
//! [`load_header`](crate::load_header) or
//! [`load_contents`](crate::ImageDescriptor::load_contents) call. Decoders do
//! not partially succeed: once an error is returned the descriptor may only
//! be dropped.

use std::fmt;

use crate::descriptor::Format;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Decoding errors.
#[derive(Debug)]
pub enum Error {
    /// The first bytes of the stream matched no known signature.
    UnknownFormat,
    /// The signature was recognized but the format's body decoder is not
    /// implemented (FITS and TIFF are header-only).
    UnsupportedFormat(Format),
    /// A recognized format with an unsupported variant, e.g. RLE BMP,
    /// color-mapped TGA, or 12-bit JPEG.
    UnsupportedSubformat(String),
    /// Malformed or truncated image data: parse violations, checksum
    /// mismatches, bad entropy codes, out-of-range palette indices. Stream
    /// read failures also surface here, which is how caller-side
    /// cancellation (closing the stream) is reported.
    InvalidData(String),
    /// The sink's sample width is outside the supported [8, 16] range.
    InvalidSampleBits(u32),
    /// A condition that valid or invalid input should never produce.
    /// Indicates a bug in this crate rather than in the image.
    Internal(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownFormat => write!(f, "unknown image format"),
            Error::UnsupportedFormat(format) => {
                write!(f, "{format:?} is recognized but its body decoder is not implemented")
            }
            Error::UnsupportedSubformat(detail) => {
                write!(f, "unsupported image subformat: {detail}")
            }
            Error::InvalidData(detail) => write!(f, "error in image data: {detail}"),
            Error::InvalidSampleBits(bits) => {
                write!(f, "sink sample width {bits} is outside the supported range [8, 16]")
            }
            Error::Internal(detail) => write!(f, "internal invariant violated: {detail}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::InvalidData(format!("stream read failed: {err}"))
    }
}
