//! The image descriptor: parsed metadata plus decoding state.
//!
//! [`ImageDescriptor`] is produced by [`load_header`](crate::load_header) and
//! threaded through the whole pipeline. It owns the buffered input, the
//! palette, and any format-specific carry-over (JPEG tables seen before the
//! frame header, the GIF frame canvas), all of which are released when it is
//! dropped.

use std::io::Read;

use log::debug;

use crate::color::Rgb8;
use crate::error::{Error, Result};
use crate::gif::GifState;
use crate::input::BufferedInput;
use crate::jpeg::JpegState;
use crate::sink::{check_sample_bits, Mode, PixelSink};
use crate::{bmp, gif, jpeg, png, pnm, qoi, tga};

/// Recognized image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Bmp,
    Fits,
    Gif,
    Jpeg,
    Png,
    Pnm,
    Qoi,
    Tga,
    Tiff,
}

/// Display orientation requested by the image's metadata.
///
/// Populated from the Exif orientation tag for JPEG; every other format is
/// [`Unchanged`](Orientation::Unchanged). The decoder never rotates pixels
/// itself — honoring this is the sink's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Unchanged,
    Rot90,
    Rot180,
    Rot270,
}

/// Parsed header data and decoding state for one image stream.
#[derive(Debug)]
pub struct ImageDescriptor<R> {
    pub(crate) input: BufferedInput<R>,
    pub(crate) format: Format,
    pub(crate) detailed_format: String,
    pub(crate) subformat_id: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) bits_per_pixel: u32,
    pub(crate) rle_encoded: bool,
    pub(crate) transparency: bool,
    pub(crate) greyscale: bool,
    pub(crate) interlaced: bool,
    /// TGA/BMP data orientation: rows arrive top-first when set.
    pub(crate) top_first: bool,
    pub(crate) orientation: Orientation,
    /// Up to 256 RGB-8 entries; empty when the format carries no palette.
    pub(crate) palette: Vec<Rgb8>,
    /// Byte consumed by signature detection; TGA reuses it as the ID length.
    pub(crate) first_byte: u8,
    /// Seconds until the next GIF frame; 0.0 after the last frame.
    pub(crate) next_frame: f32,
    /// PNM sample range carry-over (`maxval` from the header).
    pub(crate) pnm_maxval: u32,
    pub(crate) jpeg: Option<Box<JpegState>>,
    pub(crate) gif: Option<Box<GifState>>,
}

impl<R: Read> ImageDescriptor<R> {
    pub(crate) fn new(input: BufferedInput<R>, format: Format, first_byte: u8) -> Self {
        Self {
            input,
            format,
            detailed_format: String::new(),
            subformat_id: 0,
            width: 0,
            height: 0,
            bits_per_pixel: 0,
            rle_encoded: false,
            transparency: false,
            greyscale: false,
            interlaced: false,
            top_first: false,
            orientation: Orientation::Unchanged,
            palette: Vec::new(),
            first_byte,
            next_frame: 0.0,
            pnm_maxval: 0,
            jpeg: None,
            gif: None,
        }
    }

    /// Image width in pixels. Frozen once `load_header` succeeds.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels. Frozen once `load_header` succeeds.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Short human-readable format string, e.g. `"GIF89a, interlaced"`.
    pub fn detailed_format(&self) -> &str {
        &self.detailed_format
    }

    /// Format-specific discriminator: PNG color type, GIF palette-bit count
    /// plus one, JPEG SOF code, BMP/TGA depth or image type, PNM digit,
    /// QOI channel count.
    pub fn subformat_id(&self) -> u32 {
        self.subformat_id
    }

    /// Bits per pixel: all channels combined for direct-color formats,
    /// bits per palette index for palettized ones.
    pub fn bits_per_pixel(&self) -> u32 {
        self.bits_per_pixel
    }

    /// Whether the body is run-length encoded (TGA types 10/11, QOI runs).
    pub fn is_rle(&self) -> bool {
        self.rle_encoded
    }

    /// Whether the image is interlaced. For JPEG this reports progressive
    /// encoding, which the source format treats as the same notion.
    pub fn is_interlaced(&self) -> bool {
        self.interlaced
    }

    pub fn is_greyscale(&self) -> bool {
        self.greyscale
    }

    /// Whether a palette is present or required by the format. For PNG
    /// indexed images this is known from the header even though the PLTE
    /// chunk itself arrives with the body.
    pub fn has_palette(&self) -> bool {
        !self.palette.is_empty() || (self.format == Format::Png && self.subformat_id == 3)
    }

    /// Whether decoded pixels may carry alpha below the maximum.
    pub fn expects_transparency(&self) -> bool {
        self.transparency
    }

    pub fn display_orientation(&self) -> Orientation {
        self.orientation
    }

    /// Loaded palette entries; empty when the format has none.
    pub fn palette(&self) -> &[Rgb8] {
        &self.palette
    }

    /// Decode the image body, pushing every pixel into `sink`.
    ///
    /// Returns the delay in seconds before the next frame should be decoded
    /// by calling `load_contents` again on the same descriptor; `0.0` means
    /// there are no further frames. Only GIF produces non-zero delays.
    ///
    /// On error the descriptor must be considered unusable and dropped.
    pub fn load_contents<S: PixelSink>(&mut self, sink: &mut S, mode: Mode) -> Result<f32> {
        check_sample_bits(sink.sample_bits())?;
        debug!(
            "decoding {:?} {}x{} ({})",
            self.format, self.width, self.height, self.detailed_format
        );
        match self.format {
            Format::Bmp => bmp::decode(self, sink, mode),
            Format::Gif => gif::decode(self, sink, mode),
            Format::Jpeg => jpeg::decode(self, sink, mode),
            Format::Png => png::decode(self, sink, mode),
            Format::Pnm => pnm::decode(self, sink, mode),
            Format::Qoi => qoi::decode(self, sink, mode),
            Format::Tga => tga::decode(self, sink, mode),
            Format::Fits | Format::Tiff => Err(Error::UnsupportedFormat(self.format)),
        }
    }
}
