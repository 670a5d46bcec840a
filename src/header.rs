//! Signature detection and header dispatch.
//!
//! [`load_header`] reads the first byte of the stream, classifies the format
//! from the magic bytes, then hands off to the per-format header parser.
//! TGA has no signature, so it is only tried — on request — when nothing
//! else matched; the byte consumed during detection doubles as the TGA ID
//! length and is kept in the descriptor.

use std::io::Read;

use log::{debug, trace};

use crate::descriptor::{Format, ImageDescriptor};
use crate::error::{Error, Result};
use crate::input::BufferedInput;
use crate::{bmp, gif, jpeg, png, pnm, qoi, tga};

/// Identify the image format and parse its header.
///
/// On success the descriptor's dimensions, format, and per-pixel depth are
/// frozen and the stream is positioned for
/// [`load_contents`](ImageDescriptor::load_contents).
///
/// `try_tga` controls the no-signature fallback: when the first bytes match
/// no known magic, the stream is reinterpreted as TGA (whose header has no
/// signature at all) instead of failing with [`Error::UnknownFormat`].
///
/// FITS and TIFF signatures are recognized but their body decoders are
/// deferred, so both fail with [`Error::UnsupportedFormat`]. A TIFF whose
/// endianness bytes are not followed by the magic word 42 is malformed and
/// fails with [`Error::InvalidData`] instead.
pub fn load_header<R: Read>(stream: R, try_tga: bool) -> Result<ImageDescriptor<R>> {
    let mut input = BufferedInput::new(stream);
    let first = input.read_u8()?;
    trace!("signature first byte {first:#04x}");

    match first {
        b'B' => {
            expect(&mut input, b"M")?;
            let mut d = ImageDescriptor::new(input, Format::Bmp, first);
            bmp::read_header(&mut d)?;
            finish(d)
        }
        b'S' => {
            expect(&mut input, b"IMPLE")?;
            debug!("FITS signature recognized; body decoding is not implemented");
            Err(Error::UnsupportedFormat(Format::Fits))
        }
        b'G' => {
            expect(&mut input, b"IF")?;
            let mut version = [0u8; 3];
            input.read_exact(&mut version)?;
            let version89 = match &version {
                b"87a" => false,
                b"89a" => true,
                _ => return Err(Error::UnknownFormat),
            };
            let mut d = ImageDescriptor::new(input, Format::Gif, first);
            gif::read_header(&mut d, version89)?;
            finish(d)
        }
        b'I' | b'M' => {
            // TIFF: "II" little-endian or "MM" big-endian, then magic 42.
            let second = input.read_u8()?;
            if second != first {
                return Err(Error::UnknownFormat);
            }
            let magic = if first == b'I' {
                input.read_u16_le()?
            } else {
                input.read_u16_be()?
            };
            if magic != 42 {
                return Err(Error::InvalidData(format!(
                    "TIFF magic is {magic}, not 42"
                )));
            }
            debug!(
                "TIFF signature recognized ({}-endian); body decoding is not implemented",
                if first == b'I' { "little" } else { "big" }
            );
            Err(Error::UnsupportedFormat(Format::Tiff))
        }
        0xFF => {
            expect(&mut input, &[0xD8])?;
            let mut d = ImageDescriptor::new(input, Format::Jpeg, first);
            jpeg::read_header(&mut d)?;
            finish(d)
        }
        0x89 => {
            expect(&mut input, b"PNG\r\n\x1A\n")?;
            let mut d = ImageDescriptor::new(input, Format::Png, first);
            png::read_header(&mut d)?;
            finish(d)
        }
        b'P' => {
            let digit = input.read_u8()?;
            if !(b'1'..=b'6').contains(&digit) {
                return Err(Error::UnknownFormat);
            }
            let mut d = ImageDescriptor::new(input, Format::Pnm, first);
            pnm::read_header(&mut d, digit - b'0')?;
            finish(d)
        }
        b'q' => {
            expect(&mut input, b"oif")?;
            let mut d = ImageDescriptor::new(input, Format::Qoi, first);
            qoi::read_header(&mut d)?;
            finish(d)
        }
        _ if try_tga => {
            let mut d = ImageDescriptor::new(input, Format::Tga, first);
            tga::read_header(&mut d)?;
            finish(d)
        }
        _ => Err(Error::UnknownFormat),
    }
}

fn expect<R: Read>(input: &mut BufferedInput<R>, magic: &[u8]) -> Result<()> {
    for &want in magic {
        if input.read_u8()? != want {
            return Err(Error::UnknownFormat);
        }
    }
    Ok(())
}

fn finish<R: Read>(d: ImageDescriptor<R>) -> Result<ImageDescriptor<R>> {
    if d.width == 0 || d.height == 0 {
        return Err(Error::InvalidData("image dimensions must be positive".into()));
    }
    debug!(
        "{}: {}x{}, {} bpp",
        d.detailed_format, d.width, d.height, d.bits_per_pixel
    );
    Ok(d)
}
