//! BMP decoder: uncompressed BITMAPINFOHEADER images at 1, 4, 8, and 24 bpp.
//!
//! Rows are stored padded to 4 bytes and bottom-up unless the height field
//! is negative. The palette uses the BGRx quad layout. RLE4/RLE8 compression
//! is recognized and rejected as an unsupported subformat.

use std::io::Read;

use log::trace;

use crate::color::{self, load_palette_bgrx, promote};
use crate::descriptor::ImageDescriptor;
use crate::error::{Error, Result};
use crate::sink::{Mode, PixelSink};

/// Size of the only supported DIB header (BITMAPINFOHEADER).
const DIB_INFO_SIZE: u32 = 40;

pub(crate) fn read_header<R: Read>(d: &mut ImageDescriptor<R>) -> Result<()> {
    let input = &mut d.input;
    let _file_size = input.read_u32_le()?;
    input.skip(4)?; // reserved
    let data_offset = input.read_u32_le()?;

    let dib_size = input.read_u32_le()?;
    if dib_size != DIB_INFO_SIZE {
        return Err(Error::UnsupportedSubformat(format!(
            "BMP DIB header size {dib_size}"
        )));
    }
    let width = input.read_u32_le()? as i32;
    let height = input.read_u32_le()? as i32;
    let planes = input.read_u16_le()?;
    if planes != 1 {
        return Err(Error::InvalidData(format!("BMP plane count {planes}")));
    }
    let bpp = input.read_u16_le()?;
    if !matches!(bpp, 1 | 4 | 8 | 24) {
        return Err(Error::UnsupportedSubformat(format!("BMP {bpp}-bit pixels")));
    }
    let compression = input.read_u32_le()?;
    match compression {
        0 => {}
        1 => return Err(Error::UnsupportedSubformat("BMP RLE8".into())),
        2 => return Err(Error::UnsupportedSubformat("BMP RLE4".into())),
        other => {
            return Err(Error::UnsupportedSubformat(format!(
                "BMP compression method {other}"
            )))
        }
    }
    input.skip(12)?; // image size, resolutions
    let palette_count = input.read_u32_le()?;
    input.skip(4)?; // important-colors count

    if width <= 0 {
        return Err(Error::InvalidData(format!("BMP width {width}")));
    }
    d.top_first = height < 0;
    let height = if height < 0 {
        height.checked_neg().ok_or_else(|| Error::InvalidData("BMP height overflow".into()))?
    } else {
        height
    };
    if height == 0 {
        return Err(Error::InvalidData("BMP height is zero".into()));
    }

    d.width = width as u32;
    d.height = height as u32;
    d.bits_per_pixel = u32::from(bpp);
    d.subformat_id = u32::from(bpp);
    d.detailed_format = format!("BMP, {bpp}-bit");

    // 54 bytes of headers precede the palette.
    let mut consumed: u32 = 54;
    if bpp <= 8 {
        let entries = if palette_count == 0 {
            1u32 << bpp
        } else {
            palette_count
        };
        if entries > 256 {
            return Err(Error::InvalidData(format!("BMP palette of {entries} entries")));
        }
        d.palette = load_palette_bgrx(input, entries as usize)?;
        consumed += entries * 4;
    }
    // Tolerate a gap between the headers and the pixel array.
    if data_offset > consumed {
        trace!("BMP: skipping {} bytes to pixel data", data_offset - consumed);
        input.skip((data_offset - consumed) as usize)?;
    }
    Ok(())
}

pub(crate) fn decode<R: Read, S: PixelSink>(
    d: &mut ImageDescriptor<R>,
    sink: &mut S,
    _mode: Mode,
) -> Result<f32> {
    let out_bits = sink.sample_bits();
    let alpha = ((1u32 << out_bits) - 1) as u16;
    let width = d.width as usize;
    let height = d.height;
    let bpp = d.bits_per_pixel as usize;

    let row_bytes = (width * bpp + 7) / 8;
    let padded = (row_bytes + 3) & !3;
    let mut row = vec![0u8; padded];

    for row_index in 0..height {
        d.input.read_exact(&mut row)?;
        let y = if d.top_first {
            row_index
        } else {
            height - 1 - row_index
        };
        sink.set_xy(0, y);
        for x in 0..width {
            let (r, g, b) = match bpp {
                24 => {
                    let p = x * 3;
                    (row[p + 2], row[p + 1], row[p])
                }
                8 => {
                    let entry = color::palette_lookup(&d.palette, row[x] as usize)?;
                    (entry.r, entry.g, entry.b)
                }
                4 => {
                    let nibble = (row[x / 2] >> (4 * (1 - x % 2))) & 0x0F;
                    let entry = color::palette_lookup(&d.palette, nibble as usize)?;
                    (entry.r, entry.g, entry.b)
                }
                1 => {
                    let bit = (row[x / 8] >> (7 - x % 8)) & 1;
                    let entry = color::palette_lookup(&d.palette, bit as usize)?;
                    (entry.r, entry.g, entry.b)
                }
                _ => return Err(Error::Internal("BMP depth validated at header time")),
            };
            sink.put_pixel(
                promote(u16::from(r), 8, out_bits),
                promote(u16::from(g), 8, out_bits),
                promote(u16::from(b), 8, out_bits),
                alpha,
            );
        }
        sink.feedback(((row_index + 1) * 100 / height) as u8);
    }
    Ok(0.0)
}
