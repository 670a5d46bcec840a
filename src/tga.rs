//! TGA decoder: uncompressed and RLE true-color or greyscale images.
//!
//! TGA has no signature; the dispatcher's already-consumed first byte is the
//! image ID length. Supported image types are 2 (RGB), 3 (grey), 10
//! (RLE RGB), and 11 (RLE grey) at 8, 24, or 32 bits per pixel; color-mapped
//! variants are recognized and rejected. Pixel layout is BGR(A); rows are
//! stored bottom-up unless descriptor bit 5 says top-first.

use std::io::Read;

use crate::color::promote;
use crate::descriptor::ImageDescriptor;
use crate::error::{Error, Result};
use crate::input::BufferedInput;
use crate::sink::{Mode, PixelSink};

pub(crate) fn read_header<R: Read>(d: &mut ImageDescriptor<R>) -> Result<()> {
    let id_length = d.first_byte;
    let input = &mut d.input;

    let colormap_type = input.read_u8()?;
    if colormap_type != 0 {
        return Err(Error::UnsupportedSubformat("TGA color-mapped image".into()));
    }
    let image_type = input.read_u8()?;
    match image_type {
        2 | 3 | 10 | 11 => {}
        1 | 9 => return Err(Error::UnsupportedSubformat("TGA color-mapped image".into())),
        other => {
            return Err(Error::UnsupportedSubformat(format!(
                "TGA image type {other}"
            )))
        }
    }
    input.skip(5)?; // color map specification
    input.skip(4)?; // x/y origin
    let width = input.read_u16_le()?;
    let height = input.read_u16_le()?;
    let depth = input.read_u8()?;
    let descriptor = input.read_u8()?;

    let grey = matches!(image_type, 3 | 11);
    match (grey, depth) {
        (true, 8) | (false, 24) | (false, 32) => {}
        _ => {
            return Err(Error::UnsupportedSubformat(format!(
                "TGA type {image_type} at {depth} bpp"
            )))
        }
    }
    input.skip(id_length as usize)?;

    d.width = u32::from(width);
    d.height = u32::from(height);
    d.bits_per_pixel = u32::from(depth);
    d.subformat_id = u32::from(image_type);
    d.rle_encoded = image_type >= 10;
    d.greyscale = grey;
    d.transparency = depth == 32;
    d.top_first = descriptor & 0x20 != 0;
    d.detailed_format = format!(
        "TGA type {image_type} ({}{})",
        if d.rle_encoded { "RLE " } else { "" },
        if grey { "greyscale" } else { "RGB" }
    );
    Ok(())
}

/// Sequential pixel source that understands both raw data and RLE packets.
struct PixelReader {
    depth_bytes: usize,
    rle: bool,
    /// Remaining pixels in the current packet, and whether they repeat.
    packet_left: u32,
    packet_is_run: bool,
    run_pixel: [u8; 4],
}

impl PixelReader {
    fn next<R: Read>(&mut self, input: &mut BufferedInput<R>) -> Result<[u8; 4]> {
        if !self.rle {
            return read_bgra(input, self.depth_bytes);
        }
        if self.packet_left == 0 {
            let header = input.read_u8()?;
            self.packet_left = u32::from(header & 0x7F) + 1;
            self.packet_is_run = header & 0x80 != 0;
            if self.packet_is_run {
                self.run_pixel = read_bgra(input, self.depth_bytes)?;
            }
        }
        self.packet_left -= 1;
        if self.packet_is_run {
            Ok(self.run_pixel)
        } else {
            read_bgra(input, self.depth_bytes)
        }
    }
}

fn read_bgra<R: Read>(input: &mut BufferedInput<R>, depth_bytes: usize) -> Result<[u8; 4]> {
    Ok(match depth_bytes {
        1 => {
            let g = input.read_u8()?;
            [g, g, g, 255]
        }
        3 => {
            let b = input.read_u8()?;
            let g = input.read_u8()?;
            let r = input.read_u8()?;
            [r, g, b, 255]
        }
        _ => {
            let b = input.read_u8()?;
            let g = input.read_u8()?;
            let r = input.read_u8()?;
            let a = input.read_u8()?;
            [r, g, b, a]
        }
    })
}

pub(crate) fn decode<R: Read, S: PixelSink>(
    d: &mut ImageDescriptor<R>,
    sink: &mut S,
    _mode: Mode,
) -> Result<f32> {
    let out_bits = sink.sample_bits();
    let width = d.width;
    let height = d.height;
    let mut reader = PixelReader {
        depth_bytes: (d.bits_per_pixel / 8) as usize,
        rle: d.rle_encoded,
        packet_left: 0,
        packet_is_run: false,
        run_pixel: [0; 4],
    };

    for row_index in 0..height {
        let y = if d.top_first {
            row_index
        } else {
            height - 1 - row_index
        };
        sink.set_xy(0, y);
        for _ in 0..width {
            let [r, g, b, a] = reader.next(&mut d.input)?;
            sink.put_pixel(
                promote(u16::from(r), 8, out_bits),
                promote(u16::from(g), 8, out_bits),
                promote(u16::from(b), 8, out_bits),
                promote(u16::from(a), 8, out_bits),
            );
        }
        sink.feedback(((row_index + 1) * 100 / height) as u8);
    }
    Ok(0.0)
}
