//! QOI decoder ("Quite OK Image", the 2021 one-page spec).
//!
//! The body is a sequence of 1-byte-tagged chunks operating on a running
//! pixel and a 64-entry recently-seen table. Decoding stops after
//! `width * height` pixels; the 8-byte end marker is checked leniently and
//! trailing bytes are ignored.

use std::io::Read;

use log::warn;

use crate::color::promote;
use crate::descriptor::ImageDescriptor;
use crate::error::{Error, Result};
use crate::sink::{Mode, PixelSink};

const OP_INDEX: u8 = 0b00;
const OP_DIFF: u8 = 0b01;
const OP_LUMA: u8 = 0b10;
const OP_RUN: u8 = 0b11;
const OP_RGB: u8 = 0xFE;
const OP_RGBA: u8 = 0xFF;

#[inline]
fn hash(px: [u8; 4]) -> usize {
    (px[0] as usize * 3 + px[1] as usize * 5 + px[2] as usize * 7 + px[3] as usize * 11) % 64
}

pub(crate) fn read_header<R: Read>(d: &mut ImageDescriptor<R>) -> Result<()> {
    d.width = d.input.read_u32_be()?;
    d.height = d.input.read_u32_be()?;
    let channels = d.input.read_u8()?;
    if !matches!(channels, 3 | 4) {
        return Err(Error::InvalidData(format!("QOI channel count {channels}")));
    }
    let colorspace = d.input.read_u8()?;
    if colorspace > 1 {
        return Err(Error::InvalidData(format!("QOI colorspace {colorspace}")));
    }
    d.bits_per_pixel = u32::from(channels) * 8;
    d.subformat_id = u32::from(channels);
    d.transparency = channels == 4;
    d.rle_encoded = true;
    d.detailed_format = format!(
        "QOI, {channels}-channel {}",
        if channels == 4 { "RGBA" } else { "RGB" }
    );
    Ok(())
}

pub(crate) fn decode<R: Read, S: PixelSink>(
    d: &mut ImageDescriptor<R>,
    sink: &mut S,
    _mode: Mode,
) -> Result<f32> {
    let out_bits = sink.sample_bits();
    let width = d.width;
    let height = d.height;
    let total = u64::from(width) * u64::from(height);

    let mut table = [[0u8; 4]; 64];
    let mut px = [0u8, 0, 0, 255];
    let mut emitted: u64 = 0;
    let mut x: u32 = 0;
    let mut y: u32 = 0;

    let emit = |px: [u8; 4], sink: &mut S, x: &mut u32, y: &mut u32| {
        if *x == 0 {
            sink.set_xy(0, *y);
        }
        sink.put_pixel(
            promote(u16::from(px[0]), 8, out_bits),
            promote(u16::from(px[1]), 8, out_bits),
            promote(u16::from(px[2]), 8, out_bits),
            promote(u16::from(px[3]), 8, out_bits),
        );
        *x += 1;
        if *x == width {
            *x = 0;
            *y += 1;
            sink.feedback((u64::from(*y) * 100 / u64::from(height)) as u8);
        }
    };

    while emitted < total {
        let tag = d.input.read_u8()?;
        match tag {
            OP_RGB => {
                px[0] = d.input.read_u8()?;
                px[1] = d.input.read_u8()?;
                px[2] = d.input.read_u8()?;
            }
            OP_RGBA => {
                let mut rgba = [0u8; 4];
                d.input.read_exact(&mut rgba)?;
                px = rgba;
            }
            _ => match tag >> 6 {
                OP_INDEX => px = table[(tag & 0x3F) as usize],
                OP_DIFF => {
                    px[0] = px[0].wrapping_add((tag >> 4) & 0x03).wrapping_sub(2);
                    px[1] = px[1].wrapping_add((tag >> 2) & 0x03).wrapping_sub(2);
                    px[2] = px[2].wrapping_add(tag & 0x03).wrapping_sub(2);
                }
                OP_LUMA => {
                    let dg = (tag & 0x3F).wrapping_sub(32);
                    let second = d.input.read_u8()?;
                    let dr = dg.wrapping_add(second >> 4).wrapping_sub(8);
                    let db = dg.wrapping_add(second & 0x0F).wrapping_sub(8);
                    px[0] = px[0].wrapping_add(dr);
                    px[1] = px[1].wrapping_add(dg);
                    px[2] = px[2].wrapping_add(db);
                }
                OP_RUN => {
                    let run = u64::from(tag & 0x3F) + 1;
                    if emitted + run > total {
                        return Err(Error::InvalidData("QOI run overruns the image".into()));
                    }
                    for _ in 0..run {
                        emit(px, sink, &mut x, &mut y);
                    }
                    emitted += run;
                    continue;
                }
                _ => return Err(Error::Internal("two-bit tag out of range")),
            },
        }
        table[hash(px)] = px;
        emit(px, sink, &mut x, &mut y);
        emitted += 1;
    }

    // End marker: seven 0x00 bytes then 0x01. Checked leniently; a stream
    // that simply stops here decoded completely.
    let mut marker = [0u8; 8];
    let mut got = 0;
    while got < 8 {
        match d.input.read_u8_opt()? {
            Some(byte) => {
                marker[got] = byte;
                got += 1;
            }
            None => break,
        }
    }
    if got == 8 && marker != [0, 0, 0, 0, 0, 0, 0, 1] {
        warn!("QOI end marker malformed: {marker:02x?}");
    }
    Ok(0.0)
}
