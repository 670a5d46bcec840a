//! PNG decoder: chunked container, zlib-compressed filtered scanlines,
//! optional Adam7 interlacing.
//!
//! All IDAT payloads concatenate into a single zlib stream. Each inflated
//! scanline starts with a filter code whose inverse operates bytewise on the
//! packed row. Chunks this decoder reads are CRC-verified; unknown chunks
//! are skipped. Missing `IEND` is an error even when every pixel arrived.

use std::io::Read;

use log::{trace, warn};

use crate::color::{palette_lookup, promote, Rgb8};
use crate::descriptor::ImageDescriptor;
use crate::error::{Error, Result};
use crate::input::BufferedInput;
use crate::sink::{Mode, PixelSink};
use crate::zlib;
use crate::zlib::crc32::Crc32;

const COLOR_GREY: u8 = 0;
const COLOR_RGB: u8 = 2;
const COLOR_INDEXED: u8 = 3;
const COLOR_GREY_ALPHA: u8 = 4;
const COLOR_RGBA: u8 = 6;

/// Adam7 sub-images: (x offset, y offset, x stride, y stride).
const ADAM7: [(u32, u32, u32, u32); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

/// Preview block painted per pass pixel in `Nice` mode.
const ADAM7_BLOCK: [(u32, u32); 7] = [(8, 8), (4, 8), (4, 4), (2, 4), (2, 2), (1, 2), (1, 1)];

fn chunk_head<R: Read>(input: &mut BufferedInput<R>) -> Result<(u32, [u8; 4])> {
    let len = input.read_u32_be()?;
    if len > 0x7FFF_FFFF {
        return Err(Error::InvalidData(format!("PNG chunk length {len}")));
    }
    let mut ctype = [0u8; 4];
    input.read_exact(&mut ctype)?;
    Ok((len, ctype))
}

/// Read a chunk payload and verify its CRC.
fn chunk_payload<R: Read>(
    input: &mut BufferedInput<R>,
    ctype: &[u8; 4],
    len: u32,
) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; len as usize];
    input.read_exact(&mut payload)?;
    let stored = input.read_u32_be()?;
    let mut crc = Crc32::new();
    crc.update(ctype);
    crc.update(&payload);
    let computed = crc.finalize();
    if stored != computed {
        return Err(Error::InvalidData(format!(
            "CRC mismatch in {} chunk: stored {stored:#010x}, computed {computed:#010x}",
            String::from_utf8_lossy(ctype)
        )));
    }
    Ok(payload)
}

pub(crate) fn read_header<R: Read>(d: &mut ImageDescriptor<R>) -> Result<()> {
    let (len, ctype) = chunk_head(&mut d.input)?;
    if &ctype != b"IHDR" || len != 13 {
        return Err(Error::InvalidData("PNG does not start with IHDR".into()));
    }
    let ihdr = chunk_payload(&mut d.input, &ctype, len)?;

    let width = u32::from_be_bytes(ihdr[0..4].try_into().unwrap());
    let height = u32::from_be_bytes(ihdr[4..8].try_into().unwrap());
    let depth = u32::from(ihdr[8]);
    let color_type = ihdr[9];
    let compression = ihdr[10];
    let filter = ihdr[11];
    let interlace = ihdr[12];

    if compression != 0 || filter != 0 {
        return Err(Error::InvalidData(format!(
            "PNG compression {compression} / filter method {filter}"
        )));
    }
    if interlace > 1 {
        return Err(Error::InvalidData(format!("PNG interlace method {interlace}")));
    }
    let depth_ok = match color_type {
        COLOR_GREY => matches!(depth, 1 | 2 | 4 | 8 | 16),
        COLOR_INDEXED => matches!(depth, 1 | 2 | 4 | 8),
        COLOR_RGB | COLOR_GREY_ALPHA | COLOR_RGBA => matches!(depth, 8 | 16),
        _ => return Err(Error::InvalidData(format!("PNG color type {color_type}"))),
    };
    if !depth_ok {
        return Err(Error::InvalidData(format!(
            "PNG bit depth {depth} with color type {color_type}"
        )));
    }

    d.width = width;
    d.height = height;
    d.subformat_id = u32::from(color_type);
    d.interlaced = interlace == 1;
    d.greyscale = matches!(color_type, COLOR_GREY | COLOR_GREY_ALPHA);
    d.transparency = matches!(color_type, COLOR_GREY_ALPHA | COLOR_RGBA);
    d.bits_per_pixel = depth * u32::from(channels(color_type));
    let name = match color_type {
        COLOR_GREY => "greyscale",
        COLOR_RGB => "RGB",
        COLOR_INDEXED => "indexed",
        COLOR_GREY_ALPHA => "greyscale+alpha",
        _ => "RGBA",
    };
    d.detailed_format = format!(
        "PNG, color type {color_type} ({name}), {depth}-bit{}",
        if d.interlaced { ", interlaced" } else { "" }
    );
    Ok(())
}

fn channels(color_type: u8) -> u8 {
    match color_type {
        COLOR_RGB => 3,
        COLOR_GREY_ALPHA => 2,
        COLOR_RGBA => 4,
        _ => 1,
    }
}

/// Scalar Paeth predictor (PNG filter 4). Ties break left, up, upper-left.
#[inline]
pub(crate) fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn unfilter_row(filter: u8, cur: &mut [u8], prev: &[u8], step: usize) -> Result<()> {
    match filter {
        0 => {}
        1 => {
            for i in step..cur.len() {
                cur[i] = cur[i].wrapping_add(cur[i - step]);
            }
        }
        2 => {
            for i in 0..cur.len() {
                cur[i] = cur[i].wrapping_add(prev[i]);
            }
        }
        3 => {
            for i in 0..cur.len() {
                let left = if i >= step { cur[i - step] } else { 0 };
                let avg = ((u16::from(left) + u16::from(prev[i])) / 2) as u8;
                cur[i] = cur[i].wrapping_add(avg);
            }
        }
        4 => {
            for i in 0..cur.len() {
                let left = if i >= step { cur[i - step] } else { 0 };
                let upper_left = if i >= step { prev[i - step] } else { 0 };
                cur[i] = cur[i].wrapping_add(paeth_predictor(left, prev[i], upper_left));
            }
        }
        other => return Err(Error::InvalidData(format!("PNG filter code {other}"))),
    }
    Ok(())
}

/// MSB-first sample cursor over a packed, unfiltered scanline.
struct Samples<'a> {
    data: &'a [u8],
    depth: u32,
    bit_pos: usize,
}

impl Samples<'_> {
    #[inline]
    fn next(&mut self) -> u16 {
        let value = match self.depth {
            16 => {
                let i = self.bit_pos / 8;
                u16::from_be_bytes([self.data[i], self.data[i + 1]])
            }
            8 => u16::from(self.data[self.bit_pos / 8]),
            d => {
                let i = self.bit_pos / 8;
                let shift = 8 - self.bit_pos % 8 - d as usize;
                u16::from((self.data[i] >> shift) & ((1u16 << d) - 1) as u8)
            }
        };
        self.bit_pos += self.depth as usize;
        value
    }
}

pub(crate) fn decode<R: Read, S: PixelSink>(
    d: &mut ImageDescriptor<R>,
    sink: &mut S,
    mode: Mode,
) -> Result<f32> {
    let out_bits = sink.sample_bits();
    let alpha_max = ((1u32 << out_bits) - 1) as u16;
    let width = d.width;
    let height = d.height;
    let color_type = d.subformat_id as u8;
    let nchan = u32::from(channels(color_type));
    let depth = d.bits_per_pixel / nchan;
    let interlaced = d.interlaced;

    // Gather chunks through IEND.
    let mut idat: Vec<u8> = Vec::new();
    let mut trns: Option<Vec<u8>> = None;
    loop {
        let (len, ctype) = chunk_head(&mut d.input)?;
        match &ctype {
            b"PLTE" => {
                if len == 0 || len % 3 != 0 || len / 3 > 256 {
                    return Err(Error::InvalidData(format!("PLTE length {len}")));
                }
                let payload = chunk_payload(&mut d.input, &ctype, len)?;
                d.palette = payload
                    .chunks_exact(3)
                    .map(|rgb| Rgb8 {
                        r: rgb[0],
                        g: rgb[1],
                        b: rgb[2],
                    })
                    .collect();
                trace!("PLTE: {} entries", d.palette.len());
            }
            b"tRNS" => {
                let payload = chunk_payload(&mut d.input, &ctype, len)?;
                d.transparency = true;
                trns = Some(payload);
            }
            b"IDAT" => {
                let payload = chunk_payload(&mut d.input, &ctype, len)?;
                idat.extend_from_slice(&payload);
            }
            b"IEND" => {
                if len != 0 {
                    return Err(Error::InvalidData("IEND carries data".into()));
                }
                chunk_payload(&mut d.input, &ctype, 0)?;
                break;
            }
            other => {
                trace!("skipping chunk {}", String::from_utf8_lossy(other));
                d.input.skip(len as usize + 4)?;
            }
        }
    }
    if idat.is_empty() {
        return Err(Error::InvalidData("PNG has no IDAT data".into()));
    }
    if color_type == COLOR_INDEXED && d.palette.is_empty() {
        return Err(Error::InvalidData("indexed PNG without PLTE".into()));
    }

    // Transparency keys per color type.
    let mut trns_grey: Option<u16> = None;
    let mut trns_rgb: Option<(u16, u16, u16)> = None;
    let mut trns_alpha: &[u8] = &[];
    if let Some(payload) = trns.as_deref() {
        match color_type {
            COLOR_GREY if payload.len() >= 2 => {
                trns_grey = Some(u16::from_be_bytes([payload[0], payload[1]]));
            }
            COLOR_RGB if payload.len() >= 6 => {
                trns_rgb = Some((
                    u16::from_be_bytes([payload[0], payload[1]]),
                    u16::from_be_bytes([payload[2], payload[3]]),
                    u16::from_be_bytes([payload[4], payload[5]]),
                ));
            }
            COLOR_INDEXED => trns_alpha = payload,
            _ => warn!("tRNS ignored for color type {color_type}"),
        }
    }

    let passes: &[(u32, u32, u32, u32)] = if interlaced { &ADAM7 } else { &[(0, 0, 1, 1)] };
    let pass_dims = |&(x0, y0, dx, dy): &(u32, u32, u32, u32)| -> (u32, u32) {
        let wp = if width > x0 { (width - x0 + dx - 1) / dx } else { 0 };
        let hp = if height > y0 { (height - y0 + dy - 1) / dy } else { 0 };
        (wp, hp)
    };
    let row_bytes = |wp: u32| -> usize { (wp as usize * nchan as usize * depth as usize + 7) / 8 };

    let expected: usize = passes
        .iter()
        .map(|pass| {
            let (wp, hp) = pass_dims(pass);
            if wp == 0 || hp == 0 {
                0
            } else {
                hp as usize * (1 + row_bytes(wp))
            }
        })
        .sum();
    let raw = zlib::inflate(&idat, Some(expected))?;

    let total_rows: usize = passes
        .iter()
        .map(|pass| {
            let (wp, hp) = pass_dims(pass);
            if wp == 0 { 0 } else { hp as usize }
        })
        .sum();
    let step = ((nchan * depth + 7) / 8).max(1) as usize;
    let mut cursor = 0usize;
    let mut rows_done = 0usize;

    for (pass_index, pass) in passes.iter().enumerate() {
        let &(x0, y0, dx, dy) = pass;
        let (wp, hp) = pass_dims(pass);
        if wp == 0 || hp == 0 {
            continue;
        }
        let rb = row_bytes(wp);
        let mut prev = vec![0u8; rb];
        let mut cur = vec![0u8; rb];

        for row in 0..hp {
            let filter = raw[cursor];
            cursor += 1;
            cur.copy_from_slice(&raw[cursor..cursor + rb]);
            cursor += rb;
            unfilter_row(filter, &mut cur, &prev, step)?;

            let y = y0 + row * dy;
            let mut samples = Samples {
                data: &cur,
                depth,
                bit_pos: 0,
            };
            if !interlaced {
                sink.set_xy(0, y);
            }
            for px in 0..wp {
                let (r, g, b, a) = match color_type {
                    COLOR_GREY => {
                        let v = samples.next();
                        let a = if trns_grey == Some(v) { 0 } else { alpha_max };
                        let v = promote(v, depth, out_bits);
                        (v, v, v, a)
                    }
                    COLOR_RGB => {
                        let (r, g, b) = (samples.next(), samples.next(), samples.next());
                        let a = if trns_rgb == Some((r, g, b)) { 0 } else { alpha_max };
                        (
                            promote(r, depth, out_bits),
                            promote(g, depth, out_bits),
                            promote(b, depth, out_bits),
                            a,
                        )
                    }
                    COLOR_INDEXED => {
                        let index = samples.next() as usize;
                        let entry = palette_lookup(&d.palette, index)?;
                        let a = trns_alpha.get(index).copied().unwrap_or(255);
                        (
                            promote(u16::from(entry.r), 8, out_bits),
                            promote(u16::from(entry.g), 8, out_bits),
                            promote(u16::from(entry.b), 8, out_bits),
                            promote(u16::from(a), 8, out_bits),
                        )
                    }
                    COLOR_GREY_ALPHA => {
                        let v = samples.next();
                        let a = samples.next();
                        let v = promote(v, depth, out_bits);
                        (v, v, v, promote(a, depth, out_bits))
                    }
                    _ => {
                        let (r, g, b, a) =
                            (samples.next(), samples.next(), samples.next(), samples.next());
                        (
                            promote(r, depth, out_bits),
                            promote(g, depth, out_bits),
                            promote(b, depth, out_bits),
                            promote(a, depth, out_bits),
                        )
                    }
                };

                if !interlaced {
                    sink.put_pixel(r, g, b, a);
                } else {
                    let x = x0 + px * dx;
                    match mode {
                        Mode::Fast => {
                            sink.set_xy(x, y);
                            sink.put_pixel(r, g, b, a);
                        }
                        Mode::Nice => {
                            let (bw, bh) = ADAM7_BLOCK[pass_index];
                            for by in 0..bh.min(height - y) {
                                sink.set_xy(x, y + by);
                                for _ in 0..bw.min(width - x) {
                                    sink.put_pixel(r, g, b, a);
                                }
                            }
                        }
                    }
                }
            }
            std::mem::swap(&mut prev, &mut cur);
            rows_done += 1;
            sink.feedback((rows_done * 100 / total_rows) as u8);
        }
    }
    Ok(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paeth_spec_properties() {
        assert_eq!(paeth_predictor(0, 0, 0), 0);
        assert_eq!(paeth_predictor(255, 0, 0), 255);
        // Ties prefer left over up over upper-left.
        assert_eq!(paeth_predictor(5, 5, 5), 5);
        assert_eq!(paeth_predictor(1, 2, 3), 1);
    }

    #[test]
    fn unfilter_sub_accumulates() {
        let mut row = vec![1u8, 1, 1, 1];
        let prev = vec![0u8; 4];
        unfilter_row(1, &mut row, &prev, 1).unwrap();
        assert_eq!(row, [1, 2, 3, 4]);
    }

    #[test]
    fn unfilter_up_adds_previous_row() {
        let mut row = vec![1u8, 2, 3];
        let prev = vec![10u8, 20, 30];
        unfilter_row(2, &mut row, &prev, 1).unwrap();
        assert_eq!(row, [11, 22, 33]);
    }

    #[test]
    fn unfilter_average_halves() {
        let mut row = vec![10u8, 10];
        let prev = vec![4u8, 4];
        unfilter_row(3, &mut row, &prev, 1).unwrap();
        // First byte: left 0, up 4 -> +2; second: left 12, up 4 -> +8.
        assert_eq!(row, [12, 18]);
    }

    #[test]
    fn unfilter_rejects_unknown_code() {
        let mut row = vec![0u8; 2];
        assert!(unfilter_row(9, &mut row, &[0, 0], 1).is_err());
    }

    #[test]
    fn sub_byte_samples_unpack_msb_first() {
        let data = [0b1001_0110];
        let mut samples = Samples {
            data: &data,
            depth: 2,
            bit_pos: 0,
        };
        assert_eq!(samples.next(), 0b10);
        assert_eq!(samples.next(), 0b01);
        assert_eq!(samples.next(), 0b01);
        assert_eq!(samples.next(), 0b10);
    }
}
