//! PNM decoder: the six P1–P6 netpbm variants.
//!
//! The magic digit selects ASCII (P1–P3) or binary (P4–P6) encoding of
//! bitmap, graymap, or pixmap data. Header tokens are whitespace-separated
//! integers with `#` comments running to end of line; for binary variants
//! pixel data begins one whitespace byte after the last header token.
//! Samples scale from the header's `maxval` range to the sink range by
//! rounding division.

use std::io::Read;

use crate::color::scale_maxval;
use crate::descriptor::ImageDescriptor;
use crate::error::{Error, Result};
use crate::input::BufferedInput;
use crate::sink::{Mode, PixelSink};

pub(crate) fn read_header<R: Read>(d: &mut ImageDescriptor<R>, digit: u8) -> Result<()> {
    let width = read_token(&mut d.input)?;
    let height = read_token(&mut d.input)?;
    let maxval = if matches!(digit, 1 | 4) {
        1
    } else {
        let maxval = read_token(&mut d.input)?;
        if !(1..=65535).contains(&maxval) {
            return Err(Error::InvalidData(format!("PNM maxval {maxval}")));
        }
        maxval
    };

    d.width = width;
    d.height = height;
    d.pnm_maxval = maxval;
    d.subformat_id = u32::from(digit);
    d.greyscale = matches!(digit, 1 | 2 | 4 | 5);
    let sample_bits = if maxval > 255 { 16 } else { 8 };
    d.bits_per_pixel = match digit {
        1 | 4 => 1,
        2 | 5 => sample_bits,
        _ => 3 * sample_bits,
    };
    d.detailed_format = format!(
        "PNM P{digit} ({} {})",
        if digit <= 3 { "ASCII" } else { "binary" },
        match digit {
            1 | 4 => "bitmap",
            2 | 5 => "graymap",
            _ => "pixmap",
        }
    );
    Ok(())
}

/// Read a whitespace-delimited decimal token, skipping `#` comments.
/// Consumes exactly one trailing delimiter byte, which is what positions the
/// cursor at the start of binary pixel data after the last header token.
fn read_token<R: Read>(input: &mut BufferedInput<R>) -> Result<u32> {
    let mut byte = input.read_u8()?;
    loop {
        if byte == b'#' {
            while input.read_u8()? != b'\n' {}
            byte = input.read_u8()?;
        } else if byte.is_ascii_whitespace() {
            byte = input.read_u8()?;
        } else {
            break;
        }
    }
    let mut value: u32 = 0;
    let mut any = false;
    while byte.is_ascii_digit() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u32::from(byte - b'0')))
            .ok_or_else(|| Error::InvalidData("PNM token overflows".into()))?;
        any = true;
        match input.read_u8_opt()? {
            Some(next) => byte = next,
            None => break,
        }
    }
    if !any {
        return Err(Error::InvalidData(format!(
            "expected PNM integer, found byte {byte:#04x}"
        )));
    }
    Ok(value)
}

/// Read the next `0`/`1` digit of a P1 bitmap, tolerating packed digits.
fn read_ascii_bit<R: Read>(input: &mut BufferedInput<R>) -> Result<u32> {
    loop {
        let byte = input.read_u8()?;
        match byte {
            b'0' => return Ok(0),
            b'1' => return Ok(1),
            b'#' => while input.read_u8()? != b'\n' {},
            _ if byte.is_ascii_whitespace() => {}
            _ => {
                return Err(Error::InvalidData(format!(
                    "unexpected byte {byte:#04x} in PNM bitmap"
                )))
            }
        }
    }
}

pub(crate) fn decode<R: Read, S: PixelSink>(
    d: &mut ImageDescriptor<R>,
    sink: &mut S,
    _mode: Mode,
) -> Result<f32> {
    let out_bits = sink.sample_bits();
    let alpha = ((1u32 << out_bits) - 1) as u16;
    let maxval = d.pnm_maxval;
    let digit = d.subformat_id;
    let wide = maxval > 255;
    let width = d.width;
    let height = d.height;

    let read_sample = |input: &mut BufferedInput<R>| -> Result<u32> {
        let value = match digit {
            2 | 3 => read_token(input)?,
            5 | 6 if wide => u32::from(input.read_u16_be()?),
            5 | 6 => u32::from(input.read_u8()?),
            _ => return Err(Error::Internal("PNM sample reader on bitmap variant")),
        };
        if value > maxval {
            return Err(Error::InvalidData(format!(
                "PNM sample {value} exceeds maxval {maxval}"
            )));
        }
        Ok(value)
    };

    for y in 0..height {
        sink.set_xy(0, y);
        match digit {
            1 => {
                for _ in 0..width {
                    // 1 is ink (black), 0 is paper (white).
                    let v = if read_ascii_bit(&mut d.input)? == 1 { 0 } else { alpha };
                    sink.put_pixel(v, v, v, alpha);
                }
            }
            4 => {
                let row_bytes = ((width + 7) / 8) as usize;
                let mut row = vec![0u8; row_bytes];
                d.input.read_exact(&mut row)?;
                for x in 0..width as usize {
                    let bit = (row[x / 8] >> (7 - x % 8)) & 1;
                    let v = if bit == 1 { 0 } else { alpha };
                    sink.put_pixel(v, v, v, alpha);
                }
            }
            2 | 5 => {
                for _ in 0..width {
                    let v = scale_maxval(read_sample(&mut d.input)?, maxval, out_bits);
                    sink.put_pixel(v, v, v, alpha);
                }
            }
            3 | 6 => {
                for _ in 0..width {
                    let r = scale_maxval(read_sample(&mut d.input)?, maxval, out_bits);
                    let g = scale_maxval(read_sample(&mut d.input)?, maxval, out_bits);
                    let b = scale_maxval(read_sample(&mut d.input)?, maxval, out_bits);
                    sink.put_pixel(r, g, b, alpha);
                }
            }
            _ => return Err(Error::Internal("PNM digit validated at header time")),
        }
        sink.feedback(((y + 1) * 100 / height) as u8);
    }
    Ok(0.0)
}
