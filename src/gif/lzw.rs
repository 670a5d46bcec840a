//! LZW decompressor for GIF image data.
//!
//! Variable-width codes, LSB-first across sub-blocks, with the dictionary
//! held as prefix/suffix tables and strings expanded through a reversal
//! stack. The code width starts at `min_code_size + 1` and grows whenever
//! the dictionary reaches `2^width`, capping at 12 bits (4096 entries).

use std::io::Read;

use crate::bits::LsbReader;
use crate::error::{Error, Result};

const MAX_CODES: usize = 4096;

/// Decode LZW data into `out`, returning the number of bytes produced.
///
/// Decoding stops at the EOI code, when the bit stream ends, or when `out`
/// is full — whichever comes first. Surplus pixels past the end of `out`
/// are dropped, matching how oversized final codes are conventionally
/// tolerated.
pub(crate) fn decode<R: Read>(
    reader: &mut LsbReader<'_, R>,
    min_code_size: u8,
    out: &mut [u8],
) -> Result<usize> {
    if !(2..=11).contains(&min_code_size) {
        return Err(Error::InvalidData(format!(
            "LZW minimum code size {min_code_size}"
        )));
    }
    let clear: u16 = 1 << min_code_size;
    let eoi: u16 = clear + 1;

    let mut prefix = [0u16; MAX_CODES];
    let mut suffix = [0u8; MAX_CODES];
    let mut stack: Vec<u8> = Vec::with_capacity(MAX_CODES);

    let mut code_size = min_code_size + 1;
    let mut next_code = eoi + 1;
    let mut prev: Option<u16> = None;
    let mut first_char = 0u8;
    let mut written = 0usize;

    while written < out.len() {
        let code = match reader.read_code(code_size) {
            Ok(code) => code,
            // A stream that stops mid-code is reported by the caller when
            // it sees the short pixel count.
            Err(_) => break,
        };

        if code == clear {
            code_size = min_code_size + 1;
            next_code = eoi + 1;
            prev = None;
            continue;
        }
        if code == eoi {
            break;
        }

        let mut walk = code;
        if code >= next_code {
            // Only the K-omega case may reference the not-yet-added entry.
            if code != next_code || prev.is_none() {
                return Err(Error::InvalidData(format!("LZW code {code} out of range")));
            }
            stack.push(first_char);
            walk = prev.unwrap();
        }
        while walk >= clear {
            stack.push(suffix[walk as usize]);
            walk = prefix[walk as usize];
        }
        first_char = walk as u8;
        stack.push(first_char);

        while let Some(byte) = stack.pop() {
            if written < out.len() {
                out[written] = byte;
                written += 1;
            }
        }

        if let Some(p) = prev {
            if next_code < MAX_CODES as u16 {
                prefix[next_code as usize] = p;
                suffix[next_code as usize] = first_char;
                next_code += 1;
                if next_code == (1 << code_size) && code_size < 12 {
                    code_size += 1;
                }
            }
        }
        prev = Some(code);
    }
    Ok(written)
}
