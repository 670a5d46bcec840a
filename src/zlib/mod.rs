//! zlib (RFC 1950) + DEFLATE (RFC 1951) decoder for the PNG path.
//!
//! PNG frames its compressed image data in IDAT chunks; the decoder
//! concatenates their payloads into one zlib stream and inflates it here.
//! Stored, fixed-Huffman, and dynamic-Huffman blocks are supported; the
//! zlib FCHECK and trailing Adler-32 are verified. A preset dictionary
//! (FDICT) never occurs in PNG and is rejected.

pub mod adler32;
pub mod crc32;

use crate::error::{Error, Result};

use adler32::adler32;

const MAX_CODE_BITS: u8 = 15;
const WINDOW_SIZE: usize = 32 * 1024;

// RFC 1951 section 3.2.5 length/distance tables.
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

// Transmission order of code-length code lengths (RFC 1951 section 3.2.7).
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Inflate a zlib-wrapped DEFLATE stream.
///
/// `expected_size` pre-allocates the output and, when given, is validated
/// against the decompressed length (PNG knows the raw image size exactly).
pub(crate) fn inflate(data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
    if data.len() < 6 {
        return Err(Error::InvalidData("zlib stream too short".into()));
    }

    let cmf = data[0];
    let flg = data[1];
    if (cmf & 0x0F) != 8 {
        return Err(Error::InvalidData("zlib compression method is not DEFLATE".into()));
    }
    if (cmf >> 4) > 7 {
        return Err(Error::InvalidData("zlib window size out of range".into()));
    }
    if (u16::from(cmf) * 256 + u16::from(flg)) % 31 != 0 {
        return Err(Error::InvalidData("zlib FCHECK failed".into()));
    }
    if (flg & 0b0010_0000) != 0 {
        return Err(Error::UnsupportedSubformat("zlib preset dictionary".into()));
    }

    let adler_offset = data.len() - 4;
    let expected_adler = u32::from_be_bytes(data[adler_offset..].try_into().unwrap());

    let mut out = Vec::with_capacity(expected_size.unwrap_or(0));
    inflate_blocks(&data[2..adler_offset], &mut out)?;

    let actual_adler = adler32(&out);
    if actual_adler != expected_adler {
        return Err(Error::InvalidData(format!(
            "Adler-32 mismatch: expected {expected_adler:#010x}, got {actual_adler:#010x}"
        )));
    }
    if let Some(expected) = expected_size {
        if out.len() != expected {
            return Err(Error::InvalidData(format!(
                "decompressed size mismatch: expected {expected}, got {}",
                out.len()
            )));
        }
    }
    Ok(out)
}

fn inflate_blocks(input: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut reader = SliceBits::new(input);
    loop {
        let last = reader.take(1)? != 0;
        match reader.take(2)? {
            0 => copy_stored(&mut reader, out)?,
            1 => {
                let (litlen, dist) = fixed_trees();
                decode_block(&mut reader, out, &litlen, &dist)?;
            }
            2 => {
                let (litlen, dist) = dynamic_trees(&mut reader)?;
                decode_block(&mut reader, out, &litlen, &dist)?;
            }
            _ => return Err(Error::InvalidData("reserved DEFLATE block type".into())),
        }
        if last {
            return Ok(());
        }
    }
}

fn copy_stored(reader: &mut SliceBits<'_>, out: &mut Vec<u8>) -> Result<()> {
    reader.align();
    let len = reader.take_u16_aligned()? as usize;
    let nlen = reader.take_u16_aligned()? as usize;
    if len != !nlen & 0xFFFF {
        return Err(Error::InvalidData("stored block LEN/NLEN mismatch".into()));
    }
    let bytes = reader.take_bytes(len)?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn decode_block(
    reader: &mut SliceBits<'_>,
    out: &mut Vec<u8>,
    litlen: &Huffman,
    dist: &Huffman,
) -> Result<()> {
    loop {
        let symbol = litlen.decode(reader)?;
        match symbol {
            0..=255 => out.push(symbol as u8),
            256 => return Ok(()),
            257..=285 => {
                let idx = (symbol - 257) as usize;
                let length =
                    LENGTH_BASE[idx] as usize + reader.take(LENGTH_EXTRA[idx])? as usize;

                let dist_symbol = dist.decode(reader)?;
                if dist_symbol >= 30 {
                    return Err(Error::InvalidData("distance symbol out of range".into()));
                }
                let d = dist_symbol as usize;
                let distance = DIST_BASE[d] as usize + reader.take(DIST_EXTRA[d])? as usize;

                if distance == 0 || distance > out.len() || distance > WINDOW_SIZE {
                    return Err(Error::InvalidData(format!(
                        "invalid back-reference: distance {distance}, output {}",
                        out.len()
                    )));
                }
                // Byte-at-a-time copy handles overlapping matches.
                let end = out.len() + length;
                while out.len() < end {
                    let byte = out[out.len() - distance];
                    out.push(byte);
                }
            }
            _ => return Err(Error::InvalidData("invalid literal/length symbol".into())),
        }
    }
}

fn fixed_trees() -> (Huffman, Huffman) {
    let mut lengths = [0u8; 288];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    let litlen = Huffman::from_lengths(&lengths).expect("fixed literal/length tree");
    let dist = Huffman::from_lengths(&[5u8; 30]).expect("fixed distance tree");
    (litlen, dist)
}

fn dynamic_trees(reader: &mut SliceBits<'_>) -> Result<(Huffman, Huffman)> {
    let hlit = reader.take(5)? as usize + 257;
    let hdist = reader.take(5)? as usize + 1;
    let hclen = reader.take(4)? as usize + 4;

    let mut cl_lengths = [0u8; 19];
    for &slot in CODE_LENGTH_ORDER.iter().take(hclen) {
        cl_lengths[slot] = reader.take(3)? as u8;
    }
    let cl_tree = Huffman::from_lengths(&cl_lengths)?;

    let total = hlit + hdist;
    let mut lengths = Vec::with_capacity(total);
    while lengths.len() < total {
        match cl_tree.decode(reader)? {
            len @ 0..=15 => lengths.push(len as u8),
            16 => {
                let last = *lengths
                    .last()
                    .ok_or_else(|| Error::InvalidData("length repeat with no previous".into()))?;
                let repeat = 3 + reader.take(2)? as usize;
                lengths.extend(std::iter::repeat(last).take(repeat));
            }
            17 => {
                let repeat = 3 + reader.take(3)? as usize;
                lengths.extend(std::iter::repeat(0u8).take(repeat));
            }
            18 => {
                let repeat = 11 + reader.take(7)? as usize;
                lengths.extend(std::iter::repeat(0u8).take(repeat));
            }
            _ => return Err(Error::InvalidData("invalid code-length symbol".into())),
        }
        if lengths.len() > total {
            return Err(Error::InvalidData("code lengths overrun header counts".into()));
        }
    }

    let dist_lengths = &lengths[hlit..];
    if dist_lengths.iter().all(|&l| l == 0) {
        return Err(Error::InvalidData("distance tree has no codes".into()));
    }

    let litlen = Huffman::from_lengths(&lengths[..hlit])?;
    let dist = Huffman::from_lengths(dist_lengths)?;
    Ok((litlen, dist))
}

/// LSB-first bit cursor over the assembled zlib payload.
struct SliceBits<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u32,
    bit_count: u8,
}

impl<'a> SliceBits<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bit_count: 0,
        }
    }

    fn take(&mut self, bits: u8) -> Result<u32> {
        if bits == 0 {
            return Ok(0);
        }
        while self.bit_count < bits {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| Error::InvalidData("DEFLATE stream truncated".into()))?;
            self.bit_buf |= u32::from(byte) << self.bit_count;
            self.bit_count += 8;
            self.pos += 1;
        }
        let value = self.bit_buf & ((1u32 << bits) - 1);
        self.bit_buf >>= bits;
        self.bit_count -= bits;
        Ok(value)
    }

    fn align(&mut self) {
        let drop = self.bit_count % 8;
        self.bit_buf >>= drop;
        self.bit_count -= drop;
    }

    fn take_u16_aligned(&mut self) -> Result<u16> {
        debug_assert_eq!(self.bit_count % 8, 0);
        if self.bit_count >= 16 {
            let v = (self.bit_buf & 0xFFFF) as u16;
            self.bit_buf >>= 16;
            self.bit_count -= 16;
            return Ok(v);
        }
        let lo = self.take(8)? as u8;
        let hi = self.take(8)? as u8;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        debug_assert_eq!(self.bit_count, 0);
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::InvalidData("stored block overruns input".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// Canonical Huffman decoding table: per-length counts plus the first code
/// and first symbol index of each length.
pub(crate) struct Huffman {
    counts: [u16; MAX_CODE_BITS as usize + 1],
    first_code: [u16; MAX_CODE_BITS as usize + 1],
    first_symbol: [u16; MAX_CODE_BITS as usize + 1],
    symbols: Vec<u16>,
    max_bits: u8,
}

impl Huffman {
    pub(crate) fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_BITS as usize + 1];
        for &len in lengths {
            if len > MAX_CODE_BITS {
                return Err(Error::InvalidData("Huffman code length exceeds 15".into()));
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;
        let max_bits = (1..=MAX_CODE_BITS)
            .rev()
            .find(|&b| counts[b as usize] > 0)
            .ok_or_else(|| Error::InvalidData("Huffman table has no codes".into()))?;

        let mut first_code = [0u16; MAX_CODE_BITS as usize + 1];
        let mut next_code = [0u16; MAX_CODE_BITS as usize + 1];
        let mut code = 0u16;
        for bits in 1..=MAX_CODE_BITS as usize {
            code = (code + counts[bits - 1]) << 1;
            first_code[bits] = code;
            next_code[bits] = code;
        }

        let mut first_symbol = [0u16; MAX_CODE_BITS as usize + 1];
        let mut sum = 0u16;
        for bits in 1..=MAX_CODE_BITS as usize {
            first_symbol[bits] = sum;
            sum += counts[bits];
        }

        let mut symbols = vec![0u16; lengths.len()];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let len = len as usize;
            let slot = first_symbol[len] + (next_code[len] - first_code[len]);
            symbols[slot as usize] = symbol as u16;
            next_code[len] += 1;
        }

        Ok(Self {
            counts,
            first_code,
            first_symbol,
            symbols,
            max_bits,
        })
    }

    fn decode(&self, reader: &mut SliceBits<'_>) -> Result<u16> {
        let mut code = 0u16;
        for len in 1..=self.max_bits as usize {
            code = (code << 1) | reader.take(1)? as u16;
            let count = self.counts[len];
            if count == 0 {
                continue;
            }
            let first = self.first_code[len];
            if code >= first && code < first + count {
                let slot = self.first_symbol[len] + (code - first);
                return Ok(self.symbols[slot as usize]);
            }
        }
        Err(Error::InvalidData("invalid Huffman code".into()))
    }
}
