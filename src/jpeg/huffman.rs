//! Canonical Huffman decoding tables for JPEG DHT segments.
//!
//! A DHT segment carries `bits[1..=16]` (code count per length) and the
//! symbol values ordered by length then code. Decoding walks the canonical
//! code space one bit at a time against per-length first-code/first-symbol
//! tables, the same scheme the DEFLATE decoder uses, in the MSB-first
//! discipline JPEG requires.

use std::io::Read;

use crate::bits::MsbReader;
use crate::error::{Error, Result};

const MAX_BITS: usize = 16;

#[derive(Debug)]
pub(crate) struct HuffTable {
    counts: [u16; MAX_BITS + 1],
    first_code: [u32; MAX_BITS + 1],
    first_symbol: [u16; MAX_BITS + 1],
    symbols: Vec<u8>,
}

impl HuffTable {
    /// Build from a DHT `bits` array and its value list.
    pub fn build(bits: &[u8; 16], symbols: Vec<u8>) -> Result<Self> {
        let mut counts = [0u16; MAX_BITS + 1];
        let mut total = 0usize;
        for (len, &count) in bits.iter().enumerate() {
            counts[len + 1] = u16::from(count);
            total += count as usize;
        }
        if total == 0 || total > 256 || total != symbols.len() {
            return Err(Error::InvalidData(format!(
                "Huffman table declares {total} codes for {} symbols",
                symbols.len()
            )));
        }

        let mut first_code = [0u32; MAX_BITS + 1];
        let mut first_symbol = [0u16; MAX_BITS + 1];
        let mut code = 0u32;
        let mut symbol = 0u16;
        for len in 1..=MAX_BITS {
            first_code[len] = code;
            first_symbol[len] = symbol;
            code += u32::from(counts[len]);
            if code > (1u32 << len) {
                return Err(Error::InvalidData("oversubscribed Huffman table".into()));
            }
            code <<= 1;
            symbol += counts[len];
        }

        Ok(Self {
            counts,
            first_code,
            first_symbol,
            symbols,
        })
    }

    /// Decode one symbol from the entropy stream.
    pub fn decode<R: Read>(&self, reader: &mut MsbReader<'_, R>) -> Result<u8> {
        let mut code = 0u32;
        for len in 1..=MAX_BITS {
            code = (code << 1) | reader.read_bit()?;
            let count = self.counts[len];
            if count == 0 {
                continue;
            }
            let first = self.first_code[len];
            if code >= first && code < first + u32::from(count) {
                let slot = usize::from(self.first_symbol[len]) + (code - first) as usize;
                return Ok(self.symbols[slot]);
            }
        }
        Err(Error::InvalidData("invalid JPEG Huffman code".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::BufferedInput;

    #[test]
    fn single_code_table() {
        // One 1-bit code "0" mapping to symbol 7.
        let mut bits = [0u8; 16];
        bits[0] = 1;
        let table = HuffTable::build(&bits, vec![7]).unwrap();

        let data = [0b0000_0000, 0x00];
        let mut input = BufferedInput::new(&data[..]);
        let mut reader = MsbReader::new(&mut input);
        assert_eq!(table.decode(&mut reader).unwrap(), 7);
    }

    #[test]
    fn two_level_table() {
        // Codes: "0" -> 1, "10" -> 2, "11" -> 3.
        let mut bits = [0u8; 16];
        bits[0] = 1;
        bits[1] = 2;
        let table = HuffTable::build(&bits, vec![1, 2, 3]).unwrap();

        // Stream: 0 10 11 -> byte 0b01011...
        let data = [0b0101_1000, 0x00];
        let mut input = BufferedInput::new(&data[..]);
        let mut reader = MsbReader::new(&mut input);
        assert_eq!(table.decode(&mut reader).unwrap(), 1);
        assert_eq!(table.decode(&mut reader).unwrap(), 2);
        assert_eq!(table.decode(&mut reader).unwrap(), 3);
    }

    #[test]
    fn rejects_oversubscribed() {
        let mut bits = [0u8; 16];
        bits[0] = 3; // three 1-bit codes cannot exist
        assert!(HuffTable::build(&bits, vec![1, 2, 3]).is_err());
    }

    #[test]
    fn rejects_count_mismatch() {
        let mut bits = [0u8; 16];
        bits[0] = 1;
        assert!(HuffTable::build(&bits, vec![1, 2]).is_err());
    }
}
