//! Shared fixtures for the conformance tests: a recording sink that checks
//! the emission contract, and small byte-level builders for PNG containers.

#![allow(dead_code)]

use depix::PixelSink;

/// Sink that records every emitted pixel and asserts the sink contract:
/// positions stay inside the declared bounds and progress never decreases.
pub struct RecordingSink {
    pub width: u32,
    pub height: u32,
    pub bits: u32,
    /// (x, y, r, g, b, a) per `put_pixel` call, in call order.
    pub pixels: Vec<(u32, u32, u16, u16, u16, u16)>,
    pub feedback: Vec<u8>,
    x: u32,
    y: u32,
}

impl RecordingSink {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_bits(width, height, 8)
    }

    pub fn with_bits(width: u32, height: u32, bits: u32) -> Self {
        Self {
            width,
            height,
            bits,
            pixels: Vec::new(),
            feedback: Vec::new(),
            x: 0,
            y: 0,
        }
    }

    /// Final value written at (x, y); panics if the position was never hit.
    pub fn pixel(&self, x: u32, y: u32) -> (u16, u16, u16, u16) {
        self.pixels
            .iter()
            .rev()
            .find(|p| p.0 == x && p.1 == y)
            .map(|&(_, _, r, g, b, a)| (r, g, b, a))
            .unwrap_or_else(|| panic!("no pixel emitted at ({x}, {y})"))
    }

    pub fn count(&self) -> usize {
        self.pixels.len()
    }
}

impl PixelSink for RecordingSink {
    fn sample_bits(&self) -> u32 {
        self.bits
    }

    fn set_xy(&mut self, x: u32, y: u32) {
        self.x = x;
        self.y = y;
    }

    fn put_pixel(&mut self, r: u16, g: u16, b: u16, a: u16) {
        assert!(
            self.x < self.width && self.y < self.height,
            "put_pixel at ({}, {}) outside {}x{}",
            self.x,
            self.y,
            self.width,
            self.height
        );
        let max = ((1u32 << self.bits) - 1) as u16;
        for channel in [r, g, b, a] {
            assert!(channel <= max, "sample {channel} exceeds {max}");
        }
        self.pixels.push((self.x, self.y, r, g, b, a));
        self.x += 1;
    }

    fn feedback(&mut self, percent: u8) {
        if let Some(&last) = self.feedback.last() {
            assert!(percent >= last, "feedback went backwards: {last} -> {percent}");
        }
        assert!(percent <= 100);
        self.feedback.push(percent);
    }
}

/// A PNG chunk: length, type, payload, CRC.
pub fn png_chunk(ctype: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut crc = flate2::Crc::new();
    crc.update(ctype);
    crc.update(payload);
    let mut out = Vec::with_capacity(12 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(ctype);
    out.extend_from_slice(payload);
    out.extend_from_slice(&crc.sum().to_be_bytes());
    out
}

pub fn zlib_compress(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn png_ihdr(width: u32, height: u32, depth: u8, color_type: u8, interlace: u8) -> Vec<u8> {
    let mut payload = Vec::with_capacity(13);
    payload.extend_from_slice(&width.to_be_bytes());
    payload.extend_from_slice(&height.to_be_bytes());
    payload.push(depth);
    payload.push(color_type);
    payload.push(0); // compression
    payload.push(0); // filter method
    payload.push(interlace);
    png_chunk(b"IHDR", &payload)
}

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

/// Assemble a whole PNG from raw (filtered) scanline bytes.
pub fn build_png(
    width: u32,
    height: u32,
    depth: u8,
    color_type: u8,
    interlace: u8,
    extra_chunks: &[Vec<u8>],
    raw: &[u8],
) -> Vec<u8> {
    let mut out = PNG_SIGNATURE.to_vec();
    out.extend_from_slice(&png_ihdr(width, height, depth, color_type, interlace));
    for chunk in extra_chunks {
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&png_chunk(b"IDAT", &zlib_compress(raw)));
    out.extend_from_slice(&png_chunk(b"IEND", &[]));
    out
}
