//! # depix
//!
//! A streaming image decoder that identifies a compressed image on any byte
//! source and pushes its pixel grid into a caller-supplied sink.
//!
//! - **Formats**: BMP, GIF (including animations), JPEG (baseline and
//!   progressive), PNG (including Adam7), PNM (P1–P6), QOI, TGA. FITS and
//!   TIFF signatures are recognized but their bodies are not decoded.
//! - **Sink-agnostic**: pixels go to a [`PixelSink`] — an in-memory bitmap,
//!   a widget, a file writer — in the sink's own primary-color range
//!   (8 to 16 bits per channel).
//! - **Streaming**: input is any [`std::io::Read`] behind a 1 KiB buffer;
//!   nothing is seeked and no output image is allocated by the library.
//! - **Minimal dependencies**: DEFLATE, CRC-32, Adler-32, LZW, Huffman, and
//!   the inverse DCT are implemented in-crate; the only runtime dependency
//!   is the `log` facade.
//!
//! ## Quickstart
//!
//! ```rust
//! use depix::{load_header, Mode, PixelSink};
//!
//! struct Collect {
//!     pixels: Vec<(u16, u16, u16, u16)>,
//! }
//!
//! impl PixelSink for Collect {
//!     fn set_xy(&mut self, _x: u32, _y: u32) {}
//!     fn put_pixel(&mut self, r: u16, g: u16, b: u16, a: u16) {
//!         self.pixels.push((r, g, b, a));
//!     }
//! }
//!
//! # fn main() -> depix::Result<()> {
//! // A 1x1 white GIF89a.
//! let gif: &[u8] = &[
//!     0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80,
//!     0x00, 0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
//!     0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01,
//!     0x00, 0x3B,
//! ];
//!
//! let mut image = load_header(gif, false)?;
//! assert_eq!((image.width(), image.height()), (1, 1));
//!
//! let mut sink = Collect { pixels: Vec::new() };
//! let next_frame = image.load_contents(&mut sink, Mode::Fast)?;
//! assert_eq!(next_frame, 0.0); // no animation
//! assert_eq!(sink.pixels, vec![(255, 255, 255, 255)]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Animations
//!
//! [`load_contents`](ImageDescriptor::load_contents) returns the decoded
//! frame's display time in seconds. Re-invoke it on the same descriptor
//! while the returned delay is non-zero; cross-frame state (the GIF canvas
//! and disposal bookkeeping) lives inside the descriptor.
//!
//! ## Error model
//!
//! Everything surfaces as [`Error`] from `load_header`/`load_contents`;
//! decoders never partially succeed. Closing the underlying stream makes
//! the next read fail, which is the supported cancellation path.

#![forbid(unsafe_code)]

mod bits;
mod bmp;
mod color;
mod descriptor;
mod error;
mod gif;
mod header;
mod input;
mod jpeg;
mod png;
mod pnm;
mod qoi;
mod sink;
mod tga;
mod zlib;

pub use color::{promote, Rgb8};
pub use descriptor::{Format, ImageDescriptor, Orientation};
pub use error::{Error, Result};
pub use header::load_header;
pub use sink::{Mode, PixelSink};
