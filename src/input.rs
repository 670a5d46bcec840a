//! Buffered byte input over an opaque stream.
//!
//! [`BufferedInput`] keeps a fixed 1 KiB window over the caller's stream and
//! refills it lazily: the initial cursor sits past the (empty) valid region,
//! so the first read triggers the first refill. Reading past end of stream
//! fails with [`Error::InvalidData`], which is also how a stream closed by
//! the caller mid-decode is reported.

use std::io::Read;

use crate::error::{Error, Result};

/// Size of the sliding input window.
const BUFFER_SIZE: usize = 1024;

/// A 1 KiB buffered reader with endianness-typed integer reads.
#[derive(Debug)]
pub struct BufferedInput<R> {
    stream: R,
    data: [u8; BUFFER_SIZE],
    /// Index of the next byte to hand out; refill runs when it reaches `valid`.
    next_read: usize,
    /// Number of valid bytes currently in `data`.
    valid: usize,
    eof: bool,
}

impl<R: Read> BufferedInput<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            data: [0; BUFFER_SIZE],
            next_read: 0,
            valid: 0,
            eof: false,
        }
    }

    fn refill(&mut self) -> Result<()> {
        if self.eof {
            return Err(Error::InvalidData("read past end of image data".into()));
        }
        let got = self.stream.read(&mut self.data)?;
        if got == 0 {
            self.eof = true;
            return Err(Error::InvalidData("unexpected end of image data".into()));
        }
        self.valid = got;
        self.next_read = 0;
        Ok(())
    }

    /// Read one byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        if self.next_read >= self.valid {
            self.refill()?;
        }
        let byte = self.data[self.next_read];
        self.next_read += 1;
        Ok(byte)
    }

    /// Read one byte, mapping a clean end of stream to `None`.
    ///
    /// Formats that tolerate trailing truncation (QOI end marker, GIF
    /// trailer) use this instead of [`read_u8`](Self::read_u8).
    pub fn read_u8_opt(&mut self) -> Result<Option<u8>> {
        if self.next_read >= self.valid {
            if self.eof {
                return Ok(None);
            }
            let got = self.stream.read(&mut self.data)?;
            if got == 0 {
                self.eof = true;
                return Ok(None);
            }
            self.valid = got;
            self.next_read = 0;
        }
        let byte = self.data[self.next_read];
        self.next_read += 1;
        Ok(Some(byte))
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.next_read >= self.valid {
                self.refill()?;
            }
            let available = self.valid - self.next_read;
            let take = available.min(buf.len() - filled);
            buf[filled..filled + take]
                .copy_from_slice(&self.data[self.next_read..self.next_read + take]);
            self.next_read += take;
            filled += take;
        }
        Ok(())
    }

    /// Discard `count` bytes.
    pub fn skip(&mut self, mut count: usize) -> Result<()> {
        while count > 0 {
            if self.next_read >= self.valid {
                self.refill()?;
            }
            let available = self.valid - self.next_read;
            let take = available.min(count);
            self.next_read += take;
            count -= take;
        }
        Ok(())
    }

    #[inline]
    pub fn read_u16_le(&mut self) -> Result<u16> {
        let lo = self.read_u8()?;
        let hi = self.read_u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    #[inline]
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let hi = self.read_u8()?;
        let lo = self.read_u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    #[inline]
    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    #[inline]
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(u32::from_be_bytes(bytes))
    }
}
