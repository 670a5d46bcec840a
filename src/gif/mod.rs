//! GIF decoder: GIF87a/GIF89a, LZW-compressed, with animation support.
//!
//! The stream after the Logical Screen Descriptor is a sequence of blocks
//! tagged by a one-byte introducer: `0x2C` image, `0x21` extension, `0x3B`
//! trailer. Frames composite into a persistent canvas held by the
//! descriptor, so each `load_contents` call emits a complete image and the
//! disposal state carries across calls. The returned delay is the decoded
//! frame's display time; 0.0 means no frame follows.

pub(crate) mod lzw;

use std::io::Read;

use log::{trace, warn};

use crate::bits::LsbReader;
use crate::color::{load_palette_rgb, palette_lookup, promote, Rgb8};
use crate::descriptor::ImageDescriptor;
use crate::error::{Error, Result};
use crate::input::BufferedInput;
use crate::sink::{Mode, PixelSink};

const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_IMAGE: u8 = 0x2C;
const BLOCK_TRAILER: u8 = 0x3B;

const EXT_GRAPHIC_CONTROL: u8 = 0xF9;

/// 4-pass interlace: (starting row, stride, preview block height).
const INTERLACE_PASSES: [(u32, u32, u32); 4] = [(0, 8, 8), (4, 8, 4), (2, 4, 2), (1, 2, 1)];

/// Cross-frame GIF state: the compositing canvas plus the Graphic Control
/// values that apply to the upcoming frame.
#[derive(Debug)]
pub(crate) struct GifState {
    canvas: Vec<[u8; 4]>,
    /// The next frame's image separator was already consumed by the
    /// look-ahead at the end of the previous `load_contents` call.
    pending_image: bool,
    frames_decoded: u32,
    transparent_index: Option<u8>,
    disposal: u8,
    delay: f32,
    prev_disposal: u8,
    prev_rect: (u32, u32, u32, u32),
}

pub(crate) fn read_header<R: Read>(d: &mut ImageDescriptor<R>, version89: bool) -> Result<()> {
    let width = u32::from(d.input.read_u16_le()?);
    let height = u32::from(d.input.read_u16_le()?);
    let packed = d.input.read_u8()?;
    let _background = d.input.read_u8()?;
    let _aspect_ratio = d.input.read_u8()?;

    let gct_bits = u32::from(packed & 0x07);
    if packed & 0x80 != 0 {
        d.palette = load_palette_rgb(&mut d.input, 1usize << (gct_bits + 1))?;
    }

    d.width = width;
    d.height = height;
    // Recorded as palette bits + 1; not cross-checked against the frames.
    d.subformat_id = gct_bits + 1;
    d.bits_per_pixel = gct_bits + 1;
    d.detailed_format = if version89 { "GIF89a" } else { "GIF87a" }.to_string();

    let pixels = width as usize * height as usize;
    d.gif = Some(Box::new(GifState {
        canvas: vec![[0u8; 4]; pixels],
        pending_image: false,
        frames_decoded: 0,
        transparent_index: None,
        disposal: 0,
        delay: 0.0,
        prev_disposal: 0,
        prev_rect: (0, 0, 0, 0),
    }));
    Ok(())
}

/// Walk blocks until an image separator; extensions update `st` on the way.
/// `Ok(false)` means the trailer (or, leniently, end of stream) was reached.
fn next_image<R: Read>(input: &mut BufferedInput<R>, st: &mut GifState) -> Result<bool> {
    loop {
        let introducer = match input.read_u8_opt()? {
            Some(byte) => byte,
            None => {
                warn!("GIF stream ends without a trailer");
                return Ok(false);
            }
        };
        match introducer {
            BLOCK_IMAGE => return Ok(true),
            BLOCK_TRAILER => return Ok(false),
            BLOCK_EXTENSION => read_extension(input, st)?,
            other => {
                return Err(Error::InvalidData(format!(
                    "unexpected GIF block introducer {other:#04x}"
                )))
            }
        }
    }
}

fn read_extension<R: Read>(input: &mut BufferedInput<R>, st: &mut GifState) -> Result<()> {
    let label = input.read_u8()?;
    if label == EXT_GRAPHIC_CONTROL {
        let size = input.read_u8()?;
        if size >= 4 {
            let packed = input.read_u8()?;
            let delay_cs = input.read_u16_le()?;
            let transparent = input.read_u8()?;
            input.skip(size as usize - 4)?;

            let disposal = (packed >> 2) & 0x07;
            if disposal == 3 {
                warn!("GIF restore-to-previous disposal treated as keep");
            }
            st.disposal = disposal;
            st.transparent_index = (packed & 0x01 != 0).then_some(transparent);
            st.delay = f32::from(delay_cs) / 100.0;
            trace!(
                "graphic control: disposal {disposal}, delay {delay_cs} cs, transparent {:?}",
                st.transparent_index
            );
        } else {
            input.skip(size as usize)?;
        }
    } else {
        trace!("skipping GIF extension {label:#04x}");
    }
    // Every extension ends in sub-blocks through a zero-length terminator.
    loop {
        let len = input.read_u8()?;
        if len == 0 {
            return Ok(());
        }
        input.skip(len as usize)?;
    }
}

pub(crate) fn decode<R: Read, S: PixelSink>(
    d: &mut ImageDescriptor<R>,
    sink: &mut S,
    mode: Mode,
) -> Result<f32> {
    let out_bits = sink.sample_bits();
    let ImageDescriptor {
        ref mut input,
        ref mut gif,
        ref mut palette,
        ref mut transparency,
        ref mut interlaced,
        ref mut detailed_format,
        ref mut next_frame,
        width,
        height,
        ..
    } = *d;
    let st = gif
        .as_mut()
        .ok_or(Error::Internal("GIF state missing in descriptor"))?;

    if !st.pending_image {
        if !next_image(input, st)? {
            if st.frames_decoded == 0 {
                return Err(Error::InvalidData("GIF contains no image data".into()));
            }
            *next_frame = 0.0;
            return Ok(0.0);
        }
    }
    st.pending_image = false;

    // Image descriptor.
    let left = u32::from(input.read_u16_le()?);
    let top = u32::from(input.read_u16_le()?);
    let frame_w = u32::from(input.read_u16_le()?);
    let frame_h = u32::from(input.read_u16_le()?);
    let packed = input.read_u8()?;

    if frame_w == 0 || frame_h == 0 {
        return Err(Error::InvalidData("empty GIF frame".into()));
    }
    if left + frame_w > width || top + frame_h > height {
        return Err(Error::InvalidData(format!(
            "GIF frame {frame_w}x{frame_h}+{left}+{top} exceeds the {width}x{height} screen"
        )));
    }

    let local_palette = if packed & 0x80 != 0 {
        load_palette_rgb(input, 1usize << ((packed & 0x07) + 1))?
    } else {
        Vec::new()
    };
    let frame_interlaced = packed & 0x40 != 0;
    if frame_interlaced && !*interlaced {
        *interlaced = true;
        detailed_format.push_str(", interlaced");
    }

    let pal: &[Rgb8] = if !local_palette.is_empty() {
        &local_palette
    } else if !palette.is_empty() {
        palette.as_slice()
    } else {
        return Err(Error::InvalidData("GIF frame has no color table".into()));
    };

    // LZW-compressed index stream.
    let min_code_size = input.read_u8()?;
    let mut indices = vec![0u8; frame_w as usize * frame_h as usize];
    let mut reader = LsbReader::new(input);
    let filled = lzw::decode(&mut reader, min_code_size, &mut indices)?;
    reader.finish()?;
    if filled < indices.len() {
        return Err(Error::InvalidData(format!(
            "LZW data ended after {filled} of {} pixels",
            indices.len()
        )));
    }

    // Dispose of the previous frame before drawing this one.
    if st.frames_decoded > 0 && st.prev_disposal == 2 {
        let (px, py, pw, ph) = st.prev_rect;
        for y in py..py + ph {
            let row = (y * width + px) as usize;
            st.canvas[row..row + pw as usize].fill([0, 0, 0, 0]);
        }
    }

    let transparent = st.transparent_index;
    if transparent.is_some() {
        *transparency = true;
    }
    let frame_delay = st.delay;

    // Decode-order rows: (source row, display row, preview block height).
    let mut rows: Vec<(usize, u32, u32)> = Vec::with_capacity(frame_h as usize);
    if frame_interlaced {
        let mut src = 0usize;
        for &(start, stride, block) in &INTERLACE_PASSES {
            let mut y = start;
            while y < frame_h {
                rows.push((src, y, block));
                src += 1;
                y += stride;
            }
        }
    } else {
        rows.extend((0..frame_h).map(|y| (y as usize, y, 1)));
    }

    for (done, &(src, dy, block)) in rows.iter().enumerate() {
        // Composite one decoded row into the canvas.
        let canvas_row = ((top + dy) * width + left) as usize;
        let src_row = &indices[src * frame_w as usize..(src + 1) * frame_w as usize];
        for (x, &index) in src_row.iter().enumerate() {
            if Some(index) == transparent {
                continue;
            }
            let entry = palette_lookup(pal, index as usize)?;
            st.canvas[canvas_row + x] = [entry.r, entry.g, entry.b, 255];
        }
        if mode == Mode::Nice {
            // Paint the row, replicated over the gap rows its pass leaves.
            for k in 0..block.min(frame_h - dy) {
                sink.set_xy(left, top + dy + k);
                for x in 0..frame_w as usize {
                    let [r, g, b, a] = st.canvas[canvas_row + x];
                    sink.put_pixel(
                        promote(u16::from(r), 8, out_bits),
                        promote(u16::from(g), 8, out_bits),
                        promote(u16::from(b), 8, out_bits),
                        promote(u16::from(a), 8, out_bits),
                    );
                }
            }
            sink.feedback(((done + 1) * 100 / rows.len()) as u8);
        }
    }

    if mode == Mode::Fast {
        // One full-canvas emit: exactly width * height pixels per frame.
        for y in 0..height {
            sink.set_xy(0, y);
            let row = (y * width) as usize;
            for &[r, g, b, a] in &st.canvas[row..row + width as usize] {
                sink.put_pixel(
                    promote(u16::from(r), 8, out_bits),
                    promote(u16::from(g), 8, out_bits),
                    promote(u16::from(b), 8, out_bits),
                    promote(u16::from(a), 8, out_bits),
                );
            }
            sink.feedback(((y + 1) * 100 / height) as u8);
        }
    }

    st.prev_disposal = st.disposal;
    st.prev_rect = (left, top, frame_w, frame_h);
    st.frames_decoded += 1;
    // Graphic Control values apply to exactly one image.
    st.disposal = 0;
    st.transparent_index = None;
    st.delay = 0.0;

    // Look ahead so the last frame reports no follow-up.
    if next_image(input, st)? {
        st.pending_image = true;
        *next_frame = frame_delay;
        Ok(frame_delay)
    } else {
        *next_frame = 0.0;
        Ok(0.0)
    }
}
