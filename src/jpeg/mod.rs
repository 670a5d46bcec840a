//! JPEG decoder: baseline and progressive DCT, 8-bit precision.
//!
//! The stream is marker-driven. `load_header` consumes markers up to the
//! frame header (SOF), carrying tables seen on the way in the descriptor's
//! [`JpegState`]; `load_contents` continues with the scans. Scans decode
//! into per-component coefficient planes (progressive scans refine them by
//! spectral selection and successive approximation); after EOI the planes
//! are dequantized, inverse-transformed, upsampled by replication, and
//! converted to RGB.
//!
//! Not supported: arithmetic coding, lossless and hierarchical modes,
//! 12-bit precision, Adobe YCCK.

pub(crate) mod huffman;
pub(crate) mod idct;

use std::io::Read;

use log::{debug, trace, warn};

use crate::bits::MsbReader;
use crate::color::{cmyk_to_rgb, promote, ycbcr_to_rgb};
use crate::descriptor::{ImageDescriptor, Orientation};
use crate::error::{Error, Result};
use crate::input::BufferedInput;
use crate::sink::{Mode, PixelSink};

use huffman::HuffTable;
use idct::idct_block;

// Marker codes (the byte following 0xFF).
const SOF0: u8 = 0xC0; // baseline DCT
const SOF1: u8 = 0xC1; // extended sequential, Huffman
const SOF2: u8 = 0xC2; // progressive DCT
const DHT: u8 = 0xC4;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DNL: u8 = 0xDC;
const DRI: u8 = 0xDD;
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const APP14: u8 = 0xEE;
const APP15: u8 = 0xEF;
const COM: u8 = 0xFE;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;

/// Zigzag scan position -> natural (row-major) block position.
const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColorSpace {
    Grey,
    YCbCr,
    Cmyk,
}

#[derive(Debug, Clone)]
pub(crate) struct Component {
    id: u8,
    h: u32,
    v: u32,
    quant_index: usize,
    /// Unaligned sample dimensions at this component's resolution.
    width: u32,
    height: u32,
    /// MCU-aligned block grid.
    blocks_w: u32,
    blocks_h: u32,
}

/// Tables and frame data carried in the descriptor across the
/// header/contents split: everything seen before (and between) scans.
#[derive(Debug)]
pub(crate) struct JpegState {
    quant: [[u16; 64]; 4],
    quant_defined: [bool; 4],
    dc_tables: [Option<HuffTable>; 4],
    ac_tables: [Option<HuffTable>; 4],
    components: Vec<Component>,
    color: ColorSpace,
    restart_interval: u32,
    max_h: u32,
    max_v: u32,
    progressive: bool,
    adobe_transform: Option<u8>,
}

impl JpegState {
    fn new() -> Self {
        Self {
            quant: [[0; 64]; 4],
            quant_defined: [false; 4],
            dc_tables: [None, None, None, None],
            ac_tables: [None, None, None, None],
            components: Vec::new(),
            color: ColorSpace::Grey,
            restart_interval: 0,
            max_h: 1,
            max_v: 1,
            progressive: false,
            adobe_transform: None,
        }
    }
}

/// Advance to the next marker; fill bytes (extra 0xFF) are allowed.
fn next_marker<R: Read>(input: &mut BufferedInput<R>) -> Result<u8> {
    let byte = input.read_u8()?;
    if byte != 0xFF {
        return Err(Error::InvalidData(format!(
            "expected JPEG marker, found {byte:#04x}"
        )));
    }
    loop {
        let marker = input.read_u8()?;
        if marker != 0xFF {
            return Ok(marker);
        }
    }
}

fn segment_length<R: Read>(input: &mut BufferedInput<R>) -> Result<usize> {
    let len = input.read_u16_be()?;
    if len < 2 {
        return Err(Error::InvalidData(format!("JPEG segment length {len}")));
    }
    Ok(len as usize - 2)
}

fn skip_segment<R: Read>(input: &mut BufferedInput<R>) -> Result<()> {
    let len = segment_length(input)?;
    input.skip(len)
}

fn read_segment<R: Read>(input: &mut BufferedInput<R>) -> Result<Vec<u8>> {
    let len = segment_length(input)?;
    let mut payload = vec![0u8; len];
    input.read_exact(&mut payload)?;
    Ok(payload)
}

pub(crate) fn read_header<R: Read>(d: &mut ImageDescriptor<R>) -> Result<()> {
    let mut st = Box::new(JpegState::new());
    loop {
        let marker = next_marker(&mut d.input)?;
        match marker {
            SOF0 | SOF1 | SOF2 => {
                let (width, height) = read_sof(&mut d.input, &mut st, marker)?;
                let ncomp = st.components.len() as u32;
                d.width = width;
                d.height = height;
                d.bits_per_pixel = ncomp * 8;
                d.greyscale = ncomp == 1;
                d.interlaced = st.progressive;
                d.subformat_id = u32::from(marker - SOF0);
                d.detailed_format = format!(
                    "JPEG, {}",
                    match marker {
                        SOF0 => "baseline",
                        SOF1 => "extended sequential",
                        _ => "progressive",
                    }
                );
                d.jpeg = Some(st);
                return Ok(());
            }
            0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                return Err(Error::UnsupportedSubformat(format!(
                    "JPEG frame type {marker:#04x} (arithmetic, lossless, or hierarchical)"
                )))
            }
            DQT => read_dqt(&mut d.input, &mut st)?,
            DHT => read_dht(&mut d.input, &mut st)?,
            DRI => read_dri(&mut d.input, &mut st)?,
            APP1 => {
                let payload = read_segment(&mut d.input)?;
                if let Some(orientation) = exif_orientation(&payload) {
                    trace!("Exif orientation {orientation:?}");
                    d.orientation = orientation;
                }
            }
            APP14 => {
                let payload = read_segment(&mut d.input)?;
                if payload.len() >= 12 && payload.starts_with(b"Adobe") {
                    st.adobe_transform = Some(payload[11]);
                    trace!("Adobe APP14 transform {}", payload[11]);
                }
            }
            APP0 | 0xE2..=0xED | APP15 | COM | DNL => skip_segment(&mut d.input)?,
            SOI => return Err(Error::InvalidData("nested SOI marker".into())),
            SOS | EOI => {
                return Err(Error::InvalidData(format!(
                    "marker {marker:#04x} before the JPEG frame header"
                )))
            }
            other => {
                return Err(Error::InvalidData(format!(
                    "unexpected JPEG marker {other:#04x}"
                )))
            }
        }
    }
}

fn read_sof<R: Read>(
    input: &mut BufferedInput<R>,
    st: &mut JpegState,
    marker: u8,
) -> Result<(u32, u32)> {
    let len = segment_length(input)?;
    let precision = input.read_u8()?;
    if precision != 8 {
        return Err(Error::UnsupportedSubformat(format!(
            "{precision}-bit JPEG precision"
        )));
    }
    let height = u32::from(input.read_u16_be()?);
    let width = u32::from(input.read_u16_be()?);
    if height == 0 {
        return Err(Error::InvalidData(
            "JPEG deferred height (DNL) not supported".into(),
        ));
    }
    let ncomp = input.read_u8()? as usize;
    if !matches!(ncomp, 1 | 3 | 4) {
        return Err(Error::UnsupportedSubformat(format!(
            "JPEG with {ncomp} components"
        )));
    }
    if len != 6 + 3 * ncomp {
        return Err(Error::InvalidData("SOF length mismatch".into()));
    }

    let mut components = Vec::with_capacity(ncomp);
    for _ in 0..ncomp {
        let id = input.read_u8()?;
        let hv = input.read_u8()?;
        let quant_index = input.read_u8()? as usize;
        let h = u32::from(hv >> 4);
        let v = u32::from(hv & 0x0F);
        if !(1..=4).contains(&h) || !(1..=4).contains(&v) || quant_index > 3 {
            return Err(Error::InvalidData(format!(
                "component {id}: sampling {h}x{v}, table {quant_index}"
            )));
        }
        components.push(Component {
            id,
            h,
            v,
            quant_index,
            width: 0,
            height: 0,
            blocks_w: 0,
            blocks_h: 0,
        });
    }
    let max_h = components.iter().map(|c| c.h).max().unwrap_or(1);
    let max_v = components.iter().map(|c| c.v).max().unwrap_or(1);
    let mcus_x = (width + 8 * max_h - 1) / (8 * max_h);
    let mcus_y = (height + 8 * max_v - 1) / (8 * max_v);
    for comp in &mut components {
        comp.width = (width * comp.h + max_h - 1) / max_h;
        comp.height = (height * comp.v + max_v - 1) / max_v;
        comp.blocks_w = mcus_x * comp.h;
        comp.blocks_h = mcus_y * comp.v;
    }

    st.color = match ncomp {
        1 => ColorSpace::Grey,
        3 => ColorSpace::YCbCr,
        _ => {
            if st.adobe_transform == Some(2) {
                return Err(Error::UnsupportedSubformat("Adobe YCCK color".into()));
            }
            ColorSpace::Cmyk
        }
    };
    st.max_h = max_h;
    st.max_v = max_v;
    st.progressive = marker == SOF2;
    st.components = components;
    debug!(
        "SOF{}: {width}x{height}, {ncomp} components, sampling {max_h}x{max_v}",
        marker - SOF0
    );
    Ok((width, height))
}

fn read_dqt<R: Read>(input: &mut BufferedInput<R>, st: &mut JpegState) -> Result<()> {
    let mut remaining = segment_length(input)?;
    while remaining > 0 {
        let pq_tq = input.read_u8()?;
        let precision = pq_tq >> 4;
        let index = (pq_tq & 0x0F) as usize;
        if precision > 1 || index > 3 {
            return Err(Error::InvalidData(format!("DQT selector {pq_tq:#04x}")));
        }
        for slot in st.quant[index].iter_mut() {
            *slot = if precision == 1 {
                input.read_u16_be()?
            } else {
                u16::from(input.read_u8()?)
            };
        }
        st.quant_defined[index] = true;
        let used = 1 + 64 * (1 + precision as usize);
        remaining = remaining
            .checked_sub(used)
            .ok_or_else(|| Error::InvalidData("DQT length mismatch".into()))?;
        trace!("quantization table {index} ({}-bit)", 8 * (1 + precision));
    }
    Ok(())
}

fn read_dht<R: Read>(input: &mut BufferedInput<R>, st: &mut JpegState) -> Result<()> {
    let mut remaining = segment_length(input)?;
    while remaining > 0 {
        let tc_th = input.read_u8()?;
        let class = tc_th >> 4;
        let index = (tc_th & 0x0F) as usize;
        if class > 1 || index > 3 {
            return Err(Error::InvalidData(format!("DHT selector {tc_th:#04x}")));
        }
        let mut bits = [0u8; 16];
        input.read_exact(&mut bits)?;
        let total: usize = bits.iter().map(|&b| b as usize).sum();
        let mut values = vec![0u8; total];
        input.read_exact(&mut values)?;
        let table = HuffTable::build(&bits, values)?;
        if class == 0 {
            st.dc_tables[index] = Some(table);
        } else {
            st.ac_tables[index] = Some(table);
        }
        remaining = remaining
            .checked_sub(1 + 16 + total)
            .ok_or_else(|| Error::InvalidData("DHT length mismatch".into()))?;
        trace!(
            "Huffman table {} {index} ({total} symbols)",
            if class == 0 { "DC" } else { "AC" }
        );
    }
    Ok(())
}

fn read_dri<R: Read>(input: &mut BufferedInput<R>, st: &mut JpegState) -> Result<()> {
    let len = segment_length(input)?;
    if len != 2 {
        return Err(Error::InvalidData("DRI length mismatch".into()));
    }
    st.restart_interval = u32::from(input.read_u16_be()?);
    trace!("restart interval {}", st.restart_interval);
    Ok(())
}

/// Pull the Exif orientation tag (IFD0, tag 0x0112) out of an APP1 payload.
/// Anything malformed is ignored; orientation is advisory metadata.
fn exif_orientation(payload: &[u8]) -> Option<Orientation> {
    let tiff = payload.strip_prefix(b"Exif\0\0")?;
    if tiff.len() < 8 {
        return None;
    }
    let big_endian = match &tiff[0..2] {
        b"II" => false,
        b"MM" => true,
        _ => return None,
    };
    let read_u16 = |bytes: &[u8]| -> u16 {
        let pair = [bytes[0], bytes[1]];
        if big_endian {
            u16::from_be_bytes(pair)
        } else {
            u16::from_le_bytes(pair)
        }
    };
    let read_u32 = |bytes: &[u8]| -> u32 {
        let quad = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if big_endian {
            u32::from_be_bytes(quad)
        } else {
            u32::from_le_bytes(quad)
        }
    };
    if read_u16(&tiff[2..4]) != 42 {
        return None;
    }
    let ifd = read_u32(&tiff[4..8]) as usize;
    if ifd + 2 > tiff.len() {
        return None;
    }
    let entries = read_u16(&tiff[ifd..ifd + 2]) as usize;
    for i in 0..entries {
        let at = ifd + 2 + i * 12;
        if at + 12 > tiff.len() {
            return None;
        }
        if read_u16(&tiff[at..at + 2]) == 0x0112 {
            return match read_u16(&tiff[at + 8..at + 10]) {
                1 => Some(Orientation::Unchanged),
                3 => Some(Orientation::Rot180),
                6 => Some(Orientation::Rot90),
                8 => Some(Orientation::Rot270),
                other => {
                    warn!("Exif orientation {other} ignored");
                    None
                }
            };
        }
    }
    None
}

struct ScanComponent {
    index: usize,
    dc_table: usize,
    ac_table: usize,
}

struct ScanHeader {
    components: Vec<ScanComponent>,
    ss: usize,
    se: usize,
    ah: u8,
    al: u8,
}

fn read_scan_header<R: Read>(input: &mut BufferedInput<R>, st: &JpegState) -> Result<ScanHeader> {
    let len = segment_length(input)?;
    let ns = input.read_u8()? as usize;
    if ns == 0 || ns > st.components.len() || len != 4 + 2 * ns {
        return Err(Error::InvalidData(format!("scan with {ns} components")));
    }
    let mut components = Vec::with_capacity(ns);
    for _ in 0..ns {
        let id = input.read_u8()?;
        let selectors = input.read_u8()?;
        let index = st
            .components
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::InvalidData(format!("scan references component {id}")))?;
        components.push(ScanComponent {
            index,
            dc_table: usize::from(selectors >> 4),
            ac_table: usize::from(selectors & 0x0F),
        });
    }
    let ss = input.read_u8()? as usize;
    let se = input.read_u8()? as usize;
    let ah_al = input.read_u8()?;
    let (ah, al) = (ah_al >> 4, ah_al & 0x0F);

    if st.progressive {
        if ss > 63 || se > 63 || ss > se || al > 13 {
            return Err(Error::InvalidData(format!("spectral range {ss}..{se}")));
        }
        if ss == 0 && se != 0 {
            return Err(Error::InvalidData("progressive DC scan with AC band".into()));
        }
        if ss > 0 && ns != 1 {
            return Err(Error::InvalidData("interleaved progressive AC scan".into()));
        }
    } else if ss != 0 || se != 63 || ah != 0 || al != 0 {
        return Err(Error::InvalidData(
            "baseline scan with progressive parameters".into(),
        ));
    }
    Ok(ScanHeader {
        components,
        ss,
        se,
        ah,
        al,
    })
}

pub(crate) fn decode<R: Read, S: PixelSink>(
    d: &mut ImageDescriptor<R>,
    sink: &mut S,
    _mode: Mode,
) -> Result<f32> {
    let out_bits = sink.sample_bits();
    let width = d.width;
    let height = d.height;
    let ImageDescriptor {
        ref mut input,
        ref mut jpeg,
        ..
    } = *d;
    let st = jpeg
        .as_mut()
        .ok_or(Error::Internal("JPEG state missing in descriptor"))?;

    let mut coefficients: Vec<Vec<i16>> = st
        .components
        .iter()
        .map(|c| vec![0i16; (c.blocks_w * c.blocks_h) as usize * 64])
        .collect();

    let mut scans = 0usize;
    let mut pending: Option<u8> = None;
    loop {
        let marker = match pending.take() {
            Some(marker) => marker,
            None => next_marker(input)?,
        };
        match marker {
            EOI => break,
            SOS => {
                let scan = read_scan_header(input, st)?;
                pending = decode_scan(input, st, &scan, &mut coefficients)?;
                scans += 1;
            }
            DQT => read_dqt(input, st)?,
            DHT => read_dht(input, st)?,
            DRI => read_dri(input, st)?,
            APP0..=APP15 | COM | DNL => skip_segment(input)?,
            other => {
                return Err(Error::InvalidData(format!(
                    "unexpected marker {other:#04x} between scans"
                )))
            }
        }
    }
    if scans == 0 {
        return Err(Error::InvalidData("JPEG contains no scan data".into()));
    }

    // Dequantize, inverse-transform, then upsample and emit.
    let mut planes: Vec<Vec<u8>> = Vec::with_capacity(st.components.len());
    for (ci, comp) in st.components.iter().enumerate() {
        if !st.quant_defined[comp.quant_index] {
            return Err(Error::InvalidData(format!(
                "component {} uses undefined quantization table {}",
                comp.id, comp.quant_index
            )));
        }
        let qt = &st.quant[comp.quant_index];
        let stride = (comp.blocks_w * 8) as usize;
        let mut plane = vec![0u8; stride * (comp.blocks_h * 8) as usize];
        for by in 0..comp.blocks_h as usize {
            for bx in 0..comp.blocks_w as usize {
                let offset = (by * comp.blocks_w as usize + bx) * 64;
                let block = &coefficients[ci][offset..offset + 64];
                let mut natural = [0i32; 64];
                for (k, &coef) in block.iter().enumerate() {
                    natural[ZIGZAG[k]] = i32::from(coef) * i32::from(qt[k]);
                }
                let mut samples = [0u8; 64];
                idct_block(&natural, &mut samples);
                for row in 0..8 {
                    let dst = (by * 8 + row) * stride + bx * 8;
                    plane[dst..dst + 8].copy_from_slice(&samples[row * 8..row * 8 + 8]);
                }
            }
        }
        planes.push(plane);
    }

    let alpha = ((1u32 << out_bits) - 1) as u16;
    let sample = |ci: usize, x: u32, y: u32| -> u8 {
        let comp = &st.components[ci];
        let sx = (x * comp.h / st.max_h) as usize;
        let sy = (y * comp.v / st.max_v) as usize;
        planes[ci][sy * (comp.blocks_w * 8) as usize + sx]
    };
    for y in 0..height {
        sink.set_xy(0, y);
        for x in 0..width {
            let (r, g, b) = match st.color {
                ColorSpace::Grey => {
                    let v = sample(0, x, y);
                    (v, v, v)
                }
                ColorSpace::YCbCr => {
                    ycbcr_to_rgb(sample(0, x, y), sample(1, x, y), sample(2, x, y))
                }
                ColorSpace::Cmyk => cmyk_to_rgb(
                    sample(0, x, y),
                    sample(1, x, y),
                    sample(2, x, y),
                    sample(3, x, y),
                ),
            };
            sink.put_pixel(
                promote(u16::from(r), 8, out_bits),
                promote(u16::from(g), 8, out_bits),
                promote(u16::from(b), 8, out_bits),
                alpha,
            );
        }
        sink.feedback(((y + 1) * 100 / height) as u8);
    }
    Ok(0.0)
}

/// Decode one entropy-coded scan into the coefficient planes. Returns the
/// marker that terminated the segment, if the bit reader ran into one.
fn decode_scan<R: Read>(
    input: &mut BufferedInput<R>,
    st: &JpegState,
    scan: &ScanHeader,
    coefficients: &mut [Vec<i16>],
) -> Result<Option<u8>> {
    let mut reader = MsbReader::new(input);
    let mut dc_pred = [0i32; 4];
    let mut eobrun: u32 = 0;
    let mut restarts_seen: u8 = 0;
    let mut units: u32 = 0;
    let interval = st.restart_interval;

    macro_rules! maybe_restart {
        () => {
            if interval != 0 && units != 0 && units % interval == 0 {
                let marker = reader.read_marker()?;
                if !(RST0..=RST7).contains(&marker) {
                    return Err(Error::InvalidData(format!(
                        "expected restart marker, found {marker:#04x}"
                    )));
                }
                if marker - RST0 != restarts_seen % 8 {
                    return Err(Error::InvalidData(format!(
                        "restart marker out of sequence: {marker:#04x}"
                    )));
                }
                restarts_seen = restarts_seen.wrapping_add(1);
                dc_pred.fill(0);
                eobrun = 0;
            }
        };
    }

    if scan.components.len() > 1 {
        // Interleaved: MCU order, every component's blocks per MCU.
        let first = &st.components[scan.components[0].index];
        let mcus_x = first.blocks_w / first.h;
        let mcus_y = first.blocks_h / first.v;
        for mcu_y in 0..mcus_y {
            for mcu_x in 0..mcus_x {
                maybe_restart!();
                for (si, sc) in scan.components.iter().enumerate() {
                    let comp = &st.components[sc.index];
                    for by in 0..comp.v {
                        for bx in 0..comp.h {
                            let block_x = mcu_x * comp.h + bx;
                            let block_y = mcu_y * comp.v + by;
                            let offset = (block_y * comp.blocks_w + block_x) as usize * 64;
                            decode_block(
                                &mut reader,
                                st,
                                scan,
                                sc,
                                &mut coefficients[sc.index][offset..offset + 64],
                                &mut dc_pred[si],
                                &mut eobrun,
                            )?;
                        }
                    }
                }
                units += 1;
            }
        }
    } else {
        // Non-interleaved: the single component's own block grid.
        let sc = &scan.components[0];
        let comp = &st.components[sc.index];
        let blocks_x = (comp.width + 7) / 8;
        let blocks_y = (comp.height + 7) / 8;
        for block_y in 0..blocks_y {
            for block_x in 0..blocks_x {
                maybe_restart!();
                let offset = (block_y * comp.blocks_w + block_x) as usize * 64;
                decode_block(
                    &mut reader,
                    st,
                    scan,
                    sc,
                    &mut coefficients[sc.index][offset..offset + 64],
                    &mut dc_pred[0],
                    &mut eobrun,
                )?;
                units += 1;
            }
        }
    }
    Ok(reader.take_marker())
}

fn decode_block<R: Read>(
    reader: &mut MsbReader<'_, R>,
    st: &JpegState,
    scan: &ScanHeader,
    sc: &ScanComponent,
    block: &mut [i16],
    dc_pred: &mut i32,
    eobrun: &mut u32,
) -> Result<()> {
    if !st.progressive {
        let dc = require_table(&st.dc_tables, sc.dc_table, "DC")?;
        let ac = require_table(&st.ac_tables, sc.ac_table, "AC")?;
        decode_baseline_block(reader, block, dc, ac, dc_pred)
    } else if scan.ss == 0 {
        if scan.ah == 0 {
            let dc = require_table(&st.dc_tables, sc.dc_table, "DC")?;
            let size = dc.decode(reader)?;
            if size > 15 {
                return Err(Error::InvalidData(format!("DC category {size}")));
            }
            let diff = reader.receive_extend(size)?;
            *dc_pred += diff;
            block[0] = (*dc_pred << scan.al) as i16;
            Ok(())
        } else {
            if reader.read_bit()? != 0 {
                block[0] |= 1 << scan.al;
            }
            Ok(())
        }
    } else {
        let ac = require_table(&st.ac_tables, sc.ac_table, "AC")?;
        if scan.ah == 0 {
            decode_ac_first(reader, block, ac, scan, eobrun)
        } else {
            decode_ac_refine(reader, block, ac, scan, eobrun)
        }
    }
}

fn require_table<'t>(
    tables: &'t [Option<HuffTable>; 4],
    index: usize,
    kind: &str,
) -> Result<&'t HuffTable> {
    tables
        .get(index)
        .and_then(Option::as_ref)
        .ok_or_else(|| Error::InvalidData(format!("scan uses undefined {kind} table {index}")))
}

fn decode_baseline_block<R: Read>(
    reader: &mut MsbReader<'_, R>,
    block: &mut [i16],
    dc: &HuffTable,
    ac: &HuffTable,
    dc_pred: &mut i32,
) -> Result<()> {
    let size = dc.decode(reader)?;
    if size > 15 {
        return Err(Error::InvalidData(format!("DC category {size}")));
    }
    let diff = reader.receive_extend(size)?;
    *dc_pred += diff;
    block[0] = *dc_pred as i16;

    let mut k = 1usize;
    while k < 64 {
        let rs = ac.decode(reader)?;
        let run = usize::from(rs >> 4);
        let size = rs & 0x0F;
        if size == 0 {
            if run == 15 {
                k += 16;
                continue;
            }
            break; // end of block
        }
        k += run;
        if k > 63 {
            return Err(Error::InvalidData("AC run past end of block".into()));
        }
        block[k] = reader.receive_extend(size)? as i16;
        k += 1;
    }
    Ok(())
}

fn decode_ac_first<R: Read>(
    reader: &mut MsbReader<'_, R>,
    block: &mut [i16],
    ac: &HuffTable,
    scan: &ScanHeader,
    eobrun: &mut u32,
) -> Result<()> {
    if *eobrun > 0 {
        *eobrun -= 1;
        return Ok(());
    }
    let mut k = scan.ss;
    while k <= scan.se {
        let rs = ac.decode(reader)?;
        let run = u32::from(rs >> 4);
        let size = rs & 0x0F;
        if size == 0 {
            if run == 15 {
                k += 16;
                continue;
            }
            // End-of-band run: 2^run - 1 plus extension bits.
            *eobrun = (1 << run) - 1;
            if run > 0 {
                *eobrun += reader.read_bits(run as u8)?;
            }
            break;
        }
        k += run as usize;
        if k > scan.se {
            return Err(Error::InvalidData("AC run past spectral band".into()));
        }
        block[k] = (reader.receive_extend(size)? << scan.al) as i16;
        k += 1;
    }
    Ok(())
}

/// Successive-approximation AC refinement (the correction-bit pass).
fn decode_ac_refine<R: Read>(
    reader: &mut MsbReader<'_, R>,
    block: &mut [i16],
    ac: &HuffTable,
    scan: &ScanHeader,
    eobrun: &mut u32,
) -> Result<()> {
    let plus = 1i16 << scan.al;
    let minus = -1i16 << scan.al;
    let mut k = scan.ss;

    if *eobrun == 0 {
        'segments: while k <= scan.se {
            let rs = ac.decode(reader)?;
            let mut run = i32::from(rs >> 4);
            let size = rs & 0x0F;
            let mut insert = 0i16;
            if size == 0 {
                if run != 15 {
                    *eobrun = (1u32 << run) - 1;
                    if run > 0 {
                        *eobrun += reader.read_bits(run as u8)?;
                    }
                    break 'segments;
                }
                // ZRL: sixteen zero-history positions, corrections en route.
            } else {
                if size != 1 {
                    return Err(Error::InvalidData(
                        "AC refinement magnitude other than 1".into(),
                    ));
                }
                insert = if reader.read_bit()? != 0 { plus } else { minus };
            }
            while k <= scan.se {
                let coef = &mut block[k];
                if *coef != 0 {
                    if reader.read_bit()? != 0 && (*coef & plus) == 0 {
                        *coef += if *coef >= 0 { plus } else { minus };
                    }
                } else {
                    if run == 0 {
                        if insert != 0 {
                            *coef = insert;
                        }
                        k += 1;
                        continue 'segments;
                    }
                    run -= 1;
                }
                k += 1;
            }
        }
    }

    if *eobrun > 0 {
        // Correction bits for the rest of the band.
        while k <= scan.se {
            let coef = &mut block[k];
            if *coef != 0 && reader.read_bit()? != 0 && (*coef & plus) == 0 {
                *coef += if *coef >= 0 { plus } else { minus };
            }
            k += 1;
        }
        *eobrun -= 1;
    }
    Ok(())
}
