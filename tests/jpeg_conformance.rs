//! JPEG decoding against hand-assembled minimal streams: baseline grey and
//! YCbCr, subsampling, restart markers, progressive refinement, and the
//! rejection paths.

use depix::{load_header, Error, Mode, Orientation};

mod support;
use support::RecordingSink;

fn segment(out: &mut Vec<u8>, code: u8, payload: &[u8]) {
    out.push(0xFF);
    out.push(code);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
}

fn dqt_uniform(out: &mut Vec<u8>, index: u8, value: u8) {
    let mut payload = vec![index];
    payload.extend_from_slice(&[value; 64]);
    segment(out, 0xDB, &payload);
}

fn dht(out: &mut Vec<u8>, class: u8, index: u8, bits: &[u8; 16], values: &[u8]) {
    let mut payload = vec![(class << 4) | index];
    payload.extend_from_slice(bits);
    payload.extend_from_slice(values);
    segment(out, 0xC4, &payload);
}

/// DC and AC tables where code "0" means category/symbol 0. Enough for
/// DC-only blocks: one bit for "no DC change", one bit for end-of-block.
fn trivial_tables(out: &mut Vec<u8>) {
    let mut bits = [0u8; 16];
    bits[0] = 1;
    dht(out, 0, 0, &bits, &[0]);
    dht(out, 1, 0, &bits, &[0x00]);
}

fn sof(out: &mut Vec<u8>, code: u8, width: u16, height: u16, comps: &[(u8, u8, u8)]) {
    let mut payload = vec![8u8];
    payload.extend_from_slice(&height.to_be_bytes());
    payload.extend_from_slice(&width.to_be_bytes());
    payload.push(comps.len() as u8);
    for &(id, hv, tq) in comps {
        payload.push(id);
        payload.push(hv);
        payload.push(tq);
    }
    segment(out, code, &payload);
}

fn sos(out: &mut Vec<u8>, comps: &[(u8, u8)], ss: u8, se: u8, ah_al: u8) {
    let mut payload = vec![comps.len() as u8];
    for &(id, selectors) in comps {
        payload.push(id);
        payload.push(selectors);
    }
    payload.push(ss);
    payload.push(se);
    payload.push(ah_al);
    segment(out, 0xDA, &payload);
}

/// Shortest legal baseline grey JPEG: one block whose DC stays 0 -> 128.
fn grey_1x1_flat() -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8];
    dqt_uniform(&mut jpeg, 0, 1);
    sof(&mut jpeg, 0xC0, 1, 1, &[(1, 0x11, 0)]);
    trivial_tables(&mut jpeg);
    sos(&mut jpeg, &[(1, 0x00)], 0, 63, 0);
    jpeg.push(0x3F); // DC category 0, AC end-of-block, padded with ones
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

#[test]
fn baseline_grey_1x1_mid_grey() {
    let grey_1x1_flat = grey_1x1_flat();
    let mut image = load_header(grey_1x1_flat.as_slice(), false).unwrap();
    assert_eq!((image.width(), image.height()), (1, 1));
    assert!(image.is_greyscale());
    assert_eq!(image.subformat_id(), 0);
    assert!(!image.is_interlaced());

    let mut sink = RecordingSink::new(1, 1);
    let delay = image.load_contents(&mut sink, Mode::Fast).unwrap();
    assert_eq!(delay, 0.0);
    assert_eq!(sink.count(), 1);
    assert_eq!(sink.pixel(0, 0), (128, 128, 128, 255));
}

#[test]
fn baseline_grey_nonzero_dc() {
    // DC table: "0" -> category 0, "10" -> category 4. The encoded DC diff
    // is +8; with a uniform quantization table of 8 the dequantized DC is
    // 64, which the inverse DCT turns into 128 + 8.
    let mut jpeg = vec![0xFF, 0xD8];
    dqt_uniform(&mut jpeg, 0, 8);
    sof(&mut jpeg, 0xC0, 1, 1, &[(1, 0x11, 0)]);
    let mut dc_bits = [0u8; 16];
    dc_bits[0] = 1;
    dc_bits[1] = 1;
    dht(&mut jpeg, 0, 0, &dc_bits, &[0, 4]);
    let mut ac_bits = [0u8; 16];
    ac_bits[0] = 1;
    dht(&mut jpeg, 1, 0, &ac_bits, &[0x00]);
    sos(&mut jpeg, &[(1, 0x00)], 0, 63, 0);
    // Bits: DC code "10", raw "1000" (+8), AC EOB "0", padding "1".
    jpeg.push(0b1010_0001);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let mut image = load_header(jpeg.as_slice(), false).unwrap();
    let mut sink = RecordingSink::new(1, 1);
    image.load_contents(&mut sink, Mode::Fast).unwrap();
    assert_eq!(sink.pixel(0, 0), (136, 136, 136, 255));
}

#[test]
fn baseline_grey_2x1_emits_width_height_pixels() {
    let mut jpeg = vec![0xFF, 0xD8];
    dqt_uniform(&mut jpeg, 0, 1);
    sof(&mut jpeg, 0xC0, 2, 1, &[(1, 0x11, 0)]);
    trivial_tables(&mut jpeg);
    sos(&mut jpeg, &[(1, 0x00)], 0, 63, 0);
    jpeg.push(0x3F);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let mut image = load_header(jpeg.as_slice(), false).unwrap();
    let mut sink = RecordingSink::new(2, 1);
    image.load_contents(&mut sink, Mode::Fast).unwrap();
    assert_eq!(sink.count(), 2);
    assert_eq!(sink.pixel(1, 0), (128, 128, 128, 255));
}

#[test]
fn baseline_ycbcr_interleaved() {
    // 8x8, three components, no subsampling, all DC-only neutral: grey.
    let mut jpeg = vec![0xFF, 0xD8];
    dqt_uniform(&mut jpeg, 0, 1);
    sof(
        &mut jpeg,
        0xC0,
        8,
        8,
        &[(1, 0x11, 0), (2, 0x11, 0), (3, 0x11, 0)],
    );
    trivial_tables(&mut jpeg);
    sos(&mut jpeg, &[(1, 0x00), (2, 0x00), (3, 0x00)], 0, 63, 0);
    // Three blocks of "DC 0, EOB": six zero bits, then padding.
    jpeg.push(0x03);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let mut image = load_header(jpeg.as_slice(), false).unwrap();
    assert_eq!(image.bits_per_pixel(), 24);
    let mut sink = RecordingSink::new(8, 8);
    image.load_contents(&mut sink, Mode::Fast).unwrap();
    assert_eq!(sink.count(), 64);
    assert_eq!(sink.pixel(0, 0), (128, 128, 128, 255));
    assert_eq!(sink.pixel(7, 7), (128, 128, 128, 255));
}

#[test]
fn baseline_420_subsampling() {
    // 16x16 with Y at 2x2 and chroma at 1x1: one MCU of 4 + 1 + 1 blocks.
    let mut jpeg = vec![0xFF, 0xD8];
    dqt_uniform(&mut jpeg, 0, 1);
    sof(
        &mut jpeg,
        0xC0,
        16,
        16,
        &[(1, 0x22, 0), (2, 0x11, 0), (3, 0x11, 0)],
    );
    trivial_tables(&mut jpeg);
    sos(&mut jpeg, &[(1, 0x00), (2, 0x00), (3, 0x00)], 0, 63, 0);
    // Six blocks of "00": twelve zero bits -> 0x00, then 0x0F pads.
    jpeg.extend_from_slice(&[0x00, 0x0F]);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let mut image = load_header(jpeg.as_slice(), false).unwrap();
    let mut sink = RecordingSink::new(16, 16);
    image.load_contents(&mut sink, Mode::Fast).unwrap();
    assert_eq!(sink.count(), 256);
    assert_eq!(sink.pixel(15, 15), (128, 128, 128, 255));
}

#[test]
fn restart_markers_between_mcus() {
    // 8x16 grey: two MCUs with a restart interval of one.
    let mut jpeg = vec![0xFF, 0xD8];
    dqt_uniform(&mut jpeg, 0, 1);
    segment(&mut jpeg, 0xDD, &1u16.to_be_bytes()); // DRI
    sof(&mut jpeg, 0xC0, 8, 16, &[(1, 0x11, 0)]);
    trivial_tables(&mut jpeg);
    sos(&mut jpeg, &[(1, 0x00)], 0, 63, 0);
    jpeg.push(0x3F); // MCU 0
    jpeg.extend_from_slice(&[0xFF, 0xD0]); // RST0
    jpeg.push(0x3F); // MCU 1
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let mut image = load_header(jpeg.as_slice(), false).unwrap();
    let mut sink = RecordingSink::new(8, 16);
    image.load_contents(&mut sink, Mode::Fast).unwrap();
    assert_eq!(sink.count(), 128);
    assert_eq!(sink.pixel(0, 15), (128, 128, 128, 255));
}

#[test]
fn progressive_dc_refinement() {
    // Two DC scans: a first pass at Al=1 (DC stays 0) and a refinement that
    // sets the Al=0 bit. With quantizer 64 the block becomes 128 + 8.
    let mut jpeg = vec![0xFF, 0xD8];
    dqt_uniform(&mut jpeg, 0, 64);
    sof(&mut jpeg, 0xC2, 1, 1, &[(1, 0x11, 0)]);
    let mut dc_bits = [0u8; 16];
    dc_bits[0] = 1;
    dht(&mut jpeg, 0, 0, &dc_bits, &[0]);
    // Scan 1: DC first, Ah=0, Al=1.
    sos(&mut jpeg, &[(1, 0x00)], 0, 0, 0x01);
    jpeg.push(0x7F); // category 0, padded
    // Scan 2: DC refine, Ah=1, Al=0: a single 1 bit.
    sos(&mut jpeg, &[(1, 0x00)], 0, 0, 0x10);
    jpeg.push(0x80);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let mut image = load_header(jpeg.as_slice(), false).unwrap();
    assert!(image.is_interlaced()); // progressive reports as interlaced
    assert_eq!(image.subformat_id(), 2);
    let mut sink = RecordingSink::new(1, 1);
    image.load_contents(&mut sink, Mode::Fast).unwrap();
    assert_eq!(sink.pixel(0, 0), (136, 136, 136, 255));
}

#[test]
fn exif_orientation_carried_to_descriptor() {
    let mut jpeg = vec![0xFF, 0xD8];
    let mut exif = b"Exif\0\0".to_vec();
    exif.extend_from_slice(b"II");
    exif.extend_from_slice(&42u16.to_le_bytes());
    exif.extend_from_slice(&8u32.to_le_bytes());
    exif.extend_from_slice(&1u16.to_le_bytes());
    exif.extend_from_slice(&0x0112u16.to_le_bytes());
    exif.extend_from_slice(&3u16.to_le_bytes());
    exif.extend_from_slice(&1u32.to_le_bytes());
    exif.extend_from_slice(&8u16.to_le_bytes()); // Rot270
    exif.extend_from_slice(&0u16.to_le_bytes());
    segment(&mut jpeg, 0xE1, &exif);
    dqt_uniform(&mut jpeg, 0, 1);
    sof(&mut jpeg, 0xC0, 1, 1, &[(1, 0x11, 0)]);
    trivial_tables(&mut jpeg);
    sos(&mut jpeg, &[(1, 0x00)], 0, 63, 0);
    jpeg.push(0x3F);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let image = load_header(jpeg.as_slice(), false).unwrap();
    assert_eq!(image.display_orientation(), Orientation::Rot270);
}

#[test]
fn twelve_bit_precision_rejected() {
    let mut jpeg = vec![0xFF, 0xD8];
    let mut payload = vec![12u8]; // precision
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.push(1);
    payload.extend_from_slice(&[1, 0x11, 0]);
    segment(&mut jpeg, 0xC0, &payload);
    let err = load_header(jpeg.as_slice(), false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedSubformat(_)));
}

#[test]
fn arithmetic_coding_rejected() {
    let mut jpeg = vec![0xFF, 0xD8];
    let mut payload = vec![8u8];
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.push(1);
    payload.extend_from_slice(&[1, 0x11, 0]);
    segment(&mut jpeg, 0xC9, &payload); // SOF9: arithmetic sequential
    let err = load_header(jpeg.as_slice(), false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedSubformat(_)));
}

#[test]
fn truncated_scan_is_invalid() {
    let full = grey_1x1_flat();
    // Cut just after the SOS header, before any entropy byte arrives.
    let truncated = &full[..full.len() - 3];
    let mut image = load_header(truncated, false).unwrap();
    let mut sink = RecordingSink::new(1, 1);
    let err = image.load_contents(&mut sink, Mode::Fast).unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
}

#[test]
fn scan_with_undefined_table_is_invalid() {
    let mut jpeg = vec![0xFF, 0xD8];
    dqt_uniform(&mut jpeg, 0, 1);
    sof(&mut jpeg, 0xC0, 1, 1, &[(1, 0x11, 0)]);
    // No DHT segments at all.
    sos(&mut jpeg, &[(1, 0x00)], 0, 63, 0);
    jpeg.push(0x3F);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    let mut image = load_header(jpeg.as_slice(), false).unwrap();
    let mut sink = RecordingSink::new(1, 1);
    let err = image.load_contents(&mut sink, Mode::Fast).unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
}
