//! Signature dispatch: every magic byte sequence classifies to its format,
//! everything else is `UnknownFormat` unless the TGA fallback is requested.

use depix::{load_header, Error, Format};

mod support;

#[test]
fn unknown_bytes_without_tga_fallback() {
    let err = load_header(&[0x00u8, 0x01, 0x02, 0x03][..], false).unwrap_err();
    assert!(matches!(err, Error::UnknownFormat));
}

#[test]
fn bmp_signature_with_bad_submatch() {
    // 'B' not followed by 'M'.
    let err = load_header(&b"BXrest"[..], false).unwrap_err();
    assert!(matches!(err, Error::UnknownFormat));
}

#[test]
fn fits_signature_is_recognized_but_unsupported() {
    let err = load_header(&b"SIMPLE  =          T"[..], false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(Format::Fits)));
}

#[test]
fn tiff_little_endian_with_valid_magic() {
    let err = load_header(&[b'I', b'I', 42, 0, 8, 0, 0, 0][..], false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(Format::Tiff)));
}

#[test]
fn tiff_big_endian_with_valid_magic() {
    let err = load_header(&[b'M', b'M', 0, 42, 0, 0, 0, 8][..], false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(Format::Tiff)));
}

#[test]
fn tiff_with_wrong_magic_is_invalid() {
    // "II" must be followed by little-endian 42.
    let err = load_header(&[b'I', b'I', 43, 0, 8, 0, 0, 0][..], false).unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
}

#[test]
fn tiff_mixed_endian_bytes_are_unknown() {
    let err = load_header(&[b'I', b'M', 0, 42][..], false).unwrap_err();
    assert!(matches!(err, Error::UnknownFormat));
}

#[test]
fn pnm_magic_out_of_range() {
    let err = load_header(&b"P7\n1 1\n255\n"[..], false).unwrap_err();
    assert!(matches!(err, Error::UnknownFormat));
}

#[test]
fn pnm_magic_classifies() {
    let image = load_header(&b"P2 2 2 255 0 1 2 3"[..], false).unwrap();
    assert_eq!(image.format(), Format::Pnm);
    assert_eq!(image.subformat_id(), 2);
}

#[test]
fn qoi_magic_classifies() {
    let mut data = b"qoif".to_vec();
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(&1u32.to_be_bytes());
    data.push(4);
    data.push(0);
    let image = load_header(data.as_slice(), false).unwrap();
    assert_eq!(image.format(), Format::Qoi);
    assert!(image.is_rle());
    assert!(image.expects_transparency());
}

#[test]
fn truncated_signature_is_invalid_data() {
    // A lone 0x89 with no PNG magic behind it: the stream ends mid-probe.
    let err = load_header(&[0x89u8][..], false).unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
}

#[test]
fn tga_fallback_when_requested() {
    // Minimal 1x1 uncompressed grey TGA: first byte 0 is the ID length.
    let data: Vec<u8> = vec![
        0, // ID length (consumed as the probe byte)
        0, // no color map
        3, // uncompressed greyscale
        0, 0, 0, 0, 0, // color map spec
        0, 0, 0, 0, // origin
        1, 0, 1, 0, // 1x1
        8,    // depth
        0x20, // top-first
        0x80, // the pixel
    ];
    let image = load_header(data.as_slice(), true).unwrap();
    assert_eq!(image.format(), Format::Tga);
    assert_eq!((image.width(), image.height()), (1, 1));
    assert!(image.is_greyscale());
}

#[test]
fn tga_not_tried_by_default() {
    let data = vec![0u8, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0, 8, 0x20, 0x80];
    let err = load_header(data.as_slice(), false).unwrap_err();
    assert!(matches!(err, Error::UnknownFormat));
}

#[test]
fn gif_version_87a_and_89a_accepted() {
    for version in [&b"87a"[..], &b"89a"[..]] {
        let mut data = b"GIF".to_vec();
        data.extend_from_slice(version);
        // 1x1 screen, no GCT, then a frame.
        data.extend_from_slice(&[1, 0, 1, 0, 0x00, 0, 0]);
        data.extend_from_slice(&[0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0x80, 0, 0, 0]);
        let image = load_header(data.as_slice(), false).unwrap();
        assert_eq!(image.format(), Format::Gif);
        assert!(image.detailed_format().starts_with("GIF8"));
    }
}

#[test]
fn gif_bad_version_is_unknown() {
    let err = load_header(&b"GIF88a\x01\x00\x01\x00\x00\x00\x00"[..], false).unwrap_err();
    assert!(matches!(err, Error::UnknownFormat));
}

#[test]
fn png_signature_classifies() {
    let png = support::build_png(2, 1, 8, 0, 0, &[], &[0, 64, 192]);
    let image = load_header(png.as_slice(), false).unwrap();
    assert_eq!(image.format(), Format::Png);
    assert_eq!(image.subformat_id(), 0);
    assert!(image.is_greyscale());
    assert!(!image.has_palette());
}

#[test]
fn png_corrupt_magic_is_unknown() {
    let mut png = support::build_png(1, 1, 8, 0, 0, &[], &[0, 0]);
    png[3] = b'X';
    let err = load_header(png.as_slice(), false).unwrap_err();
    assert!(matches!(err, Error::UnknownFormat));
}

#[test]
fn zero_dimensions_rejected() {
    // QOI with width 0.
    let mut data = b"qoif".to_vec();
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&1u32.to_be_bytes());
    data.push(3);
    data.push(0);
    let err = load_header(data.as_slice(), false).unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
}
