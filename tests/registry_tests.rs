use mp4tree::boxes::{FourCC, NodeKind};
use mp4tree::parser::{DecodeOptions, Decoder, decode, decode_box};
use mp4tree::registry::{BoxValue, Entry, FullHeader, Special};
use mp4tree::{MemorySource, Registry, default_registry};
use std::collections::HashMap;

fn bx(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

fn full(typ: &[u8; 4], version: u8, body: &[u8]) -> Vec<u8> {
    let mut p = vec![version, 0, 0, 0];
    p.extend_from_slice(body);
    bx(typ, &p)
}

#[test]
fn registry_has_core_tags() {
    let reg = default_registry();
    for tag in [
        b"ftyp", b"moov", b"trak", b"mdia", b"minf", b"stbl", b"udta", b"meta", b"ilst", b"data",
    ] {
        assert!(reg.lookup(FourCC(*tag)).is_some(), "missing {:?}", FourCC(*tag));
    }
    assert!(reg.lookup(FourCC(*b"zzzz")).is_none());
    assert!(!reg.is_empty());
}

#[test]
fn container_and_full_flags() {
    let reg = default_registry();
    let moov = reg.lookup(FourCC(*b"moov")).unwrap();
    assert!(moov.container);
    assert_eq!(moov.full, FullHeader::Absent);

    let mvhd = reg.lookup(FourCC(*b"mvhd")).unwrap();
    assert!(!mvhd.container);
    assert_eq!(mvhd.full, FullHeader::Present);
    assert_eq!(mvhd.special, Some(Special::MovieHeader));

    let meta = reg.lookup(FourCC(*b"meta")).unwrap();
    assert!(meta.container);
    assert_eq!(meta.full, FullHeader::Probe);
}

#[test]
fn full_names() {
    let reg = default_registry();
    assert_eq!(reg.full_name(FourCC(*b"ftyp")), "File Type Box");
    assert_eq!(reg.full_name(FourCC(*b"\xa9nam")), "Title");
    assert_eq!(reg.full_name(FourCC(*b"zzzz")), "Unknown Box");
}

#[test]
fn resolve_unknown_falls_back() {
    let reg = default_registry();
    let e = reg.resolve(FourCC(*b"zzzz"), None, &HashMap::new());
    assert_eq!(e, Entry::UNKNOWN);
    assert!(!e.known);
}

#[test]
fn children_of_ilst_are_always_items() {
    let reg = default_registry();
    let ilst = *reg.lookup(FourCC(*b"ilst")).unwrap();
    let none = HashMap::new();

    // even a tag registered as a plain leaf elsewhere
    let e = reg.resolve(FourCC(*b"free"), Some(&ilst), &none);
    assert!(e.container);
    assert_eq!(e.special, Some(Special::MetadataItem));

    // registered items keep their own entry
    let e = reg.resolve(FourCC(*b"\xa9ART"), Some(&ilst), &none);
    assert_eq!(e.name, "Artist");

    // outside an ilst, `free` stays a leaf
    let e = reg.resolve(FourCC(*b"free"), None, &none);
    assert!(!e.container);
}

#[test]
fn overrides_take_precedence() {
    let reg = default_registry();
    let mut overrides = HashMap::new();
    overrides.insert(FourCC(*b"moov"), false);
    overrides.insert(FourCC(*b"zzzz"), true);

    assert!(!reg.resolve(FourCC(*b"moov"), None, &overrides).container);
    assert!(reg.resolve(FourCC(*b"zzzz"), None, &overrides).container);
    // untouched tags keep their registration
    assert!(reg.resolve(FourCC(*b"trak"), None, &overrides).container);
}

#[test]
fn ftyp_is_decoded() {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"isom");
    payload.extend_from_slice(&512u32.to_be_bytes());
    payload.extend_from_slice(b"isom");
    payload.extend_from_slice(b"avc1");
    let mut src = MemorySource::new(bx(b"ftyp", &payload));

    let b = decode_box(&mut src).unwrap();

    match &b.value {
        Some(BoxValue::FileType(f)) => {
            assert_eq!(f.major_brand, FourCC(*b"isom"));
            assert_eq!(f.minor_version, 512);
            assert_eq!(f.compatible_brands, vec![FourCC(*b"isom"), FourCC(*b"avc1")]);
        }
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn hdlr_is_decoded() {
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(b"vide");
    body.extend_from_slice(&[0; 12]);
    body.extend_from_slice(b"VideoHandler\0");
    let mut src = MemorySource::new(full(b"hdlr", 0, &body));

    let b = decode_box(&mut src).unwrap();

    assert_eq!(b.version_flags(), Some((0, 0)));
    match &b.value {
        Some(BoxValue::Handler(h)) => {
            assert_eq!(h.handler_type, FourCC(*b"vide"));
            assert_eq!(h.name, "VideoHandler");
        }
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn mdhd_version0_with_language() {
    let mut body = Vec::new();
    body.extend_from_slice(&1u32.to_be_bytes()); // creation
    body.extend_from_slice(&2u32.to_be_bytes()); // modification
    body.extend_from_slice(&48_000u32.to_be_bytes());
    body.extend_from_slice(&96_000u32.to_be_bytes());
    body.extend_from_slice(&0x15C7u16.to_be_bytes()); // "eng"
    body.extend_from_slice(&[0, 0]);
    let mut src = MemorySource::new(full(b"mdhd", 0, &body));

    let b = decode_box(&mut src).unwrap();

    match &b.value {
        Some(BoxValue::MediaHeader(m)) => {
            assert_eq!(m.creation_time, 1);
            assert_eq!(m.modification_time, 2);
            assert_eq!(m.timescale, 48_000);
            assert_eq!(m.duration, 96_000);
            assert_eq!(m.language, "eng");
        }
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn mvhd_version1_uses_64_bit_times() {
    let mut body = Vec::new();
    body.extend_from_slice(&(1u64 << 40).to_be_bytes());
    body.extend_from_slice(&(2u64 << 40).to_be_bytes());
    body.extend_from_slice(&1000u32.to_be_bytes());
    body.extend_from_slice(&(5u64 << 33).to_be_bytes());
    body.extend_from_slice(&[0; 80]); // rate, volume, matrix, next track id
    let mut src = MemorySource::new(full(b"mvhd", 1, &body));

    let b = decode_box(&mut src).unwrap();

    match &b.value {
        Some(BoxValue::MovieHeader(m)) => {
            assert_eq!(m.creation_time, 1 << 40);
            assert_eq!(m.modification_time, 2 << 40);
            assert_eq!(m.timescale, 1000);
            assert_eq!(m.duration, 5 << 33);
        }
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn failing_payload_decoder_keeps_generic_box() {
    // ftyp too short to hold a brand and a version
    let mut data = bx(b"ftyp", b"iso");
    data.extend(bx(b"free", &[]));
    let mut src = MemorySource::new(data);

    let boxes = decode(&mut src).unwrap();

    assert_eq!(boxes.len(), 2);
    assert!(boxes[0].value.is_none());
    assert!(matches!(boxes[0].kind, NodeKind::Leaf(_)));
    assert_eq!(boxes[0].payload_len(), 3);
}

#[test]
fn custom_registry_changes_decoding() {
    let reg = Registry::new()
        .with_entry(FourCC(*b"abcd"), Entry::container("Custom Container"))
        .with_entry(FourCC(*b"wxyz"), Entry::full("Custom Full Box"));
    assert_eq!(reg.len(), 2);

    let data = bx(b"abcd", &full(b"wxyz", 2, &[7, 7]));
    let decoder = Decoder::new(&reg, DecodeOptions::default());
    let b = decoder.decode_box(&mut MemorySource::new(data)).unwrap();

    assert!(b.is_container());
    let child = &b.children()[0];
    assert_eq!(child.version_flags(), Some((2, 0)));
    assert_eq!(child.payload_len(), 2);
}

#[test]
fn custom_registry_replaces_entries() {
    let reg = Registry::new()
        .with_entry(FourCC(*b"abcd"), Entry::leaf("First"))
        .with_entry(FourCC(*b"abcd"), Entry::leaf("Second"));
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.full_name(FourCC(*b"abcd")), "Second");
}

#[test]
fn quicktime_name_atom_is_a_plain_leaf() {
    // udta/name holding a two byte string, too short for version and flags
    let data = bx(b"udta", &bx(b"name", b"ab"));
    let udta = decode_box(&mut MemorySource::new(data)).unwrap();

    let name = &udta.children()[0];
    assert!(matches!(&name.kind, NodeKind::Leaf(p) if p.bytes() == Some(&b"ab"[..])));
    assert_eq!(name.version_flags(), None);
}

#[test]
fn mean_and_name_are_full_boxes_inside_items() {
    let reg = default_registry();
    let none = HashMap::new();
    let item = *reg.lookup(FourCC(*b"----")).unwrap();

    for tag in [b"mean", b"name"] {
        let inside = reg.resolve(FourCC(*tag), Some(&item), &none);
        assert_eq!(inside.full, FullHeader::Present);
        let outside = reg.resolve(FourCC(*tag), None, &none);
        assert_eq!(outside.full, FullHeader::Absent);
    }
}
