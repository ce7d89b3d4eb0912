use mp4tree::boxes::FourCC;
use mp4tree::metadata::{self, DataKind, DataValue};
use mp4tree::registry::BoxValue;
use mp4tree::{BoxRecord, MemorySource, decode};

fn bx(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

fn data(code: u32, value: &[u8]) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&code.to_be_bytes());
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(value);
    bx(b"data", &p)
}

fn full_text(typ: &[u8; 4], s: &str) -> Vec<u8> {
    let mut p = vec![0, 0, 0, 0];
    p.extend_from_slice(s.as_bytes());
    bx(typ, &p)
}

/// moov > udta > meta (ISO form) > hdlr, ilst { ©nam, trkn, ----, xyz1 }
fn tagged_file() -> Vec<u8> {
    let mut items = Vec::new();
    items.extend(bx(b"\xa9nam", &data(1, b"Opening")));
    // track 3 of 12
    items.extend(bx(b"trkn", &data(0, &[0, 0, 0, 3, 0, 12, 0, 0])));
    let mut freeform = full_text(b"mean", "com.apple.iTunes");
    freeform.extend(full_text(b"name", "ENCODER"));
    freeform.extend(data(1, b"x264"));
    items.extend(bx(b"----", &freeform));
    items.extend(bx(b"xyz1", &data(21, &[0x01, 0x00])));

    let mut hdlr = vec![0, 0, 0, 0]; // version + flags
    hdlr.extend_from_slice(&0u32.to_be_bytes());
    hdlr.extend_from_slice(b"mdir");
    hdlr.extend_from_slice(&[0; 12]);
    hdlr.push(0);

    let mut meta = vec![0, 0, 0, 0];
    meta.extend(bx(b"hdlr", &hdlr));
    meta.extend(bx(b"ilst", &items));

    bx(b"moov", &bx(b"udta", &bx(b"meta", &meta)))
}

#[test]
fn items_are_decoded_from_ilst() {
    let mut src = MemorySource::new(tagged_file());
    let boxes = decode(&mut src).unwrap();

    let ilst = boxes[0].find("udta.meta.ilst").expect("ilst not found");
    assert_eq!(ilst.children().len(), 4);

    let entries = metadata::entries(ilst);
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        keys,
        vec!["©nam", "trkn", "com.apple.iTunes:ENCODER", "xyz1"]
    );

    assert_eq!(entries[0].1.as_text().as_deref(), Some("Opening"));
    assert_eq!(entries[1].1.kind, DataKind::Implicit);
    assert_eq!(entries[1].1.bytes, vec![0, 0, 0, 3, 0, 12, 0, 0]);
    assert_eq!(entries[2].1.as_text().as_deref(), Some("x264"));
    assert_eq!(entries[3].1.as_integer(), Some(256));
}

#[test]
fn unregistered_item_tags_are_still_items() {
    let mut src = MemorySource::new(tagged_file());
    let boxes = decode(&mut src).unwrap();
    let ilst = boxes[0].find("udta.meta.ilst").unwrap();

    let item = ilst.child(FourCC(*b"xyz1")).unwrap();
    assert!(item.is_container());
    assert_eq!(item.value, Some(BoxValue::MetadataKey("xyz1".to_string())));
    assert_eq!(item.children()[0].typ(), metadata::DATA);
}

#[test]
fn hdlr_inside_meta_is_decoded() {
    let mut src = MemorySource::new(tagged_file());
    let boxes = decode(&mut src).unwrap();
    let hdlr = boxes[0].find("udta.meta.hdlr").unwrap();

    match &hdlr.value {
        Some(BoxValue::Handler(h)) => assert_eq!(h.handler_type, FourCC(*b"mdir")),
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn upsert_replaces_existing_value() {
    let mut src = MemorySource::new(tagged_file());
    let mut boxes = decode(&mut src).unwrap();
    let before = boxes[0].encoded_size();

    let ilst = boxes[0]
        .child_mut(FourCC(*b"udta"))
        .and_then(|b| b.child_mut(FourCC(*b"meta")))
        .and_then(|b| b.child_mut(metadata::ILST))
        .unwrap();
    metadata::upsert(ilst, FourCC(*b"\xa9nam"), DataValue::text("Closing")).unwrap();
    metadata::upsert(ilst, FourCC(*b"\xa9ART"), DataValue::text("Band")).unwrap();
    assert_eq!(ilst.children().len(), 5);

    boxes[0].relayout(0);
    assert_eq!(boxes[0].size(), boxes[0].encoded_size());
    // "Opening" -> "Closing" keeps the length, ©ART adds 8 + 8 + 8 + 4
    assert_eq!(boxes[0].size(), before + 28);

    let bytes = boxes[0].to_bytes().unwrap();
    let reread = decode(&mut MemorySource::new(bytes)).unwrap();
    let ilst = reread[0].find("udta.meta.ilst").unwrap();
    let entries = metadata::entries(ilst);
    assert_eq!(entries[0].1.as_text().as_deref(), Some("Closing"));
    assert_eq!(entries[4].0, "©ART");
    assert_eq!(entries[4].1.as_text().as_deref(), Some("Band"));
}

#[test]
fn set_item_value_adds_missing_data() {
    let mut item = BoxRecord::container(FourCC(*b"tmpo"));
    metadata::set_item_value(&mut item, DataValue::integer(120)).unwrap();

    assert_eq!(item.children().len(), 1);
    assert_eq!(metadata::item_value(&item).unwrap().as_integer(), Some(120));
    // header + data header + indicator + locale + one byte
    assert_eq!(item.size(), 8 + 8 + 8 + 1);
}

#[test]
fn set_item_value_on_leaf_fails() {
    let mut leaf = BoxRecord::leaf(FourCC(*b"free"), vec![]);
    assert!(metadata::set_item_value(&mut leaf, DataValue::boolean(true)).is_err());
}

#[test]
fn freeform_item_builds_key() {
    let item = metadata::freeform_item("com.example", "mood", DataValue::text("calm"));
    assert_eq!(metadata::item_key(&item), "com.example:mood");
    assert_eq!(item.size(), item.encoded_size());
    assert_eq!(item.children().len(), 3);
}

#[test]
fn cover_art_round_trips() {
    let png = b"\x89PNG\r\n\x1a\n....".to_vec();
    let mut ilst = BoxRecord::new_empty("ilst").unwrap();
    metadata::upsert(&mut ilst, FourCC(*b"covr"), DataValue::image(png.clone())).unwrap();

    let bytes = ilst.to_bytes().unwrap();
    let decoded = decode(&mut MemorySource::new(bytes)).unwrap();
    let entries = metadata::entries(&decoded[0]);

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1.kind, DataKind::Png);
    assert_eq!(entries[0].1.bytes, png);
}

/// Sum of child sizes equals the payload size, at every level.
fn assert_sizes_consistent(b: &BoxRecord) {
    if b.is_container() {
        let sum: u64 = b.children().iter().map(BoxRecord::size).sum();
        assert_eq!(sum, b.payload_len(), "children of {} do not fill it", b.typ());
    }
    for c in b.children() {
        assert_sizes_consistent(c);
    }
}

fn udta_with_empty_ilst() -> Vec<u8> {
    let mut meta = vec![0, 0, 0, 0];
    meta.extend(bx(b"ilst", &[]));
    bx(b"udta", &bx(b"meta", &meta))
}

#[test]
fn editing_through_child_mut_keeps_sizes_consistent() {
    let mut udta = decode(&mut MemorySource::new(udta_with_empty_ilst()))
        .unwrap()
        .remove(0);

    let ilst = udta
        .child_mut(FourCC(*b"meta"))
        .and_then(|m| m.child_mut(metadata::ILST))
        .unwrap();
    metadata::upsert(ilst, FourCC(*b"\xa9nam"), DataValue::text("Song")).unwrap();

    assert_sizes_consistent(&udta);
    let meta = udta.child(FourCC(*b"meta")).unwrap();
    // ilst 8 + ©nam 8 + data 8 + 8 + "Song"
    assert_eq!(meta.payload_len(), 36);
    assert_eq!(meta.size(), 12 + 36);
    assert_eq!(udta.size(), 8 + 48);
    assert_eq!(udta.to_bytes().unwrap().len() as u64, udta.size());
}

#[test]
fn edit_refreshes_every_header_on_the_path() {
    let mut udta = decode(&mut MemorySource::new(udta_with_empty_ilst()))
        .unwrap()
        .remove(0);

    let done = udta
        .edit("meta.ilst", |ilst| {
            metadata::upsert(ilst, FourCC(*b"\xa9ART"), DataValue::text("Band"))
        })
        .unwrap();
    assert_eq!(done, Some(()));

    assert_sizes_consistent(&udta);
    let meta = udta.child(FourCC(*b"meta")).unwrap();
    let ilst = meta.child(metadata::ILST).unwrap();
    assert_eq!(ilst.hdr.size, ilst.size());
    assert_eq!(meta.hdr.size, meta.size());
    assert_eq!(udta.hdr.size, 56);

    // missing paths leave the tree untouched
    let missing = udta.edit("meta.keys", |_| Ok(())).unwrap();
    assert_eq!(missing, None);
    assert_eq!(udta.hdr.size, 56);
}

#[test]
fn json_view_reflects_edits() {
    let mut udta = decode(&mut MemorySource::new(udta_with_empty_ilst()))
        .unwrap()
        .remove(0);
    let ilst = udta
        .child_mut(FourCC(*b"meta"))
        .and_then(|m| m.child_mut(metadata::ILST))
        .unwrap();
    metadata::upsert(ilst, FourCC(*b"\xa9nam"), DataValue::text("Song")).unwrap();

    let tree = mp4tree::json_api::to_json_tree(std::slice::from_ref(&udta));
    let meta = &tree[0].children.as_ref().unwrap()[0];
    assert_eq!(tree[0].size, 56);
    assert_eq!(meta.size, 48);
    assert_eq!(meta.payload_size, 36);
}
