//! iTunes-style metadata lists: an `ilst` container whose children are items
//! keyed by their tag (`©nam`, `trkn`, `covr`, ...). Each item holds a `data`
//! box whose payload is a type indicator, a locale and the value bytes:
//!
//! ```text
//! ilst
//!   ©nam
//!     data  [00 00 00 01][00 00 00 00] "My Title"
//!   ----
//!     mean  [version/flags] "com.apple.iTunes"
//!     name  [version/flags] "iTunNORM"
//!     data  ...
//! ```

use crate::boxes::{BoxHeader, BoxRecord, FourCC, NodeKind, Payload};
use crate::error::{Error, Result};
use crate::registry::BoxValue;
use crate::source::{ByteSource, MemorySource};
use byteorder::{BigEndian, ByteOrder};
use serde::{Serialize, Serializer};

pub const ILST: FourCC = FourCC::new(b"ilst");
pub const DATA: FourCC = FourCC::new(b"data");
pub const FREEFORM: FourCC = FourCC::new(b"----");
pub const MEAN: FourCC = FourCC::new(b"mean");
pub const NAME: FourCC = FourCC::new(b"name");

/// Well-known value types of a `data` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataKind {
    /// Type is implied by the item key.
    Implicit,
    Utf8,
    Utf16,
    Jpeg,
    Png,
    BeSigned,
    BeUnsigned,
    Bmp,
    Other(u32),
}

impl DataKind {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => DataKind::Implicit,
            1 => DataKind::Utf8,
            2 => DataKind::Utf16,
            13 => DataKind::Jpeg,
            14 => DataKind::Png,
            21 => DataKind::BeSigned,
            22 => DataKind::BeUnsigned,
            27 => DataKind::Bmp,
            n => DataKind::Other(n),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            DataKind::Implicit => 0,
            DataKind::Utf8 => 1,
            DataKind::Utf16 => 2,
            DataKind::Jpeg => 13,
            DataKind::Png => 14,
            DataKind::BeSigned => 21,
            DataKind::BeUnsigned => 22,
            DataKind::Bmp => 27,
            DataKind::Other(n) => n,
        }
    }
}

fn as_hex<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

/// Decoded payload of a `data` box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataValue {
    pub kind: DataKind,
    pub locale: u32,
    #[serde(serialize_with = "as_hex")]
    pub bytes: Vec<u8>,
}

impl DataValue {
    /// What a freshly built item holds before anything is assigned.
    pub fn empty() -> Self {
        DataValue {
            kind: DataKind::Implicit,
            locale: 0,
            bytes: Vec::new(),
        }
    }

    pub fn text(s: &str) -> Self {
        DataValue {
            kind: DataKind::Utf8,
            locale: 0,
            bytes: s.as_bytes().to_vec(),
        }
    }

    /// Image bytes; the kind is sniffed from the file signature.
    pub fn image(bytes: Vec<u8>) -> Self {
        let kind = if bytes.starts_with(b"\x89PNG") {
            DataKind::Png
        } else if bytes.starts_with(&[0xFF, 0xD8]) {
            DataKind::Jpeg
        } else if bytes.starts_with(b"BM") {
            DataKind::Bmp
        } else {
            DataKind::Implicit
        };
        DataValue {
            kind,
            locale: 0,
            bytes,
        }
    }

    /// A big-endian signed integer in the narrowest of 1, 2, 4 or 8 bytes.
    pub fn integer(v: i64) -> Self {
        let width = if i8::try_from(v).is_ok() {
            1
        } else if i16::try_from(v).is_ok() {
            2
        } else if i32::try_from(v).is_ok() {
            4
        } else {
            8
        };
        let mut bytes = vec![0u8; width];
        BigEndian::write_int(&mut bytes, v, width);
        DataValue {
            kind: DataKind::BeSigned,
            locale: 0,
            bytes,
        }
    }

    pub fn boolean(v: bool) -> Self {
        Self::integer(i64::from(v))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cur = MemorySource::from_slice(payload);
        // high byte is the type set; 0 is the well-known set
        let indicator = cur.read_u32_be()?;
        let locale = cur.read_u32_be()?;
        let bytes = cur.read(cur.remaining())?;
        Ok(DataValue {
            kind: DataKind::from_code(indicator & 0x00FF_FFFF),
            locale,
            bytes,
        })
    }

    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.bytes.len());
        out.extend_from_slice(&self.kind.code().to_be_bytes());
        out.extend_from_slice(&self.locale.to_be_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }

    pub fn as_text(&self) -> Option<String> {
        match self.kind {
            DataKind::Utf8 => String::from_utf8(self.bytes.clone()).ok(),
            DataKind::Utf16 => {
                if self.bytes.len() % 2 != 0 {
                    return None;
                }
                let units: Vec<u16> = self
                    .bytes
                    .chunks_exact(2)
                    .map(BigEndian::read_u16)
                    .collect();
                String::from_utf16(&units).ok()
            }
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        let n = self.bytes.len();
        if !(1..=8).contains(&n) {
            return None;
        }
        match self.kind {
            DataKind::BeSigned => Some(BigEndian::read_int(&self.bytes, n)),
            DataKind::BeUnsigned => i64::try_from(BigEndian::read_uint(&self.bytes, n)).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_integer().map(|v| v != 0)
    }
}

/// A `data` leaf carrying `value`.
pub fn data_box(value: DataValue) -> BoxRecord {
    let mut rec = BoxRecord::leaf(DATA, value.to_payload());
    rec.value = Some(BoxValue::Data(value));
    rec
}

/// A metadata item with its default, empty `data` child.
pub fn new_item(typ: FourCC) -> BoxRecord {
    let mut item = BoxRecord::container(typ);
    item.kind = NodeKind::Container(vec![data_box(DataValue::empty())]);
    item.hdr.size = item.encoded_size();
    item.value = Some(BoxValue::MetadataKey(item_key(&item)));
    item
}

fn full_string_box(typ: FourCC, s: &str) -> BoxRecord {
    let mut rec = BoxRecord {
        hdr: BoxHeader::new(typ),
        kind: NodeKind::FullBox {
            version: 0,
            flags: 0,
            payload: Payload::Inline(s.as_bytes().to_vec()),
        },
        value: None,
    };
    rec.hdr.size = rec.encoded_size();
    rec
}

/// A `----` item keyed by a reverse-DNS `mean` and a `name`.
pub fn freeform_item(mean: &str, name: &str, value: DataValue) -> BoxRecord {
    let mut item = BoxRecord::container(FREEFORM);
    item.kind = NodeKind::Container(vec![
        full_string_box(MEAN, mean),
        full_string_box(NAME, name),
        data_box(value),
    ]);
    item.hdr.size = item.encoded_size();
    item.value = Some(BoxValue::MetadataKey(item_key(&item)));
    item
}

fn leaf_text(rec: Option<&BoxRecord>) -> String {
    rec.and_then(|r| r.payload())
        .and_then(|p| p.bytes())
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}

/// The item's key: its tag, or `mean:name` for freeform items.
pub fn item_key(item: &BoxRecord) -> String {
    if item.typ() == FREEFORM {
        format!(
            "{}:{}",
            leaf_text(item.child(MEAN)),
            leaf_text(item.child(NAME))
        )
    } else {
        item.typ().to_string()
    }
}

/// The value of the item's first `data` child.
pub fn item_value(item: &BoxRecord) -> Option<&DataValue> {
    match item.child(DATA)?.value.as_ref()? {
        BoxValue::Data(v) => Some(v),
        _ => None,
    }
}

/// Replaces the value of the item's `data` child, adding one if missing.
pub fn set_item_value(item: &mut BoxRecord, value: DataValue) -> Result<()> {
    if !item.is_container() {
        return Err(Error::NotContainer(item.typ()));
    }
    match item.child_mut(DATA) {
        Some(data) => {
            data.kind = NodeKind::Leaf(Payload::Inline(value.to_payload()));
            data.value = Some(BoxValue::Data(value));
            data.hdr.size = data.encoded_size();
        }
        None => item.push_child(data_box(value))?,
    }
    item.hdr.size = item.encoded_size();
    Ok(())
}

/// `(key, value)` for every item of an `ilst` that carries a value.
pub fn entries(ilst: &BoxRecord) -> Vec<(String, &DataValue)> {
    ilst.children()
        .iter()
        .filter_map(|item| item_value(item).map(|v| (item_key(item), v)))
        .collect()
}

/// Sets the value of item `typ`, creating the item if the list lacks it.
pub fn upsert(ilst: &mut BoxRecord, typ: FourCC, value: DataValue) -> Result<()> {
    let list_typ = ilst.typ();
    let items = ilst.children_mut().ok_or(Error::NotContainer(list_typ))?;
    match items.iter_mut().find(|c| c.typ() == typ) {
        Some(item) => set_item_value(item, value)?,
        None => {
            let mut item = new_item(typ);
            set_item_value(&mut item, value)?;
            items.push(item);
        }
    }
    ilst.hdr.size = ilst.encoded_size();
    Ok(())
}
