use crate::boxes::{BoxRecord, FourCC, NodeKind};
use crate::error::Result;
use crate::metadata::{self, DataValue};
use crate::source::{ByteSource, Endian, MemorySource};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// A value produced by a specialized payload decoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BoxValue {
    FileType(FtypData),
    Handler(HdlrData),
    MovieHeader(MvhdData),
    MediaHeader(MdhdData),
    /// Key of a metadata-list item; freeform items read as `mean:name`.
    MetadataKey(String),
    Data(DataValue),
}

/// File Type / Segment Type Box data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FtypData {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

/// Handler Reference Box data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HdlrData {
    pub handler_type: FourCC,
    pub name: String,
}

/// Movie Header Box data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MvhdData {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
}

/// Media Header Box data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MdhdData {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub language: String,
}

/// Whether a box starts its payload with a version byte and 24 bits of flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullHeader {
    Absent,
    Present,
    /// Decided per box by looking at the payload (`meta`).
    Probe,
}

/// Specialized behaviour attached to a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    FileType,
    Handler,
    MovieHeader,
    MediaHeader,
    /// `ilst`: every child is a metadata item, whatever its tag.
    MetadataList,
    MetadataItem,
    Data,
}

/// Everything the decoder needs to know about one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub container: bool,
    pub full: FullHeader,
    pub special: Option<Special>,
    pub name: &'static str,
    pub known: bool,
}

impl Entry {
    /// Fallback for tags nobody registered.
    pub const UNKNOWN: Entry = Entry {
        container: false,
        full: FullHeader::Absent,
        special: None,
        name: "Unknown Box",
        known: false,
    };

    /// How every child of an `ilst` is treated.
    pub const METADATA_ITEM: Entry = Entry::container("Metadata Item").with(Special::MetadataItem);

    /// `mean` and `name` below a metadata item: a version/flags word and a
    /// string. Elsewhere (`udta/name`) they are plain leaves.
    pub const FREEFORM_FIELD: Entry = Entry::full("Freeform Field Box");

    pub const fn leaf(name: &'static str) -> Self {
        Entry {
            container: false,
            full: FullHeader::Absent,
            special: None,
            name,
            known: true,
        }
    }

    pub const fn full(name: &'static str) -> Self {
        Entry {
            full: FullHeader::Present,
            ..Entry::leaf(name)
        }
    }

    pub const fn container(name: &'static str) -> Self {
        Entry {
            container: true,
            ..Entry::leaf(name)
        }
    }

    pub const fn full_container(name: &'static str) -> Self {
        Entry {
            container: true,
            full: FullHeader::Present,
            ..Entry::leaf(name)
        }
    }

    pub const fn with(self, special: Special) -> Self {
        Entry {
            special: Some(special),
            ..self
        }
    }

    const fn probing(self) -> Self {
        Entry {
            full: FullHeader::Probe,
            ..self
        }
    }
}

/// Immutable map from tag to [`Entry`].
///
/// Build one with [`Registry::with_entry`], or use the process-wide
/// [`default_registry`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    map: HashMap<FourCC, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new registry with `entry` registered for `typ`, replacing any
    /// previous entry for the same tag.
    pub fn with_entry(mut self, typ: FourCC, entry: Entry) -> Self {
        self.map.insert(typ, entry);
        self
    }

    pub fn lookup(&self, typ: FourCC) -> Option<&Entry> {
        self.map.get(&typ)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Decides how a box is decoded, taking its parent and any per-call
    /// container overrides into account. Never fails: unknown tags fall back
    /// to [`Entry::UNKNOWN`].
    pub fn resolve(
        &self,
        typ: FourCC,
        parent: Option<&Entry>,
        overrides: &HashMap<FourCC, bool>,
    ) -> Entry {
        let mut entry = match parent.and_then(|p| p.special) {
            Some(Special::MetadataList) => self
                .lookup(typ)
                .filter(|e| e.special == Some(Special::MetadataItem))
                .copied()
                .unwrap_or(Entry::METADATA_ITEM),
            Some(Special::MetadataItem) if typ == metadata::MEAN || typ == metadata::NAME => {
                Entry::FREEFORM_FIELD
            }
            _ => self.lookup(typ).copied().unwrap_or(Entry::UNKNOWN),
        };
        if let Some(&container) = overrides.get(&typ) {
            entry.container = container;
        }
        entry
    }

    pub fn full_name(&self, typ: FourCC) -> &'static str {
        self.lookup(typ).map_or(Entry::UNKNOWN.name, |e| e.name)
    }
}

static KNOWN: &[(&[u8; 4], Entry)] = &[
    // file level
    (b"ftyp", Entry::leaf("File Type Box").with(Special::FileType)),
    (b"styp", Entry::leaf("Segment Type Box").with(Special::FileType)),
    (b"mdat", Entry::leaf("Media Data Box")),
    (b"free", Entry::leaf("Free Space Box")),
    (b"skip", Entry::leaf("Free Space Box")),
    (b"wide", Entry::leaf("Wide Box")),
    (b"pssh", Entry::full("Protection System Specific Header Box")),
    (b"sidx", Entry::full("Segment Index Box")),
    (b"emsg", Entry::full("Event Message Box")),
    (b"mfro", Entry::full("Movie Fragment Random Access Offset Box")),
    // containers
    (b"moov", Entry::container("Movie Box")),
    (b"trak", Entry::container("Track Box")),
    (b"mdia", Entry::container("Media Box")),
    (b"minf", Entry::container("Media Information Box")),
    (b"stbl", Entry::container("Sample Table Box")),
    (b"edts", Entry::container("Edit Box")),
    (b"udta", Entry::container("User Data Box")),
    (b"dinf", Entry::container("Data Information Box")),
    (b"mvex", Entry::container("Movie Extends Box")),
    (b"moof", Entry::container("Movie Fragment Box")),
    (b"traf", Entry::container("Track Fragment Box")),
    (b"mfra", Entry::container("Movie Fragment Random Access Box")),
    (b"tref", Entry::container("Track Reference Box")),
    (b"sinf", Entry::container("Protection Scheme Information Box")),
    (b"schi", Entry::container("Scheme Information Box")),
    (b"iprp", Entry::container("Item Properties Box")),
    (b"ipco", Entry::container("Item Property Container Box")),
    (b"meco", Entry::container("Additional Metadata Container Box")),
    (b"iref", Entry::full_container("Item Reference Box")),
    (b"meta", Entry::full_container("Meta Box").probing()),
    // full-box leaves
    (b"mvhd", Entry::full("Movie Header Box").with(Special::MovieHeader)),
    (b"tkhd", Entry::full("Track Header Box")),
    (b"mdhd", Entry::full("Media Header Box").with(Special::MediaHeader)),
    (b"hdlr", Entry::full("Handler Reference Box").with(Special::Handler)),
    (b"vmhd", Entry::full("Video Media Header Box")),
    (b"smhd", Entry::full("Sound Media Header Box")),
    (b"nmhd", Entry::full("Null Media Header Box")),
    (b"dref", Entry::full("Data Reference Box")),
    (b"stsd", Entry::full("Sample Description Box")),
    (b"stts", Entry::full("Decoding Time to Sample Box")),
    (b"ctts", Entry::full("Composition Time to Sample Box")),
    (b"stsc", Entry::full("Sample To Chunk Box")),
    (b"stsz", Entry::full("Sample Size Box")),
    (b"stz2", Entry::full("Compact Sample Size Box")),
    (b"stco", Entry::full("Chunk Offset Box")),
    (b"co64", Entry::full("Chunk Large Offset Box")),
    (b"stss", Entry::full("Sync Sample Box")),
    (b"elst", Entry::full("Edit List Box")),
    (b"mehd", Entry::full("Movie Extends Header Box")),
    (b"trex", Entry::full("Track Extends Box")),
    (b"mfhd", Entry::full("Movie Fragment Header Box")),
    (b"tfhd", Entry::full("Track Fragment Header Box")),
    (b"tfdt", Entry::full("Track Fragment Decode Time Box")),
    (b"trun", Entry::full("Track Fragment Run Box")),
    (b"tfra", Entry::full("Track Fragment Random Access Box")),
    (b"iloc", Entry::full("Item Location Box")),
    (b"iinf", Entry::full("Item Information Box")),
    (b"pitm", Entry::full("Primary Item Box")),
    (b"schm", Entry::full("Scheme Type Box")),
    (b"tenc", Entry::full("Track Encryption Box")),
    (b"saio", Entry::full("Sample Auxiliary Information Offsets Box")),
    (b"saiz", Entry::full("Sample Auxiliary Information Sizes Box")),
    // metadata list
    (b"ilst", Entry::container("Metadata Item List Box").with(Special::MetadataList)),
    (b"data", Entry::leaf("Metadata Data Box").with(Special::Data)),
    // full boxes only inside an item, see `Registry::resolve`
    (b"mean", Entry::leaf("Freeform Mean Box")),
    (b"name", Entry::leaf("Name Box")),
    (b"----", Entry::container("Freeform Metadata Item").with(Special::MetadataItem)),
    (b"\xa9nam", Entry::container("Title").with(Special::MetadataItem)),
    (b"\xa9ART", Entry::container("Artist").with(Special::MetadataItem)),
    (b"\xa9alb", Entry::container("Album").with(Special::MetadataItem)),
    (b"\xa9day", Entry::container("Release Date").with(Special::MetadataItem)),
    (b"\xa9gen", Entry::container("Genre").with(Special::MetadataItem)),
    (b"\xa9cmt", Entry::container("Comment").with(Special::MetadataItem)),
    (b"\xa9too", Entry::container("Encoder").with(Special::MetadataItem)),
    (b"\xa9wrt", Entry::container("Composer").with(Special::MetadataItem)),
    (b"aART", Entry::container("Album Artist").with(Special::MetadataItem)),
    (b"trkn", Entry::container("Track Number").with(Special::MetadataItem)),
    (b"disk", Entry::container("Disc Number").with(Special::MetadataItem)),
    (b"tmpo", Entry::container("Tempo").with(Special::MetadataItem)),
    (b"cpil", Entry::container("Compilation").with(Special::MetadataItem)),
    (b"covr", Entry::container("Cover Art").with(Special::MetadataItem)),
];

/// The registry of every tag this crate knows, built once per process.
pub fn default_registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        KNOWN
            .iter()
            .fold(Registry::new(), |reg, (typ, entry)| {
                reg.with_entry(FourCC(**typ), *entry)
            })
    })
}

// ---------- Helpers ----------

fn lang_from_u16(code: u16) -> String {
    if code == 0 {
        return "und".to_string();
    }
    let c1 = ((code >> 10) & 0x1F) as u8 + 0x60;
    let c2 = ((code >> 5) & 0x1F) as u8 + 0x60;
    let c3 = (code & 0x1F) as u8 + 0x60;
    format!("{}{}{}", c1 as char, c2 as char, c3 as char)
}

fn trimmed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// ---------- Decoders ----------

impl Special {
    /// Interprets an already framed record. `Ok(None)` means there is nothing
    /// to interpret (deferred payload, or a marker-only behaviour).
    pub fn interpret(self, rec: &BoxRecord) -> Result<Option<BoxValue>> {
        match self {
            Special::MetadataList => return Ok(None),
            Special::MetadataItem => {
                return Ok(Some(BoxValue::MetadataKey(metadata::item_key(rec))));
            }
            _ => {}
        }

        let Some(bytes) = rec.payload().and_then(|p| p.bytes()) else {
            return Ok(None);
        };
        let version = rec.version_flags().map_or(0, |(v, _)| v);
        let mut cur = MemorySource::from_slice(bytes);

        let value = match self {
            Special::FileType => decode_ftyp(&mut cur)?,
            Special::Handler => decode_hdlr(&mut cur)?,
            Special::MovieHeader => decode_mvhd(&mut cur, version)?,
            Special::MediaHeader => decode_mdhd(&mut cur, version)?,
            Special::Data => BoxValue::Data(DataValue::decode(bytes)?),
            Special::MetadataItem | Special::MetadataList => return Ok(None),
        };
        Ok(Some(value))
    }
}

// ftyp / styp: major + minor + compatible brands
fn decode_ftyp(cur: &mut MemorySource) -> Result<BoxValue> {
    let major_brand = cur.read_fourcc()?;
    let minor_version = cur.read_u32_be()?;
    let mut compatible_brands = Vec::new();
    while cur.remaining() >= 4 {
        compatible_brands.push(cur.read_fourcc()?);
    }
    Ok(BoxValue::FileType(FtypData {
        major_brand,
        minor_version,
        compatible_brands,
    }))
}

// hdlr: pre_defined, handler type, 3 reserved words, name
fn decode_hdlr(cur: &mut MemorySource) -> Result<BoxValue> {
    let _pre_defined = cur.read_u32_be()?;
    let handler_type = cur.read_fourcc()?;
    let _reserved = cur.read(12)?;
    let name_bytes = cur.read(cur.remaining())?;
    Ok(BoxValue::Handler(HdlrData {
        handler_type,
        name: trimmed_string(&name_bytes),
    }))
}

// times and duration are 64-bit in version 1, 32-bit otherwise
fn read_times(cur: &mut MemorySource, version: u8) -> Result<(u64, u64, u32, u64)> {
    let width = if version == 1 { 8 } else { 4 };
    let creation = cur.read_uint(width, Endian::Big)?;
    let modification = cur.read_uint(width, Endian::Big)?;
    let timescale = cur.read_u32_be()?;
    let duration = cur.read_uint(width, Endian::Big)?;
    Ok((creation, modification, timescale, duration))
}

fn decode_mvhd(cur: &mut MemorySource, version: u8) -> Result<BoxValue> {
    let (creation_time, modification_time, timescale, duration) = read_times(cur, version)?;
    Ok(BoxValue::MovieHeader(MvhdData {
        creation_time,
        modification_time,
        timescale,
        duration,
    }))
}

fn decode_mdhd(cur: &mut MemorySource, version: u8) -> Result<BoxValue> {
    let (creation_time, modification_time, timescale, duration) = read_times(cur, version)?;
    let language = cur.read_uint(2, Endian::Big)? as u16;
    Ok(BoxValue::MediaHeader(MdhdData {
        creation_time,
        modification_time,
        timescale,
        duration,
        language: lang_from_u16(language),
    }))
}

/// Framing-level description of a record, as shown by tools.
pub fn kind_label(rec: &BoxRecord) -> &'static str {
    match rec.kind {
        NodeKind::Container(_) => "container",
        NodeKind::FullContainer { .. } => "full-container",
        NodeKind::FullBox { .. } => "full",
        NodeKind::Leaf(_) => "leaf",
        NodeKind::Unknown(_) => "unknown",
    }
}
