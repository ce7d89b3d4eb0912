use crate::boxes::{BoxHeader, BoxRecord, FourCC, NodeKind, Payload};
use crate::error::{Error, ErrorKind, Result};
use crate::metadata::{self, DataValue};
use crate::registry::{Entry, FullHeader, Registry, Special, default_registry};
use crate::source::{ByteSource, Endian};
use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;

/// Deepest nesting accepted by default. Top-level boxes sit at depth 0.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Smallest possible box header: 32-bit size + type.
pub const MIN_HEADER_SIZE: u64 = 8;

#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// A box at depth `>= max_depth` fails with [`Error::DepthExceeded`].
    pub max_depth: usize,
    /// Leaf payloads longer than this are skipped and recorded as
    /// [`Payload::Deferred`]. `None` loads everything.
    pub inline_limit: Option<u64>,
    /// Forces container (`true`) or leaf (`false`) interpretation of a tag.
    pub overrides: HashMap<FourCC, bool>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            inline_limit: None,
            overrides: HashMap::new(),
        }
    }
}

impl DecodeOptions {
    pub fn with_override(mut self, typ: FourCC, container: bool) -> Self {
        self.overrides.insert(typ, container);
        self
    }
}

/// Reads one box header at the current offset and checks it against the end
/// of the enclosing scope. A `size == 0` header extends to `scope_end`.
pub fn read_box_header<S: ByteSource + ?Sized>(r: &mut S, scope_end: u64) -> Result<BoxHeader> {
    let start = r.offset();
    let size32 = r.read_u32_be()?;
    let typ = r.read_fourcc()?;
    let large = size32 == 1;
    let mut size = if large {
        r.read_u64_be()?
    } else {
        u64::from(size32)
    };

    let mut uuid = None;
    if &typ.0 == b"uuid" {
        let mut u = [0u8; 16];
        r.read_exact(&mut u)?;
        uuid = Some(u);
    }

    let header_size = r.offset() - start;
    let to_end = size32 == 0;
    if to_end {
        size = scope_end.saturating_sub(start);
    }

    if size < header_size {
        return Err(Error::InvalidSize {
            typ,
            size,
            header_size,
        });
    }
    let end = start.checked_add(size).unwrap_or(u64::MAX);
    if end > scope_end {
        return Err(Error::ExceedsParent {
            typ,
            end,
            parent_end: scope_end,
        });
    }

    Ok(BoxHeader {
        start,
        size,
        typ,
        uuid,
        header_size,
        large,
        to_end,
    })
}

/// Recursive-descent box decoder bound to a registry and a set of options.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    registry: &'a Registry,
    options: DecodeOptions,
}

impl Default for Decoder<'static> {
    fn default() -> Self {
        Decoder::new(default_registry(), DecodeOptions::default())
    }
}

impl<'a> Decoder<'a> {
    pub fn new(registry: &'a Registry, options: DecodeOptions) -> Self {
        Decoder { registry, options }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decodes every top-level box from the current offset to the end of the
    /// source.
    pub fn decode_all<S: ByteSource + ?Sized>(&self, r: &mut S) -> Result<Vec<BoxRecord>> {
        let end = r.len();
        let boxes = self.parse_children(r, end, 0, None)?;
        tracing::debug!(count = boxes.len(), len = end, "decoded top-level boxes");
        Ok(boxes)
    }

    /// Decodes the single box at the current offset.
    pub fn decode_box<S: ByteSource + ?Sized>(&self, r: &mut S) -> Result<BoxRecord> {
        let end = r.len();
        self.decode_at(r, end, 0, None)
    }

    /// Decodes sibling boxes until exactly `parent_end`. Trailing bytes too
    /// short to hold a header are a framing error.
    pub fn parse_children<S: ByteSource + ?Sized>(
        &self,
        r: &mut S,
        parent_end: u64,
        depth: usize,
        parent: Option<&Entry>,
    ) -> Result<Vec<BoxRecord>> {
        let mut kids = Vec::new();
        loop {
            let pos = r.offset();
            if pos >= parent_end {
                break;
            }
            let remaining = parent_end - pos;
            if remaining < MIN_HEADER_SIZE {
                return Err(Error::TrailingBytes {
                    offset: pos,
                    remaining,
                });
            }
            kids.push(self.decode_at(r, parent_end, depth, parent)?);
        }
        Ok(kids)
    }

    fn decode_at<S: ByteSource + ?Sized>(
        &self,
        r: &mut S,
        scope_end: u64,
        depth: usize,
        parent: Option<&Entry>,
    ) -> Result<BoxRecord> {
        if depth >= self.options.max_depth {
            return Err(Error::DepthExceeded {
                max: self.options.max_depth,
            });
        }

        let hdr = read_box_header(r, scope_end)?;
        let entry = self
            .registry
            .resolve(hdr.typ, parent, &self.options.overrides);
        tracing::trace!(
            typ = %hdr.typ,
            start = hdr.start,
            size = hdr.size,
            depth,
            container = entry.container,
            "box header"
        );
        if !entry.known && !entry.container {
            tracing::trace!(typ = %hdr.typ, "unregistered tag, keeping opaque payload");
        }

        let end = hdr.end();
        let full = match entry.full {
            FullHeader::Absent => false,
            FullHeader::Present => true,
            FullHeader::Probe => probe_full_header(r, end)?,
        };

        let mut version_flags = (0u8, 0u32);
        if full {
            if end - r.offset() < 4 {
                return Err(Error::InvalidSize {
                    typ: hdr.typ,
                    size: hdr.size,
                    header_size: hdr.header_size + 4,
                });
            }
            let version = r.read_u8()?;
            let flags = r.read_uint(3, Endian::Big)? as u32;
            version_flags = (version, flags);
        }
        let (version, flags) = version_flags;

        let kind = if entry.container {
            match self.parse_children(r, end, depth + 1, Some(&entry)) {
                Ok(children) => {
                    tracing::debug!(typ = %hdr.typ, children = children.len(), "container decoded");
                    if full {
                        NodeKind::FullContainer {
                            version,
                            flags,
                            children,
                        }
                    } else {
                        NodeKind::Container(children)
                    }
                }
                // a probed box that frames as neither form is kept whole
                Err(e)
                    if entry.full == FullHeader::Probe
                        && matches!(e.kind(), ErrorKind::Framing | ErrorKind::Bounds) =>
                {
                    tracing::warn!(
                        typ = %hdr.typ,
                        offset = hdr.start,
                        error = %e,
                        "children do not frame, keeping opaque payload"
                    );
                    r.set_offset(hdr.payload_start())?;
                    NodeKind::Leaf(self.read_payload(r, end)?)
                }
                Err(e) => return Err(e),
            }
        } else {
            let payload = self.read_payload(r, end)?;
            if full {
                NodeKind::FullBox {
                    version,
                    flags,
                    payload,
                }
            } else if entry.known {
                NodeKind::Leaf(payload)
            } else {
                NodeKind::Unknown(payload)
            }
        };

        // Skip to end of box
        r.set_offset(end)?;

        let mut rec = BoxRecord {
            hdr,
            kind,
            value: None,
        };
        if let Some(special) = entry.special {
            match special.interpret(&rec) {
                Ok(value) => rec.value = value,
                Err(e) => tracing::warn!(
                    typ = %rec.hdr.typ,
                    offset = rec.hdr.start,
                    error = %e,
                    "payload decoder failed, keeping generic box"
                ),
            }
        }
        Ok(rec)
    }

    fn read_payload<S: ByteSource + ?Sized>(&self, r: &mut S, end: u64) -> Result<Payload> {
        let offset = r.offset();
        let len = end - offset;
        if self.options.inline_limit.is_some_and(|limit| len > limit) {
            r.set_offset(end)?;
            return Ok(Payload::Deferred { offset, len });
        }
        Ok(Payload::Inline(r.read(len)?))
    }
}

/// `meta` is a FullBox in ISO files but a plain container in QuickTime ones.
/// The payload is read as plain children only when it starts with a
/// plausible child header: a size that fits and a printable type.
fn probe_full_header<S: ByteSource + ?Sized>(r: &mut S, end: u64) -> Result<bool> {
    let available = end - r.offset();
    if available < MIN_HEADER_SIZE {
        return Ok(available >= 4);
    }
    let head = r.peek(MIN_HEADER_SIZE)?;
    let size = u64::from(BigEndian::read_u32(&head[..4]));
    let printable = head[4..8]
        .iter()
        .all(|&c| (32..=126).contains(&c) || c == 0xA9);
    let plain = (MIN_HEADER_SIZE..=available).contains(&size) && printable;
    Ok(!plain)
}

/// Decodes all top-level boxes with the default registry and options.
pub fn decode<S: ByteSource + ?Sized>(r: &mut S) -> Result<Vec<BoxRecord>> {
    Decoder::default().decode_all(r)
}

/// Decodes the single box at the current offset with the default registry.
pub fn decode_box<S: ByteSource + ?Sized>(r: &mut S) -> Result<BoxRecord> {
    Decoder::default().decode_box(r)
}

/// Decodes the boxes between the current offset and `parent_end`.
pub fn parse_children<S: ByteSource + ?Sized>(r: &mut S, parent_end: u64) -> Result<Vec<BoxRecord>> {
    Decoder::default().parse_children(r, parent_end, 0, None)
}

impl BoxRecord {
    /// Decodes the box at the current offset of `r`.
    pub fn decode<S: ByteSource + ?Sized>(r: &mut S) -> Result<BoxRecord> {
        decode_box(r)
    }

    /// Builds an empty box for `tag` using the default registry.
    ///
    /// Metadata items come with their default `data` child, so the tree is
    /// well formed before any value is assigned.
    pub fn new_empty(tag: &str) -> Result<BoxRecord> {
        Ok(Self::new_empty_with(tag.parse()?, default_registry(), None))
    }

    /// Like [`BoxRecord::new_empty`], with an explicit registry and an
    /// optional container override for tags whose shape is ambiguous.
    pub fn new_empty_with(typ: FourCC, registry: &Registry, container: Option<bool>) -> BoxRecord {
        let mut entry = registry.lookup(typ).copied().unwrap_or(Entry::UNKNOWN);
        if let Some(c) = container {
            entry.container = c;
        }

        if entry.container && entry.special == Some(Special::MetadataItem) {
            return metadata::new_item(typ);
        }
        if !entry.container && entry.special == Some(Special::Data) {
            return metadata::data_box(DataValue::empty());
        }

        // probed headers are built in the ISO form
        let full = entry.full != FullHeader::Absent;
        let kind = match (entry.container, full) {
            (true, true) => NodeKind::FullContainer {
                version: 0,
                flags: 0,
                children: Vec::new(),
            },
            (true, false) => NodeKind::Container(Vec::new()),
            (false, true) => NodeKind::FullBox {
                version: 0,
                flags: 0,
                payload: Payload::Inline(Vec::new()),
            },
            (false, false) if entry.known => NodeKind::Leaf(Payload::Inline(Vec::new())),
            (false, false) => NodeKind::Unknown(Payload::Inline(Vec::new())),
        };
        let mut rec = BoxRecord {
            hdr: BoxHeader::new(typ),
            kind,
            value: None,
        };
        rec.hdr.size = rec.encoded_size();
        rec
    }
}
