use crate::error::{Error, Result};
use crate::registry::BoxValue;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(b: &[u8; 4]) -> Self {
        FourCC(*b)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn as_str_lossy(&self) -> String {
        // 0xA9 ('©') leads most iTunes-style metadata keys
        self.0
            .iter()
            .map(|&c| match c {
                32..=126 => c as char,
                0xA9 => '©',
                _ => '.',
            })
            .collect()
    }
}

impl FromStr for FourCC {
    type Err = Error;

    /// Accepts four ASCII bytes, or a leading `©` followed by three ASCII
    /// bytes (stored as 0xA9, the way metadata keys are written on disk).
    fn from_str(s: &str) -> Result<Self> {
        let bytes: Vec<u8> = s
            .chars()
            .map(|c| match c {
                '©' => Some(0xA9),
                c if c.is_ascii() => Some(c as u8),
                _ => None,
            })
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| Error::InvalidFourCC(s.to_string()))?;
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| Error::InvalidFourCC(s.to_string()))?;
        Ok(FourCC(arr))
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}
impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    pub start: u64,       // offset of header start; 0 for boxes built in memory
    pub size: u64,        // effective total size including header
    pub typ: FourCC,      // 4CC or b"uuid"
    pub uuid: Option<[u8; 16]>,
    pub header_size: u64, // 8, 16, 24 or 32
    pub large: bool,      // size was stored in the 64-bit field
    pub to_end: bool,     // size field was 0
}

impl BoxHeader {
    /// Header for a box built in memory, before it has been laid out.
    pub fn new(typ: FourCC) -> Self {
        let uuid = (&typ.0 == b"uuid").then_some([0u8; 16]);
        let header_size = if uuid.is_some() { 24 } else { 8 };
        BoxHeader {
            start: 0,
            size: header_size,
            typ,
            uuid,
            header_size,
            large: false,
            to_end: false,
        }
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn payload_start(&self) -> u64 {
        self.start + self.header_size
    }
}

/// Bytes of a leaf box, either held in memory or left in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Inline(Vec<u8>),
    Deferred { offset: u64, len: u64 },
}

impl Payload {
    pub fn len(&self) -> u64 {
        match self {
            Payload::Inline(b) => b.len() as u64,
            Payload::Deferred { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Inline(b) => Some(b),
            Payload::Deferred { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container(Vec<BoxRecord>),
    FullContainer {
        version: u8,
        flags: u32,
        children: Vec<BoxRecord>,
    },
    FullBox {
        version: u8,
        flags: u32,
        payload: Payload,
    },
    Leaf(Payload),
    Unknown(Payload),
}

/// One node of the box tree. Containers own their children by value.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxRecord {
    pub hdr: BoxHeader,
    pub kind: NodeKind,
    /// Typed interpretation from a specialized payload decoder, if any.
    pub value: Option<BoxValue>,
}

impl BoxRecord {
    /// A generic leaf holding `payload`.
    pub fn leaf(typ: FourCC, payload: Vec<u8>) -> Self {
        let mut b = BoxRecord {
            hdr: BoxHeader::new(typ),
            kind: NodeKind::Leaf(Payload::Inline(payload)),
            value: None,
        };
        b.hdr.size = b.encoded_size();
        b
    }

    /// A generic, empty container.
    pub fn container(typ: FourCC) -> Self {
        BoxRecord {
            hdr: BoxHeader::new(typ),
            kind: NodeKind::Container(Vec::new()),
            value: None,
        }
    }

    pub fn typ(&self) -> FourCC {
        self.hdr.typ
    }

    /// Total size, header included, computed from the current contents.
    ///
    /// Equals `hdr.size` for a decoded tree. After children are edited
    /// through [`BoxRecord::child_mut`] it still reflects the edit, while
    /// `hdr.size` of the ancestors is only refreshed by
    /// [`BoxRecord::edit`] or [`BoxRecord::relayout`].
    pub fn size(&self) -> u64 {
        self.encoded_size()
    }

    /// Bytes after the header (and after version/flags for full boxes).
    pub fn payload_len(&self) -> u64 {
        match &self.kind {
            NodeKind::FullContainer { .. } => self.body_len() - 4,
            _ => self.body_len(),
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match &self.kind {
            NodeKind::Leaf(p) | NodeKind::Unknown(p) | NodeKind::FullBox { payload: p, .. } => {
                Some(p)
            }
            _ => None,
        }
    }

    pub fn version_flags(&self) -> Option<(u8, u32)> {
        match &self.kind {
            NodeKind::FullBox { version, flags, .. }
            | NodeKind::FullContainer { version, flags, .. } => Some((*version, *flags)),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Container(_) | NodeKind::FullContainer { .. }
        )
    }

    /// Children in stream / insertion order; empty for leaves.
    pub fn children(&self) -> &[BoxRecord] {
        match &self.kind {
            NodeKind::Container(c) | NodeKind::FullContainer { children: c, .. } => c,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<BoxRecord>> {
        match &mut self.kind {
            NodeKind::Container(c) | NodeKind::FullContainer { children: c, .. } => Some(c),
            _ => None,
        }
    }

    /// Appends a child. Fails on anything that is not a container.
    pub fn push_child(&mut self, child: BoxRecord) -> Result<()> {
        let typ = self.typ();
        let added = child.hdr.size;
        let kids = self.children_mut().ok_or(Error::NotContainer(typ))?;
        kids.push(child);
        self.hdr.size += added;
        Ok(())
    }

    /// First direct child with the given type.
    pub fn child(&self, typ: FourCC) -> Option<&BoxRecord> {
        self.children().iter().find(|c| c.typ() == typ)
    }

    pub fn child_mut(&mut self, typ: FourCC) -> Option<&mut BoxRecord> {
        self.children_mut()?.iter_mut().find(|c| c.typ() == typ)
    }

    /// Runs `f` on the descendant at the dotted `path` (empty for this box)
    /// and refreshes `hdr.size` of every box from there back up to `self`.
    ///
    /// Returns `Ok(None)` when the path does not exist.
    ///
    /// ```
    /// use mp4tree::{BoxRecord, FourCC, metadata::{self, DataValue}};
    ///
    /// let mut udta = BoxRecord::new_empty("udta")?;
    /// udta.push_child(BoxRecord::new_empty("ilst")?)?;
    /// udta.edit("ilst", |ilst| {
    ///     metadata::upsert(ilst, FourCC(*b"\xa9nam"), DataValue::text("Song"))
    /// })?;
    /// assert_eq!(udta.hdr.size, udta.size());
    /// # Ok::<(), mp4tree::Error>(())
    /// ```
    pub fn edit<R>(
        &mut self,
        path: &str,
        f: impl FnOnce(&mut BoxRecord) -> Result<R>,
    ) -> Result<Option<R>> {
        let segments = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<FourCC>>>()?;
        self.edit_segments(&segments, f)
    }

    fn edit_segments<R>(
        &mut self,
        segments: &[FourCC],
        f: impl FnOnce(&mut BoxRecord) -> Result<R>,
    ) -> Result<Option<R>> {
        let out = match segments.split_first() {
            None => Some(f(self)?),
            Some((typ, rest)) => match self.child_mut(*typ) {
                Some(child) => child.edit_segments(rest, f)?,
                None => return Ok(None),
            },
        };
        self.hdr.size = self.encoded_size();
        Ok(out)
    }

    /// Walks a dotted path of child types below this box, e.g. `"trak.mdia.hdlr"`.
    pub fn find(&self, path: &str) -> Option<&BoxRecord> {
        let mut cur = self;
        for seg in path.split('.').filter(|s| !s.is_empty()) {
            let typ: FourCC = seg.parse().ok()?;
            cur = cur.child(typ)?;
        }
        Some(cur)
    }
}
