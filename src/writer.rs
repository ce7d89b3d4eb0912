use crate::boxes::{BoxRecord, NodeKind, Payload};
use crate::error::{Error, Result};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

impl BoxRecord {
    fn header_len(&self, body: u64) -> u64 {
        let uuid = if self.hdr.uuid.is_some() { 16 } else { 0 };
        let small = 8 + uuid;
        if self.hdr.large || small + body > u64::from(u32::MAX) {
            small + 8
        } else {
            small
        }
    }

    pub(crate) fn body_len(&self) -> u64 {
        match &self.kind {
            NodeKind::Container(c) => c.iter().map(BoxRecord::encoded_size).sum(),
            NodeKind::FullContainer { children, .. } => {
                4 + children.iter().map(BoxRecord::encoded_size).sum::<u64>()
            }
            NodeKind::FullBox { payload, .. } => 4 + payload.len(),
            NodeKind::Leaf(p) | NodeKind::Unknown(p) => p.len(),
        }
    }

    /// Size this box takes when written, computed from its contents rather
    /// than from the (possibly stale) header.
    pub fn encoded_size(&self) -> u64 {
        let body = self.body_len();
        self.header_len(body) + body
    }

    /// Rewrites `start`, `size` and `header_size` of this box and all of its
    /// descendants as if it were written at offset `start`. Call after
    /// editing a tree in place.
    pub fn relayout(&mut self, start: u64) {
        let body = self.body_len();
        let header_size = self.header_len(body);
        self.hdr.start = start;
        self.hdr.header_size = header_size;
        self.hdr.size = header_size + body;
        self.hdr.to_end = false;

        let mut pos = start + header_size;
        if let NodeKind::FullContainer { .. } = self.kind {
            pos += 4;
        }
        if let Some(kids) = self.children_mut() {
            for child in kids {
                child.relayout(pos);
                pos += child.hdr.size;
            }
        }
    }

    /// Serializes this box and its subtree, returning the bytes written.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<u64> {
        let body = self.body_len();
        let header_size = self.header_len(body);
        let size = header_size + body;
        let uuid_len = if self.hdr.uuid.is_some() { 16 } else { 0 };

        if header_size > 8 + uuid_len {
            w.write_u32::<BigEndian>(1)?;
            w.write_all(&self.hdr.typ.0)?;
            w.write_u64::<BigEndian>(size)?;
        } else {
            w.write_u32::<BigEndian>(size as u32)?;
            w.write_all(&self.hdr.typ.0)?;
        }
        if let Some(u) = &self.hdr.uuid {
            w.write_all(u)?;
        }

        match &self.kind {
            NodeKind::Container(children) => {
                for c in children {
                    c.write_to(w)?;
                }
            }
            NodeKind::FullContainer {
                version,
                flags,
                children,
            } => {
                w.write_u8(*version)?;
                w.write_uint::<BigEndian>(u64::from(*flags), 3)?;
                for c in children {
                    c.write_to(w)?;
                }
            }
            NodeKind::FullBox {
                version,
                flags,
                payload,
            } => {
                w.write_u8(*version)?;
                w.write_uint::<BigEndian>(u64::from(*flags), 3)?;
                self.write_payload(payload, w)?;
            }
            NodeKind::Leaf(payload) | NodeKind::Unknown(payload) => {
                self.write_payload(payload, w)?;
            }
        }
        Ok(size)
    }

    fn write_payload<W: Write + ?Sized>(&self, payload: &Payload, w: &mut W) -> Result<()> {
        match payload {
            Payload::Inline(bytes) => Ok(w.write_all(bytes)?),
            Payload::Deferred { .. } => Err(Error::DeferredPayload(self.hdr.typ)),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_size() as usize);
        self.write_to(&mut out)?;
        Ok(out)
    }
}

/// Writes a sequence of top-level boxes back to back.
pub fn write_all<W: Write + ?Sized>(boxes: &[BoxRecord], w: &mut W) -> Result<u64> {
    let mut total = 0;
    for b in boxes {
        total += b.write_to(w)?;
    }
    tracing::debug!(boxes = boxes.len(), bytes = total, "encoded box tree");
    Ok(total)
}
