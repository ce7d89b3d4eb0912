use crate::{
    boxes::BoxRecord,
    config::Config,
    registry::{Registry, default_registry, kind_label},
};
use serde::Serialize;
use std::path::Path;

/// A JSON-serializable view of one box and its subtree, for UIs and for the
/// `--json` output of `mp4dump`.
#[derive(Debug, Serialize)]
pub struct JsonBox {
    /// Absolute byte offset of this box
    pub offset: u64,
    /// Total size including header
    pub size: u64,
    pub header_size: u64,
    /// Bytes after the header (and after version/flags for full boxes)
    pub payload_size: u64,

    pub typ: String,
    /// Extended type of `uuid` boxes, as hex
    pub uuid: Option<String>,
    pub version: Option<u8>,
    pub flags: Option<u32>,
    /// "leaf", "full", "container", "full-container" or "unknown"
    pub kind: String,
    /// Human-readable box name (e.g. "File Type Box")
    pub full_name: String,
    /// Output of the specialized decoder, when one ran
    pub decoded: Option<serde_json::Value>,
    pub children: Option<Vec<JsonBox>>,
}

impl JsonBox {
    pub fn from_record(b: &BoxRecord, reg: &Registry) -> JsonBox {
        let hdr = &b.hdr;
        let (version, flags) = b.version_flags().unzip();
        let children = b.is_container().then(|| {
            b.children()
                .iter()
                .map(|c| JsonBox::from_record(c, reg))
                .collect()
        });
        // BoxValue only holds plain data, so this cannot fail in practice
        let decoded = b
            .value
            .as_ref()
            .and_then(|v| serde_json::to_value(v).ok());

        JsonBox {
            offset: hdr.start,
            size: b.size(),
            header_size: hdr.header_size,
            payload_size: b.payload_len(),
            typ: hdr.typ.to_string(),
            uuid: hdr.uuid.map(hex::encode),
            version,
            flags,
            kind: kind_label(b).to_string(),
            full_name: reg.full_name(hdr.typ).to_string(),
            decoded,
            children,
        }
    }
}

pub fn to_json_tree(boxes: &[BoxRecord]) -> Vec<JsonBox> {
    let reg = default_registry();
    boxes.iter().map(|b| JsonBox::from_record(b, reg)).collect()
}

/// Decode `path` and return its box tree in JSON-ready form.
pub fn analyze_file(path: impl AsRef<Path>, config: &Config) -> anyhow::Result<Vec<JsonBox>> {
    let boxes = crate::api::decode_file(path, config)?;
    Ok(to_json_tree(&boxes))
}
