pub mod api;
pub mod boxes;
pub mod config;
pub mod error;
pub mod json_api;
pub mod metadata;
pub mod parser;
pub mod registry;
pub mod source;
pub mod util;
pub mod writer;

pub use api::{HexDump, decode_file, hex_range, open};
pub use boxes::{BoxHeader, BoxRecord, FourCC, NodeKind, Payload};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use json_api::{JsonBox, analyze_file};
pub use parser::{DecodeOptions, Decoder, decode, decode_box, parse_children, read_box_header};
pub use registry::{BoxValue, Registry, default_registry};
pub use source::{ByteSource, Endian, FileSource, MemorySource, OpenMode};
