use crate::{
    boxes::BoxRecord,
    config::Config,
    parser::Decoder,
    registry::default_registry,
    source::{ByteSource, FileSource, OpenMode},
    util::{hex_dump, read_slice},
};
use serde::Serialize;
use std::path::Path;

/// Opens `path` as a byte source.
///
/// `mode` is a C-style mode string (`"r"`, `"rb"`, `"r+"`, `"w+"`, `"a+"`);
/// when it is `None` the config's `default_mode` is used.
pub fn open(
    path: impl AsRef<Path>,
    mode: Option<&str>,
    config: &Config,
) -> crate::error::Result<FileSource> {
    let mode: OpenMode = mode.unwrap_or(config.default_mode.as_str()).parse()?;
    FileSource::open_with_mode(path, mode)
}

/// Opens `path` and decodes its whole box tree.
///
/// The file is closed before this returns, whether decoding succeeded or not.
///
/// ```no_run
/// use mp4tree::{Config, decode_file};
///
/// let boxes = decode_file("video.mp4", &Config::default())?;
/// for b in &boxes {
///     println!("{} {}", b.typ(), b.size());
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn decode_file(path: impl AsRef<Path>, config: &Config) -> anyhow::Result<Vec<BoxRecord>> {
    let path = path.as_ref();
    let mut src = open(path, None, config)?;
    let decoder = Decoder::new(default_registry(), config.decode_options());
    let boxes = decoder.decode_all(&mut src).map_err(|e| {
        anyhow::Error::new(e).context(format!("decoding {}", path.display()))
    })?;
    Ok(boxes)
}

/// Result of a hex dump operation containing the formatted hex output.
#[derive(Debug, Serialize)]
pub struct HexDump {
    /// Starting offset of the dumped data
    pub offset: u64,
    /// Actual number of bytes that were read and dumped
    pub length: u64,
    /// Formatted hex dump string with addresses and ASCII representation
    pub hex: String,
}

/// Hex-dump up to `max_len` bytes starting at `offset`.
///
/// Never reads past the end of the source; if `offset + max_len` goes beyond
/// it, the returned length is smaller than `max_len`. The source's offset is
/// left unchanged.
pub fn hex_range<S: ByteSource + ?Sized>(
    r: &mut S,
    offset: u64,
    max_len: u64,
) -> anyhow::Result<HexDump> {
    let available = r.len().saturating_sub(offset);
    let to_read = available.min(max_len);

    if to_read == 0 {
        return Ok(HexDump {
            offset,
            length: 0,
            hex: String::new(),
        });
    }

    let data = read_slice(r, offset, to_read)?;
    Ok(HexDump {
        offset,
        length: to_read,
        hex: hex_dump(&data, offset),
    })
}
