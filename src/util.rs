use crate::error::Result;
use crate::source::ByteSource;

/// Reads `len` bytes at `offset`, leaving the source's offset where it was.
pub fn read_slice<S: ByteSource + ?Sized>(r: &mut S, offset: u64, len: u64) -> Result<Vec<u8>> {
    let saved = r.offset();
    r.set_offset(offset)?;
    let out = r.read(len);
    r.set_offset(saved)?;
    out
}

pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let hexs: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<48}  |{}|\n", offs, hexs, ascii));
    }
    out
}
