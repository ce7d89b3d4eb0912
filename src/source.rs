//! Seekable, offset-tracking byte sources the box decoder reads from.
//!
//! Every source knows its total length up front. Reads are all-or-nothing: a
//! read that cannot be satisfied fails with [`Error::OutOfBounds`] and leaves
//! the offset where it was.

use crate::boxes::FourCC;
use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

/// Byte order of a multi-byte integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

pub trait ByteSource {
    /// Total number of addressable bytes.
    fn len(&self) -> u64;

    /// Current absolute offset, always within `[0, len]`.
    fn offset(&self) -> u64;

    /// Moves to an absolute offset. Fails if `pos > len`.
    fn set_offset(&mut self, pos: u64) -> Result<()>;

    /// Fills `buf` from the current offset and advances past it.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.offset())
    }

    /// Reads exactly `n` bytes.
    fn read(&mut self, n: u64) -> Result<Vec<u8>> {
        let available = self.remaining();
        if n > available {
            return Err(Error::OutOfBounds {
                offset: self.offset(),
                requested: n,
                available,
            });
        }
        // `n <= remaining` so it fits in memory-addressable space for any
        // source we can actually construct.
        let mut buf = vec![0u8; n as usize];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads `n` bytes without moving the offset.
    fn peek(&mut self, n: u64) -> Result<Vec<u8>> {
        let pos = self.offset();
        let out = self.read(n);
        self.set_offset(pos)?;
        out
    }

    /// Reads an unsigned integer `width` bytes wide (1..=8).
    fn read_uint(&mut self, width: usize, endian: Endian) -> Result<u64> {
        if !(1..=8).contains(&width) {
            return Err(Error::InvalidWidth(width));
        }
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf[..width])?;
        Ok(match endian {
            Endian::Big => BigEndian::read_uint(&buf, width),
            Endian::Little => LittleEndian::read_uint(&buf, width),
        })
    }

    /// Reads a two's-complement signed integer `width` bytes wide (1..=8).
    fn read_int(&mut self, width: usize, endian: Endian) -> Result<i64> {
        if !(1..=8).contains(&width) {
            return Err(Error::InvalidWidth(width));
        }
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf[..width])?;
        Ok(match endian {
            Endian::Big => BigEndian::read_int(&buf, width),
            Endian::Little => LittleEndian::read_int(&buf, width),
        })
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_uint(1, Endian::Big)? as u8)
    }

    fn read_u32_be(&mut self) -> Result<u32> {
        Ok(self.read_uint(4, Endian::Big)? as u32)
    }

    fn read_u64_be(&mut self) -> Result<u64> {
        self.read_uint(8, Endian::Big)
    }

    fn read_fourcc(&mut self) -> Result<FourCC> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(FourCC(b))
    }
}

fn check_available(offset: u64, requested: u64, len: u64) -> Result<()> {
    let available = len.saturating_sub(offset);
    if requested > available {
        return Err(Error::OutOfBounds {
            offset,
            requested,
            available,
        });
    }
    Ok(())
}

/// A source over an owned in-memory buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
    pos: u64,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }

    /// The whole underlying buffer, regardless of the current offset.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn offset(&self) -> u64 {
        self.pos
    }

    fn set_offset(&mut self, pos: u64) -> Result<()> {
        if pos > self.len() {
            return Err(Error::InvalidSeek {
                pos,
                len: self.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        check_available(self.pos, buf.len() as u64, self.len())?;
        let start = self.pos as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        self.pos += buf.len() as u64;
        Ok(())
    }
}

/// How a file is opened, parsed from a C-style mode string.
///
/// Only modes that allow reading are accepted, since the decoder must be able
/// to read what it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `r`
    Read,
    /// `r+`: read and write, file must exist.
    ReadWrite,
    /// `w+`: read and write, create or truncate.
    Truncate,
    /// `a+`: read and append, create if missing.
    Append,
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let stripped: String = s.chars().filter(|&c| c != 'b').collect();
        // `b` may appear at most once, anywhere after the first letter
        if s.len() - stripped.len() > 1 || s.starts_with('b') {
            return Err(Error::InvalidMode(s.to_string()));
        }
        match stripped.as_str() {
            "r" => Ok(OpenMode::Read),
            "r+" => Ok(OpenMode::ReadWrite),
            "w+" => Ok(OpenMode::Truncate),
            "a+" => Ok(OpenMode::Append),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

impl OpenMode {
    fn options(self) -> OpenOptions {
        let mut o = OpenOptions::new();
        o.read(true);
        match self {
            OpenMode::Read => {}
            OpenMode::ReadWrite => {
                o.write(true);
            }
            OpenMode::Truncate => {
                o.write(true).create(true).truncate(true);
            }
            OpenMode::Append => {
                o.append(true).create(true);
            }
        }
        o
    }
}

/// A source backed by an open file. The handle is closed when the source is
/// dropped.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
    pos: u64,
}

impl FileSource {
    /// Opens `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_mode(path, OpenMode::Read)
    }

    pub fn open_with_mode(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let file = mode.options().open(path)?;
        tracing::debug!(path = %path.display(), ?mode, "opened file source");
        Self::from_file(file)
    }

    /// Wraps an already open file. Its length is probed once, here.
    pub fn from_file(mut file: File) -> Result<Self> {
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self { file, len, pos: 0 })
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn offset(&self) -> u64 {
        self.pos
    }

    fn set_offset(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(Error::InvalidSeek { pos, len: self.len });
        }
        self.pos = pos;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        check_available(self.pos, buf.len() as u64, self.len)?;
        // The OS cursor is not trusted between calls; `pos` is authoritative
        // and only moves once the whole read succeeded.
        self.file.seek(SeekFrom::Start(self.pos))?;
        self.file.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }
}
