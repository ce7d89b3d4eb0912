use crate::boxes::FourCC;

/// Coarse classification of [`Error`], useful when callers only care about
/// *why* a decode stopped, not the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A read or seek went past the end of the current scope.
    Bounds,
    /// Box sizes do not fit together.
    Framing,
    /// File could not be opened or an I/O call failed.
    Resource,
    /// Input is well framed but cannot be handled (nesting too deep, ...).
    Structure,
    /// The caller asked for something that does not make sense.
    Usage,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),

    #[error("read of {requested} bytes at offset {offset} exceeds the {available} bytes available")]
    OutOfBounds {
        offset: u64,
        requested: u64,
        available: u64,
    },
    #[error("cannot seek to {pos}: source length is {len}")]
    InvalidSeek { pos: u64, len: u64 },

    #[error("box '{typ}' declares size {size}, smaller than its {header_size}-byte header")]
    InvalidSize {
        typ: FourCC,
        size: u64,
        header_size: u64,
    },
    #[error("box '{typ}' ends at {end}, past the end of its enclosing scope at {parent_end}")]
    ExceedsParent {
        typ: FourCC,
        end: u64,
        parent_end: u64,
    },
    #[error("{remaining} trailing bytes at offset {offset} are too short for a box header")]
    TrailingBytes { offset: u64, remaining: u64 },

    #[error("box nesting deeper than {max} levels")]
    DepthExceeded { max: usize },
    #[error("payload of box '{0}' was not loaded and cannot be written")]
    DeferredPayload(FourCC),

    #[error("box '{0}' is not a container")]
    NotContainer(FourCC),
    #[error("invalid four-character code {0:?}")]
    InvalidFourCC(String),
    #[error("invalid open mode {0:?}")]
    InvalidMode(String),
    #[error("unsupported integer width {0}")]
    InvalidWidth(usize),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Config(_) => ErrorKind::Resource,
            Error::OutOfBounds { .. } | Error::InvalidSeek { .. } => ErrorKind::Bounds,
            Error::InvalidSize { .. } | Error::ExceedsParent { .. } | Error::TrailingBytes { .. } => {
                ErrorKind::Framing
            }
            Error::DepthExceeded { .. } | Error::DeferredPayload(_) => ErrorKind::Structure,
            Error::NotContainer(_)
            | Error::InvalidFourCC(_)
            | Error::InvalidMode(_)
            | Error::InvalidWidth(_) => ErrorKind::Usage,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
