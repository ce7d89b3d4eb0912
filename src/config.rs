use crate::error::{Error, Result};
use crate::parser::{DEFAULT_MAX_DEPTH, DecodeOptions};
use serde::Deserialize;
use std::path::Path;

/// Leaf payloads above this many bytes stay in the file when decoding
/// through a [`Config`].
pub const DEFAULT_INLINE_LIMIT: u64 = 1 << 20;

/// Host-level settings. Every field is optional in the JSON form:
///
/// ```json
/// { "default_mode": "rb", "max_depth": 32, "inline_limit": 1048576 }
/// ```
///
/// `"inline_limit": null` loads every payload into memory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Mode used by [`crate::api::open`] when the caller passes none.
    pub default_mode: String,
    pub max_depth: usize,
    /// Defaults to [`DEFAULT_INLINE_LIMIT`] so a large `mdat` is recorded as
    /// a deferred payload instead of being read.
    pub inline_limit: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_mode: "r".to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            inline_limit: Some(DEFAULT_INLINE_LIMIT),
        }
    }
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), ?cfg, "loaded config");
        Ok(cfg)
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            max_depth: self.max_depth,
            inline_limit: self.inline_limit,
            ..DecodeOptions::default()
        }
    }
}
