//! Raw uploads as received from a caller.

use std::path::Path;

use encoding_rs::Encoding;

use crate::error::{IngestError, Result};

/// Label used when a caller does not declare an encoding.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Bytes of one uploaded file plus what the caller declared about them.
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub bytes: Vec<u8>,
    /// WHATWG encoding label, e.g. `utf-8` or `windows-1252`.
    pub encoding: String,
    /// Whether the caller saw a byte-order mark.
    pub bom_detected: bool,
}

impl RawUpload {
    pub fn new(bytes: Vec<u8>, encoding: impl Into<String>) -> Self {
        let bom_detected = Encoding::for_bom(&bytes).is_some();
        Self {
            bytes,
            encoding: encoding.into(),
            bom_detected,
        }
    }

    pub fn utf8(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(bytes.into(), DEFAULT_ENCODING)
    }

    /// Read a file from disk.
    ///
    /// This is a sync function meant to be called via `spawn_blocking` from async contexts.
    pub fn from_path(path: &Path, encoding: impl Into<String>) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| IngestError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(bytes, encoding))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
