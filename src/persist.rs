//! On-disk collection file for file-backed stores.
//!
//! Layout: magic, version byte, payload length (u32 LE), CRC32 of the
//! payload (u32 LE), then the JSON payload. Every save rewrites the whole
//! file through a temporary sibling and a rename.

use crate::error::{Result, SyncError};
use crate::types::{RequestId, RequestRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the collection file.
const COLLECTION_MAGIC: &[u8; 4] = b"RQS\0";

/// Current collection format version.
const COLLECTION_VERSION: u8 = 1;

/// Header size (magic + version + length + checksum).
const HEADER_SIZE: usize = 4 + 1 + 4 + 4;

/// A record plus its store-assigned creation ordinal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StoredRequest {
    pub ordinal: u64,
    pub record: RequestRecord,
}

/// The whole request collection, keyed by request id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct Collection {
    pub next_ordinal: u64,
    pub requests: BTreeMap<RequestId, StoredRequest>,
}

/// Reads and writes the collection file.
pub(crate) struct CollectionFile {
    path: PathBuf,
}

impl CollectionFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the collection.
    pub fn load(&self) -> Result<Collection> {
        let mut file = File::open(&self.path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE {
            return Err(SyncError::Corruption(format!(
                "collection file truncated ({} bytes)",
                bytes.len()
            )));
        }

        if &bytes[0..4] != COLLECTION_MAGIC {
            return Err(SyncError::InvalidFormat("Invalid collection magic".into()));
        }
        if bytes[4] != COLLECTION_VERSION {
            return Err(SyncError::InvalidFormat(format!(
                "Unsupported collection version: {}",
                bytes[4]
            )));
        }

        let len = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
        let expected = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != len {
            return Err(SyncError::Corruption(format!(
                "payload length {} does not match header {}",
                payload.len(),
                len
            )));
        }

        let got = crc32fast::hash(payload);
        if got != expected {
            return Err(SyncError::ChecksumMismatch { expected, got });
        }

        serde_json::from_slice(payload).map_err(|e| SyncError::Deserialization(e.to_string()))
    }

    /// Atomically replace the file with `collection`.
    pub fn save(&self, collection: &Collection) -> Result<()> {
        let payload = serde_json::to_vec(collection)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| SyncError::Serialization("collection exceeds 4 GiB".into()))?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;

            file.write_all(COLLECTION_MAGIC)?;
            file.write_all(&[COLLECTION_VERSION])?;
            file.write_all(&len.to_le_bytes())?;
            file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
