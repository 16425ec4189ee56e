//! Chunk identity.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The id of a chunk document.
///
/// Ids produced by [`ChunkId::for_content`] are derived from the payload
/// (`h:<sha256 hex>`) and therefore stay stable across tombstoning, vacating and
/// resurrection. Ids coming from replicated data are accepted verbatim.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkId(String);

impl ChunkId {
    /// Derive the fixed id for a chunk payload.
    pub fn for_content(data: &str) -> Self {
        let hash = ContentHash::compute(data.as_bytes());
        Self(format!("{}{}", crate::CHUNK_ID_PREFIX, hash.to_hex()))
    }

    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidChunkId("empty chunk id".to_string()));
        }
        Ok(Self(id))
    }

    /// Whether this id was derived from content.
    pub fn is_content_derived(&self) -> bool {
        self.content_hash().is_some()
    }

    /// The payload digest encoded in a content-derived id.
    pub fn content_hash(&self) -> Option<ContentHash> {
        let hex = self.0.strip_prefix(crate::CHUNK_ID_PREFIX)?;
        ContentHash::from_hex(hex).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChunkId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<ChunkId> for String {
    fn from(id: ChunkId) -> Self {
        id.0
    }
}

impl AsRef<str> for ChunkId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
