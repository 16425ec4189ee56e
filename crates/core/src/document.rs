//! Documents stored in the replicated database.
//!
//! Only the two document families the collector reasons about are modelled:
//! chunks (`type: "leaf"`) and file entries (`type: "plain"` / `"newnote"`).
//! Field names follow the store's wire format (`_id`, `_rev`, `_deleted`).

use crate::chunk::ChunkId;
use crate::revision::Revision;
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// A content-addressed chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDoc {
    #[serde(rename = "_id")]
    pub id: ChunkId,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Revision>,
    /// Payload. Empty once the chunk has been vacated.
    #[serde(default)]
    pub data: String,
    /// Store-level tombstone.
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub tombstoned: bool,
}

impl ChunkDoc {
    /// New chunk with a content-derived id.
    pub fn new(data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            id: ChunkId::for_content(&data),
            rev: None,
            data,
            tombstoned: false,
        }
    }

    /// New chunk with an explicit id.
    pub fn with_id(id: ChunkId, data: impl Into<String>) -> Self {
        Self {
            id,
            rev: None,
            data: data.into(),
            tombstoned: false,
        }
    }

    /// Whether the payload has been replaced by an empty string.
    pub fn is_vacated(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Copy with the tombstone set and the payload kept.
    pub fn marked_deleted(&self) -> Self {
        Self {
            tombstoned: true,
            ..self.clone()
        }
    }

    /// Copy with the tombstone set and the payload vacated.
    pub fn vacated(&self) -> Self {
        Self {
            tombstoned: true,
            data: String::new(),
            ..self.clone()
        }
    }

    /// Copy with the tombstone cleared and the given payload restored.
    pub fn resurrected(&self, data: impl Into<String>) -> Self {
        Self {
            tombstoned: false,
            data: data.into(),
            ..self.clone()
        }
    }
}

/// Metadata for one file in the vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Revision>,
    pub path: String,
    /// Chunks making up the file content, in order.
    #[serde(default)]
    pub children: Vec<ChunkId>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub ctime: i64,
    #[serde(default)]
    pub mtime: i64,
    /// Logical deletion, not yet committed to the store.
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    /// Store-level tombstone.
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub tombstoned: bool,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, children: Vec<ChunkId>) -> Self {
        let path = path.into();
        Self {
            id: path.to_lowercase(),
            rev: None,
            path,
            children,
            size: 0,
            ctime: 0,
            mtime: 0,
            deleted: false,
            tombstoned: false,
        }
    }

    /// Neither logically deleted nor tombstoned.
    pub fn is_live(&self) -> bool {
        !self.deleted && !self.tombstoned
    }
}

/// Any document the collector understands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Document {
    /// A chunk.
    Leaf(ChunkDoc),
    /// A file stored as plain text.
    Plain(FileEntry),
    /// A file stored as a note.
    Newnote(FileEntry),
}

impl Document {
    pub fn id(&self) -> &str {
        match self {
            Self::Leaf(chunk) => chunk.id.as_str(),
            Self::Plain(entry) | Self::Newnote(entry) => &entry.id,
        }
    }

    pub fn rev(&self) -> Option<&Revision> {
        match self {
            Self::Leaf(chunk) => chunk.rev.as_ref(),
            Self::Plain(entry) | Self::Newnote(entry) => entry.rev.as_ref(),
        }
    }

    pub fn set_rev(&mut self, rev: Option<Revision>) {
        match self {
            Self::Leaf(chunk) => chunk.rev = rev,
            Self::Plain(entry) | Self::Newnote(entry) => entry.rev = rev,
        }
    }

    /// Whether the document carries the store-level tombstone.
    pub fn is_tombstoned(&self) -> bool {
        match self {
            Self::Leaf(chunk) => chunk.tombstoned,
            Self::Plain(entry) | Self::Newnote(entry) => entry.tombstoned,
        }
    }

    pub fn as_chunk(&self) -> Option<&ChunkDoc> {
        match self {
            Self::Leaf(chunk) => Some(chunk),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Self::Plain(entry) | Self::Newnote(entry) => Some(entry),
            Self::Leaf(_) => None,
        }
    }

    /// Replace the file entry while keeping the document type.
    pub fn map_file(self, f: impl FnOnce(FileEntry) -> FileEntry) -> Self {
        match self {
            Self::Plain(entry) => Self::Plain(f(entry)),
            Self::Newnote(entry) => Self::Newnote(f(entry)),
            other => other,
        }
    }

    /// Parse from the store's JSON representation.
    pub fn from_json(value: serde_json::Value) -> crate::Result<Self> {
        serde_json::from_value(value).map_err(|e| crate::Error::InvalidDocument(e.to_string()))
    }

    /// Serialize to the store's JSON representation.
    pub fn to_json_bytes(&self) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

impl From<ChunkDoc> for Document {
    fn from(chunk: ChunkDoc) -> Self {
        Self::Leaf(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_wire_format() {
        let chunk = ChunkDoc::new("payload").marked_deleted();
        let value = serde_json::to_value(Document::from(chunk.clone())).unwrap();
        assert_eq!(value["type"], "leaf");
        assert_eq!(value["_id"], chunk.id.as_str());
        assert_eq!(value["_deleted"], true);
        assert_eq!(value["data"], "payload");
        assert!(value.get("_rev").is_none());
    }

    #[test]
    fn test_file_entry_parses_from_store_json() {
        let doc = Document::from_json(json!({
            "_id": "notes/a.md",
            "_rev": "2-abc",
            "type": "newnote",
            "path": "notes/a.md",
            "children": ["h:1", "h:2"],
            "deleted": true
        }))
        .unwrap();

        let entry = doc.as_file().unwrap();
        assert_eq!(entry.children.len(), 2);
        assert!(entry.deleted);
        assert!(!entry.tombstoned);
        assert!(!doc.is_tombstoned());
        assert_eq!(doc.rev().unwrap().generation(), 2);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = Document::from_json(json!({"_id": "x", "type": "versioninfo"})).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidDocument(_)));
    }

    #[test]
    fn test_vacated_keeps_identity() {
        let chunk = ChunkDoc::new("abc");
        let vacated = chunk.vacated();
        assert_eq!(vacated.id, chunk.id);
        assert!(vacated.is_vacated());
        assert!(vacated.tombstoned);
        let back = vacated.resurrected("abc");
        assert_eq!(back.data, "abc");
        assert!(!back.tombstoned);
    }
}
