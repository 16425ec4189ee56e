//! Typed revision tokens.
//!
//! The replicated store identifies each revision of a document with a token of
//! the form `<generation>-<hash>`. The generation counts edits since creation,
//! so ordering by generation walks a linear history from oldest to newest.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Number of hex characters kept from the content hash in generated revisions.
const REVISION_HASH_LEN: usize = 32;

/// A parsed revision token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision {
    generation: u64,
    hash: String,
}

impl Revision {
    /// Create a revision from its parts.
    pub fn new(generation: u64, hash: impl Into<String>) -> crate::Result<Self> {
        let hash = hash.into();
        if generation == 0 {
            return Err(crate::Error::InvalidRevision(
                "generation must be at least 1".to_string(),
            ));
        }
        if hash.is_empty() {
            return Err(crate::Error::InvalidRevision("empty revision hash".to_string()));
        }
        Ok(Self { generation, hash })
    }

    /// First revision of a document with the given body.
    pub fn initial(body: &[u8]) -> Self {
        Self {
            generation: 1,
            hash: derive_hash(None, body),
        }
    }

    /// Successor of this revision for the given body.
    pub fn next(&self, body: &[u8]) -> Self {
        Self {
            generation: self.generation + 1,
            hash: derive_hash(Some(self), body),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Ancestor ordering: oldest generation first, ties broken by hash.
    pub fn ancestor_order(a: &Revision, b: &Revision) -> Ordering {
        a.generation
            .cmp(&b.generation)
            .then_with(|| a.hash.cmp(&b.hash))
    }
}

fn derive_hash(parent: Option<&Revision>, body: &[u8]) -> String {
    let parent = parent.map(ToString::to_string).unwrap_or_default();
    let mut hex = ContentHash::chain([parent.as_bytes(), body]).to_hex();
    hex.truncate(REVISION_HASH_LEN);
    hex
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::ancestor_order(self, other)
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Revision {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let (generation, hash) = s
            .split_once('-')
            .ok_or_else(|| crate::Error::InvalidRevision(format!("missing '-' in {s:?}")))?;
        let generation = generation
            .parse::<u64>()
            .map_err(|e| crate::Error::InvalidRevision(format!("{s:?}: {e}")))?;
        Self::new(generation, hash)
    }
}

impl TryFrom<String> for Revision {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        value.parse()
    }
}

impl From<Revision> for String {
    fn from(rev: Revision) -> Self {
        rev.to_string()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.hash)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({self})")
    }
}
