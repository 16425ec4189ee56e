//! Core domain types shared by the Vellum key-value store and chunk collector.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashes and content-addressed chunk ids
//! - Typed revision tokens and their ancestor ordering
//! - Chunk and file-entry documents as stored in the replicated database
//! - Configuration for the key-value store and the collector

pub mod chunk;
pub mod config;
pub mod document;
pub mod error;
pub mod hash;
pub mod revision;

pub use chunk::ChunkId;
pub use document::{ChunkDoc, Document, FileEntry};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use revision::Revision;

/// Prefix used for content-derived chunk ids.
pub const CHUNK_ID_PREFIX: &str = "h:";
