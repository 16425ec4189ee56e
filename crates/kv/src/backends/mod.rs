//! Storage engine implementations.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryEngine;
pub use sqlite::SqliteEngine;
