pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{Harness, put_chunk, put_file, put_revision};
#[allow(unused_imports)]
pub use mocks::{CountingHashCache, RecordingNotifier, ScriptedConfirmer};
