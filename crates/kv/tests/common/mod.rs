pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{memory_registry, sqlite_registry};
#[allow(unused_imports)]
pub use mocks::{FlakyEngine, RacingEngine, SlowEngine};
