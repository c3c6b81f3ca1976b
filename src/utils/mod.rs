pub mod benchmark;
pub mod error;

pub use benchmark::{BenchmarkResults, BenchmarkTracker, MemorySnapshot};
