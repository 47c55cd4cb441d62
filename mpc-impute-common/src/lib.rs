pub mod config;
pub mod error;
pub mod task;
pub mod tracing;

/// Number of parties taking part in every ring computation.
pub const NUM_PARTIES: usize = 3;
