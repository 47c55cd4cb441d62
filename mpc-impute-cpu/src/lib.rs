pub mod error;
pub mod execution;
pub mod network;
pub mod protocol;
pub mod shares;
