pub mod endpoints;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod server;
pub mod table;
pub mod topology;
