use thiserror::Error;

/// Terminal error of a task on one party. None of them is retried.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The party is missing from the peer table, or the topology it was handed
    /// does not match its own id.
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid task parameters: {0}")]
    Param(String),
    #[error("dataset is inconsistent: {0}")]
    DatasetInconsistent(String),
    /// Handshake, share or reveal round failed.
    #[error("MPC session failed: {0:#}")]
    Session(eyre::Report),
    #[error("failed to persist result: {0}")]
    Persist(String),
    #[error("dispatch to {destination} failed: {reason}")]
    Dispatch { destination: String, reason: String },
}

impl From<mpc_impute_common::error::Error> for TaskError {
    fn from(err: mpc_impute_common::error::Error) -> Self {
        TaskError::Config(err.to_string())
    }
}
