use thiserror::Error;

/// An Error enum capturing the errors produced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid party id provided
    #[error("Invalid Party id {0}")]
    Id(usize),
    /// A value received from a peer did not have the expected shape
    #[error("Unexpected network value: expected {0}")]
    UnexpectedValue(&'static str),
    /// Message size is invalid
    #[error("Message size is invalid")]
    InvalidMessageSize,
    /// No link to the given peer
    #[error("No link to peer {0}")]
    UnknownPeer(String),
}
