use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A task did not carry the shape its type requires
    #[error("Malformed task: {0}")]
    MalformedTask(String),
    /// Party ids must cover `0..NUM_PARTIES` exactly once
    #[error("Party id {0} is out of range or assigned twice")]
    PartyId(usize),
}
