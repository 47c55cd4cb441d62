use crate::{execution::player::Identity, network::value::NetworkValue};
use async_trait::async_trait;
use eyre::Result;

/// Requirements for networking.
#[async_trait]
pub trait Networking {
    async fn send(&self, value: NetworkValue, receiver: &Identity) -> Result<()>;

    async fn receive(&self, sender: &Identity) -> Result<NetworkValue>;

    /// Flushes and closes every link. Further calls fail.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

pub type NetworkingImpl = Box<dyn Networking + Send + Sync>;

pub mod local;
pub mod tcp;
pub mod value;
