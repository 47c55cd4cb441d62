use crate::{
    error::Error,
    execution::player::Identity,
    network::{value::NetworkValue, Networking},
};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use dashmap::DashMap;
use eyre::Result;
use std::sync::Arc;

/// Encoded frames from the first identity of the key to the second.
type Links = Arc<DashMap<(Identity, Identity), (Sender<Vec<u8>>, Receiver<Vec<u8>>)>>;

/// In-process channels between every ordered pair of parties.
#[derive(Debug, Clone)]
pub struct LocalNetworkingStore {
    links: Links,
}

impl LocalNetworkingStore {
    pub fn from_host_ids(identities: &[Identity]) -> Self {
        let links = DashMap::new();
        for from in identities {
            for to in identities.iter().filter(|to| *to != from) {
                links.insert((from.clone(), to.clone()), async_channel::unbounded());
            }
        }
        Self {
            links: Arc::new(links),
        }
    }

    /// Closes every channel `owner` sends on. Frames already queued stay
    /// readable, later receives on these channels fail.
    pub fn close_outgoing(&self, owner: &Identity) {
        close_outgoing(&self.links, owner);
    }

    pub fn get_local_network(&self, owner: Identity) -> LocalNetworking {
        LocalNetworking {
            links: Arc::clone(&self.links),
            owner,
        }
    }
}

fn close_outgoing(links: &Links, owner: &Identity) {
    for entry in links.iter().filter(|entry| entry.key().0 == *owner) {
        entry.value().0.close();
    }
}

#[derive(Debug)]
pub struct LocalNetworking {
    links:     Links,
    pub owner: Identity,
}

impl LocalNetworking {
    fn channel(&self, from: &Identity, to: &Identity) -> Result<(Sender<Vec<u8>>, Receiver<Vec<u8>>)> {
        let peer = if *from == self.owner { to } else { from };
        self.links
            .get(&(from.clone(), to.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownPeer(peer.to_string()).into())
    }
}

#[async_trait]
impl Networking for LocalNetworking {
    async fn send(&self, value: NetworkValue, receiver: &Identity) -> Result<()> {
        let (tx, _) = self.channel(&self.owner, receiver)?;
        tx.send(value.to_network()).await?;
        Ok(())
    }

    async fn receive(&self, sender: &Identity) -> Result<NetworkValue> {
        let (_, rx) = self.channel(sender, &self.owner)?;
        let frame = rx.recv().await?;
        NetworkValue::from_network(&frame)
    }

    async fn shutdown(&self) -> Result<()> {
        close_outgoing(&self.links, &self.owner);
        Ok(())
    }
}
