//! Ring links over TCP.
//!
//! Each party opens exactly the links described by its resolved endpoints. A
//! `Server` endpoint listens, a `Client` endpoint dials. Several server links
//! may share one listening address (party 0 listens for both of its
//! neighbours on the same port); the link name announced during the handshake
//! tells them apart.

pub mod data;
pub mod handshake;

use crate::{
    error::Error,
    execution::player::Identity,
    network::{value::NetworkValue, Networking},
};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use eyre::{eyre, Result, WrapErr};
use futures::{
    future::try_join_all,
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use mpc_impute_common::task::LinkType;
use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::Mutex,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::instrument;

type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Time an accepted connection gets to announce its link before it is dropped.
const INBOUND_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// One link this party has to open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSpec {
    pub peer:      Identity,
    pub name:      String,
    pub link_type: LinkType,
    pub ip:        String,
    pub port:      u16,
}

impl LinkSpec {
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

struct Link {
    sink:   Mutex<SplitSink<FramedStream, Bytes>>,
    stream: Mutex<SplitStream<FramedStream>>,
}

impl Link {
    fn new(stream: TcpStream) -> Self {
        let (sink, stream) = Framed::new(stream, LengthDelimitedCodec::new()).split();
        Self {
            sink:   Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

pub struct TcpNetworking {
    own_id: Identity,
    links:  HashMap<Identity, Link>,
}

fn backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_factor(1.5)
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(40)
}

impl TcpNetworking {
    /// Opens every link, failing if the whole handshake does not complete
    /// within `timeout`.
    #[instrument(level = "debug", skip(links), fields(num_links = links.len()))]
    pub async fn establish(
        own_id: Identity,
        links: Vec<LinkSpec>,
        timeout: Duration,
    ) -> Result<Self> {
        let (servers, clients): (Vec<_>, Vec<_>) = links
            .into_iter()
            .partition(|link| link.link_type == LinkType::Server);

        let mut listeners: BTreeMap<String, Vec<LinkSpec>> = BTreeMap::new();
        for link in servers {
            listeners.entry(link.address()).or_default().push(link);
        }

        let accepts = try_join_all(
            listeners
                .into_iter()
                .map(|(address, expected)| accept_links(address, expected)),
        );
        let dials = try_join_all(clients.into_iter().map(|link| dial_link(&own_id, link)));

        let (accepted, dialed) = tokio::time::timeout(timeout, async {
            tokio::try_join!(accepts, dials)
        })
        .await
        .map_err(|_| eyre!("link handshake did not complete within {timeout:?}"))??;

        let links = accepted
            .into_iter()
            .flatten()
            .chain(dialed)
            .map(|(peer, stream)| (peer, Link::new(stream)))
            .collect();
        tracing::info!("{own_id} established all ring links");
        Ok(Self { own_id, links })
    }

    fn link(&self, peer: &Identity) -> Result<&Link> {
        self.links
            .get(peer)
            .ok_or_else(|| Error::UnknownPeer(peer.0.clone()).into())
    }
}

async fn accept_links(
    address: String,
    expected: Vec<LinkSpec>,
) -> Result<Vec<(Identity, TcpStream)>> {
    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("failed to listen on {address}"))?;
    let mut pending: HashMap<String, Identity> = expected
        .into_iter()
        .map(|link| (link.name, link.peer))
        .collect();

    let mut established = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let (mut stream, peer_addr) = listener.accept().await?;
        let announced =
            tokio::time::timeout(INBOUND_HANDSHAKE_TIMEOUT, handshake::inbound(&mut stream)).await;
        let (link_name, peer_id) = match announced {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                tracing::debug!("application level handshake with {peer_addr} failed: {e:?}");
                continue;
            }
            Err(_) => {
                tracing::warn!(
                    "{peer_addr} did not announce a link within {INBOUND_HANDSHAKE_TIMEOUT:?}"
                );
                continue;
            }
        };
        if pending.get(&link_name) == Some(&peer_id) {
            handshake::inbound_ok(&mut stream).await?;
            data::configure_tcp_stream(&stream)?;
            pending.remove(&link_name);
            tracing::debug!(%link_name, %peer_id, "accepted link");
            established.push((peer_id, stream));
        } else {
            tracing::warn!(%link_name, %peer_id, "rejecting connection for an unexpected link");
            let _ = stream.shutdown().await;
        }
    }
    Ok(established)
}

async fn dial_link(own_id: &Identity, link: LinkSpec) -> Result<(Identity, TcpStream)> {
    let address = link.address();
    let mut stream = (|| TcpStream::connect(address.clone()))
        .retry(backoff())
        .sleep(tokio::time::sleep)
        .notify(|err, dur| {
            tracing::debug!("dialing {address} failed: {err}, retrying in {dur:?}");
        })
        .await
        .wrap_err_with(|| format!("failed to connect to {address}"))?;

    handshake::outbound(&mut stream, &link.name, own_id).await?;
    handshake::outbound_ok(&mut stream).await?;
    data::configure_tcp_stream(&stream)?;
    tracing::debug!(link_name = %link.name, peer_id = %link.peer, "dialed link");
    Ok((link.peer, stream))
}

#[async_trait]
impl Networking for TcpNetworking {
    async fn send(&self, value: NetworkValue, receiver: &Identity) -> Result<()> {
        let link = self.link(receiver)?;
        link.sink
            .lock()
            .await
            .send(Bytes::from(value.to_network()))
            .await
            .wrap_err_with(|| format!("{} failed to send to {receiver}", self.own_id))
    }

    async fn receive(&self, sender: &Identity) -> Result<NetworkValue> {
        let link = self.link(sender)?;
        let frame = link
            .stream
            .lock()
            .await
            .next()
            .await
            .ok_or_else(|| eyre!("connection to {sender} closed"))??;
        NetworkValue::from_network(&frame)
    }

    async fn shutdown(&self) -> Result<()> {
        for (peer, link) in self.links.iter() {
            if let Err(e) = link.sink.lock().await.close().await {
                tracing::debug!("closing link to {peer} failed: {e:?}");
            }
        }
        Ok(())
    }
}
