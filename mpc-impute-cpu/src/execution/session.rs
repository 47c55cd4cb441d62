use crate::{
    error::Error,
    execution::player::{Identity, Role},
    network::{
        tcp::{LinkSpec, TcpNetworking},
        value::NetworkValue,
        NetworkingImpl,
    },
    protocol::{
        ops::{open_ring, setup_replicated_prf, share_inputs},
        prf::{Prf, PrfSeed},
    },
    shares::{RingElement, RingEncoding, Share},
};
use eyre::Result;
use mpc_impute_common::NUM_PARTIES;
use std::time::Duration;

/// Ring-shaped view of the networking layer for one party.
pub struct NetworkSession {
    pub own_role:   Role,
    pub networking: NetworkingImpl,
}

impl NetworkSession {
    pub fn own_identity(&self) -> Identity {
        self.own_role.identity()
    }

    pub async fn send_next(&self, value: NetworkValue) -> Result<()> {
        self.networking
            .send(value, &self.own_role.next().identity())
            .await
    }

    pub async fn send_prev(&self, value: NetworkValue) -> Result<()> {
        self.networking
            .send(value, &self.own_role.prev().identity())
            .await
    }

    pub async fn receive_next(&self) -> Result<NetworkValue> {
        self.networking
            .receive(&self.own_role.next().identity())
            .await
    }

    pub async fn receive_prev(&self) -> Result<NetworkValue> {
        self.networking
            .receive(&self.own_role.prev().identity())
            .await
    }
}

/// A party's handle on one three-party computation.
///
/// The session owns its links for its whole lifetime. [`MpcSession::teardown`]
/// consumes it, so nothing can be sent once the links are closed.
pub struct MpcSession {
    pub network_session: NetworkSession,
    pub prf:             Prf,
}

impl MpcSession {
    /// Agrees on the correlated randomness with both neighbours over already
    /// established links.
    pub async fn setup(own_role: Role, networking: NetworkingImpl) -> Result<Self> {
        Self::setup_with_seed(own_role, networking, Prf::gen_seed()).await
    }

    pub async fn setup_with_seed(
        own_role: Role,
        networking: NetworkingImpl,
        seed: PrfSeed,
    ) -> Result<Self> {
        let network_session = NetworkSession {
            own_role,
            networking,
        };
        let prf = setup_replicated_prf(&network_session, seed).await?;
        tracing::debug!("{} completed session setup", network_session.own_identity());
        Ok(Self {
            network_session,
            prf,
        })
    }

    /// Opens the TCP links described by `links` and runs [`MpcSession::setup`]
    /// over them.
    pub async fn setup_tcp(own_role: Role, links: Vec<LinkSpec>, timeout: Duration) -> Result<Self> {
        let networking = TcpNetworking::establish(own_role.identity(), links, timeout).await?;
        Self::setup(own_role, Box::new(networking)).await
    }

    pub fn own_role(&self) -> Role {
        self.network_session.own_role
    }

    /// Secret-shares this party's `value` together with the other two
    /// parties' inputs. Entry `j` of the result is this party's share of the
    /// input contributed by party `j`.
    pub async fn create_shares<V: RingEncoding>(
        &mut self,
        value: V,
    ) -> Result<[Share<u64>; NUM_PARTIES]> {
        share_inputs(self, value.encode()).await
    }

    /// Opens `share` towards every party. All three parties must call this
    /// for the same share before any of them returns.
    pub async fn reveal_all<V: RingEncoding>(&mut self, share: &Share<u64>) -> Result<V> {
        let opened = open_ring(self, std::slice::from_ref(share)).await?;
        let value = opened
            .into_iter()
            .next()
            .ok_or(Error::InvalidMessageSize)?;
        Ok(V::decode(RingElement(value)))
    }

    pub async fn teardown(self) -> Result<()> {
        tracing::debug!("{} tearing down session", self.network_session.own_identity());
        self.network_session.networking.shutdown().await
    }
}
