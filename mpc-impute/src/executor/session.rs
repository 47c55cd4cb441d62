use crate::executor::params::TaskContext;
use async_trait::async_trait;
use eyre::Result;
use mpc_impute_cpu::{
    execution::{player::Role, session::MpcSession},
    network::local::LocalNetworkingStore,
};
use std::time::Duration;

/// Opens the MPC session of one party for one task.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, ctx: &TaskContext) -> Result<MpcSession>;

    /// Called when `role` fails without a session, so that peers waiting on
    /// it fail as well. TCP peers give up at their handshake timeout.
    fn abandon(&self, _role: Role) {}
}

/// Dials and accepts the ring links over TCP at the resolved endpoints.
pub struct TcpSessionFactory {
    pub handshake_timeout: Duration,
}

#[async_trait]
impl SessionFactory for TcpSessionFactory {
    async fn open(&self, ctx: &TaskContext) -> Result<MpcSession> {
        let links = ctx.endpoints.links();
        tracing::debug!(
            "party {} opening links {:?}",
            ctx.party_id,
            links.iter().map(|l| l.name.as_str()).collect::<Vec<_>>()
        );
        MpcSession::setup_tcp(ctx.endpoints.role, links, self.handshake_timeout).await
    }
}

/// In-process channels, for parties that live in the same process.
#[derive(Clone)]
pub struct LocalSessionFactory {
    store: LocalNetworkingStore,
}

impl Default for LocalSessionFactory {
    fn default() -> Self {
        let identities = Role::ALL.map(|role| role.identity());
        Self {
            store: LocalNetworkingStore::from_host_ids(&identities),
        }
    }
}

#[async_trait]
impl SessionFactory for LocalSessionFactory {
    async fn open(&self, ctx: &TaskContext) -> Result<MpcSession> {
        let role = ctx.endpoints.role;
        let networking = self.store.get_local_network(role.identity());
        MpcSession::setup(role, Box::new(networking)).await
    }

    fn abandon(&self, role: Role) {
        tracing::debug!("closing the channels of abandoned party {role}");
        self.store.close_outgoing(&role.identity());
    }
}
