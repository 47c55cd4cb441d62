use crate::{
    execution::{player::Role, session::MpcSession},
    network::local::LocalNetworkingStore,
    protocol::prf::PrfSeed,
};
use eyre::Result;
use tokio::task::JoinSet;

/// Three sessions wired together over in-process channels.
pub struct LocalRuntime {
    /// Ordered by role.
    pub sessions: Vec<MpcSession>,
}

impl LocalRuntime {
    pub async fn mock_setup() -> Result<Self> {
        let seeds = Role::ALL.map(|role| {
            let mut seed = PrfSeed::default();
            seed[0] = role.index() as u8;
            seed
        });
        Self::new_with_seeds(seeds).await
    }

    pub async fn new_with_seeds(seeds: [PrfSeed; 3]) -> Result<Self> {
        let identities = Role::ALL.map(|role| role.identity());
        let store = LocalNetworkingStore::from_host_ids(&identities);

        let mut jobs = JoinSet::new();
        for (role, seed) in Role::ALL.into_iter().zip(seeds) {
            let networking = store.get_local_network(role.identity());
            jobs.spawn(
                async move { MpcSession::setup_with_seed(role, Box::new(networking), seed).await },
            );
        }

        let mut sessions = Vec::with_capacity(Role::ALL.len());
        while let Some(session) = jobs.join_next().await {
            sessions.push(session??);
        }
        sessions.sort_by_key(|s| s.own_role());
        Ok(Self { sessions })
    }
}
