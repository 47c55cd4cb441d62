//! Ring topology of the three parties.
//!
//! Every party derives the same link names and ports from the same peer list,
//! so both sides of a link meet without any further negotiation.

use crate::error::TaskError;
use mpc_impute_common::{
    config::PeerConfig,
    task::{EndPoint, LinkType, Node, NodeMap, VirtualMachine},
    NUM_PARTIES,
};
use std::fmt;

pub fn next_party(i: usize) -> usize {
    (i + 1) % NUM_PARTIES
}

pub fn prev_party(i: usize) -> usize {
    (i + 2) % NUM_PARTIES
}

/// Identifies the undirected link between two parties of one task.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinkId {
    pub low_party:  usize,
    pub high_party: usize,
    pub job_id:     String,
    pub task_id:    String,
}

impl LinkId {
    pub fn new(a: usize, b: usize, job_id: &str, task_id: &str) -> Self {
        Self {
            low_party:  a.min(b),
            high_party: a.max(b),
            job_id:     job_id.to_string(),
            task_id:    task_id.to_string(),
        }
    }

    /// The link is served on the lower party's port.
    pub fn port(&self, base_port: u16) -> u16 {
        base_port + self.low_party as u16
    }

    /// Which side of the link `party` is on.
    pub fn link_type_for(&self, party: usize) -> LinkType {
        if party == self.low_party {
            LinkType::Server
        } else {
            LinkType::Client
        }
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}{}",
            self.job_id, self.task_id, self.low_party, self.high_party
        )
    }
}

/// One party's view of a link to a neighbour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingLink {
    pub from_party: usize,
    pub to_party:   usize,
    pub ip:         String,
    pub port:       u16,
    pub link_type:  LinkType,
    pub id:         LinkId,
}

impl From<&RingLink> for EndPoint {
    fn from(link: &RingLink) -> Self {
        EndPoint {
            ip:        link.ip.clone(),
            port:      link.port,
            name:      link.id.to_string(),
            link_type: link.link_type,
        }
    }
}

pub struct RingTopologyBuilder<'a> {
    peers:     &'a [PeerConfig],
    base_port: u16,
    singleton: bool,
}

impl<'a> RingTopologyBuilder<'a> {
    pub fn new(peers: &'a [PeerConfig], base_port: u16) -> Self {
        Self {
            peers,
            base_port,
            singleton: false,
        }
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    /// Link from `from` to `to`; `ip` is the advertised address of `to`.
    fn link(&self, from: usize, to: usize, job_id: &str, task_id: &str) -> RingLink {
        let id = LinkId::new(from, to, job_id, task_id);
        RingLink {
            from_party: from,
            to_party: to,
            ip: self.peers[to].ip.clone(),
            port: id.port(self.base_port),
            link_type: id.link_type_for(from),
            id,
        }
    }

    fn virtual_machine(&self, party_id: usize, job_id: &str, task_id: &str) -> VirtualMachine {
        let next = self.link(party_id, next_party(party_id), job_id, task_id);
        let prev = self.link(party_id, prev_party(party_id), job_id, task_id);
        VirtualMachine {
            party_id,
            next: EndPoint::from(&next),
            prev: EndPoint::from(&prev),
        }
    }

    /// Builds the `node_map` of a task.
    ///
    /// In singleton mode the first peer carries all three virtual machines and
    /// the others are left out.
    pub fn build(&self, job_id: &str, task_id: &str) -> Result<NodeMap, TaskError> {
        if self.peers.len() != NUM_PARTIES {
            return Err(TaskError::Config(format!(
                "ring topology needs {NUM_PARTIES} peers, got {}",
                self.peers.len()
            )));
        }
        if self.base_port.checked_add(NUM_PARTIES as u16).is_none() {
            return Err(TaskError::Config(format!(
                "session base port {} leaves no room for {NUM_PARTIES} links",
                self.base_port
            )));
        }

        let mut node_map = NodeMap::new();
        for (i, peer) in self.peers.iter().enumerate() {
            let mut node = Node::new(peer.node_id.clone(), peer.ip.clone(), peer.port);
            if self.singleton {
                node.vm = (0..NUM_PARTIES)
                    .map(|j| self.virtual_machine(j, job_id, task_id))
                    .collect();
                node_map.insert(peer.node_id.clone(), node);
                break;
            }
            node.vm.push(self.virtual_machine(i, job_id, task_id));
            node_map.insert(peer.node_id.clone(), node);
        }
        tracing::debug!(
            "built ring topology for {job_id}/{task_id} over {} node(s)",
            node_map.len()
        );
        Ok(node_map)
    }
}
