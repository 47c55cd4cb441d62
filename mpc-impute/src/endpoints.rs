//! Addresses a party actually binds to or dials.
//!
//! The deployment co-locates ring roles: the first party serves both of its
//! links on its own node, the second serves its `next` link locally and dials
//! the first party, the third dials both neighbours.

use crate::error::TaskError;
use mpc_impute_common::task::{EndPoint, NodeMap, VirtualMachine};
use mpc_impute_cpu::{execution::player::Role, network::tcp::LinkSpec};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    pub role: Role,
    pub next: EndPoint,
    pub prev: EndPoint,
}

impl ResolvedEndpoints {
    /// Transport links, keyed by the identities of the neighbouring roles.
    pub fn links(&self) -> Vec<LinkSpec> {
        [(self.role.next(), &self.next), (self.role.prev(), &self.prev)]
            .into_iter()
            .map(|(peer, ep)| LinkSpec {
                peer:      peer.identity(),
                name:      ep.name.clone(),
                link_type: ep.link_type,
                ip:        ep.ip.clone(),
                port:      ep.port,
            })
            .collect()
    }
}

fn with_ip(endpoint: &EndPoint, ip: &str) -> EndPoint {
    EndPoint {
        ip: ip.to_string(),
        ..endpoint.clone()
    }
}

/// Finds virtual machine `party_id` on node `node_id` and resolves its two
/// ring endpoints.
pub fn resolve(
    node_id: &str,
    party_id: usize,
    node_map: &NodeMap,
) -> Result<ResolvedEndpoints, TaskError> {
    let node = node_map
        .get(node_id)
        .ok_or_else(|| TaskError::Config(format!("{node_id} not found in node map")))?;
    let vm: &VirtualMachine = node
        .vm
        .iter()
        .find(|vm| vm.party_id == party_id)
        .ok_or_else(|| {
            TaskError::Config(format!("{node_id} hosts no virtual machine for party {party_id}"))
        })?;
    let role = Role::try_from(party_id).map_err(|e| TaskError::Config(e.to_string()))?;

    let (next, prev) = match role {
        Role::First => (with_ip(&vm.next, &node.ip), with_ip(&vm.prev, &node.ip)),
        Role::Second => (with_ip(&vm.next, &node.ip), vm.prev.clone()),
        Role::Third => (vm.next.clone(), vm.prev.clone()),
    };
    tracing::debug!(
        "{node_id} resolved party {party_id}: next {}:{} prev {}:{}",
        next.ip,
        next.port,
        prev.ip,
        prev.port
    );
    Ok(ResolvedEndpoints { role, next, prev })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{tests::peers, RingTopologyBuilder};
    use mpc_impute_common::task::LinkType;

    #[test]
    fn test_resolution_per_role() {
        let peers = peers();
        let node_map = RingTopologyBuilder::new(&peers, 12120).build("j", "t").unwrap();

        let first = resolve("node0", 0, &node_map).unwrap();
        assert_eq!(first.role, Role::First);
        assert_eq!((first.next.ip.as_str(), first.next.port), ("10.0.0.1", 12120));
        assert_eq!((first.prev.ip.as_str(), first.prev.port), ("10.0.0.1", 12120));

        let second = resolve("node1", 1, &node_map).unwrap();
        assert_eq!((second.next.ip.as_str(), second.next.port), ("10.0.0.2", 12121));
        assert_eq!(second.next.link_type, LinkType::Server);
        assert_eq!((second.prev.ip.as_str(), second.prev.port), ("10.0.0.1", 12120));
        assert_eq!(second.prev.link_type, LinkType::Client);

        let third = resolve("node2", 2, &node_map).unwrap();
        assert_eq!((third.next.ip.as_str(), third.next.port), ("10.0.0.1", 12120));
        assert_eq!((third.prev.ip.as_str(), third.prev.port), ("10.0.0.2", 12121));
    }

    #[test]
    fn test_every_dial_targets_a_listener() {
        let peers = peers();
        let node_map = RingTopologyBuilder::new(&peers, 12120).build("j", "t").unwrap();
        let links: Vec<LinkSpec> = (0..3)
            .flat_map(|i| resolve(&format!("node{i}"), i, &node_map).unwrap().links())
            .collect();

        for client in links.iter().filter(|l| l.link_type == LinkType::Client) {
            let server = links
                .iter()
                .find(|l| l.link_type == LinkType::Server && l.name == client.name)
                .unwrap();
            assert_eq!(server.address(), client.address());
        }
    }

    #[test]
    fn test_unknown_node_is_a_config_error() {
        let peers = peers();
        let node_map = RingTopologyBuilder::new(&peers, 12120).build("j", "t").unwrap();
        assert!(matches!(resolve("node7", 0, &node_map), Err(TaskError::Config(_))));
        assert!(matches!(resolve("node0", 1, &node_map), Err(TaskError::Config(_))));
    }
}
