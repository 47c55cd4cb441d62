//! Task envelope exchanged between the coordinator and the nodes.
//!
//! An [`TaskType::ActorTask`] is the logical form submitted to a scheduler. The
//! scheduler turns it into one [`TaskType::NodeTask`] per destination, with the
//! ring topology embedded in `node_map` and the dataset bindings merged into
//! `params`.

use crate::{error::Error, NUM_PARTIES};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

pub type NodeMap = BTreeMap<String, Node>;
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Node id under which party `party_id` is expected in a `node_map`.
pub fn node_id_for_party(party_id: usize) -> String {
    format!("node{party_id}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    ActorTask,
    NodeTask,
}

/// Which side of a ring link listens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    Server,
    Client,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndPoint {
    pub ip:        String,
    pub port:      u16,
    /// Rendezvous key shared by both sides of the link.
    pub name:      String,
    pub link_type: LinkType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub party_id: usize,
    pub next:     EndPoint,
    pub prev:     EndPoint,
}

/// A physical node: its task service address plus the virtual parties it hosts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub ip:      String,
    pub port:    u16,
    #[serde(default)]
    pub vm:      Vec<VirtualMachine>,
}

impl Node {
    pub fn new(node_id: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            node_id: node_id.into(),
            ip: ip.into(),
            port,
            vm: Vec::new(),
        }
    }

    /// Address of the node's task service.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "var_type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamValue {
    String(String),
    Int64(i64),
    Float64(f64),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub job_id:    String,
    pub task_id:   String,
    pub task_type: TaskType,
    #[serde(default)]
    pub node_map:  NodeMap,
    #[serde(default)]
    pub params:    ParamMap,
}

impl Task {
    pub fn new_actor_task(
        job_id: impl Into<String>,
        task_id: impl Into<String>,
        params: ParamMap,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            task_id: task_id.into(),
            task_type: TaskType::ActorTask,
            node_map: NodeMap::new(),
            params,
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(ParamValue::as_str)
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(key.into(), value.into());
    }

    /// Checks that a concrete task embeds a usable topology.
    pub fn validate_node_task(&self) -> Result<(), Error> {
        if self.task_type != TaskType::NodeTask {
            return Err(Error::MalformedTask(format!(
                "task {} is not a node task",
                self.task_id
            )));
        }
        let num_vms: usize = self.node_map.values().map(|n| n.vm.len()).sum();
        if num_vms != NUM_PARTIES {
            return Err(Error::MalformedTask(format!(
                "task {} describes {num_vms} virtual machines, expected {NUM_PARTIES}",
                self.task_id
            )));
        }
        let mut seen = [false; NUM_PARTIES];
        for vm in self.node_map.values().flat_map(|n| n.vm.iter()) {
            match seen.get_mut(vm.party_id) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(Error::PartyId(vm.party_id)),
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one virtual party on a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyReport {
    pub party_id: usize,
    pub status:   TaskStatus,
    #[serde(default)]
    pub output:   Option<String>,
    #[serde(default)]
    pub message:  Option<String>,
}

/// Answer of a node to a submitted task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReply {
    pub node_id: String,
    pub parties: Vec<PartyReport>,
}

impl TaskReply {
    pub fn is_success(&self) -> bool {
        !self.parties.is_empty() && self.parties.iter().all(|p| p.status == TaskStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_value_wire_format() {
        let value = ParamValue::from("node1");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"var_type":"STRING","value":"node1"}"#);
        let back: ParamValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), Some("node1"));
    }

    #[test]
    fn test_actor_task_is_not_a_node_task() {
        let task = Task::new_actor_task("job", "task", ParamMap::new());
        assert!(task.validate_node_task().is_err());
        assert_eq!(node_id_for_party(2), "node2");
    }

    #[test]
    fn test_duplicate_party_is_rejected() {
        let endpoint = EndPoint {
            ip:        "127.0.0.1".into(),
            port:      12120,
            name:      "j_t_01".into(),
            link_type: LinkType::Server,
        };
        let mut node = Node::new("node0", "127.0.0.1", 50050);
        for party_id in [0, 1, 1] {
            node.vm.push(VirtualMachine {
                party_id,
                next: endpoint.clone(),
                prev: endpoint.clone(),
            });
        }
        let mut task = Task::new_actor_task("job", "task", ParamMap::new());
        task.task_type = TaskType::NodeTask;
        task.node_map.insert("node0".into(), node);
        assert_eq!(task.validate_node_task(), Err(Error::PartyId(1)));
    }

    #[test]
    fn test_reply_success_requires_parties() {
        let mut reply = TaskReply {
            node_id: "node0".into(),
            parties: vec![],
        };
        assert!(!reply.is_success());
        reply.parties.push(PartyReport {
            party_id: 0,
            status:   TaskStatus::Completed,
            output:   None,
            message:  None,
        });
        assert!(reply.is_success());
    }
}
