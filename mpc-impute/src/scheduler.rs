//! Fans a task out to the three parties.
//!
//! An actor task is expanded into one node task per destination, each carrying
//! the full ring topology and the dataset bindings of that destination. The
//! calls run concurrently and independently; a failing node does not cancel
//! the others.

use crate::{error::TaskError, topology::RingTopologyBuilder};
use async_trait::async_trait;
use eyre::{eyre, Result};
use mpc_impute_common::{
    config::{Config, DispatchPolicy, PeerConfig},
    task::{node_id_for_party, Task, TaskReply, TaskType},
    NUM_PARTIES,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::task::JoinSet;

/// Per node: the datasets it contributes, as `(dataset_name, parameter_tag)`.
pub type PeerDatasetMap = BTreeMap<String, Vec<(String, String)>>;

#[async_trait]
pub trait TaskSender: Send + Sync {
    async fn send(&self, destination: &str, task: &Task) -> Result<TaskReply>;
}

/// Posts tasks as JSON to a node service.
pub struct HttpTaskSender {
    client: reqwest::Client,
}

impl HttpTaskSender {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl TaskSender for HttpTaskSender {
    async fn send(&self, destination: &str, task: &Task) -> Result<TaskReply> {
        let reply = self
            .client
            .post(format!("http://{destination}/v1/tasks"))
            .json(task)
            .send()
            .await?
            .error_for_status()?
            .json::<TaskReply>()
            .await?;
        Ok(reply)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node_id:     String,
    pub destination: String,
    pub reply:       Option<TaskReply>,
    pub error:       Option<String>,
}

impl NodeOutcome {
    fn failed(node_id: &str, destination: &str, error: impl Into<String>) -> Self {
        Self {
            node_id:     node_id.to_string(),
            destination: destination.to_string(),
            reply:       None,
            error:       Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.reply.as_ref().is_some_and(TaskReply::is_success)
    }

    fn reason(&self) -> String {
        match (&self.error, &self.reply) {
            (Some(error), _) => error.clone(),
            (None, Some(reply)) => reply
                .parties
                .iter()
                .filter_map(|p| p.message.as_deref())
                .collect::<Vec<_>>()
                .join("; "),
            (None, None) => "no reply".to_string(),
        }
    }
}

/// Combined result of one dispatch, one entry per destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id:  String,
    pub task_id: String,
    pub nodes:   Vec<NodeOutcome>,
}

impl JobOutcome {
    pub fn succeeded(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_success()).count()
    }

    pub fn check(&self, policy: DispatchPolicy) -> Result<(), TaskError> {
        let first_failure = self.nodes.iter().find(|n| !n.is_success());
        let to_error = |node: &NodeOutcome| TaskError::Dispatch {
            destination: node.destination.clone(),
            reason:      node.reason(),
        };
        if self.nodes.is_empty() {
            return Err(TaskError::Dispatch {
                destination: "-".to_string(),
                reason:      "no destination was dispatched".to_string(),
            });
        }
        match policy {
            DispatchPolicy::RequireAll => first_failure.map_or(Ok(()), |n| Err(to_error(n))),
            DispatchPolicy::AllowPartial if self.succeeded() == 0 => {
                first_failure.map_or(Ok(()), |n| Err(to_error(n)))
            }
            DispatchPolicy::AllowPartial => Ok(()),
        }
    }
}

pub struct Scheduler {
    peers:            Vec<PeerConfig>,
    base_port:        u16,
    singleton:        bool,
    peer_datasets:    PeerDatasetMap,
    /// Dataset name to owning node id, visible to every party.
    dataset_owner:    BTreeMap<String, String>,
    sender:           Arc<dyn TaskSender>,
    dispatch_timeout: Option<Duration>,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        peer_datasets: PeerDatasetMap,
        dataset_owner: BTreeMap<String, String>,
        sender: Arc<dyn TaskSender>,
    ) -> Self {
        Self {
            peers: config.peers.clone(),
            base_port: config.session_base_port,
            singleton: config.singleton,
            peer_datasets,
            dataset_owner,
            sender,
            dispatch_timeout: config.dispatch_timeout(),
        }
    }

    /// Turns an actor task into its node task form. Node tasks pass through.
    pub fn expand(&self, task: &Task) -> Result<Task, TaskError> {
        if task.task_type != TaskType::ActorTask {
            return Ok(task.clone());
        }
        let node_map = RingTopologyBuilder::new(&self.peers, self.base_port)
            .singleton(self.singleton)
            .build(&task.job_id, &task.task_id)?;
        Ok(Task {
            task_type: TaskType::NodeTask,
            node_map,
            ..task.clone()
        })
    }

    /// Copy of `task` with the bindings of `node_id` merged into its params.
    pub fn bind_node(&self, task: &Task, node_id: &str) -> Result<Task, TaskError> {
        let datasets = self.peer_datasets.get(node_id).ok_or_else(|| TaskError::Dispatch {
            destination: node_id.to_string(),
            reason:      "no dataset bindings for this node".to_string(),
        })?;
        let mut task = task.clone();
        for (dataset, tag) in datasets {
            tracing::debug!("{node_id}: binding dataset {dataset} as {tag}");
            task.set_param(tag.clone(), dataset.clone());
        }
        for (dataset, owner) in &self.dataset_owner {
            task.set_param(dataset.clone(), owner.clone());
        }
        Ok(task)
    }

    /// Sends `task` to every expected party found in its topology and waits for
    /// all of them.
    pub async fn dispatch(&self, task: &Task) -> Result<JobOutcome, TaskError> {
        let task = self.expand(task)?;
        tracing::info!(
            "dispatching task {} of job {} to {} node(s)",
            task.task_id,
            task.job_id,
            task.node_map.len()
        );

        let mut outcomes = Vec::with_capacity(NUM_PARTIES);
        let mut calls = JoinSet::new();
        for node_id in (0..NUM_PARTIES).map(node_id_for_party) {
            let Some(node) = task.node_map.get(&node_id) else {
                continue;
            };
            let destination = node.address();
            let node_task = match self.bind_node(&task, &node_id) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("not dispatching to {node_id}: {e}");
                    metrics::counter!("mpc_impute.dispatch.failure").increment(1);
                    outcomes.push(NodeOutcome::failed(&node_id, &destination, e.to_string()));
                    continue;
                }
            };

            let sender = Arc::clone(&self.sender);
            let timeout = self.dispatch_timeout;
            calls.spawn(async move {
                let call = sender.send(&destination, &node_task);
                let res = match timeout {
                    Some(t) => tokio::time::timeout(t, call)
                        .await
                        .unwrap_or_else(|_| Err(eyre!("no reply within {t:?}"))),
                    None => call.await,
                };
                match res {
                    Ok(reply) => NodeOutcome {
                        node_id,
                        destination,
                        reply: Some(reply),
                        error: None,
                    },
                    Err(e) => NodeOutcome::failed(&node_id, &destination, format!("{e:#}")),
                }
            });
        }

        while let Some(joined) = calls.join_next().await {
            let outcome = joined.map_err(|e| TaskError::Dispatch {
                destination: "-".to_string(),
                reason:      e.to_string(),
            })?;
            if outcome.is_success() {
                tracing::info!("{} ({}) completed the task", outcome.node_id, outcome.destination);
                metrics::counter!("mpc_impute.dispatch.success").increment(1);
            } else {
                tracing::error!(
                    "{} ({}) failed: {}",
                    outcome.node_id,
                    outcome.destination,
                    outcome.reason()
                );
                metrics::counter!("mpc_impute.dispatch.failure").increment(1);
            }
            outcomes.push(outcome);
        }
        outcomes.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        Ok(JobOutcome {
            job_id: task.job_id,
            task_id: task.task_id,
            nodes: outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::tests::peers;
    use mpc_impute_common::task::{ParamMap, PartyReport, TaskStatus};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        received: Mutex<Vec<(String, Task)>>,
        failing:  Option<String>,
    }

    #[async_trait]
    impl TaskSender for RecordingSender {
        async fn send(&self, destination: &str, task: &Task) -> Result<TaskReply> {
            self.received
                .lock()
                .await
                .push((destination.to_string(), task.clone()));
            if self.failing.as_deref() == Some(destination) {
                return Err(eyre!("connection refused"));
            }
            let vm = &task.node_map.values().next().unwrap().vm;
            Ok(TaskReply {
                node_id: destination.to_string(),
                parties: vm
                    .iter()
                    .map(|vm| PartyReport {
                        party_id: vm.party_id,
                        status:   TaskStatus::Completed,
                        output:   None,
                        message:  None,
                    })
                    .collect(),
            })
        }
    }

    fn config(singleton: bool) -> Config {
        Config {
            peers: peers(),
            singleton,
            ..Config::default()
        }
    }

    fn bindings() -> (PeerDatasetMap, BTreeMap<String, String>) {
        let peer_datasets = (0..3)
            .map(|i| {
                (format!("node{i}"), vec![(format!("ds{i}"), "Data_File".to_string())])
            })
            .collect();
        let owners = (0..3).map(|i| (format!("ds{i}"), format!("node{i}"))).collect();
        (peer_datasets, owners)
    }

    fn actor_task() -> Task {
        let mut params = ParamMap::new();
        params.insert("ResFileName".into(), "out".into());
        Task::new_actor_task("job", "task", params)
    }

    #[tokio::test]
    async fn test_dispatch_binds_each_node() {
        let sender = Arc::new(RecordingSender::default());
        let (datasets, owners) = bindings();
        let scheduler = Scheduler::new(&config(false), datasets, owners, sender.clone());

        let outcome = scheduler.dispatch(&actor_task()).await.unwrap();
        assert_eq!(outcome.nodes.len(), 3);
        assert!(outcome.check(DispatchPolicy::RequireAll).is_ok());

        let received = sender.received.lock().await;
        assert_eq!(received.len(), 3);
        for (destination, task) in received.iter() {
            assert_eq!(task.task_type, TaskType::NodeTask);
            assert!(task.validate_node_task().is_ok());
            let i = peers().iter().position(|p| &p.address() == destination).unwrap();
            assert_eq!(task.param_str("Data_File"), Some(format!("ds{i}").as_str()));
            assert_eq!(task.param_str("ds2"), Some("node2"));
            assert_eq!(task.param_str("ResFileName"), Some("out"));
        }
    }

    #[tokio::test]
    async fn test_singleton_dispatches_once() {
        let sender = Arc::new(RecordingSender::default());
        let (datasets, owners) = bindings();
        let scheduler = Scheduler::new(&config(true), datasets, owners, sender.clone());

        let outcome = scheduler.dispatch(&actor_task()).await.unwrap();
        assert_eq!(outcome.nodes.len(), 1);
        let received = sender.received.lock().await;
        assert_eq!(received[0].1.node_map["node0"].vm.len(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_policy_applies() {
        let failing = peers()[1].address();
        let sender = Arc::new(RecordingSender {
            failing: Some(failing.clone()),
            ..Default::default()
        });
        let (mut datasets, owners) = bindings();
        datasets.remove("node2");
        let scheduler = Scheduler::new(&config(false), datasets, owners, sender.clone());

        let outcome = scheduler.dispatch(&actor_task()).await.unwrap();
        let status: Vec<bool> = outcome.nodes.iter().map(NodeOutcome::is_success).collect();
        assert_eq!(status, vec![true, false, false]);
        // node2 had no bindings and was never contacted
        assert_eq!(sender.received.lock().await.len(), 2);

        assert!(matches!(
            outcome.check(DispatchPolicy::RequireAll),
            Err(TaskError::Dispatch { destination, .. }) if destination == failing
        ));
        assert!(outcome.check(DispatchPolicy::AllowPartial).is_ok());
    }

    #[test]
    fn test_node_tasks_are_not_expanded_again() {
        let (datasets, owners) = bindings();
        let scheduler = Scheduler::new(
            &config(false),
            datasets,
            owners,
            Arc::new(RecordingSender::default()),
        );
        let expanded = scheduler.expand(&actor_task()).unwrap();
        assert_eq!(scheduler.expand(&expanded).unwrap(), expanded);
    }
}
