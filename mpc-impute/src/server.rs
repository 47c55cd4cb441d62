//! HTTP task service of a node.

use crate::{
    error::TaskError,
    executor::{
        session::{LocalSessionFactory, SessionFactory, TcpSessionFactory},
        SecureAggregationExecutor,
    },
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use eyre::{Context, Result};
use mpc_impute_common::{
    config::Config,
    task::{PartyReport, Task, TaskReply, TaskStatus},
};
use serde::Serialize;
use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinSet};

#[derive(Clone)]
pub struct NodeServiceState {
    pub node_id:           Arc<String>,
    pub output_dir:        Arc<PathBuf>,
    pub handshake_timeout: Duration,
}

impl NodeServiceState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            node_id:           Arc::new(config.node_id.clone()),
            output_dir:        Arc::new(PathBuf::from(&config.output_dir)),
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    node_id: String,
}

pub fn router(state: NodeServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/tasks", post(submit_task))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: NodeServiceState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .wrap_err("node service encountered an unrecoverable error")
}

async fn health(State(state): State<NodeServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        node_id: state.node_id.as_ref().clone(),
    })
}

async fn submit_task(
    State(state): State<NodeServiceState>,
    Json(task): Json<Task>,
) -> Result<Json<TaskReply>, (StatusCode, String)> {
    tracing::info!("{} received task {} of job {}", state.node_id, task.task_id, task.job_id);
    match run_task(&state, task).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            tracing::error!("{} rejected task: {e}", state.node_id);
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

/// Runs one executor per virtual machine this node hosts in `task`.
pub async fn run_task(state: &NodeServiceState, task: Task) -> Result<TaskReply, TaskError> {
    task.validate_node_task()?;
    let node_id = state.node_id.as_ref().clone();
    let node = task
        .node_map
        .get(&node_id)
        .ok_or_else(|| TaskError::Config(format!("{node_id} is not part of the task topology")))?;
    let party_ids: Vec<usize> = node.vm.iter().map(|vm| vm.party_id).collect();

    let sessions: Arc<dyn SessionFactory> = if party_ids.len() > 1 {
        Arc::new(LocalSessionFactory::default())
    } else {
        Arc::new(TcpSessionFactory {
            handshake_timeout: state.handshake_timeout,
        })
    };

    let task = Arc::new(task);
    let mut parties = JoinSet::new();
    for party_id in party_ids {
        let task = Arc::clone(&task);
        let sessions = Arc::clone(&sessions);
        let mut executor =
            SecureAggregationExecutor::new(node_id.clone(), party_id, state.output_dir.as_ref());
        parties.spawn(async move {
            let res = executor.run(&task, sessions.as_ref()).await;
            match res {
                Ok(path) => PartyReport {
                    party_id,
                    status: TaskStatus::Completed,
                    output: Some(path.display().to_string()),
                    message: None,
                },
                Err(e) => PartyReport {
                    party_id,
                    status: TaskStatus::Failed,
                    output: None,
                    message: Some(e.to_string()),
                },
            }
        });
    }

    let mut reports = Vec::new();
    while let Some(report) = parties.join_next().await {
        reports.push(report.map_err(|e| TaskError::Config(format!("party task panicked: {e}")))?);
    }
    reports.sort_by_key(|r| r.party_id);
    Ok(TaskReply { node_id, parties: reports })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpc_impute_common::task::ParamMap;

    fn state(node_id: &str) -> NodeServiceState {
        NodeServiceState {
            node_id:           Arc::new(node_id.to_string()),
            output_dir:        Arc::new(PathBuf::from("unused")),
            handshake_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_actor_task_is_rejected() {
        let task = Task::new_actor_task("job", "task", ParamMap::new());
        assert!(matches!(
            run_task(&state("node0"), task).await,
            Err(TaskError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_health_route() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state("node1"), std::future::pending()));

        let body: serde_json::Value = reqwest::get(format!("http://{address}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["node_id"], "node1");
    }
}
