mod common;

use common::*;
use eyre::Result;
use mpc_impute::{
    scheduler::{HttpTaskSender, Scheduler},
    server::{serve, NodeServiceState},
};
use mpc_impute_common::{
    config::{Config, DispatchPolicy},
    task::{Task, TaskStatus},
};
use std::{path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;

async fn spawn_node(node_id: &str, output_dir: &Path) -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let state = NodeServiceState {
        node_id:           Arc::new(node_id.to_string()),
        output_dir:        Arc::new(output_dir.to_path_buf()),
        handshake_timeout: Duration::from_secs(20),
    };
    tokio::spawn(serve(listener, state, std::future::pending()));
    Ok(port)
}

#[tokio::test]
async fn test_scheduler_drives_three_node_services() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let files = write_inputs(dir.path(), AGE_INPUTS)?;
    let mut ports = [0; 3];
    for (i, port) in ports.iter_mut().enumerate() {
        *port = spawn_node(&format!("node{i}"), &dir.path().join(format!("node{i}"))).await?;
    }

    let config = Config {
        peers: loopback_peers(ports),
        session_base_port: free_port_pair()?,
        dispatch_timeout_secs: Some(60),
        ..Config::default()
    };
    let (datasets, owners) = dataset_bindings(&files);
    let scheduler = Scheduler::new(
        &config,
        datasets,
        owners,
        Arc::new(HttpTaskSender::new(config.dispatch_timeout())?),
    );

    let task = Task::new_actor_task("job", "http", job_params(AGE_COLUMN_INFO, "imputed"));
    let outcome = scheduler.dispatch(&task).await?;
    outcome.check(DispatchPolicy::RequireAll)?;
    assert_eq!(outcome.succeeded(), 3);

    let written = std::fs::read_to_string(dir.path().join("node0").join("imputed.csv"))?;
    assert_eq!(written, "id,age\n1,10\n2,33\n3,30\n");
    Ok(())
}

#[tokio::test]
async fn test_singleton_node_hosts_the_whole_ring() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // every co-located party reads the same bound file
    let files = write_inputs(dir.path(), AGE_INPUTS)?;
    let port = spawn_node("node0", &dir.path().join("out")).await?;

    let config = Config {
        peers: loopback_peers([port, port, port]),
        singleton: true,
        ..Config::default()
    };
    let (datasets, owners) = dataset_bindings(&files);
    let scheduler = Scheduler::new(
        &config,
        datasets,
        owners,
        Arc::new(HttpTaskSender::new(None)?),
    );

    let task = Task::new_actor_task("job", "single", job_params(AGE_COLUMN_INFO, "imputed"));
    let outcome = scheduler.dispatch(&task).await?;
    assert_eq!(outcome.nodes.len(), 1);
    let reply = outcome.nodes[0].reply.as_ref().expect("node0 replied");
    assert_eq!(reply.parties.len(), 3);
    assert!(reply.parties.iter().all(|p| p.status == TaskStatus::Completed));

    // [10, null, 30] contributed three times: 120 / 3 = 40
    for party in 0..3 {
        let path = dir.path().join("out").join(format!("party{party}")).join("imputed.csv");
        assert_eq!(std::fs::read_to_string(path)?, "id,age\n1,10\n2,40\n3,30\n");
    }
    Ok(())
}

#[tokio::test]
async fn test_singleton_node_reports_a_failing_party() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let files = write_inputs(dir.path(), AGE_INPUTS)?;
    let port = spawn_node("node0", &dir.path().join("out")).await?;

    let config = Config {
        peers: loopback_peers([port, port, port]),
        singleton: true,
        ..Config::default()
    };
    let (datasets, mut owners) = dataset_bindings(&files);
    // party 2 finds no dataset it owns and fails before opening its session
    owners.remove("ds2");
    let scheduler = Scheduler::new(
        &config,
        datasets,
        owners,
        Arc::new(HttpTaskSender::new(None)?),
    );

    let task = Task::new_actor_task("job", "broken", job_params(AGE_COLUMN_INFO, "imputed"));
    let outcome = tokio::time::timeout(Duration::from_secs(30), scheduler.dispatch(&task)).await??;
    assert!(outcome.check(DispatchPolicy::RequireAll).is_err());
    assert_eq!(outcome.succeeded(), 0);

    let reply = outcome.nodes[0].reply.as_ref().expect("node0 replied");
    assert_eq!(reply.parties.len(), 3);
    assert!(reply.parties.iter().all(|p| p.status == TaskStatus::Failed));
    let message = reply.parties[2].message.as_deref().unwrap_or_default();
    assert!(message.contains("invalid task parameters"), "{message}");
    assert!(!dir.path().join("out").exists());
    Ok(())
}
