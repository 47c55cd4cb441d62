#![allow(dead_code)]

use eyre::Result;
use mpc_impute::{executor::params::*, scheduler::PeerDatasetMap, topology::RingTopologyBuilder};
use mpc_impute_common::{
    config::PeerConfig,
    task::{ParamMap, Task, TaskType},
};
use std::{collections::BTreeMap, net::TcpListener, path::Path};

pub const AGE_COLUMN_INFO: &str = r#"{"ds0": {"age": 1}, "ds1": {"age": 1}, "ds2": {"age": 1}}"#;

/// Party 0 holds `[10, null, 30]`, party 1 `[20]`, party 2 `[40]`.
pub const AGE_INPUTS: [&str; 3] = [
    "id,age\n1,10\n2,\n3,30\n",
    "id,age\n4,20\n",
    "id,age\n5,40\n",
];

/// A port `p` such that `p` and `p + 1` are both free.
pub fn free_port_pair() -> Result<u16> {
    for _ in 0..32 {
        let first = TcpListener::bind("127.0.0.1:0")?;
        let port = first.local_addr()?.port();
        if port < u16::MAX && TcpListener::bind(("127.0.0.1", port + 1)).is_ok() {
            return Ok(port);
        }
    }
    eyre::bail!("no consecutive free ports found")
}

pub fn loopback_peers(service_ports: [u16; 3]) -> Vec<PeerConfig> {
    service_ports
        .iter()
        .enumerate()
        .map(|(i, port)| PeerConfig {
            node_id: format!("node{i}"),
            ip:      "127.0.0.1".to_string(),
            port:    *port,
        })
        .collect()
}

pub fn write_inputs(dir: &Path, inputs: [&str; 3]) -> Result<Vec<String>> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, contents)| {
            let path = dir.join(format!("input{i}.csv"));
            std::fs::write(&path, contents)?;
            Ok(path.display().to_string())
        })
        .collect()
}

pub fn dataset_bindings(files: &[String]) -> (PeerDatasetMap, BTreeMap<String, String>) {
    let peer_datasets = files
        .iter()
        .enumerate()
        .map(|(i, file)| (format!("node{i}"), vec![(file.clone(), DATA_FILE.to_string())]))
        .collect();
    let owners = (0..files.len())
        .map(|i| (format!("ds{i}"), format!("node{i}")))
        .collect();
    (peer_datasets, owners)
}

pub fn job_params(column_info: &str, res_file_name: &str) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(COLUMN_INFO.into(), column_info.into());
    params.insert(RES_FILE_NAME.into(), res_file_name.into());
    params
}

/// Node task for `party`, built the way the scheduler would.
pub fn node_task(
    party: usize,
    peers: &[PeerConfig],
    base_port: u16,
    data_file: &str,
    column_info: &str,
) -> Result<Task> {
    let mut params = job_params(column_info, &format!("party{party}"));
    params.insert(DATA_FILE.into(), data_file.into());
    for i in 0..3 {
        params.insert(format!("ds{i}"), format!("node{i}").into());
    }
    Ok(Task {
        job_id: "job".into(),
        task_id: "task".into(),
        task_type: TaskType::NodeTask,
        node_map: RingTopologyBuilder::new(peers, base_port).build("job", "task")?,
        params,
    })
}
