use clap::Parser;
use eyre::{Context, Result};
use mpc_impute::scheduler::{HttpTaskSender, PeerDatasetMap, Scheduler};
use mpc_impute_common::{
    config::{Config, Opt, ENV_PREFIX},
    task::{ParamMap, Task},
    tracing::initialize_tracing,
};
use serde::Deserialize;
use std::{collections::BTreeMap, path::Path, sync::Arc};

#[derive(Debug, Parser)]
struct ClientOpt {
    #[command(flatten)]
    opt: Opt,

    /// JSON job description.
    #[arg(long)]
    job: String,
}

#[derive(Debug, Deserialize)]
struct JobFile {
    job_id:        String,
    /// A fresh id is generated when absent.
    #[serde(default)]
    task_id:       Option<String>,
    #[serde(default)]
    params:        BTreeMap<String, String>,
    peer_datasets: PeerDatasetMap,
    #[serde(default)]
    dataset_owner: BTreeMap<String, String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let ClientOpt { opt, job } = ClientOpt::parse();
    let mut config = Config::load_config(ENV_PREFIX, opt.config.as_deref().map(Path::new))?;
    config.overwrite_defaults_with_cli_args(opt);
    initialize_tracing()?;

    let job_file: JobFile = serde_json::from_str(
        &std::fs::read_to_string(&job).wrap_err_with(|| format!("Failed to read job file {job}"))?,
    )
    .wrap_err("Failed to parse job file")?;

    let task_id = job_file
        .task_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let params: ParamMap = job_file
        .params
        .into_iter()
        .map(|(k, v)| (k, v.into()))
        .collect();
    let task = Task::new_actor_task(job_file.job_id, task_id, params);

    let sender = Arc::new(HttpTaskSender::new(config.dispatch_timeout())?);
    let scheduler = Scheduler::new(
        &config,
        job_file.peer_datasets,
        job_file.dataset_owner,
        sender,
    );

    let outcome = scheduler.dispatch(&task).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    outcome.check(config.dispatch_policy)?;
    tracing::info!(
        "task {} finished on {}/{} node(s)",
        outcome.task_id,
        outcome.succeeded(),
        outcome.nodes.len()
    );
    Ok(())
}
