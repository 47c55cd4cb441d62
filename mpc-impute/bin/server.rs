use clap::Parser;
use eyre::{Context, Result};
use mpc_impute::server::{serve, NodeServiceState};
use mpc_impute_common::{
    config::{Config, Opt, ENV_PREFIX},
    tracing::initialize_tracing,
};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opt::parse();
    println!("Init config");
    let mut config = Config::load_config(ENV_PREFIX, opts.config.as_deref().map(Path::new))?;
    config.overwrite_defaults_with_cli_args(opts);

    if let Err(e) = initialize_tracing() {
        eprintln!("Failed to initialize tracing: {:?}", e);
        return Err(e);
    }
    tracing::info!("Starting node service {}", config.node_id);

    let listener = tokio::net::TcpListener::bind(&config.service_address)
        .await
        .wrap_err_with(|| format!("Failed to bind node service on {}", config.service_address))?;
    tracing::info!("Node service listening on {}", config.service_address);

    serve(listener, NodeServiceState::from_config(&config), shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C handler: {:?}", err);
    }
}
