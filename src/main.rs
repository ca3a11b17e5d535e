//! # Volume Health Monitor
//!
//! Watches persistent volumes provisioned by one CSI driver, asks the storage
//! backend for their health, and reports abnormal volumes as Kubernetes
//! warning events on the volume and on the pods mounting it.
//!
//! Configuration comes from environment variables (see `config`), with
//! command-line flags taking precedence.

use anyhow::Result;
use clap::Parser;
use volume_health_monitor::cli::Cli;
use volume_health_monitor::config::{ControllerConfig, ServerConfig};
use volume_health_monitor::runtime::{initialize, run_monitor};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut controller_config = ControllerConfig::from_env();
    let mut server_config = ServerConfig::from_env();
    cli.apply(&mut controller_config, &mut server_config);

    let init = initialize(&controller_config, &server_config).await?;
    run_monitor(init, controller_config).await
}
