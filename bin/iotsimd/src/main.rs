//! ---
//! sim_section: "01-core-functionality"
//! sim_subsection: "binary"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Binary entrypoint for the IoT-Sim daemon."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use iotsim_api::{spawn_api_server, ApiState};
use iotsim_broker::{MqttBroker, ReadingPublisher};
use iotsim_common::config::AppConfig;
use iotsim_common::logging::init_tracing;
use iotsim_engine::SimulatorEngine;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "IoT-Sim daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the simulator daemon")]
    Run,
    #[command(about = "Validate the configuration and exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/iotsim.toml"));
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    config.apply_env_overrides()?;

    if let Some(Commands::CheckConfig) = cli.command {
        config.validate()?;
        println!("configuration OK ({})", loaded.source.display());
        return Ok(());
    }

    init_tracing("iotsimd", &config.logging)?;
    info!(
        config_path = %loaded.source.display(),
        broker_host = %config.broker.host,
        broker_port = config.broker.port,
        api_listen = %config.api.listen,
        "iotsimd starting"
    );

    let broker = Arc::new(MqttBroker::new(config.broker.clone()));
    let publisher: Arc<dyn ReadingPublisher> = broker;
    let engine = Arc::new(SimulatorEngine::new(
        &config.simulation,
        config.broker.connect_timeout,
        publisher,
    ));

    let api = if config.api.enabled {
        let state = Arc::new(ApiState::new(engine.clone()));
        Some(spawn_api_server(state, config.api.listen)?)
    } else {
        warn!("api surface disabled; simulator only controllable via signals");
        None
    };

    signal::ctrl_c().await?;
    info!("shutdown signal received");

    if engine.status().running {
        if let Err(err) = engine.stop().await {
            warn!(error = %err, "failed to stop simulation cleanly");
        }
    }
    if let Some(api) = api {
        api.shutdown().await?;
    }

    info!("iotsimd shutdown complete");
    Ok(())
}
