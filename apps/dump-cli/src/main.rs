use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use one_dump::DumpRegistry;
use one_dump::config::core_config::AppConfig;
use serde::Deserialize;
use shared_types::DumpName;
use tracing_subscriber::prelude::*;

const DEFAULT_CONFIG: &str = "config/config.yml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE")]
    config: Option<Vec<PathBuf>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a dump and hands it to the configured storage
    Dump { name: DumpName },
    /// Restores the most recent stored dump
    Load {
        name: DumpName,
        /// Terminate other database connections first
        #[arg(long)]
        kill_connections: bool,
    },
    /// Terminates every other connection to the database
    KillConnections,
    /// Lists declared dumps
    List,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliConfig {
    trace_level: Option<String>,
    trace_json: Option<bool>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_files = cli
        .config
        .unwrap_or_else(|| vec![PathBuf::from(DEFAULT_CONFIG)]);
    let app_config: AppConfig<CliConfig> =
        AppConfig::from_files(&config_files).context("Failed creating config")?;

    initialize_tracing(&app_config.app)?;
    tracing::debug!(?config_files, "Loaded configuration");

    let registry = DumpRegistry::from_config(&app_config.core)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli.command, registry))
}

async fn run(command: Command, registry: DumpRegistry) -> anyhow::Result<()> {
    match command {
        Command::Dump { name } => registry.create_dump(&name).await?,
        Command::Load {
            name,
            kill_connections,
        } => {
            if kill_connections {
                registry.terminate_other_connections().await?;
            }
            registry.load_dump(&name).await?
        }
        Command::KillConnections => registry.terminate_other_connections().await?,
        Command::List => {
            for (name, dump_type) in registry.dumps() {
                println!("{name}\t{dump_type}");
            }
        }
    }

    Ok(())
}

fn initialize_tracing(config: &CliConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(config.trace_level.as_deref().unwrap_or("info"))
    })?;

    let tracing_layer = tracing_subscriber::registry().with(filter);

    if config.trace_json.unwrap_or_default() {
        tracing_layer
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        tracing_layer.with(tracing_subscriber::fmt::layer()).init();
    };

    Ok(())
}
