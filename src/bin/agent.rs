//! Daemon binary for the uppi agent.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uppi_agent::AgentConfig;

/// Uppi Server Monitoring Agent: reports server metrics to Uppi.
#[derive(Parser)]
#[command(name = "uppi-agent", version, about)]
struct Cli {
    /// Server token in the form `{serverId}:{secret}`.
    token: String,

    /// Instance URL.
    #[arg(long)]
    instance: Option<String>,

    /// Skip the update check at startup.
    #[arg(long)]
    skip_updates: bool,

    /// Reporting interval in minutes.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval_minutes: Option<u64>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("uppi_agent=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => AgentConfig::from_file(path)?,
        None => AgentConfig::default(),
    };
    config.apply_token(&cli.token)?;
    if let Some(instance) = cli.instance {
        config.instance = instance;
    }
    if let Some(minutes) = cli.interval_minutes {
        config.interval_minutes = minutes;
    }
    config.skip_updates |= cli.skip_updates;

    uppi_agent::daemon::run(config).await?;
    Ok(())
}
