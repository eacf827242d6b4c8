use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;
use sluice::bridge::Bridge;
use sluice::common::Manager;
use sluice::config::Config;

#[derive(Parser)]
#[command(name = "sluice", about = "Stream-processing bridge")]
struct Args {
    /// Path to a YAML (or JSON) configuration file. Defaults apply when
    /// omitted.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// How long shutdown may take to drain, in milliseconds.
    #[arg(long, default_value_t = 20_000)]
    shutdown_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Err(err) = sluice::utils::logger::init("info") {
        eprintln!("logger init failed: {err}");
    }

    let conf: Config = match &args.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => Config::default(),
    };

    let manager = Arc::new(Manager::new());
    let bridge = Bridge::new(&conf, &manager).context("constructing bridge")?;
    info!("sluice: running");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    info!("sluice: shutting down");

    bridge
        .shutdown(Duration::from_millis(args.shutdown_timeout_ms))
        .await?;
    Ok(())
}
