use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tanker_watch::config::{Config, read_config_file};
use tanker_watch::hub::Hub;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// JSON config file; the environment is used when omitted
    #[arg(short, long)]
    file: Option<String>,

    /// Maximum log level
    #[arg(long, default_value = "debug")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("tanker_watch", level),
        ("tanker_watch_hub", level),
        ("hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::from_env()?,
    };

    let hub = Arc::new(Hub::new(config)?);
    hub.start();

    #[cfg(feature = "api")]
    {
        use tanker_watch::api::{ApiState, spawn_api_server};

        let addr = spawn_api_server(&hub.config().api, ApiState::new(hub.clone())).await?;
        info!("live stream available at http://{addr}/api/stream");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");
    hub.shutdown().await;

    Ok(())
}
