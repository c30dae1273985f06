//! tether-gateway - push gateway client
//!
//! Connects to the gateway, logs every dispatch event it receives, and
//! closes cleanly on Ctrl-C.

use std::path::PathBuf;

use clap::Parser;
use tether_gateway::{Bootstrap, GatewayBuilder, GatewayConfig, bootstrap};
use tether_proto::{Event, Intents};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "tether-gateway")]
#[command(about = "Push gateway client")]
#[command(version)]
struct Cli {
    /// Authentication token
    #[arg(long, env = "TETHER_TOKEN", hide_env_values = true)]
    token: String,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Websocket URL; skips the REST lookup when set
    #[arg(long)]
    url: Option<String>,

    /// Intents bitmask to subscribe to
    #[arg(long)]
    intents: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("tether_gateway=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::default(),
    };

    let url = match cli.url {
        Some(url) => url,
        None => {
            let data = Bootstrap::new(&config.api_base)?.gateway_bot(&cli.token).await?;
            if let Some(limit) = data.start_limit {
                info!(
                    shards = data.shards,
                    remaining = limit.remaining,
                    total = limit.total,
                    "session start budget"
                );
            }
            bootstrap::with_query(&data.url, config.version, &config.encoding)?
        }
    };

    let mut builder = GatewayBuilder::new(url, cli.token)
        .with_config(config)
        .with_error_log(|err| warn!(error = %err, "gateway error"));
    if let Some(bits) = cli.intents {
        builder = builder.with_intents(Intents::from_bits(bits));
    }

    let (gateway, mut events) = builder.build()?;
    gateway.open().await?;
    info!(url = gateway.url(), "listening for events");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    Event::Ready(ready) => {
                        info!(session_id = %ready.session_id, user = %ready.user.username, "ready");
                    }
                    Event::MessageCreate(message) => {
                        info!(channel = %message.channel_id, author = %message.author.username, "{}", message.content);
                    }
                    other => info!(name = other.name(), seq = gateway.sequence(), "event"),
                }
            }
        }
    }

    gateway.close().await?;
    Ok(())
}
