//! Command-line peer for a realm hub.
//!
//! Lines read from stdin are sent as text frames; frames from the hub are
//! printed to stdout.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use realm::client::{ClientConfig, spawn_client};

#[derive(Debug, Parser)]
#[command(author, version, about = "Realm peer client: relay stdin lines to a hub.")]
struct Cli {
    /// Hub WebSocket endpoint
    #[arg(default_value = "ws://127.0.0.1:8080/ws")]
    url: String,
    /// Heartbeat period in milliseconds
    #[arg(long, default_value = "1000")]
    heartbeat_ms: u64,
    /// Delay before redialing after a lost connection, in milliseconds
    #[arg(long, default_value = "1000")]
    reconnect_ms: u64,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("realm={level},realm_client={level}")));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .ok();

    let mut config = ClientConfig::new(cli.url);
    config.heartbeat_interval = Duration::from_millis(cli.heartbeat_ms.max(1));
    config.reconnect_delay = Duration::from_millis(cli.reconnect_ms);

    let (client, mut inbound) = spawn_client(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.is_empty() => {}
                Some(line) => client.send(line).await?,
                None => break,
            },
            Some(frame) = inbound.recv() => {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{}", frame.display())?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down");
    client.shutdown().await;
    Ok(())
}
