//! Receiver daemon: supervises the serial link and persists images.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use camsink_receiver::{ImageSink, ReceiverConfig, Supervisor};

#[derive(Debug, Parser)]
#[command(
    name = "camsink-receiverd",
    about = "Receive camera images over a USB CDC serial link",
    version
)]
struct Args {
    /// Serial port device
    #[arg(short = 'p', long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Baud rate
    #[arg(short = 'b', long, default_value_t = 115_200)]
    baud: u32,

    /// Output directory for saved images
    #[arg(short = 'o', long, default_value = "images")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = ReceiverConfig {
        port: args.port,
        baud: args.baud,
        output_dir: args.output,
        ..ReceiverConfig::default()
    };

    let (sink, sink_worker) = ImageSink::create(config.output_dir.clone())
        .with_context(|| format!("cannot prepare output directory {}", config.output_dir.display()))?;
    info!(dir = %config.output_dir.display(), "Images will be saved");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; shutting down");
            signal_token.cancel();
        }
    });

    Supervisor::new(config, sink, shutdown).run().await?;

    // The supervisor owned the only sink handle, so the queue is closed;
    // let queued writes finish before exiting.
    if let Err(e) = sink_worker.await {
        error!(error = %e, "Sink worker panicked");
    }
    Ok(())
}
