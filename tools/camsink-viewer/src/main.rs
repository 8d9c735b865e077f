//! Browser gallery over the receiver's image directory.
//!
//! Read-only: every request re-lists the directory, recovers sender MAC
//! and reception time by parsing filenames, and serves a paginated HTML
//! page plus the raw blobs. The receiver owns the directory; this tool
//! never writes to it.

mod gallery;
mod html;

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "camsink-viewer",
    about = "Serve a browser gallery of received camera images",
    version
)]
struct Args {
    /// Address to serve on
    #[arg(short = 'l', long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Image directory (defaults to $VIEWER_IMAGE_DIR)
    #[arg(short = 'd', long)]
    dir: Option<PathBuf>,
}

/// Shared state for the request handlers.
pub(crate) struct ViewerState {
    pub image_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let image_dir = match args.dir {
        Some(dir) => dir,
        None => env::var("VIEWER_IMAGE_DIR")
            .map(PathBuf::from)
            .context("no image directory: pass --dir or set VIEWER_IMAGE_DIR")?,
    };
    if !image_dir.is_dir() {
        bail!("image directory does not exist: {}", image_dir.display());
    }
    info!(dir = %image_dir.display(), "Serving image gallery");

    let state = Arc::new(ViewerState { image_dir });
    let app = Router::new()
        .route("/", get(gallery::index))
        .route("/images/{filename}", get(gallery::image))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("cannot listen on {}", args.listen))?;
    info!(addr = %args.listen, "Listening");
    axum::serve(listener, app).await?;
    Ok(())
}
