//! Persistence of completed images.
//!
//! The supervisor's read path must never wait on the disk, so the sink is
//! split in two: a cheap handle that stamps the reception time and queues
//! the blob, and a worker task that does the actual writing (via
//! `tokio::fs`, which runs on the blocking pool). Dropping the handle
//! closes the queue; the worker drains what is left and exits, so queued
//! writes complete before shutdown.

pub mod filename;

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::reassembly::CompletedImage;

pub use filename::ImageFilename;

/// Queue depth between the supervisor and the sink worker.
const SINK_QUEUE_DEPTH: usize = 16;

/// Emit a running statistics line every this many images.
const STATS_EVERY: u64 = 10;

/// Destination for completed images.
///
/// The supervisor only ever moves blobs into a sink; the trait is the seam
/// that lets tests capture them in memory instead of on disk.
#[async_trait]
pub trait BlobSink {
    /// Accept a finalized image. Ownership of the blob moves to the sink;
    /// an error means the image was not accepted and is lost.
    async fn store(&self, image: CompletedImage) -> Result<()>;
}

/// Handle to the filesystem sink.
pub struct ImageSink {
    tx: mpsc::Sender<PendingImage>,
}

struct PendingImage {
    image: CompletedImage,
    /// Local wall-clock time at finalize; becomes the filename timestamp.
    received_at: DateTime<Local>,
}

impl ImageSink {
    /// Create the sink and spawn its worker task.
    ///
    /// The output directory is created if missing. Failure here is the one
    /// non-recoverable startup error: a receiver that cannot persist
    /// anything has no reason to run.
    pub fn create(output_dir: PathBuf) -> Result<(Self, JoinHandle<()>)> {
        std::fs::create_dir_all(&output_dir)?;

        let (tx, rx) = mpsc::channel(SINK_QUEUE_DEPTH);
        let worker = SinkWorker {
            rx,
            output_dir,
            stats: SinkStats::new(),
        };
        let handle = tokio::spawn(worker.run());
        Ok((Self { tx }, handle))
    }
}

#[async_trait]
impl BlobSink for ImageSink {
    async fn store(&self, image: CompletedImage) -> Result<()> {
        let pending = PendingImage {
            image,
            received_at: Local::now(),
        };
        self.tx
            .send(pending)
            .await
            .map_err(|_| Error::Other("sink worker is gone".into()))
    }
}

struct SinkStats {
    images: u64,
    bytes: u64,
    started: Instant,
}

impl SinkStats {
    fn new() -> Self {
        Self {
            images: 0,
            bytes: 0,
            started: Instant::now(),
        }
    }

    fn record(&mut self, size: usize) {
        self.images += 1;
        self.bytes += size as u64;
        if self.images % STATS_EVERY == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            let average = self.bytes as f64 / self.images as f64;
            info!(
                images = self.images,
                avg_size = format!("{average:.1}"),
                elapsed_secs = format!("{elapsed:.1}"),
                "Sink statistics"
            );
        }
    }
}

struct SinkWorker {
    rx: mpsc::Receiver<PendingImage>,
    output_dir: PathBuf,
    stats: SinkStats,
}

impl SinkWorker {
    async fn run(mut self) {
        while let Some(pending) = self.rx.recv().await {
            self.persist(pending).await;
        }
        debug!("Sink queue closed; worker exiting");
    }

    async fn persist(&mut self, pending: PendingImage) {
        let PendingImage { image, received_at } = pending;

        if let Some(expected) = &image.advertised_hash {
            let computed = hex::encode(Sha256::digest(&image.data));
            if computed.eq_ignore_ascii_case(expected) {
                debug!(mac = %image.mac, "Image digest matches advertisement");
            } else {
                // The bytes we got are still the best record of what the
                // sender saw; persist them and let the operator judge.
                error!(
                    mac = %image.mac,
                    expected = %expected,
                    computed = %computed,
                    "Image digest mismatch; persisting anyway"
                );
            }
        }

        let name = ImageFilename::new(image.mac, received_at.naive_local()).to_string();
        let path = self.output_dir.join(&name);
        match tokio::fs::write(&path, &image.data).await {
            Ok(()) => {
                info!(
                    mac = %image.mac,
                    size = image.data.len(),
                    file = %name,
                    "Saved image"
                );
                self.stats.record(image.data.len());
            }
            Err(e) => {
                error!(
                    mac = %image.mac,
                    file = %name,
                    error = %e,
                    "Failed to save image; discarding"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Mac;
    use bytes::Bytes;

    fn mac(text: &str) -> Mac {
        text.parse().unwrap()
    }

    fn image(mac_text: &str, data: &[u8], advertised_hash: Option<String>) -> CompletedImage {
        CompletedImage {
            mac: mac(mac_text),
            data: Bytes::copy_from_slice(data),
            advertised_hash,
        }
    }

    async fn store_and_drain(images: Vec<CompletedImage>) -> (tempfile::TempDir, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let (sink, worker) = ImageSink::create(dir.path().to_path_buf()).unwrap();
        for image in images {
            sink.store(image).await.unwrap();
        }
        drop(sink);
        worker.await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        (dir, names)
    }

    #[tokio::test]
    async fn writes_blob_under_canonical_name() {
        let payload = vec![0xffu8, 0xd8, 0xff, 0xe0, 0x00, 0x10];
        let (dir, names) = store_and_drain(vec![image("aa:bb:cc:dd:ee:ff", &payload, None)]).await;

        assert_eq!(names.len(), 1);
        let parsed = ImageFilename::parse(&names[0]).expect("filename must conform");
        assert_eq!(parsed.mac, mac("aa:bb:cc:dd:ee:ff"));

        let written = std::fs::read(dir.path().join(&names[0])).unwrap();
        assert_eq!(written, payload);
    }

    #[tokio::test]
    async fn persists_despite_digest_mismatch() {
        let (dir, names) = store_and_drain(vec![image(
            "aa:bb:cc:dd:ee:ff",
            b"not what was advertised",
            Some("0".repeat(64)),
        )])
        .await;

        assert_eq!(names.len(), 1);
        let written = std::fs::read(dir.path().join(&names[0])).unwrap();
        assert_eq!(written, b"not what was advertised");
    }

    #[tokio::test]
    async fn accepts_matching_digest() {
        let payload = b"verified payload".to_vec();
        let digest = hex::encode(Sha256::digest(&payload));
        let (_dir, names) =
            store_and_drain(vec![image("00:11:22:33:44:55", &payload, Some(digest))]).await;
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn drains_queued_images_on_shutdown() {
        let images = (0..5)
            .map(|i| image("aa:bb:cc:dd:ee:ff", &[i as u8; 32], None))
            .collect();
        let (_dir, names) = store_and_drain(images).await;
        assert_eq!(names.len(), 5);
    }

    #[tokio::test]
    async fn creates_missing_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("gallery").join("blobs");
        let (sink, worker) = ImageSink::create(nested.clone()).unwrap();
        assert!(nested.is_dir());
        drop(sink);
        worker.await.unwrap();
    }
}
