//! Per-sender image reassembly.
//!
//! Frames from different senders interleave freely on the shared
//! transport. The table keeps one append-only buffer per sender MAC,
//! created lazily on the first data chunk and destroyed either by the
//! sender's end-of-image frame or by the inactivity sweep. Within one
//! sender, chunk order on the wire is chunk order in the blob.
//!
//! All operations run on the supervisor task; the table needs no lock.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::protocol::Mac;

/// A fully reassembled image, ready to hand to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedImage {
    /// Which sender streamed it.
    pub mac: Mac,

    /// The reassembled bytes, moved out of the table.
    pub data: Bytes,

    /// The digest the sender advertised before streaming, if any
    /// (lowercase hex SHA-256).
    pub advertised_hash: Option<String>,
}

struct InFlightImage {
    buffer: BytesMut,
    last_activity: Instant,
}

/// In-flight image buffers keyed by sender MAC.
pub struct ReassemblyTable {
    entries: HashMap<Mac, InFlightImage>,
    /// Hash advertisements arrive before the image they describe, so they
    /// live outside the entries; a bare advertisement must not create a
    /// buffer.
    advertised: HashMap<Mac, String>,
    image_timeout: Duration,
}

impl ReassemblyTable {
    pub fn new(image_timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            advertised: HashMap::new(),
            image_timeout,
        }
    }

    /// Append a data chunk to the sender's buffer, creating it on the
    /// first chunk. Zero-length chunks are ignored.
    pub fn on_data(&mut self, mac: Mac, payload: &[u8]) {
        if payload.is_empty() {
            debug!(%mac, "Ignoring zero-length data frame");
            return;
        }

        let entry = self.entries.entry(mac).or_insert_with(|| {
            info!(%mac, "Started receiving new image");
            InFlightImage {
                buffer: BytesMut::new(),
                last_activity: Instant::now(),
            }
        });
        entry.buffer.extend_from_slice(payload);
        entry.last_activity = Instant::now();
    }

    /// Record the digest a sender advertises for its next image.
    pub fn on_hash(&mut self, mac: Mac, digest: &str) {
        info!(%mac, digest, "Received hash advertisement");
        self.advertised.insert(mac, digest.to_string());
    }

    /// Finalize the sender's buffer, if one exists.
    ///
    /// Exactly one image is produced per buffered sender; an EOF with no
    /// buffer (duplicate EOF, or everything before it was lost) is logged
    /// and ignored.
    pub fn on_eof(&mut self, mac: Mac) -> Option<CompletedImage> {
        let advertised_hash = self.advertised.remove(&mac);
        match self.entries.remove(&mac) {
            Some(entry) => {
                info!(%mac, bytes = entry.buffer.len(), "End of image; finalizing");
                Some(CompletedImage {
                    mac,
                    data: entry.buffer.freeze(),
                    advertised_hash,
                })
            }
            None => {
                warn!(%mac, "EOF without buffer; ignoring");
                None
            }
        }
    }

    /// Evict every buffer idle longer than the image timeout, returning
    /// how many were dropped. Advertised hashes for evicted senders go
    /// with them.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let timeout = self.image_timeout;
        let stale: Vec<Mac> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_activity) > timeout)
            .map(|(mac, _)| *mac)
            .collect();

        for mac in &stale {
            if let Some(entry) = self.entries.remove(mac) {
                warn!(
                    %mac,
                    bytes = entry.buffer.len(),
                    "Timed out waiting for image data; discarding buffer"
                );
            }
            self.advertised.remove(mac);
        }
        stale.len()
    }

    /// Number of senders with an image in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes buffered so far for a sender, if it has an image in flight.
    pub fn buffered_bytes(&self, mac: Mac) -> Option<usize> {
        self.entries.get(&mac).map(|entry| entry.buffer.len())
    }
}
