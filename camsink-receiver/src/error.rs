//! Error types shared across the receiver.

use thiserror::Error;

/// Errors surfaced by the receiver library.
///
/// Almost everything that goes wrong on the link is recovered in place
/// (resync, reconnect, discard); only failures that cross an API boundary
/// end up here.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial transport open or control failure.
    #[error("serial transport error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Filesystem or stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything without a more specific variant.
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
