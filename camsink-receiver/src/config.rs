//! Receiver configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the receiver daemon.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Serial device path of the USB CDC transport.
    pub port: String,

    /// Baud rate for the serial port.
    pub baud: u32,

    /// Directory completed images are written to. Created at startup if
    /// missing.
    pub output_dir: PathBuf,

    /// How long a partial image may sit idle before the sweeper discards
    /// it. Bounds per-sender memory for senders that vanish mid-image.
    pub image_timeout: Duration,

    /// Delay between reconnection attempts after transport loss.
    pub retry_delay: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".into(),
            baud: 115_200,
            output_dir: "images".into(),
            image_timeout: Duration::from_secs(20),
            retry_delay: Duration::from_secs(5),
        }
    }
}
