//! Connection supervision for the serial transport.
//!
//! One supervisor drives one logical reader. It opens the port, feeds
//! decoded frames into the reassembly table, runs the inactivity sweep,
//! and hands completed images to the sink. Transport loss tears down the
//! codec buffer and the table with the connection; after a retry delay the
//! loop reopens the port and starts from a clean slate, indefinitely.

use tokio::io::AsyncRead;
use tokio::time::{Instant, interval_at, sleep};
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::config::ReceiverConfig;
use crate::error::Result;
use crate::protocol::codec::FrameCodec;
use crate::protocol::{Frame, FrameKind};
use crate::reassembly::ReassemblyTable;
use crate::sink::BlobSink;

/// Why one connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    /// The transport reported closure or a read error.
    TransportLost,

    /// External cancellation; the supervisor should exit.
    Shutdown,
}

/// Supervises the serial connection and routes frames to the sink.
pub struct Supervisor<S> {
    config: ReceiverConfig,
    sink: S,
    shutdown: CancellationToken,
}

impl<S: BlobSink> Supervisor<S> {
    pub fn new(config: ReceiverConfig, sink: S, shutdown: CancellationToken) -> Self {
        Self {
            config,
            sink,
            shutdown,
        }
    }

    /// Run the reconnect-forever loop until cancelled.
    ///
    /// No transport failure terminates the loop; losing one image is
    /// always preferred over stalling the pipeline.
    pub async fn run(mut self) -> Result<()> {
        info!(
            port = %self.config.port,
            baud = self.config.baud,
            "Starting receiver"
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.run_connection().await {
                Ok(ConnectionEnd::Shutdown) => break,
                Ok(ConnectionEnd::TransportLost) => {}
                Err(e) => warn!(error = %e, "Serial connection failed"),
            }

            // Retry delay, cut short by shutdown.
            tokio::select! {
                _ = sleep(self.config.retry_delay) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!("Receiver stopped");
        Ok(())
    }

    async fn run_connection(&mut self) -> Result<ConnectionEnd> {
        info!(port = %self.config.port, "Opening serial port");
        let mut stream =
            tokio_serial::new(self.config.port.as_str(), self.config.baud).open_native_async()?;

        // Some CDC devices only start transmitting once DTR is asserted;
        // failure to assert it is non-fatal.
        if let Err(e) = stream.write_data_terminal_ready(true) {
            warn!(error = %e, "Could not assert DTR");
        }
        info!("Serial port open");

        Ok(self.drain_transport(stream).await)
    }

    /// Drive one connection: decode frames from `reader` until the
    /// transport ends or shutdown is requested.
    ///
    /// The codec buffer and reassembly table live and die with the
    /// connection. Sweeping runs as an arm of the same select loop, so the
    /// table is only ever touched from this task.
    async fn drain_transport<R>(&mut self, reader: R) -> ConnectionEnd
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(reader, FrameCodec::new());
        let mut table = ReassemblyTable::new(self.config.image_timeout);
        let mut sweep = interval_at(
            Instant::now() + self.config.image_timeout,
            self.config.image_timeout,
        );

        loop {
            tokio::select! {
                next = frames.next() => match next {
                    Some(Ok(frame)) => self.handle_frame(&mut table, frame).await,
                    Some(Err(e)) => {
                        warn!(
                            error = %e,
                            stats = ?frames.decoder().stats(),
                            "Serial read error; reconnecting"
                        );
                        return ConnectionEnd::TransportLost;
                    }
                    None => {
                        info!(
                            stats = ?frames.decoder().stats(),
                            "Serial stream closed; reconnecting"
                        );
                        return ConnectionEnd::TransportLost;
                    }
                },
                _ = sweep.tick() => {
                    table.sweep(Instant::now());
                }
                _ = self.shutdown.cancelled() => {
                    info!(
                        in_flight = table.len(),
                        "Shutdown requested; dropping in-flight buffers"
                    );
                    return ConnectionEnd::Shutdown;
                }
            }
        }
    }

    async fn handle_frame(&mut self, table: &mut ReassemblyTable, frame: Frame) {
        trace!(
            mac = %frame.mac,
            kind = ?frame.kind,
            sequence = frame.sequence,
            len = frame.payload.len(),
            "Frame"
        );

        match frame.kind {
            FrameKind::Hash => {
                let digest = String::from_utf8_lossy(&frame.payload);
                table.on_hash(frame.mac, digest.trim());
            }
            FrameKind::Data => table.on_data(frame.mac, &frame.payload),
            FrameKind::Eof => {
                if let Some(image) = table.on_eof(frame.mac) {
                    if let Err(e) = self.sink.store(image).await {
                        warn!(error = %e, "Dropping completed image: sink unavailable");
                    }
                }
            }
        }
    }
}
