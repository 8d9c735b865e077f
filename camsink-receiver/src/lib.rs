//! USB CDC image ingestion.
//!
//! Embedded camera senders fragment JPEG images into small chunks, wrap
//! every chunk in a framed envelope, and interleave frames from different
//! senders over a shared serial link. This crate resynchronizes the lossy
//! byte stream, demultiplexes frames by sender address, reassembles
//! per-sender images, and persists each completed image under a filename
//! that encodes the sender and the reception time.
//!
//! The moving parts, in data-flow order: [`protocol::codec::FrameCodec`]
//! recognizes envelopes in the byte stream; [`ReassemblyTable`] buffers
//! chunks per sender; [`Supervisor`] drives the serial connection and
//! survives transport loss; [`ImageSink`] persists finalized blobs off
//! the read path.

pub mod config;
pub mod error;
pub mod protocol;
pub mod reassembly;
pub mod sink;
pub mod supervisor;

pub use config::ReceiverConfig;
pub use error::{Error, Result};
pub use protocol::{Frame, FrameKind, Mac};
pub use reassembly::{CompletedImage, ReassemblyTable};
pub use sink::{BlobSink, ImageFilename, ImageSink};
pub use supervisor::Supervisor;
