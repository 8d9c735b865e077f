//! Wire protocol definitions for the camera sender link.
//!
//! Senders fragment each JPEG into small chunks and wrap every chunk in a
//! framed envelope. Frames from different senders are interleaved on the
//! shared serial transport; the MAC field is what lets the receiver pull
//! them apart again.
//!
//! Envelope layout (multi-byte integers big-endian):
//!
//! ```text
//! ┌──────────────┬──────┬──────┬──────────┬──────────┬─────────┬──────────┬────────────┐
//! │ START_MARKER │ MAC  │ KIND │ SEQUENCE │ DATA_LEN │ PAYLOAD │ CHECKSUM │ END_MARKER │
//! │   4 bytes    │ 6 B  │ 1 B  │   4 B    │   4 B    │ DATA_LEN│   4 B    │  4 bytes   │
//! └──────────────┴──────┴──────┴──────────┴──────────┴─────────┴──────────┴────────────┘
//! ```

pub mod codec;
pub mod crc;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use strum::FromRepr;
use thiserror::Error;

/// Byte sequence that opens every frame.
pub const START_MARKER: [u8; 4] = [0xfa, 0xce, 0xaa, 0xbb];

/// Byte sequence that closes every frame.
pub const END_MARKER: [u8; 4] = [0xcd, 0xef, 0x56, 0x78];

/// Largest payload a single frame may carry, in bytes.
///
/// Senders chunk well below this; anything larger in the DATA_LEN field
/// means the parser has lost sync and is reading garbage as a header.
pub const MAX_PAYLOAD: usize = 512;

/// 6-byte link-layer address of an embedded sender.
///
/// Canonical text form is lowercase colon-separated hex
/// (`0a:1b:2c:3d:4e:5f`); the path form used in filenames is the same six
/// octets concatenated with no separator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac([u8; 6]);

impl Mac {
    /// Length of a MAC address in bytes.
    pub const LEN: usize = 6;

    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// The 12-hex-digit separator-free form used in blob filenames.
    pub fn path_form(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({self})")
    }
}

/// Error parsing a textual MAC address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid MAC address: {0:?}")]
pub struct ParseMacError(String);

impl FromStr for Mac {
    type Err = ParseMacError;

    /// Accepts both the colon-separated and the concatenated form,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacError(s.to_string());

        let mut octets = [0u8; 6];
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [flat] if flat.len() == 12 => {
                if !flat.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(err());
                }
                for (i, octet) in octets.iter_mut().enumerate() {
                    *octet = u8::from_str_radix(&flat[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
                }
                Ok(Self(octets))
            }
            six if six.len() == 6 => {
                for (octet, part) in octets.iter_mut().zip(six) {
                    if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                        return Err(err());
                    }
                    *octet = u8::from_str_radix(part, 16).map_err(|_| err())?;
                }
                Ok(Self(octets))
            }
            _ => Err(err()),
        }
    }
}

/// What a frame carries.
///
/// Discriminants are the on-wire KIND byte. Unknown discriminants are
/// logged and dropped by the codec; they never reach the reassembly table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum FrameKind {
    /// Integrity advertisement preceding an image: the payload is the
    /// ASCII hex SHA-256 of the image the sender is about to stream.
    Hash = 1,

    /// One chunk of image payload to append to the sender's buffer.
    Data = 2,

    /// End of image: finalize the sender's buffer into a blob.
    Eof = 3,
}

/// One parsed envelope.
///
/// Frames are independent: the codec does not require sequence continuity,
/// and no ordering is assumed across senders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Link-layer address of the sender.
    pub mac: Mac,

    /// What the payload means.
    pub kind: FrameKind,

    /// Sender-assigned sequence number. Carried for diagnostics; gaps are
    /// not detected or repaired.
    pub sequence: u32,

    /// Payload bytes, up to [`MAX_PAYLOAD`].
    pub payload: Bytes,
}
