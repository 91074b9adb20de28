//! Error types for the H5 transport.
//!
//! This module defines all error types that can occur while framing,
//! parsing, or shuttling HCI packets over the three-wire UART link.

use thiserror::Error;

use crate::proto::frame::PacketType;

/// Main error type for the H5 transport.
#[derive(Error, Debug)]
pub enum H5Error {
   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Invalid SLIP escape: 0xDB followed by 0x{0:02x}")]
   InvalidEscape(u8),

   #[error("Header checksum mismatch: expected 0x{expected:02x}, got 0x{actual:02x}")]
   ChecksumMismatch { expected: u8, actual: u8 },

   #[error("Unknown packet type nibble: 0x{0:x}")]
   UnknownPacketType(u8),

   #[error("Payload of {0} bytes exceeds the 12-bit length field")]
   PayloadTooLong(usize),

   #[error("Packet type {0} cannot be sent through the HCI queue")]
   Unsendable(PacketType),

   #[error("Link is not active yet")]
   NotReady,

   #[error("Transmit queue is full")]
   QueueFull,

   #[error("Link closed")]
   LinkClosed,

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `H5Error`.
pub type Result<T> = std::result::Result<T, H5Error>;
