//! H5 frame header pack/unpack.
//!
//! Four bytes: sequence and ack numbers share byte 0 with the integrity
//! flags, the packet type nibble and the 12-bit payload length share
//! bytes 1 and 2, and byte 3 carries a plain additive checksum over the
//! first three. The checksum is deliberately not a CRC; it is the ones'
//! complement of the wrapping 8-bit sum, exactly as the vendor header
//! defines it.

use crate::{
   error::{H5Error, Result},
   proto::frame::PacketType,
};

/// Size of the packed header on the wire (before stuffing).
pub const HEADER_LEN: usize = 4;

/// Largest payload the 12-bit length field can describe.
pub const MAX_PAYLOAD: usize = 0x0FFF;

/// Decoded H5 frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
   /// Sequence number (mod 8), meaningful only on reliable frames.
   pub seq: u8,
   /// Cumulative next-expected-sequence acknowledgment (mod 8).
   pub ack: u8,
   /// Peer appends a 16-bit data-integrity check to the payload.
   pub crc_present: bool,
   /// Frame occupies a sequence number and must be acknowledged.
   pub reliable: bool,
   pub packet_type: PacketType,
   /// Payload length in bytes.
   pub len: u16,
}

impl FrameHeader {
   /// Packs the header into its 4-byte wire form, checksum included.
   pub fn encode(&self) -> [u8; HEADER_LEN] {
      let mut bytes = [0u8; HEADER_LEN];
      bytes[0] = (self.seq & 0x07)
         | ((self.ack & 0x07) << 3)
         | (u8::from(self.crc_present) << 6)
         | (u8::from(self.reliable) << 7);
      bytes[1] = (self.packet_type as u8) | (((self.len & 0x0F) as u8) << 4);
      bytes[2] = (self.len >> 4) as u8;
      bytes[3] = checksum(&bytes[..3]);
      bytes
   }

   /// Unpacks a 4-byte wire header, validating the checksum.
   pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
      let expected = checksum(&bytes[..3]);
      if bytes[3] != expected {
         return Err(H5Error::ChecksumMismatch {
            expected,
            actual: bytes[3],
         });
      }
      Self::decode_unchecked(bytes)
   }

   /// Unpacks without validating the checksum (lenient mode).
   pub fn decode_unchecked(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
      let packet_type = PacketType::from_repr(bytes[1] & 0x0F)
         .ok_or(H5Error::UnknownPacketType(bytes[1] & 0x0F))?;
      Ok(Self {
         seq: bytes[0] & 0x07,
         ack: (bytes[0] >> 3) & 0x07,
         crc_present: bytes[0] & 0x40 != 0,
         reliable: bytes[0] & 0x80 != 0,
         packet_type,
         len: u16::from(bytes[1] >> 4) | (u16::from(bytes[2]) << 4),
      })
   }
}

/// Ones' complement of the wrapping 8-bit sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
   !bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}
