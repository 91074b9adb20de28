//! Frame data model and link-control payload definitions.
//!
//! A frame is the unit of wire transfer: a 4-byte header followed by up
//! to 4095 payload bytes, SLIP-stuffed between two delimiters. The
//! payload is opaque HCI data except for link-control frames, whose
//! fixed 2-byte signatures drive the SYNC/CONFIG handshake.

use smallvec::SmallVec;

use crate::proto::header::FrameHeader;

/// Payload buffer. Inline capacity covers events and the bounded
/// link-control signals without a heap allocation.
pub type Packet = SmallVec<[u8; 32]>;

/// H5 packet type nibble carried in the frame header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
pub enum PacketType {
   Ack = 0x00,
   Command = 0x01,
   Acl = 0x02,
   Sco = 0x03,
   Event = 0x04,
   Vendor = 0x0E,
   LinkControl = 0x0F,
}

impl PacketType {
   /// Whether frames of this type occupy a sequence number and are
   /// retransmitted until acknowledged.
   pub const fn is_reliable(self) -> bool {
      matches!(self, Self::Command | Self::Acl | Self::Event)
   }

   /// Whether this type carries HCI data (as opposed to pure acks and
   /// link-control signals, which never leave the transport).
   pub const fn is_hci(self) -> bool {
      matches!(
         self,
         Self::Command | Self::Acl | Self::Sco | Self::Event | Self::Vendor
      )
   }
}

// Fixed link-control signatures (2 bytes each, window byte appended to
// the CONFIG pair).
pub const SYNC: &[u8] = &[0x01, 0x7E];
pub const SYNC_RESP: &[u8] = &[0x02, 0x7D];
pub const CONFIG_REQ: &[u8] = &[0x03, 0xFC];
pub const CONFIG_RESP: &[u8] = &[0x04, 0x7B];

// Low-energy signals. Recognized so they do not log as unknown, but the
// transport neither sleeps nor wakes the peer.
pub const WAKEUP: &[u8] = &[0x05, 0xFA];
pub const WOKEN: &[u8] = &[0x06, 0xF9];
pub const SLEEP: &[u8] = &[0x07, 0x78];

/// A fully reassembled frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
   pub header: FrameHeader,
   pub payload: Packet,
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_wire_values() {
      assert_eq!(PacketType::from_repr(0x00), Some(PacketType::Ack));
      assert_eq!(PacketType::from_repr(0x01), Some(PacketType::Command));
      assert_eq!(PacketType::from_repr(0x02), Some(PacketType::Acl));
      assert_eq!(PacketType::from_repr(0x03), Some(PacketType::Sco));
      assert_eq!(PacketType::from_repr(0x04), Some(PacketType::Event));
      assert_eq!(PacketType::from_repr(0x0E), Some(PacketType::Vendor));
      assert_eq!(PacketType::from_repr(0x0F), Some(PacketType::LinkControl));
      assert_eq!(PacketType::from_repr(0x05), None);
   }

   #[test]
   fn test_reliability_classes() {
      assert!(PacketType::Command.is_reliable());
      assert!(PacketType::Acl.is_reliable());
      assert!(PacketType::Event.is_reliable());
      assert!(!PacketType::Sco.is_reliable());
      assert!(!PacketType::Ack.is_reliable());
      assert!(!PacketType::LinkControl.is_reliable());
      assert!(!PacketType::Vendor.is_reliable());
   }

   #[test]
   fn test_hci_classes() {
      assert!(PacketType::Command.is_hci());
      assert!(PacketType::Sco.is_hci());
      assert!(!PacketType::Ack.is_hci());
      assert!(!PacketType::LinkControl.is_hci());
   }
}
