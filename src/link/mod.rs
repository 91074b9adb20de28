//! Link layer: reassembly, reliability, and the actor that owns the
//! connection state.
//!
//! All mutable protocol state lives in [`LinkState`] and is touched by
//! exactly one task (the link actor), so no locking is involved.

pub mod actor;
pub mod arq;
pub mod rx;

/// Lifecycle of the single active link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
   /// No handshake traffic exchanged yet.
   Uninit,
   /// SYNC_RESP seen, CONFIG exchange in progress.
   Init,
   /// CONFIG_RESP seen, HCI traffic may flow.
   Active,
}

/// Connection state for the one active link.
#[derive(Debug, Clone, Copy)]
pub struct LinkState {
   pub phase: LinkPhase,
   /// Negotiated transmit window (frames in flight), 1..=7.
   pub tx_win: u8,
   /// Next sequence number to assign to an outgoing reliable frame.
   pub tx_seq: u8,
   /// Next sequence number expected from the peer.
   pub tx_ack: u8,
   /// Last acknowledgment number received from the peer.
   pub rx_ack: u8,
}

impl LinkState {
   pub const fn new(tx_win: u8) -> Self {
      Self {
         phase: LinkPhase::Uninit,
         tx_win,
         tx_seq: 0,
         tx_ack: 0,
         rx_ack: 0,
      }
   }

   /// Drops all negotiated state, returning the link to `Uninit` with
   /// the given default window.
   pub fn reset(&mut self, tx_win: u8) {
      *self = Self::new(tx_win);
   }
}

/// Advances a 3-bit sequence number.
pub const fn next_seq(seq: u8) -> u8 {
   (seq + 1) & 0x07
}

/// Steps a 3-bit sequence number backwards.
pub const fn prev_seq(seq: u8) -> u8 {
   seq.wrapping_sub(1) & 0x07
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_seq_arithmetic_wraps() {
      assert_eq!(next_seq(6), 7);
      assert_eq!(next_seq(7), 0);
      assert_eq!(prev_seq(0), 7);
      assert_eq!(prev_seq(5), 4);
   }

   #[test]
   fn test_reset_clears_counters() {
      let mut link = LinkState::new(4);
      link.phase = LinkPhase::Active;
      link.tx_seq = 3;
      link.tx_ack = 5;
      link.rx_ack = 2;
      link.tx_win = 7;

      link.reset(4);
      assert_eq!(link.phase, LinkPhase::Uninit);
      assert_eq!(link.tx_seq, 0);
      assert_eq!(link.tx_ack, 0);
      assert_eq!(link.rx_ack, 0);
      assert_eq!(link.tx_win, 4);
   }
}
