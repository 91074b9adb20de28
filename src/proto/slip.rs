//! SLIP byte-stuffing for H5 frames.
//!
//! The delimiter byte 0xC0 marks frame boundaries on the wire, so it may
//! never appear inside a frame; 0xC0 and the escape byte 0xDB are each
//! replaced by a two-byte escape sequence. Everything else passes through
//! untouched.

use crate::error::{H5Error, Result};

/// Frame delimiter.
pub const DELIMITER: u8 = 0xC0;

/// Escape prefix.
pub const ESCAPE: u8 = 0xDB;

/// Substitute following [`ESCAPE`] for a literal 0xC0.
pub const SUB_DELIMITER: u8 = 0xDC;

/// Substitute following [`ESCAPE`] for a literal 0xDB.
pub const SUB_ESCAPE: u8 = 0xDD;

/// Stuffs a single byte into `out`, emitting one or two bytes.
pub fn stuff_into(byte: u8, out: &mut Vec<u8>) {
   match byte {
      DELIMITER => {
         out.push(ESCAPE);
         out.push(SUB_DELIMITER);
      },
      ESCAPE => {
         out.push(ESCAPE);
         out.push(SUB_ESCAPE);
      },
      _ => out.push(byte),
   }
}

/// Stuffs every byte of `bytes` into `out`.
pub fn stuff_all(bytes: &[u8], out: &mut Vec<u8>) {
   for &b in bytes {
      stuff_into(b, out);
   }
}

/// Incremental un-stuffer.
///
/// The only state carried across calls is whether the previous byte was
/// the escape prefix; the transform is otherwise per-byte.
#[derive(Debug, Default)]
pub struct Unstuffer {
   pending_escape: bool,
}

impl Unstuffer {
   pub const fn new() -> Self {
      Self {
         pending_escape: false,
      }
   }

   /// Feeds one wire byte.
   ///
   /// Returns `Ok(None)` while an escape pair is being consumed, the
   /// decoded byte once one is available, and an error when the escape
   /// prefix is followed by anything other than the two substitutes.
   pub fn feed(&mut self, byte: u8) -> Result<Option<u8>> {
      if self.pending_escape {
         self.pending_escape = false;
         return match byte {
            SUB_DELIMITER => Ok(Some(DELIMITER)),
            SUB_ESCAPE => Ok(Some(ESCAPE)),
            other => Err(H5Error::InvalidEscape(other)),
         };
      }

      if byte == ESCAPE {
         self.pending_escape = true;
         Ok(None)
      } else {
         Ok(Some(byte))
      }
   }

   /// Drops any half-consumed escape pair.
   pub fn reset(&mut self) {
      self.pending_escape = false;
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn unstuff_all(bytes: &[u8]) -> Vec<u8> {
      let mut unstuffer = Unstuffer::new();
      let mut out = Vec::new();
      for &b in bytes {
         if let Some(b) = unstuffer.feed(b).expect("valid escape") {
            out.push(b);
         }
      }
      out
   }

   #[test]
   fn test_plain_bytes_pass_through() {
      let mut out = Vec::new();
      stuff_all(b"hello", &mut out);
      assert_eq!(out, b"hello");
   }

   #[test]
   fn test_reserved_bytes_are_escaped() {
      let mut out = Vec::new();
      stuff_all(&[0x01, DELIMITER, ESCAPE, 0x02], &mut out);
      assert_eq!(
         out,
         vec![0x01, ESCAPE, SUB_DELIMITER, ESCAPE, SUB_ESCAPE, 0x02]
      );
   }

   #[test]
   fn test_roundtrip_all_byte_values() {
      let payload: Vec<u8> = (0..=255).collect();
      let mut stuffed = Vec::new();
      stuff_all(&payload, &mut stuffed);
      assert!(!stuffed.contains(&DELIMITER));
      assert_eq!(unstuff_all(&stuffed), payload);
   }

   #[test]
   fn test_escape_pair_needs_second_byte() {
      let mut unstuffer = Unstuffer::new();
      assert_eq!(unstuffer.feed(ESCAPE).expect("pending"), None);
      assert_eq!(unstuffer.feed(SUB_ESCAPE).expect("escape"), Some(ESCAPE));
   }

   #[test]
   fn test_invalid_escape_rejected() {
      let mut unstuffer = Unstuffer::new();
      assert_eq!(unstuffer.feed(ESCAPE).expect("pending"), None);
      let err = unstuffer.feed(0x42).expect_err("invalid escape");
      assert!(matches!(err, H5Error::InvalidEscape(0x42)));
      // The error clears the pending state
      assert_eq!(unstuffer.feed(0x42).expect("plain"), Some(0x42));
   }

   #[test]
   fn test_reset_drops_pending_escape() {
      let mut unstuffer = Unstuffer::new();
      unstuffer.feed(ESCAPE).expect("pending");
      unstuffer.reset();
      assert_eq!(unstuffer.feed(SUB_ESCAPE).expect("plain"), Some(SUB_ESCAPE));
   }
}
