//! Byte-stream reassembly of H5 frames.
//!
//! A small state machine fed one raw UART byte at a time. It runs in the
//! reader task at byte-arrival time, so every transition is non-blocking
//! and complete before the next byte is looked at. Any framing violation
//! discards the partial frame and returns to the hunt for a delimiter;
//! corrupted input costs at most one frame.

use log::{debug, warn};

use crate::{
   config::H5Config,
   proto::{
      frame::{Frame, Packet, PacketType},
      header::{FrameHeader, HEADER_LEN},
      slip::{self, Unstuffer},
   },
};

/// Upper bound on link-control payloads. Signals are 2-byte signatures
/// with at most one trailing configuration byte; anything longer is a
/// corrupt frame, not a bigger buffer.
const SIGNAL_MAX: usize = 8;

#[derive(Debug)]
enum RxState {
   /// Hunting for the opening delimiter.
   Start,
   /// Collecting the 4 unstuffed header bytes.
   Header { buf: heapless::Vec<u8, HEADER_LEN> },
   /// Collecting `header.len` bytes of HCI payload.
   Payload { header: FrameHeader, buf: Packet },
   /// Collecting a bounded link-control or ack payload.
   Signal {
      header: FrameHeader,
      buf: heapless::Vec<u8, SIGNAL_MAX>,
   },
   /// Waiting for the closing delimiter.
   End { header: FrameHeader, payload: Packet },
}

/// Reassembles SLIP-delimited frames from the raw byte stream.
#[derive(Debug)]
pub struct RxReassembler {
   state: RxState,
   unstuffer: Unstuffer,
   strict_checksum: bool,
}

impl RxReassembler {
   pub fn new(config: &H5Config) -> Self {
      Self {
         state: RxState::Start,
         unstuffer: Unstuffer::new(),
         strict_checksum: config.strict_checksum,
      }
   }

   /// Feeds one raw wire byte, returning a frame once the closing
   /// delimiter of a valid frame has been consumed.
   pub fn feed(&mut self, byte: u8) -> Option<Frame> {
      if byte == slip::DELIMITER {
         return self.on_delimiter();
      }

      let unstuffed = match self.unstuffer.feed(byte) {
         Ok(Some(b)) => b,
         Ok(None) => return None,
         Err(e) => {
            if !matches!(self.state, RxState::Start) {
               warn!("Dropping partial frame: {e}");
            }
            self.reset();
            return None;
         },
      };

      match std::mem::replace(&mut self.state, RxState::Start) {
         // Inter-frame noise, drop it
         RxState::Start => {},
         RxState::Header { mut buf } => {
            let _ = buf.push(unstuffed);
            if buf.is_full() {
               let bytes: [u8; HEADER_LEN] = buf.as_slice().try_into().unwrap_or_default();
               self.on_header(&bytes);
            } else {
               self.state = RxState::Header { buf };
            }
         },
         RxState::Payload { header, mut buf } => {
            buf.push(unstuffed);
            self.state = if buf.len() == header.len as usize {
               RxState::End {
                  header,
                  payload: buf,
               }
            } else {
               RxState::Payload { header, buf }
            };
         },
         RxState::Signal { header, mut buf } => {
            let _ = buf.push(unstuffed);
            self.state = if buf.len() == header.len as usize {
               RxState::End {
                  header,
                  payload: Packet::from_slice(&buf),
               }
            } else {
               RxState::Signal { header, buf }
            };
         },
         RxState::End { .. } => {
            warn!("Expected closing delimiter, got 0x{unstuffed:02x}; dropping frame");
            self.reset();
         },
      }
      None
   }

   fn on_delimiter(&mut self) -> Option<Frame> {
      match std::mem::replace(&mut self.state, RxState::Start) {
         // Back-to-back delimiters between frames are normal
         RxState::Start | RxState::Header { .. } => {
            self.begin_header();
            None
         },
         RxState::End { header, payload } => Some(Frame { header, payload }),
         state => {
            warn!("Delimiter inside a frame body ({state:?}); dropping partial frame");
            // The same delimiter may open the next frame
            self.begin_header();
            None
         },
      }
   }

   fn on_header(&mut self, bytes: &[u8; HEADER_LEN]) {
      let header = match FrameHeader::decode(bytes) {
         Ok(header) => header,
         Err(e) if self.strict_checksum => {
            warn!("Bad header ({e}); dropping frame");
            self.reset();
            return;
         },
         Err(e) => match FrameHeader::decode_unchecked(bytes) {
            Ok(header) => {
               warn!("Bad header ({e}); processing anyway (lenient mode)");
               header
            },
            Err(e) => {
               // Unknown packet type is unrecoverable in either mode
               warn!("Bad header ({e}); dropping frame");
               self.reset();
               return;
            },
         },
      };

      debug!(
         "Header: type {} len {} seq {} ack {} reliable {}",
         header.packet_type, header.len, header.seq, header.ack, header.reliable
      );

      self.state = if header.len == 0 {
         RxState::End {
            header,
            payload: Packet::new(),
         }
      } else if matches!(
         header.packet_type,
         PacketType::Ack | PacketType::LinkControl
      ) {
         if header.len as usize > SIGNAL_MAX {
            warn!(
               "Link-control frame claims {} bytes (limit {SIGNAL_MAX}); dropping",
               header.len
            );
            self.reset();
            return;
         }
         RxState::Signal {
            header,
            buf: heapless::Vec::new(),
         }
      } else {
         RxState::Payload {
            header,
            buf: Packet::with_capacity(header.len as usize),
         }
      };
   }

   fn begin_header(&mut self) {
      self.state = RxState::Header {
         buf: heapless::Vec::new(),
      };
      self.unstuffer.reset();
   }

   fn reset(&mut self) {
      self.state = RxState::Start;
      self.unstuffer.reset();
   }
}
