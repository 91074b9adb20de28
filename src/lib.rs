//! Three-Wire UART (H5) transport for Bluetooth HCI.
//!
//! H5 runs the HCI packet stream over a bare UART with no hardware flow
//! control, adding its own framing, acknowledgment, and retransmission:
//! SLIP byte-stuffing delimits frames, a four-byte header carries a
//! 3-bit sliding window, and a SYNC/CONFIG handshake brings the link up
//! before any HCI traffic flows.
//!
//! [`H5Transport::attach`] takes the two halves of an already-opened
//! UART and returns a send handle plus an [`H5Receiver`] yielding
//! in-order HCI packets:
//!
//! ```no_run
//! # async fn demo(port: tokio::io::DuplexStream) -> hci_h5::Result<()> {
//! use hci_h5::{H5Config, H5Transport, PacketType};
//!
//! let (rd, wr) = tokio::io::split(port);
//! let (transport, mut receiver) = H5Transport::attach(rd, wr, H5Config::load()?);
//!
//! while !transport.is_active() {
//!    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//! }
//! transport.send(PacketType::Command, &[0x03, 0x0C, 0x00])?;
//! let (packet_type, payload) = receiver.recv().await?;
//! println!("{packet_type}: {}", hex::encode(&payload));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod link;
pub mod proto;

pub use config::H5Config;
pub use error::{H5Error, Result};
pub use link::actor::{H5Receiver, H5Transport};
pub use proto::frame::{Packet, PacketType};
