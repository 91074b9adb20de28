//! Wire-level protocol definitions for H5.
//!
//! This module contains the SLIP byte-stuffing codec, the 4-byte frame
//! header codec, and the frame/packet-type data model shared by the RX
//! and TX paths.

pub mod frame;
pub mod header;
pub mod slip;
