//! # XVC Protocol Library
//!
//! Types and encodings for the [Xilinx Virtual Cable (XVC)](https://github.com/Xilinx/XilinxVirtualCable)
//! 1.0 protocol, which carries JTAG shifts over a TCP connection.
//!
//! ## Overview
//!
//! An XVC client sends one of three commands and waits for the reply before
//! sending the next:
//!
//! | request                                   | reply                                  |
//! |-------------------------------------------|----------------------------------------|
//! | `getinfo:`                                | `xvcServer_v1.0:<max_vector_len>\n`    |
//! | `settck:<period_ns: u32 LE>`              | `<applied period_ns: u32 LE>`          |
//! | `shift:<num_bits: u32 LE><TMS><TDI>`      | `<TDO>`                                |
//!
//! TMS, TDI and TDO vectors are `ceil(num_bits / 8)` bytes each; bit 0 of
//! byte 0 is clocked first.
//!
//! ## Basic Usage
//!
//! ```
//! use xvc_protocol::{Message, Version, XvcInfo};
//! use std::io::Cursor;
//!
//! // Reset the TAP: five clocks with TMS high, then one into Run-Test/Idle
//! let reset = Message::shift(6, [0x1Fu8], [0x3Fu8]).expect("vectors match num_bits");
//! assert_eq!(reset.to_bytes(), b"shift:\x06\x00\x00\x00\x1F\x3F");
//!
//! let mut reply = Cursor::new(b"xvcServer_v1.0:2048\n");
//! let info = XvcInfo::from_reader(&mut reply).expect("Info should parse");
//! assert_eq!(info.version(), Version::V1_0);
//! assert_eq!(info.max_vector_len(), 2048);
//! ```
//!
//! ## Features
//!
//! - `tokio`: enables [`framing::ClientCodec`], a `tokio_util` codec that
//!   splits the reply stream according to the outstanding requests.
//!
//! ## Error Handling
//!
//! Decoding and validation failures are reported as [`error::ReadError`].

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
#[cfg(feature = "tokio")]
pub mod framing;
