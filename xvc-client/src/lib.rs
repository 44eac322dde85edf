//! # XVC Client
//!
//! A Rust client library for connecting to Xilinx Virtual Cable (XVC) servers
//! and performing remote JTAG operations on FPGA devices.
//!
//! ## Overview
//!
//! [`XvcClient`] is a blocking client on top of [`std::net::TcpStream`],
//! [`AsyncXvcClient`] the tokio equivalent for any async byte stream. Both offer
//! the three XVC requests plus a few fixed JTAG sequences built from them:
//!
//! - **get_info** / **set_tck** / **shift**: the raw XVC 1.0 operations
//! - **reset_tap**, **enter_shift_dr**, **read_dr32**: fixed TMS patterns
//! - **read_idcode**: TAP reset followed by a 32 bit DR read
//! - **scan_chain**: lists IDCODE and BYPASS devices on the chain
//!
//! The [`jtag`] module decodes IDCODEs and scanned chains.
//!
//! For detailed protocol information, see the [`xvc_protocol`](https://docs.rs/xvc-protocol/) crate.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use xvc_client::{Builder, XvcClient};
//! use std::time::Duration;
//!
//! let config = Builder::new().rw_timeout(Duration::from_secs(5)).build();
//! let mut client = XvcClient::connect_with("127.0.0.1:2542", config)?;
//!
//! let info = client.get_info()?;
//! println!("Server version: {}", info.version());
//!
//! let id = client.read_idcode()?;
//! println!("IDCODE {} ({:?})", id, id.manufacturer_name());
//! ```
//!
//! ## Logging
//!
//! Requests are logged through the `log` crate at `debug`, vector contents at
//! `trace`. Retries and invalid IDCODEs are reported at `warn`.
mod async_client;
mod client;
pub mod config;
pub mod error;
pub mod jtag;

pub use async_client::AsyncXvcClient;
pub use client::XvcClient;
pub use config::{Builder, Config};
pub use error::ClientError;
