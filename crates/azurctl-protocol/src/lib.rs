//! Cambridge Audio Azur Control Protocol
//!
//! This crate provides types and utilities for talking to Azur-series
//! receivers over the line-based control protocol their RS232 port
//! speaks, typically reached through a TCP-to-serial bridge.
//!
//! # Protocol Overview
//!
//! The protocol is a simple line-based text interface, datagrams
//! delimited by `\r`:
//!
//! - **Commands** (host → receiver): `#<group>,<number>,<data>\r`
//! - **Status lines** (receiver → host): `#<group>,<number>,<value>`,
//!   sent both as replies to commands (reply group = command group + 5)
//!   and unsolicited when state changes at the front panel
//! - **Rejections**: group 11 lines (`#11,01` .. `#11,03`) flagging an
//!   unparseable command
//!
//! # Example
//!
//! ```rust,ignore
//! use azurctl_protocol::{Command, LineCodec, Message};
//!
//! // Build a command
//! let frame = Command::SetPower(true).encode();
//!
//! // Parse incoming bytes
//! let mut codec = LineCodec::new();
//! codec.push(b"#6,01,1\r");
//! while let Some(line) = codec.decode_line() {
//!     let message = Message::parse(&line?);
//! }
//! ```

mod codec;
mod commands;
mod error;
mod message;
mod properties;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use message::*;
pub use properties::*;
