//! Session layer for Cambridge Audio Azur receivers.
//!
//! Maintains one long-lived TCP session to a serial bridge, decodes the
//! receiver's status lines into a live state store, and dispatches
//! commands with acknowledgment tracking. Lost sessions reconnect with
//! exponential backoff; callers observe state through typed getters,
//! snapshots, and change subscriptions.
//!
//! # Example
//!
//! ```rust,ignore
//! use azurctl_client::{AvrClient, Subscription};
//!
//! let client = AvrClient::connect("10.0.0.5", 14999).await?;
//! client.subscribe(Subscription::Any, |property, value| {
//!     println!("{} -> {}", property, value);
//! });
//! client.set_power(true).await?.wait().await?;
//! ```

mod backoff;
mod client;
mod connection;
mod dispatcher;
mod error;
mod state;

pub use client::{AvrClient, CommandHandle};
pub use connection::{ClientOptions, ConnectionState};
pub use dispatcher::Ack;
pub use error::{ClientError, ClientResult};
pub use state::{Subscription, SubscriptionId};
