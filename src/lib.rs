// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `tagwatch` - change subscriptions for remote data points.
//!
//! This library keeps a registry of subscriptions to remote values (MQTT
//! topics, PLC variables) over one transport connection, renders every
//! pushed value into a display string according to its declared type, and
//! invokes a caller callback only when that string changes.
//!
//! # Building blocks
//!
//! - [`Client`] - owns the connection state and one registry
//! - [`SubscriptionRegistry`](subscription::SubscriptionRegistry) - entries,
//!   dispatch, deduplication, publish
//! - [`Driver`](protocol::Driver) - transport abstraction;
//!   [`MqttDriver`](protocol::MqttDriver) ships with the `mqtt` feature
//! - [`format`] - IEC type rendering (`TIME`, `WORD`, `DT`, `WSTRING`, ...)
//!
//! # Quick Start
//!
//! ```no_run
//! use tagwatch::Client;
//! use tagwatch::protocol::{MqttDriver, MqttDriverConfig, SubscribeOptions};
//! use tagwatch::subscription::callback;
//!
//! #[tokio::main]
//! async fn main() -> tagwatch::Result<()> {
//!     let config = MqttDriverConfig::from_url("mqtt://192.168.1.50:1883")?;
//!     let client = Client::new(MqttDriver::new(config));
//!     client.connect().await?;
//!
//!     client
//!         .subscribe(
//!             "sensor/temp",
//!             SubscribeOptions::passthrough(),
//!             Some(callback(|key, value| println!("{key} -> {value}"))),
//!         )
//!         .await?;
//!
//!     // Announce a value; the local callback fires once
//!     client.publish("sensor/temp", "21.5").await?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Logging
//!
//! The library emits `tracing` events with a `client_id` field and installs
//! no subscriber. Dedup decisions are logged at `trace`, value changes at
//! `debug`, lifecycle at `info`.

pub mod client;
pub mod error;
pub mod event;
pub mod format;
pub mod protocol;
pub mod subscription;
pub mod types;

pub use client::{Client, ConnectionState};
pub use error::{DriverError, Error, FormatError, Result, SinkError};
pub use event::{ClientEvent, EventBus};
#[cfg(feature = "mqtt")]
pub use protocol::{MqttDriver, MqttDriverConfig};
pub use protocol::{ChangeSink, Driver, DriverHandle, EventTarget, SubscribeOptions};
pub use subscription::{
    PublishPolicy, RegistryConfig, SubscriptionRegistry, SubscriptionSnapshot, ValueCallback,
    callback,
};
pub use types::{DataType, FormatHint, RawValue};
