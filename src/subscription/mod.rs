// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscriptions to remote data points.
//!
//! # Overview
//!
//! - [`SubscriptionRegistry`] - one entry per key, event dispatch, publish
//! - [`ValueCallback`] - closure invoked with `(key, value)` on each change
//! - [`SubscriptionSnapshot`] - read-only view of an entry
//! - [`ValueSink`] - optional per-key log of accepted changes
//! - [`RegistryConfig`] - publish deduplication policy
//!
//! # Change detection
//!
//! Every value pushed by the driver is rendered with the entry's
//! [`FormatHint`](crate::types::FormatHint) and compared with the last
//! accepted value. The callback only fires when the text differs, so a
//! transport that re-sends the same value (MQTT retained messages, polling
//! notifications) does not cause duplicate callbacks.
//!
//! # Usage
//!
//! ```no_run
//! use tagwatch::protocol::{MqttDriver, MqttDriverConfig, SubscribeOptions};
//! use tagwatch::subscription::callback;
//! use tagwatch::Client;
//!
//! # async fn example() -> tagwatch::Result<()> {
//! let config = MqttDriverConfig::from_url("mqtt://192.168.1.50:1883")?;
//! let client = Client::new(MqttDriver::new(config));
//! client.connect().await?;
//!
//! client
//!     .subscribe(
//!         "sensor/temp",
//!         SubscribeOptions::passthrough(),
//!         Some(callback(|key, value| println!("{key} = {value}"))),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod callback;
mod config;
mod entry;
mod registry;
mod sink;

pub use callback::{ValueCallback, callback};
pub use config::{PublishPolicy, RegistryConfig};
pub use entry::SubscriptionSnapshot;
pub use registry::SubscriptionRegistry;
pub use sink::{JsonLinesSink, MemorySink, ValueRecord, ValueSink};
