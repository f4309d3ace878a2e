// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport driver interface.
//!
//! A [`Driver`] wraps a transport library (an MQTT client, a PLC runtime
//! client, ...) behind a narrow connect / subscribe / publish surface. The
//! registry never touches the wire itself.
//!
//! # Push path
//!
//! ```text
//! transport I/O task
//!        ↓
//! ChangeSink::on_change(Key("sensor/temp") | Handle(7), raw, timestamp)
//!        ↓
//! SubscriptionRegistry: format → dedup → callback
//! ```
//!
//! Drivers receive the sink as a [`Weak`] reference on connect so that a
//! dropped client is not kept alive by its own I/O task.
//!
//! When the remote end drops the session, the driver reports it through
//! [`ChangeSink::on_connection_lost`]. The owning client then discards its
//! subscriptions and goes back to `Disconnected`. A close requested through
//! [`Driver::disconnect`] is never reported.
//!
//! # Drivers
//!
//! - [`MqttDriver`]: MQTT over `rumqttc` (feature `mqtt`)

#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "mqtt")]
mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttDriver, MqttDriverConfig, MqttDriverConfigBuilder};

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::types::{FormatHint, RawValue};

/// Opaque token identifying one driver-side subscription.
///
/// Handles are minted by the driver and are only meaningful to the driver
/// that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverHandle(u64);

impl DriverHandle {
    /// Creates a handle with the given raw value.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// How a pushed change identifies its subscription.
///
/// Notification-handle transports (PLC runtimes) report the handle,
/// pub/sub transports (MQTT) report the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget<'a> {
    /// Resolve by driver handle.
    Handle(DriverHandle),
    /// Resolve by key (topic or tag path).
    Key(&'a str),
}

impl fmt::Display for EventTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(handle) => write!(f, "{handle}"),
            Self::Key(key) => f.write_str(key),
        }
    }
}

/// Per-subscription options passed to the driver.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tagwatch::protocol::SubscribeOptions;
/// use tagwatch::types::DataType;
///
/// let options = SubscribeOptions::typed("TIME", 0)
///     .with_cycle_time(Duration::from_millis(100));
/// assert_eq!(options.format.data_type, DataType::Time);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// How raw values are rendered.
    pub format: FormatHint,
    /// Sampling cycle for polling transports.
    pub cycle_time: Duration,
    /// Maximum delay before a change must be reported.
    pub max_delay: Duration,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            format: FormatHint::passthrough(),
            cycle_time: Duration::from_millis(200),
            max_delay: Duration::ZERO,
        }
    }
}

impl SubscribeOptions {
    /// Options for an untyped payload (MQTT topics).
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Options for a typed variable, e.g. `typed("WSTRING", 20)`.
    #[must_use]
    pub fn typed(data_type: &str, size: usize) -> Self {
        Self {
            format: FormatHint::from_tag(data_type, size),
            ..Self::default()
        }
    }

    /// Sets the sampling cycle (default: 200 ms).
    #[must_use]
    pub fn with_cycle_time(mut self, cycle_time: Duration) -> Self {
        self.cycle_time = cycle_time;
        self
    }

    /// Sets the maximum notification delay (default: none).
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }
}

/// Receiver of driver-pushed changes.
///
/// Implementations must return quickly: drivers call this from their I/O
/// task or dispatch thread.
pub trait ChangeSink: Send + Sync {
    /// Delivers one raw change. `timestamp` is `None` when the transport
    /// does not stamp its notifications.
    fn on_change(&self, target: EventTarget<'_>, raw: RawValue, timestamp: Option<DateTime<Utc>>);

    /// Reports that the session ended without a `disconnect` call. Every
    /// handle issued by the session is dead.
    fn on_connection_lost(&self, reason: &str) {
        let _ = reason;
    }
}

/// A transport driver.
///
/// Operations may suspend on a network round trip. Failures are reported
/// as [`DriverError`] and never retried by the caller.
#[allow(async_fn_in_trait)]
pub trait Driver: Send + Sync + 'static {
    /// Opens the transport session and starts pushing changes to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the session cannot be established.
    async fn connect(&self, sink: Weak<dyn ChangeSink>) -> Result<(), DriverError>;

    /// Closes the transport session.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the transport reports a failure on close.
    async fn disconnect(&self) -> Result<(), DriverError>;

    /// Starts watching `key` and returns the handle identifying it.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the transport refuses the subscription.
    async fn subscribe(
        &self,
        key: &str,
        options: &SubscribeOptions,
    ) -> Result<DriverHandle, DriverError>;

    /// Releases a subscription.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the handle is unknown or the release fails.
    async fn unsubscribe(&self, handle: DriverHandle) -> Result<(), DriverError>;

    /// Publishes a value on `key`. Only pub/sub transports support this.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unsupported`] by default.
    async fn publish(&self, key: &str, value: &str) -> Result<(), DriverError> {
        let _ = (key, value);
        Err(DriverError::Unsupported("publish"))
    }

    /// Reads the current value of `key` once.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unsupported`] by default.
    async fn read(&self, key: &str, hint: &FormatHint) -> Result<RawValue, DriverError> {
        let _ = (key, hint);
        Err(DriverError::Unsupported("read"))
    }
}
