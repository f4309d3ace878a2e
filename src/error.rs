// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `tagwatch` library.
//!
//! Failures are layered the same way the data flows:
//!
//! - [`DriverError`] - whatever the transport driver reports
//! - [`Error`] - what the registry and client return to callers
//! - [`FormatError`] - a raw value that does not fit its declared type
//!   (never surfaced, formatting falls back to passthrough)
//! - [`SinkError`] - a per-entry value log could not be written

use thiserror::Error;

use crate::client::ConnectionState;
use crate::protocol::DriverHandle;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection is not in the `Connected` state.
    #[error("client is not connected")]
    NotConnected,

    /// An empty key was given to a subscribe, publish or read call.
    #[error("key must not be empty")]
    EmptyKey,

    /// Publishing requires an existing subscription for the key.
    #[error("key is not subscribed: {0}")]
    NotSubscribed(String),

    /// The transport driver reported a failure.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// A connection state transition was requested from the wrong state.
    #[error("invalid connection transition from {from} to {to}")]
    InvalidState {
        /// State the connection was in.
        from: ConnectionState,
        /// State that was requested.
        to: ConnectionState,
    },
}

/// Errors reported by a transport driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the remote endpoint failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The driver has no live session.
    #[error("driver is not connected")]
    NotConnected,

    /// The handle does not belong to an active driver subscription.
    #[error("unknown subscription handle: {0}")]
    UnknownHandle(DriverHandle),

    /// The transport does not support this operation.
    #[error("operation not supported by this transport: {0}")]
    Unsupported(&'static str),

    /// The remote side refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// A raw value could not be rendered with its declared type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Integer does not fit the width of the declared type.
    #[error("value {value} does not fit in {type_name}")]
    OutOfRange {
        /// Declared PLC type name.
        type_name: &'static str,
        /// Offending value, rendered.
        value: String,
    },

    /// Text could not be parsed as a number.
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// Epoch offset outside the representable calendar range.
    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    /// Raw variant does not match the declared type family.
    #[error("unexpected raw value for {0}")]
    UnexpectedRaw(&'static str),
}

/// Errors raised by a per-entry value sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
