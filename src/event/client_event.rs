// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection lifecycle events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Event emitted by a [`Client`](crate::Client) when its connection changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The driver session is up.
    Connected,
    /// The driver session was closed and all subscriptions released.
    Disconnected,
    /// A connect attempt failed.
    ConnectionFailed(String),
    /// A driver failure outside of connect, e.g. on close.
    Error(String),
}

impl ClientEvent {
    /// Returns true for [`ConnectionFailed`](Self::ConnectionFailed) and
    /// [`Error`](Self::Error).
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::Error(_))
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::ConnectionFailed(msg) => write!(f, "connection failed: {msg}"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}
