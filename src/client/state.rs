// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Connection state of a client.
///
/// ```text
/// Disconnected ──connect──▶ Connecting ──ok──▶ Connected
///      ▲                        │                  │
///      └────────failure─────────┘             disconnect
///      │                                           ▼
///      └──────────────teardown done──────── Disconnecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session. Subscribe and publish are rejected.
    #[default]
    Disconnected,
    /// Session being established.
    Connecting,
    /// Session live.
    Connected,
    /// Subscriptions being torn down.
    Disconnecting,
}

impl ConnectionState {
    /// Returns true if the client is connected.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Disconnected)
                | (Self::Connected, Self::Disconnecting)
                | (Self::Disconnecting, Self::Disconnected)
        )
    }

    /// Returns `next` if the transition is legal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] otherwise.
    pub fn transition(self, next: Self) -> Result<Self, Error> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidState {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}
