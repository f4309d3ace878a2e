// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The sink handed to a driver for one session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};

use super::ConnectionState;
use crate::error::Result;
use crate::event::{ClientEvent, EventBus};
use crate::protocol::{ChangeSink, Driver, EventTarget};
use crate::subscription::SubscriptionRegistry;
use crate::types::RawValue;

/// Applies a state transition if it is legal from the current state.
pub(super) fn advance(
    state_tx: &watch::Sender<ConnectionState>,
    client_id: &str,
    next: ConnectionState,
) -> Result<()> {
    let mut outcome = Ok(());
    let mut from = ConnectionState::default();
    let changed = state_tx.send_if_modified(|state| {
        from = *state;
        match state.transition(next) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        }
    });
    if changed {
        tracing::debug!(client_id = %client_id, %from, to = %next, "Connection state changed");
    }
    outcome
}

/// Routes driver callbacks for one session.
///
/// Changes go to the registry. A lost session tears the client down
/// unless a connect or disconnect is already running, in which case that
/// transition sees the `lost` flag or finishes the teardown itself.
pub(super) struct SessionLink<D: Driver> {
    client_id: String,
    registry: Arc<SubscriptionRegistry<D>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    transition: Arc<Mutex<()>>,
    events: EventBus,
    lost: AtomicBool,
}

impl<D: Driver> SessionLink<D> {
    pub fn new(
        client_id: String,
        registry: Arc<SubscriptionRegistry<D>>,
        state_tx: Arc<watch::Sender<ConnectionState>>,
        transition: Arc<Mutex<()>>,
        events: EventBus,
    ) -> Self {
        Self {
            client_id,
            registry,
            state_tx,
            transition,
            events,
            lost: AtomicBool::new(false),
        }
    }

    /// Returns true once the driver has reported the session lost.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn close_lost_session(&self, reason: &str) -> Result<usize> {
        advance(&self.state_tx, &self.client_id, ConnectionState::Disconnecting)?;
        let discarded = self.registry.discard_all();
        advance(&self.state_tx, &self.client_id, ConnectionState::Disconnected)?;
        self.events
            .publish(ClientEvent::Error(format!("connection lost: {reason}")));
        self.events.publish(ClientEvent::Disconnected);
        Ok(discarded)
    }
}

impl<D: Driver> ChangeSink for SessionLink<D> {
    fn on_change(&self, target: EventTarget<'_>, raw: RawValue, timestamp: Option<DateTime<Utc>>) {
        self.registry.on_driver_event(target, raw, timestamp);
    }

    fn on_connection_lost(&self, reason: &str) {
        self.lost.store(true, Ordering::Release);

        let Ok(_transition) = self.transition.try_lock() else {
            tracing::debug!(
                client_id = %self.client_id,
                reason,
                "Session lost during a connect or disconnect"
            );
            return;
        };
        if !self.state_tx.borrow().is_connected() {
            return;
        }

        tracing::warn!(client_id = %self.client_id, reason, "Connection lost");
        match self.close_lost_session(reason) {
            Ok(discarded) => {
                tracing::info!(client_id = %self.client_id, discarded, "Disconnected");
            }
            Err(e) => {
                tracing::error!(client_id = %self.client_id, error = %e, "Failed to close lost session");
            }
        }
    }
}
