// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A single live subscription.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::MutexGuard;

use super::callback::{ValueCallback, invoke_isolated};
use super::sink::ValueSink;
use crate::protocol::{DriverHandle, SubscribeOptions};

/// Outcome of offering a new value to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    /// Value differed and was stored; sink and callback ran.
    Accepted,
    /// Value equal to the stored one, nothing happened.
    Unchanged,
    /// Entry was unsubscribed while the event was in flight.
    Removed,
}

struct EntryState {
    last_value: String,
    updated_at: DateTime<Utc>,
    sink: Option<Arc<dyn ValueSink>>,
    removed: bool,
}

/// Registry record for one key.
///
/// The value state sits behind a short-lived lock. A second lock,
/// `dispatch`, is held for the whole compare / store / callback sequence
/// so that callbacks for one key never overlap and observe values in
/// acceptance order. `publish` serializes outgoing writes on the key across
/// the compare, send and store steps.
pub(crate) struct SubscriptionEntry {
    key: String,
    handle: DriverHandle,
    options: SubscribeOptions,
    callback: Option<ValueCallback>,
    subscribed_at: DateTime<Utc>,
    state: Mutex<EntryState>,
    dispatch: Mutex<()>,
    publish: tokio::sync::Mutex<()>,
}

impl SubscriptionEntry {
    pub fn new(
        key: String,
        handle: DriverHandle,
        options: SubscribeOptions,
        callback: Option<ValueCallback>,
        initial_value: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            handle,
            options,
            callback,
            subscribed_at: now,
            state: Mutex::new(EntryState {
                last_value: initial_value,
                updated_at: now,
                sink: None,
                removed: false,
            }),
            dispatch: Mutex::new(()),
            publish: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handle(&self) -> DriverHandle {
        self.handle
    }

    pub fn options(&self) -> &SubscribeOptions {
        &self.options
    }

    pub fn last_value(&self) -> String {
        self.state.lock().last_value.clone()
    }

    /// Waits for exclusive write access to the key. Held by a publish from
    /// the dedup check until the sent value is stored.
    pub async fn lock_publish(&self) -> MutexGuard<'_, ()> {
        self.publish.lock().await
    }

    /// Offers a formatted value.
    ///
    /// On change: stores it, records it to the sink if one is attached, then
    /// invokes the callback. Both run outside the state lock but inside the
    /// dispatch lock, which is not reentrant.
    pub fn apply(&self, value: String, at: DateTime<Utc>, client_id: &str) -> Applied {
        let _order = self.dispatch.lock();

        let sink = {
            let mut state = self.state.lock();
            if state.removed {
                return Applied::Removed;
            }
            if state.last_value == value {
                return Applied::Unchanged;
            }
            state.last_value.clone_from(&value);
            state.updated_at = at;
            state.sink.clone()
        };

        if let Some(sink) = sink
            && let Err(e) = sink.record(&self.key, &value, at)
        {
            tracing::warn!(
                client_id = %client_id,
                key = %self.key,
                error = %e,
                "Failed to record value"
            );
        }

        if let Some(cb) = &self.callback {
            invoke_isolated(cb, &self.key, &value, client_id);
        }
        Applied::Accepted
    }

    /// Marks the entry dead. Events already in flight are discarded.
    pub fn mark_removed(&self) {
        let mut state = self.state.lock();
        state.removed = true;
        state.sink = None;
    }

    pub fn has_sink(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Attaches a sink, returning the current value and timestamp so the
    /// caller can record them. Returns `None` if a sink is already attached.
    pub fn attach_sink(&self, sink: Arc<dyn ValueSink>) -> Option<(String, DateTime<Utc>)> {
        let mut state = self.state.lock();
        if state.sink.is_some() || state.removed {
            return None;
        }
        state.sink = Some(sink);
        Some((state.last_value.clone(), state.updated_at))
    }

    /// Detaches the sink. Returns `true` if one was attached.
    pub fn detach_sink(&self) -> bool {
        self.state.lock().sink.take().is_some()
    }

    pub fn snapshot(&self) -> SubscriptionSnapshot {
        let state = self.state.lock();
        SubscriptionSnapshot {
            key: self.key.clone(),
            handle: self.handle,
            options: self.options.clone(),
            last_value: state.last_value.clone(),
            subscribed_at: self.subscribed_at,
            updated_at: state.updated_at,
            has_callback: self.callback.is_some(),
            logging: state.sink.is_some(),
        }
    }
}

impl std::fmt::Debug for SubscriptionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionEntry")
            .field("key", &self.key)
            .field("handle", &self.handle)
            .field("format", &self.options.format)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionSnapshot {
    /// Subscribed key.
    pub key: String,
    /// Driver handle.
    pub handle: DriverHandle,
    /// Options the subscription was created with.
    pub options: SubscribeOptions,
    /// Last accepted value, formatted.
    pub last_value: String,
    /// When the subscription was created.
    pub subscribed_at: DateTime<Utc>,
    /// When the last value was accepted (creation time if none yet).
    pub updated_at: DateTime<Utc>,
    /// Whether a change callback is attached.
    pub has_callback: bool,
    /// Whether a value log is attached.
    pub logging: bool,
}
