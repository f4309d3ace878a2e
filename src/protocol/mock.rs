// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory driver for unit tests.

use std::collections::HashMap;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{ChangeSink, Driver, DriverHandle, EventTarget, SubscribeOptions};
use crate::error::DriverError;
use crate::types::{FormatHint, RawValue};

/// Driver that records every call and lets tests push changes by hand.
#[derive(Default)]
pub(crate) struct MockDriver {
    next_handle: AtomicU64,
    sink: Mutex<Option<Weak<dyn ChangeSink>>>,
    active: Mutex<HashMap<DriverHandle, String>>,
    reads: Mutex<HashMap<String, RawValue>>,
    published: Mutex<Vec<(String, String)>>,
    pub subscribe_calls: AtomicU32,
    pub unsubscribe_calls: AtomicU32,
    pub disconnect_calls: AtomicU32,
    pub fail_connect: AtomicBool,
    pub fail_disconnect: AtomicBool,
    pub fail_subscribe: AtomicBool,
    pub fail_unsubscribe: AtomicBool,
    pub fail_publish: AtomicBool,
    subscribe_delay: Mutex<Option<Duration>>,
    publish_delay: Mutex<Option<Duration>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subscribe call sleep before answering.
    pub fn set_subscribe_delay(&self, delay: Duration) {
        *self.subscribe_delay.lock() = Some(delay);
    }

    /// Makes every publish call sleep before sending.
    pub fn set_publish_delay(&self, delay: Duration) {
        *self.publish_delay.lock() = Some(delay);
    }

    pub fn set_read_value(&self, key: &str, raw: impl Into<RawValue>) {
        self.reads.lock().insert(key.to_string(), raw.into());
    }

    pub fn handle_for(&self, key: &str) -> Option<DriverHandle> {
        self.active
            .lock()
            .iter()
            .find(|(_, k)| k.as_str() == key)
            .map(|(h, _)| *h)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    /// Pushes a change identified by key, as a pub/sub transport would.
    pub fn push_key(&self, key: &str, raw: impl Into<RawValue>) {
        self.push(EventTarget::Key(key), raw.into(), None);
    }

    /// Pushes a change identified by handle, as a notification transport would.
    pub fn push_handle(&self, handle: DriverHandle, raw: impl Into<RawValue>, at: DateTime<Utc>) {
        self.push(EventTarget::Handle(handle), raw.into(), Some(at));
    }

    /// Simulates the remote end dropping the session.
    pub fn drop_session(&self, reason: &str) {
        let sink = self.sink.lock().take().and_then(|sink| sink.upgrade());
        self.active.lock().clear();
        if let Some(sink) = sink {
            sink.on_connection_lost(reason);
        }
    }

    fn push(&self, target: EventTarget<'_>, raw: RawValue, at: Option<DateTime<Utc>>) {
        let sink = self.sink.lock().as_ref().and_then(Weak::upgrade);
        if let Some(sink) = sink {
            sink.on_change(target, raw, at);
        }
    }
}

impl Driver for MockDriver {
    async fn connect(&self, sink: Weak<dyn ChangeSink>) -> Result<(), DriverError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(DriverError::ConnectionFailed("mock refused".to_string()));
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DriverError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().take();
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(DriverError::ConnectionFailed("mock close failed".to_string()));
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        key: &str,
        _options: &SubscribeOptions,
    ) -> Result<DriverHandle, DriverError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.subscribe_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(DriverError::Rejected(format!("mock refused {key}")));
        }
        let handle = DriverHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.active.lock().insert(handle, key.to_string());
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: DriverHandle) -> Result<(), DriverError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        let removed = self.active.lock().remove(&handle);
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(DriverError::Rejected("mock release failed".to_string()));
        }
        removed.map(|_| ()).ok_or(DriverError::UnknownHandle(handle))
    }

    async fn publish(&self, key: &str, value: &str) -> Result<(), DriverError> {
        let delay = *self.publish_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(DriverError::Rejected("mock publish failed".to_string()));
        }
        self.published
            .lock()
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn read(&self, key: &str, _hint: &FormatHint) -> Result<RawValue, DriverError> {
        self.reads
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| DriverError::Rejected(format!("no such symbol: {key}")))
    }
}
