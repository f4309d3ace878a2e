// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The subscription registry.
//!
//! Keeps one entry per subscribed key, resolves driver events to entries by
//! key or handle, and turns raw values into deduplicated callbacks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;

use super::callback::ValueCallback;
use super::config::{PublishPolicy, RegistryConfig};
use super::entry::{Applied, SubscriptionEntry, SubscriptionSnapshot};
use super::sink::ValueSink;
use crate::client::ConnectionState;
use crate::error::{Error, Result};
use crate::format::format_value;
use crate::protocol::{ChangeSink, Driver, DriverHandle, EventTarget, SubscribeOptions};
use crate::types::{FormatHint, RawValue};

#[derive(Default)]
struct EntryTable {
    by_key: HashMap<String, Arc<SubscriptionEntry>>,
    by_handle: HashMap<DriverHandle, Arc<SubscriptionEntry>>,
    /// Keys with a driver subscribe call in flight.
    pending: HashSet<String>,
    /// Bumped by every teardown. A subscribe that started in an earlier
    /// generation must not insert its entry.
    generation: u64,
}

impl EntryTable {
    fn drain(&mut self) -> Vec<Arc<SubscriptionEntry>> {
        self.generation += 1;
        self.by_handle.clear();
        self.by_key.drain().map(|(_, entry)| entry).collect()
    }
}

/// Releases a pending key when the subscribe call finishes or is cancelled.
struct PendingGuard<'a> {
    table: &'a RwLock<EntryTable>,
    key: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.write().pending.remove(&self.key);
    }
}

/// Registry of live subscriptions for one connection.
///
/// All methods take `&self`. Table and value locks are only held for map
/// lookups and updates, never across a driver call, so events keep flowing
/// while a subscribe or unsubscribe is waiting on the network. The one
/// exception is the per-key publish lock, which only other publishes wait on.
///
/// # Examples
///
/// ```ignore
/// let registry = client.registry();
/// registry
///     .subscribe("sensor/temp", SubscribeOptions::default(), Some(callback(|k, v| {
///         println!("{k} -> {v}");
///     })))
///     .await?;
///
/// // later, from the driver's I/O task
/// registry.on_driver_event(EventTarget::Key("sensor/temp"), RawValue::from("21.5"), None);
/// ```
pub struct SubscriptionRegistry<D: Driver> {
    driver: Arc<D>,
    state: watch::Receiver<ConnectionState>,
    config: RegistryConfig,
    client_id: String,
    table: RwLock<EntryTable>,
}

impl<D: Driver> SubscriptionRegistry<D> {
    /// Creates an empty registry bound to a driver and a connection state.
    pub fn new(
        driver: Arc<D>,
        state: watch::Receiver<ConnectionState>,
        config: RegistryConfig,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            state,
            config,
            client_id: client_id.into(),
            table: RwLock::new(EntryTable::default()),
        }
    }

    /// Returns the correlation id used in logs.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns true if the connection is currently `Connected`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    fn ensure_connected(&self, operation: &'static str) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            tracing::error!(
                client_id = %self.client_id,
                operation,
                "Rejected, client is not connected"
            );
            Err(Error::NotConnected)
        }
    }

    // ========================================================================
    // Subscribe / unsubscribe
    // ========================================================================

    /// Subscribes to `key`.
    ///
    /// Returns `Ok(true)` if a new entry was created, `Ok(false)` if the key
    /// is already subscribed (or a subscribe for it is in flight).
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection is not `Connected`
    /// - [`Error::EmptyKey`] if `key` is empty
    /// - [`Error::Driver`] if the driver refuses; no entry is created
    pub async fn subscribe(
        &self,
        key: impl Into<String>,
        options: SubscribeOptions,
        callback: Option<ValueCallback>,
    ) -> Result<bool> {
        let key = key.into();
        self.ensure_connected("subscribe")?;
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        self.subscribe_seeded(key, options, callback, String::new())
            .await
    }

    async fn subscribe_seeded(
        &self,
        key: String,
        options: SubscribeOptions,
        callback: Option<ValueCallback>,
        seed: String,
    ) -> Result<bool> {
        let (_pending, generation) = {
            let mut table = self.table.write();
            if table.by_key.contains_key(&key) || !table.pending.insert(key.clone()) {
                drop(table);
                tracing::info!(
                    client_id = %self.client_id,
                    key = %key,
                    "Key already subscribed"
                );
                return Ok(false);
            }
            let guard = PendingGuard {
                table: &self.table,
                key: key.clone(),
            };
            (guard, table.generation)
        };

        let handle = match self.driver.subscribe(&key, &options).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    client_id = %self.client_id,
                    key = %key,
                    error = %e,
                    "Driver refused subscription"
                );
                return Err(e.into());
            }
        };

        let format = options.format;
        let entry = Arc::new(SubscriptionEntry::new(
            key.clone(),
            handle,
            options,
            callback,
            seed,
        ));

        // The session may have been torn down (and maybe reopened) while
        // the driver was busy; the handle then belongs to a dead session.
        let inserted = {
            let mut table = self.table.write();
            if table.generation == generation && self.is_connected() {
                table.by_handle.insert(handle, Arc::clone(&entry));
                table.by_key.insert(key.clone(), entry);
                true
            } else {
                false
            }
        };
        if !inserted {
            tracing::warn!(
                client_id = %self.client_id,
                key = %key,
                %handle,
                "Connection closed during subscribe, releasing handle"
            );
            if let Err(e) = self.driver.unsubscribe(handle).await {
                tracing::debug!(error = %e, %handle, "Release after teardown failed");
            }
            return Err(Error::NotConnected);
        }

        tracing::info!(
            client_id = %self.client_id,
            key = %key,
            %handle,
            format = %format,
            "Subscribed"
        );
        Ok(true)
    }

    /// Unsubscribes from `key`.
    ///
    /// Returns `true` on success, including when `key` was not subscribed.
    /// Returns `false` if the driver failed to release the handle; the entry
    /// is removed either way.
    pub async fn unsubscribe(&self, key: &str) -> bool {
        let entry = {
            let mut table = self.table.write();
            let entry = table.by_key.remove(key);
            if let Some(entry) = &entry {
                table.by_handle.remove(&entry.handle());
            }
            entry
        };

        let Some(entry) = entry else {
            tracing::debug!(client_id = %self.client_id, key = %key, "Key not subscribed, nothing to do");
            return true;
        };
        entry.mark_removed();

        match self.driver.unsubscribe(entry.handle()).await {
            Ok(()) => {
                tracing::info!(client_id = %self.client_id, key = %key, "Unsubscribed");
                true
            }
            Err(e) => {
                tracing::warn!(
                    client_id = %self.client_id,
                    key = %key,
                    handle = %entry.handle(),
                    error = %e,
                    "Driver failed to release subscription"
                );
                false
            }
        }
    }

    /// Releases every subscription. Used when the connection closes.
    ///
    /// Returns the number of entries removed. Driver failures are logged
    /// and do not stop the teardown.
    pub async fn teardown_all(&self) -> usize {
        let entries = self.table.write().drain();
        for entry in &entries {
            entry.mark_removed();
        }

        let mut failed = 0_usize;
        for entry in &entries {
            if let Err(e) = self.driver.unsubscribe(entry.handle()).await {
                failed += 1;
                tracing::warn!(
                    client_id = %self.client_id,
                    key = %entry.key(),
                    error = %e,
                    "Driver failed to release subscription"
                );
            }
        }

        tracing::info!(
            client_id = %self.client_id,
            removed = entries.len(),
            failed,
            "All subscriptions released"
        );
        entries.len()
    }

    /// Drops every entry without calling the driver. Used when the session
    /// is already gone and its handles died with it.
    ///
    /// Returns the number of entries removed.
    pub fn discard_all(&self) -> usize {
        let entries = self.table.write().drain();
        for entry in &entries {
            entry.mark_removed();
        }
        tracing::info!(
            client_id = %self.client_id,
            removed = entries.len(),
            "Subscriptions discarded with the session"
        );
        entries.len()
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    /// Handles one change pushed by the driver.
    ///
    /// Resolves the entry, formats the raw value with the entry's hint, and
    /// if it differs from the stored value stores it and invokes the
    /// callback. Returns `true` if the value was accepted.
    ///
    /// Unknown targets are discarded: they are late events for entries that
    /// were already removed.
    pub fn on_driver_event(
        &self,
        target: EventTarget<'_>,
        raw: RawValue,
        timestamp: Option<DateTime<Utc>>,
    ) -> bool {
        let entry = {
            let table = self.table.read();
            match target {
                EventTarget::Handle(handle) => table.by_handle.get(&handle).cloned(),
                EventTarget::Key(key) => table.by_key.get(key).cloned(),
            }
        };
        let Some(entry) = entry else {
            tracing::trace!(client_id = %self.client_id, source = %target, "No subscription for event, discarding");
            return false;
        };

        let value = format_value(&raw, &entry.options().format);
        let at = timestamp.unwrap_or_else(Utc::now);
        match entry.apply(value, at, &self.client_id) {
            Applied::Accepted => {
                tracing::debug!(client_id = %self.client_id, key = %entry.key(), "Value changed");
                true
            }
            Applied::Unchanged => {
                tracing::trace!(client_id = %self.client_id, key = %entry.key(), "Value unchanged, skipping");
                false
            }
            Applied::Removed => {
                tracing::trace!(client_id = %self.client_id, key = %entry.key(), "Entry removed, discarding event");
                false
            }
        }
    }

    // ========================================================================
    // Publish / read
    // ========================================================================

    /// Publishes `value` on a subscribed `key`.
    ///
    /// Returns `Ok(false)` if the value equals the stored one and the policy
    /// is [`PublishPolicy::SkipUnchanged`]. On a successful send the stored
    /// value is updated and the local callback fires if it changed.
    ///
    /// Publishes on one key are serialized, so concurrent identical values
    /// reach the transport once.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection is not `Connected`
    /// - [`Error::EmptyKey`] if `key` is empty
    /// - [`Error::NotSubscribed`] if `key` has no entry
    /// - [`Error::Driver`] if the send fails; the stored value is unchanged
    pub async fn publish(&self, key: &str, value: impl Into<String>) -> Result<bool> {
        self.ensure_connected("publish")?;
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let value = value.into();

        let entry = self.table.read().by_key.get(key).cloned();
        let Some(entry) = entry else {
            tracing::error!(client_id = %self.client_id, key = %key, "Publish to a key that is not subscribed");
            return Err(Error::NotSubscribed(key.to_string()));
        };

        let _write = entry.lock_publish().await;
        if self.config.publish_dedup == PublishPolicy::SkipUnchanged && entry.last_value() == value {
            tracing::debug!(client_id = %self.client_id, key = %key, "Value unchanged, not publishing");
            return Ok(false);
        }

        if let Err(e) = self.driver.publish(key, &value).await {
            tracing::error!(client_id = %self.client_id, key = %key, error = %e, "Publish failed");
            return Err(e.into());
        }

        tracing::debug!(client_id = %self.client_id, key = %key, value = %value, "Published");
        entry.apply(value, Utc::now(), &self.client_id);
        Ok(true)
    }

    /// Reads the current value of `key` once, formatted with `hint`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection is not `Connected`
    /// - [`Error::EmptyKey`] if `key` is empty
    /// - [`Error::Driver`] if the read fails
    pub async fn read(&self, key: &str, hint: &FormatHint) -> Result<String> {
        self.ensure_connected("read")?;
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        match self.driver.read(key, hint).await {
            Ok(raw) => Ok(format_value(&raw, hint)),
            Err(e) => {
                tracing::error!(client_id = %self.client_id, key = %key, error = %e, "Read failed");
                Err(e.into())
            }
        }
    }

    /// Reads `key` then subscribes to it.
    ///
    /// The read value seeds the new entry, so a first push carrying the same
    /// value does not fire the callback. Returns the value and whether a new
    /// entry was created.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read) and [`subscribe`](Self::subscribe).
    pub async fn read_and_subscribe(
        &self,
        key: impl Into<String>,
        options: SubscribeOptions,
        callback: Option<ValueCallback>,
    ) -> Result<(String, bool)> {
        let key = key.into();
        let value = self.read(&key, &options.format).await?;
        let created = self
            .subscribe_seeded(key, options, callback, value.clone())
            .await?;
        Ok((value, created))
    }

    // ========================================================================
    // Value logs
    // ========================================================================

    /// Starts logging changes of `key` to `sink`, recording the current
    /// value right away.
    ///
    /// Returns `false` if `key` is not subscribed or already logging.
    pub fn enable_value_log(&self, key: &str, sink: Arc<dyn ValueSink>) -> bool {
        let Some(entry) = self.entry(key) else {
            return false;
        };
        let Some((current, at)) = entry.attach_sink(Arc::clone(&sink)) else {
            return false;
        };
        if let Err(e) = sink.record(key, &current, at) {
            tracing::warn!(client_id = %self.client_id, key = %key, error = %e, "Failed to record value");
        }
        tracing::info!(client_id = %self.client_id, key = %key, "Value log enabled");
        true
    }

    /// Stops logging changes of `key`. Returns `true` if a log was attached.
    pub fn disable_value_log(&self, key: &str) -> bool {
        let detached = self.entry(key).is_some_and(|entry| entry.detach_sink());
        if detached {
            tracing::info!(client_id = %self.client_id, key = %key, "Value log disabled");
        }
        detached
    }

    /// Flips logging for `key`. Returns the new state, or `None` if `key`
    /// is not subscribed.
    pub fn toggle_value_log(&self, key: &str, sink: Arc<dyn ValueSink>) -> Option<bool> {
        let entry = self.entry(key)?;
        if entry.has_sink() {
            self.disable_value_log(key);
            Some(false)
        } else {
            Some(self.enable_value_log(key, sink))
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn entry(&self, key: &str) -> Option<Arc<SubscriptionEntry>> {
        self.table.read().by_key.get(key).cloned()
    }

    /// Returns true if `key` has an entry.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.table.read().by_key.contains_key(key)
    }

    /// Returns the last accepted value of `key`.
    #[must_use]
    pub fn last_value(&self, key: &str) -> Option<String> {
        self.entry(key).map(|entry| entry.last_value())
    }

    /// Returns a snapshot of the entry for `key`.
    #[must_use]
    pub fn snapshot(&self, key: &str) -> Option<SubscriptionSnapshot> {
        self.entry(key).map(|entry| entry.snapshot())
    }

    /// Returns snapshots of every entry, sorted by key.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SubscriptionSnapshot> {
        let mut snapshots: Vec<_> = self
            .table
            .read()
            .by_key
            .values()
            .map(|entry| entry.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    /// Returns every subscribed key, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.table.read().by_key.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().by_key.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().by_key.is_empty()
    }
}

impl<D: Driver> ChangeSink for SubscriptionRegistry<D> {
    fn on_change(&self, target: EventTarget<'_>, raw: RawValue, timestamp: Option<DateTime<Utc>>) {
        self.on_driver_event(target, raw, timestamp);
    }
}

impl<D: Driver> std::fmt::Debug for SubscriptionRegistry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("client_id", &self.client_id)
            .field("entries", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::MockDriver;
    use crate::subscription::callback::callback;
    use crate::subscription::sink::MemorySink;
    use crate::types::DataType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Harness {
        registry: Arc<SubscriptionRegistry<MockDriver>>,
        driver: Arc<MockDriver>,
        state: watch::Sender<ConnectionState>,
    }

    async fn harness(config: RegistryConfig) -> Harness {
        let driver = Arc::new(MockDriver::new());
        let (state, rx) = watch::channel(ConnectionState::Connected);
        let registry = Arc::new(SubscriptionRegistry::new(
            Arc::clone(&driver),
            rx,
            config,
            "test-client",
        ));
        let sink: Arc<dyn ChangeSink> = registry.clone();
        driver.connect(Arc::downgrade(&sink)).await.unwrap();
        Harness {
            registry,
            driver,
            state,
        }
    }

    fn counting_callback() -> (ValueCallback, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let cb = callback(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        (cb, calls)
    }

    fn recording_callback() -> (ValueCallback, Arc<parking_lot::Mutex<Vec<String>>>) {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let cb = callback(move |_, v| seen_clone.lock().push(v.to_string()));
        (cb, seen)
    }

    // ========================================================================
    // Subscribe
    // ========================================================================

    #[tokio::test]
    async fn subscribe_creates_entry() {
        let h = harness(RegistryConfig::default()).await;
        let created = h
            .registry
            .subscribe("sensor/temp", SubscribeOptions::default(), None)
            .await
            .unwrap();

        assert!(created);
        assert!(h.registry.contains("sensor/temp"));
        assert_eq!(h.registry.last_value("sensor/temp").as_deref(), Some(""));
        assert_eq!(h.driver.active_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_subscribe_returns_false() {
        let h = harness(RegistryConfig::default()).await;
        let opts = SubscribeOptions::default();

        assert!(h.registry.subscribe("a", opts.clone(), None).await.unwrap());
        assert!(!h.registry.subscribe("a", opts, None).await.unwrap());
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.driver.subscribe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_subscribe_creates_one_entry() {
        let h = harness(RegistryConfig::default()).await;
        h.driver.set_subscribe_delay(Duration::from_millis(20));

        let (a, b) = tokio::join!(
            h.registry.subscribe("k", SubscribeOptions::default(), None),
            h.registry.subscribe("k", SubscribeOptions::default(), None),
        );

        let created = [a.unwrap(), b.unwrap()];
        assert_eq!(created.iter().filter(|c| **c).count(), 1);
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.driver.subscribe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribe_requires_connection() {
        let h = harness(RegistryConfig::default()).await;
        h.state.send_replace(ConnectionState::Disconnected);

        let err = h
            .registry
            .subscribe("k", SubscribeOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn subscribe_rejects_empty_key() {
        let h = harness(RegistryConfig::default()).await;
        let err = h
            .registry
            .subscribe("", SubscribeOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyKey));
    }

    #[tokio::test]
    async fn driver_refusal_leaves_no_entry() {
        let h = harness(RegistryConfig::default()).await;
        h.driver.fail_subscribe.store(true, Ordering::SeqCst);

        let err = h
            .registry
            .subscribe("k", SubscribeOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
        assert!(h.registry.is_empty());

        // pending marker released, retry works
        h.driver.fail_subscribe.store(false, Ordering::SeqCst);
        assert!(h.registry.subscribe("k", SubscribeOptions::default(), None).await.unwrap());
    }

    #[tokio::test]
    async fn teardown_during_subscribe_releases_handle() {
        let h = harness(RegistryConfig::default()).await;
        h.driver.set_subscribe_delay(Duration::from_millis(30));

        let registry = Arc::clone(&h.registry);
        let task = tokio::spawn(async move {
            registry.subscribe("k", SubscribeOptions::default(), None).await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        h.state.send_replace(ConnectionState::Disconnecting);

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(h.registry.is_empty());
        assert_eq!(h.driver.active_count(), 0);
    }

    #[tokio::test]
    async fn teardown_and_reconnect_during_subscribe_releases_handle() {
        let h = harness(RegistryConfig::default()).await;
        h.driver.set_subscribe_delay(Duration::from_millis(50));

        let (result, ()) = tokio::join!(
            h.registry.subscribe("k", SubscribeOptions::default(), None),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                h.state.send_replace(ConnectionState::Disconnecting);
                h.registry.teardown_all().await;
                h.state.send_replace(ConnectionState::Disconnected);
                h.state.send_replace(ConnectionState::Connecting);
                h.state.send_replace(ConnectionState::Connected);
            }
        );

        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(!h.registry.contains("k"));
        assert_eq!(h.driver.active_count(), 0);
        assert_eq!(h.driver.unsubscribe_calls.load(Ordering::SeqCst), 1);

        // the next subscribe belongs to the new session
        h.driver.set_subscribe_delay(Duration::ZERO);
        assert!(h.registry.subscribe("k", SubscribeOptions::default(), None).await.unwrap());
    }

    // ========================================================================
    // Events
    // ========================================================================

    #[tokio::test]
    async fn events_by_key_are_deduplicated() {
        let h = harness(RegistryConfig::default()).await;
        let (cb, seen) = recording_callback();
        h.registry
            .subscribe("sensor/temp", SubscribeOptions::default(), Some(cb))
            .await
            .unwrap();

        h.driver.push_key("sensor/temp", "21.5");
        h.driver.push_key("sensor/temp", "21.5");
        h.driver.push_key("sensor/temp", "22.0");

        assert_eq!(seen.lock().as_slice(), ["21.5", "22.0"]);
        assert_eq!(h.registry.last_value("sensor/temp").as_deref(), Some("22.0"));
    }

    #[tokio::test]
    async fn unchanged_event_keeps_timestamp() {
        let h = harness(RegistryConfig::default()).await;
        h.registry
            .subscribe("MAIN.nSpeed", SubscribeOptions::typed("UINT", 0), None)
            .await
            .unwrap();
        let handle = h.driver.handle_for("MAIN.nSpeed").unwrap();
        let first = DateTime::from_timestamp(1_714_127_400, 0).unwrap();
        let later = DateTime::from_timestamp(1_714_127_460, 0).unwrap();

        h.driver.push_handle(handle, 1500_u16, first);
        let before = h.registry.snapshot("MAIN.nSpeed").unwrap();
        h.driver.push_handle(handle, 1500_u16, later);
        let after = h.registry.snapshot("MAIN.nSpeed").unwrap();

        assert_eq!(before.updated_at, first);
        assert_eq!(after.updated_at, first);
        assert_eq!(after.last_value, "1500");
    }

    #[tokio::test]
    async fn events_by_handle_use_format_hint() {
        let h = harness(RegistryConfig::default()).await;
        let (cb, seen) = recording_callback();
        h.registry
            .subscribe("MAIN.tCycle", SubscribeOptions::typed("TIME", 0), Some(cb))
            .await
            .unwrap();
        let handle = h.driver.handle_for("MAIN.tCycle").unwrap();
        let at = DateTime::from_timestamp(1_714_127_400, 0).unwrap();

        h.driver.push_handle(handle, 61_234_u32, at);

        assert_eq!(seen.lock().as_slice(), ["T#1M 1S 234MS"]);
        let snap = h.registry.snapshot("MAIN.tCycle").unwrap();
        assert_eq!(snap.updated_at, at);
        assert_eq!(snap.options.format.data_type, DataType::Time);
    }

    #[tokio::test]
    async fn first_empty_event_is_deduplicated() {
        let h = harness(RegistryConfig::default()).await;
        let (cb, calls) = counting_callback();
        h.registry
            .subscribe("k", SubscribeOptions::default(), Some(cb))
            .await
            .unwrap();

        h.driver.push_key("k", "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_target_is_discarded() {
        let h = harness(RegistryConfig::default()).await;
        assert!(!h.registry.on_driver_event(EventTarget::Key("nope"), RawValue::from("1"), None));
        assert!(!h.registry.on_driver_event(
            EventTarget::Handle(DriverHandle::new(99)),
            RawValue::from("1"),
            None
        ));
    }

    #[tokio::test]
    async fn callback_panic_does_not_stop_dispatch() {
        let h = harness(RegistryConfig::default()).await;
        let (cb, calls) = counting_callback();
        h.registry
            .subscribe("bad", SubscribeOptions::default(), Some(callback(|_, _| panic!("user bug"))))
            .await
            .unwrap();
        h.registry
            .subscribe("good", SubscribeOptions::default(), Some(cb))
            .await
            .unwrap();

        h.driver.push_key("bad", "1");
        h.driver.push_key("good", "1");
        h.driver.push_key("bad", "2");

        assert_eq!(h.registry.last_value("bad").as_deref(), Some("2"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn callback_panic_still_moves_timestamp() {
        let h = harness(RegistryConfig::default()).await;
        h.registry
            .subscribe("bad", SubscribeOptions::default(), Some(callback(|_, _| panic!("user bug"))))
            .await
            .unwrap();
        let handle = h.driver.handle_for("bad").unwrap();
        let before = h.registry.snapshot("bad").unwrap();
        let at = DateTime::from_timestamp(1_714_127_400, 0).unwrap();

        h.driver.push_handle(handle, "1", at);
        let after = h.registry.snapshot("bad").unwrap();

        assert_ne!(before.updated_at, after.updated_at);
        assert_eq!(after.updated_at, at);
        assert_eq!(after.last_value, "1");
    }

    // ========================================================================
    // Unsubscribe / teardown
    // ========================================================================

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let h = harness(RegistryConfig::default()).await;
        h.registry
            .subscribe("k", SubscribeOptions::default(), None)
            .await
            .unwrap();

        assert!(h.registry.unsubscribe("k").await);
        assert!(h.registry.unsubscribe("k").await);
        assert!(h.registry.unsubscribe("never").await);
        assert_eq!(h.driver.unsubscribe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_failure_still_removes_entry() {
        let h = harness(RegistryConfig::default()).await;
        h.registry
            .subscribe("k", SubscribeOptions::default(), None)
            .await
            .unwrap();
        h.driver.fail_unsubscribe.store(true, Ordering::SeqCst);

        assert!(!h.registry.unsubscribe("k").await);
        assert!(!h.registry.contains("k"));
    }

    #[tokio::test]
    async fn events_after_unsubscribe_are_dropped() {
        let h = harness(RegistryConfig::default()).await;
        let (cb, calls) = counting_callback();
        h.registry
            .subscribe("k", SubscribeOptions::default(), Some(cb))
            .await
            .unwrap();
        let handle = h.driver.handle_for("k").unwrap();
        h.registry.unsubscribe("k").await;

        h.driver.push_key("k", "1");
        h.registry
            .on_driver_event(EventTarget::Handle(handle), RawValue::from("2"), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn teardown_releases_everything() {
        let h = harness(RegistryConfig::default()).await;
        for key in ["a", "b", "c"] {
            h.registry
                .subscribe(key, SubscribeOptions::default(), None)
                .await
                .unwrap();
        }
        h.driver.fail_unsubscribe.store(true, Ordering::SeqCst);

        assert_eq!(h.registry.teardown_all().await, 3);
        assert!(h.registry.is_empty());
        assert_eq!(h.driver.unsubscribe_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn discard_drops_entries_without_driver_calls() {
        let h = harness(RegistryConfig::default()).await;
        let (cb, calls) = counting_callback();
        h.registry
            .subscribe("k", SubscribeOptions::default(), Some(cb))
            .await
            .unwrap();

        assert_eq!(h.registry.discard_all(), 1);
        assert!(h.registry.is_empty());
        assert_eq!(h.driver.unsubscribe_calls.load(Ordering::SeqCst), 0);

        h.driver.push_key("k", "1");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // ========================================================================
    // Publish / read
    // ========================================================================

    #[tokio::test]
    async fn publish_requires_subscription() {
        let h = harness(RegistryConfig::default()).await;
        let err = h.registry.publish("cmd/light", "ON").await.unwrap_err();
        assert!(matches!(err, Error::NotSubscribed(ref k) if k == "cmd/light"));
        assert!(h.driver.published().is_empty());
    }

    #[tokio::test]
    async fn publish_updates_value_and_fires_callback() {
        let h = harness(RegistryConfig::default()).await;
        let (cb, seen) = recording_callback();
        h.registry
            .subscribe("cmd/light", SubscribeOptions::default(), Some(cb))
            .await
            .unwrap();

        assert!(h.registry.publish("cmd/light", "ON").await.unwrap());
        assert!(!h.registry.publish("cmd/light", "ON").await.unwrap());

        assert_eq!(h.driver.published(), [("cmd/light".to_string(), "ON".to_string())]);
        assert_eq!(seen.lock().as_slice(), ["ON"]);

        // broker echo of our own publish is deduplicated
        h.driver.push_key("cmd/light", "ON");
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn publish_always_policy_resends() {
        let h = harness(RegistryConfig::default().with_publish_policy(PublishPolicy::Always)).await;
        let (cb, calls) = counting_callback();
        h.registry
            .subscribe("cmd/light", SubscribeOptions::default(), Some(cb))
            .await
            .unwrap();

        assert!(h.registry.publish("cmd/light", "ON").await.unwrap());
        assert!(h.registry.publish("cmd/light", "ON").await.unwrap());
        assert_eq!(h.driver.published().len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_identical_publishes_send_once() {
        let h = harness(RegistryConfig::default()).await;
        let (cb, calls) = counting_callback();
        h.registry
            .subscribe("cmd/light", SubscribeOptions::default(), Some(cb))
            .await
            .unwrap();
        h.driver.set_publish_delay(Duration::from_millis(20));

        let (a, b) = tokio::join!(
            h.registry.publish("cmd/light", "ON"),
            h.registry.publish("cmd/light", "ON"),
        );

        let sent = [a.unwrap(), b.unwrap()];
        assert_eq!(sent.iter().filter(|s| **s).count(), 1);
        assert_eq!(h.driver.published().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_failure_keeps_value() {
        let h = harness(RegistryConfig::default()).await;
        h.registry
            .subscribe("k", SubscribeOptions::default(), None)
            .await
            .unwrap();
        h.driver.fail_publish.store(true, Ordering::SeqCst);

        assert!(matches!(h.registry.publish("k", "x").await, Err(Error::Driver(_))));
        assert_eq!(h.registry.last_value("k").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn publish_requires_connection() {
        let h = harness(RegistryConfig::default()).await;
        h.state.send_replace(ConnectionState::Disconnected);
        assert!(matches!(h.registry.publish("k", "x").await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn read_formats_value() {
        let h = harness(RegistryConfig::default()).await;
        h.driver.set_read_value("MAIN.wStatus", 5_u8);

        let value = h
            .registry
            .read("MAIN.wStatus", &FormatHint::new(DataType::Byte, 0))
            .await
            .unwrap();
        assert_eq!(value, "(5) Hex: 05 | Dec: 0000_0101");
    }

    #[tokio::test]
    async fn read_and_subscribe_seeds_value() {
        let h = harness(RegistryConfig::default()).await;
        h.driver.set_read_value("MAIN.nCount", 7_u16);
        let (cb, seen) = recording_callback();

        let (value, created) = h
            .registry
            .read_and_subscribe("MAIN.nCount", SubscribeOptions::typed("UINT", 0), Some(cb))
            .await
            .unwrap();
        assert_eq!(value, "7");
        assert!(created);

        let handle = h.driver.handle_for("MAIN.nCount").unwrap();
        h.driver.push_handle(handle, 7_u16, Utc::now());
        h.driver.push_handle(handle, 8_u16, Utc::now());
        assert_eq!(seen.lock().as_slice(), ["8"]);
    }

    #[tokio::test]
    async fn read_failure_does_not_subscribe() {
        let h = harness(RegistryConfig::default()).await;
        let result = h
            .registry
            .read_and_subscribe("missing", SubscribeOptions::default(), None)
            .await;
        assert!(matches!(result, Err(Error::Driver(_))));
        assert!(h.registry.is_empty());
    }

    // ========================================================================
    // Value logs
    // ========================================================================

    #[tokio::test]
    async fn value_log_records_current_then_changes() {
        let h = harness(RegistryConfig::default()).await;
        h.registry
            .subscribe("k", SubscribeOptions::default(), None)
            .await
            .unwrap();
        h.driver.push_key("k", "1");

        let sink = Arc::new(MemorySink::new());
        assert!(h.registry.enable_value_log("k", sink.clone()));
        assert!(!h.registry.enable_value_log("k", sink.clone()));
        h.driver.push_key("k", "2");
        h.driver.push_key("k", "2");

        assert_eq!(sink.values_for("k"), ["1", "2"]);
        assert!(h.registry.snapshot("k").unwrap().logging);

        assert!(h.registry.disable_value_log("k"));
        h.driver.push_key("k", "3");
        assert_eq!(sink.values_for("k").len(), 2);
    }

    #[tokio::test]
    async fn toggle_value_log() {
        let h = harness(RegistryConfig::default()).await;
        let sink = Arc::new(MemorySink::new());
        assert_eq!(h.registry.toggle_value_log("k", sink.clone()), None);

        h.registry
            .subscribe("k", SubscribeOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(h.registry.toggle_value_log("k", sink.clone()), Some(true));
        assert_eq!(h.registry.toggle_value_log("k", sink.clone()), Some(false));
        assert!(!h.registry.disable_value_log("k"));
    }

    #[tokio::test]
    async fn keys_and_snapshots_are_sorted() {
        let h = harness(RegistryConfig::default()).await;
        for key in ["b", "a", "c"] {
            h.registry
                .subscribe(key, SubscribeOptions::default(), None)
                .await
                .unwrap();
        }
        assert_eq!(h.registry.keys(), ["a", "b", "c"]);
        let snaps: Vec<_> = h.registry.snapshots().into_iter().map(|s| s.key).collect();
        assert_eq!(snaps, ["a", "b", "c"]);
    }
}
