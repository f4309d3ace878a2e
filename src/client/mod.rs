// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection owner.
//!
//! A [`Client`] ties one [`Driver`] session to one [`SubscriptionRegistry`].
//! It owns the connection state, publishes [`ClientEvent`]s on changes and
//! releases every subscription when the connection is closed, whether by
//! [`Client::disconnect`] or by the remote end.

mod session;
mod state;

pub use state::ConnectionState;

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use uuid::Uuid;

use session::{SessionLink, advance};

use crate::error::{DriverError, Result};
use crate::event::{ClientEvent, EventBus};
use crate::protocol::{ChangeSink, Driver, SubscribeOptions};
use crate::subscription::{RegistryConfig, SubscriptionRegistry, ValueCallback};
use crate::types::FormatHint;

/// A connection to one remote endpoint with its subscriptions.
///
/// # Examples
///
/// ```no_run
/// use tagwatch::Client;
/// use tagwatch::protocol::{MqttDriver, MqttDriverConfig, SubscribeOptions};
///
/// # async fn example() -> tagwatch::Result<()> {
/// let config = MqttDriverConfig::builder().host("broker.local").build();
/// let client = Client::new(MqttDriver::new(config));
///
/// client.connect().await?;
/// client.subscribe("sensor/temp", SubscribeOptions::passthrough(), None).await?;
/// client.publish("sensor/temp", "21.5").await?;
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client<D: Driver> {
    client_id: String,
    driver: Arc<D>,
    registry: Arc<SubscriptionRegistry<D>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    events: EventBus,
    /// Serializes connect, disconnect and connection-loss handling.
    transition: Arc<Mutex<()>>,
    /// Sink of the current driver session. Dropping it silences the
    /// session's late callbacks.
    link: parking_lot::Mutex<Option<Arc<SessionLink<D>>>>,
}

impl<D: Driver> Client<D> {
    /// Creates a disconnected client with the default registry config.
    pub fn new(driver: D) -> Self {
        Self::with_config(driver, RegistryConfig::default())
    }

    /// Creates a disconnected client.
    pub fn with_config(driver: D, config: RegistryConfig) -> Self {
        let client_id = Uuid::new_v4().to_string();
        let driver = Arc::new(driver);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let registry = Arc::new(SubscriptionRegistry::new(
            Arc::clone(&driver),
            state_rx,
            config,
            client_id.clone(),
        ));

        Self {
            client_id,
            driver,
            registry,
            state_tx: Arc::new(state_tx),
            events: EventBus::new(),
            transition: Arc::new(Mutex::new(())),
            link: parking_lot::Mutex::new(None),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Opens the driver session.
    ///
    /// Does nothing if already connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Driver`](crate::Error::Driver) if the driver cannot
    /// connect; the client is back to `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        let _transition = self.transition.lock().await;

        if self.state().is_connected() {
            tracing::warn!(client_id = %self.client_id, "Already connected");
            return Ok(());
        }
        self.set_state(ConnectionState::Connecting)?;
        tracing::info!(client_id = %self.client_id, "Connecting");

        let link = Arc::new(SessionLink::new(
            self.client_id.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.state_tx),
            Arc::clone(&self.transition),
            self.events.clone(),
        ));
        *self.link.lock() = Some(Arc::clone(&link));
        let sink: Arc<dyn ChangeSink> = link.clone();

        let mut result = self.driver.connect(Arc::downgrade(&sink)).await;
        if result.is_ok() && link.is_lost() {
            let _ = self.driver.disconnect().await;
            result = Err(DriverError::ConnectionFailed(
                "session lost while connecting".to_string(),
            ));
        }

        match result {
            Ok(()) => {
                self.set_state(ConnectionState::Connected)?;
                tracing::info!(client_id = %self.client_id, "Connected");
                self.events.publish(ClientEvent::Connected);
                Ok(())
            }
            Err(e) => {
                self.link.lock().take();
                self.set_state(ConnectionState::Disconnected)?;
                tracing::error!(client_id = %self.client_id, error = %e, "Connection failed");
                self.events
                    .publish(ClientEvent::ConnectionFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Releases every subscription and closes the driver session.
    ///
    /// Does nothing if already disconnected. The client always ends
    /// `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Driver`](crate::Error::Driver) if the driver reports
    /// a failure on close. The failure is also published as
    /// [`ClientEvent::Error`].
    pub async fn disconnect(&self) -> Result<()> {
        let _transition = self.transition.lock().await;

        if self.state() == ConnectionState::Disconnected {
            tracing::debug!(client_id = %self.client_id, "Already disconnected");
            return Ok(());
        }
        self.set_state(ConnectionState::Disconnecting)?;

        let released = self.registry.teardown_all().await;
        let closed = self.driver.disconnect().await;
        self.link.lock().take();
        self.set_state(ConnectionState::Disconnected)?;

        if let Err(e) = closed {
            tracing::error!(client_id = %self.client_id, error = %e, "Driver failed to close session");
            self.events.publish(ClientEvent::Error(e.to_string()));
            self.events.publish(ClientEvent::Disconnected);
            return Err(e.into());
        }

        tracing::info!(client_id = %self.client_id, released, "Disconnected");
        self.events.publish(ClientEvent::Disconnected);
        Ok(())
    }

    /// Closes the session if open, then opens a fresh one.
    ///
    /// Subscriptions do not survive: the registry is empty afterwards.
    ///
    /// # Errors
    ///
    /// Returns the connect error. A failure to close the old session is
    /// logged and published but does not stop the new connect.
    pub async fn reconnect(&self) -> Result<()> {
        if let Err(e) = self.disconnect().await {
            tracing::warn!(client_id = %self.client_id, error = %e, "Reconnecting after failed close");
        }
        self.connect().await
    }

    fn set_state(&self, next: ConnectionState) -> Result<()> {
        advance(&self.state_tx, &self.client_id, next)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the client id (UUID v4), used as log correlation id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Returns true if the client is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns a receiver that observes state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Returns the connection event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns the subscription registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry<D>> {
        &self.registry
    }

    /// Returns the driver.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    // ========================================================================
    // Registry shortcuts
    // ========================================================================

    /// See [`SubscriptionRegistry::subscribe`].
    ///
    /// # Errors
    ///
    /// Same as [`SubscriptionRegistry::subscribe`].
    pub async fn subscribe(
        &self,
        key: impl Into<String>,
        options: SubscribeOptions,
        callback: Option<ValueCallback>,
    ) -> Result<bool> {
        self.registry.subscribe(key, options, callback).await
    }

    /// See [`SubscriptionRegistry::unsubscribe`].
    pub async fn unsubscribe(&self, key: &str) -> bool {
        self.registry.unsubscribe(key).await
    }

    /// See [`SubscriptionRegistry::publish`].
    ///
    /// # Errors
    ///
    /// Same as [`SubscriptionRegistry::publish`].
    pub async fn publish(&self, key: &str, value: impl Into<String>) -> Result<bool> {
        self.registry.publish(key, value).await
    }

    /// See [`SubscriptionRegistry::read`].
    ///
    /// # Errors
    ///
    /// Same as [`SubscriptionRegistry::read`].
    pub async fn read(&self, key: &str, hint: &FormatHint) -> Result<String> {
        self.registry.read(key, hint).await
    }

    /// See [`SubscriptionRegistry::read_and_subscribe`].
    ///
    /// # Errors
    ///
    /// Same as [`SubscriptionRegistry::read_and_subscribe`].
    pub async fn read_and_subscribe(
        &self,
        key: impl Into<String>,
        options: SubscribeOptions,
        callback: Option<ValueCallback>,
    ) -> Result<(String, bool)> {
        self.registry
            .read_and_subscribe(key, options, callback)
            .await
    }
}

impl<D: Driver> std::fmt::Debug for Client<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field("state", &self.state())
            .field("subscriptions", &self.registry.len())
            .finish_non_exhaustive()
    }
}
