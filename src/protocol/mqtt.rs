// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT transport driver.
//!
//! Each subscribed key is an MQTT topic. Incoming publishes are pushed to the
//! registry by topic; handles only exist so that `unsubscribe` knows which
//! topic to release.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//! use tagwatch::Client;
//! use tagwatch::protocol::{MqttDriver, MqttDriverConfig};
//!
//! # async fn example() -> tagwatch::Result<()> {
//! let config = MqttDriverConfig::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("user", "password")
//!     .keep_alive(Duration::from_secs(60))
//!     .build();
//!
//! let client = Client::new(MqttDriver::new(config));
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{ChangeSink, Driver, DriverHandle, EventTarget, SubscribeOptions};
use crate::error::DriverError;
use crate::types::RawValue;

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

const DEFAULT_PORT: u16 = 1883;

/// Configuration for an MQTT driver.
#[derive(Debug, Clone)]
pub struct MqttDriverConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    client_id: Option<String>,
    keep_alive: Duration,
    connection_timeout: Duration,
    qos: QoS,
    clean_session: bool,
}

impl Default for MqttDriverConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            credentials: None,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            qos: QoS::AtLeastOnce,
            clean_session: true,
        }
    }
}

impl MqttDriverConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> MqttDriverConfigBuilder {
        MqttDriverConfigBuilder::default()
    }

    /// Creates a config from a broker URL.
    ///
    /// Accepts `mqtt://host:port`, `tcp://host:port` or a bare `host[:port]`.
    /// The port defaults to 1883.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidAddress`] if the host is empty or the
    /// port is not a number.
    pub fn from_url(url: &str) -> Result<Self, DriverError> {
        let (host, port) = parse_mqtt_url(url)?;
        Ok(Self::builder().host(host).port(port).build())
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns whether authentication is configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Returns the QoS used for subscriptions and publishes.
    #[must_use]
    pub fn qos(&self) -> QoS {
        self.qos
    }
}

/// Builder for [`MqttDriverConfig`].
#[derive(Debug, Default)]
pub struct MqttDriverConfigBuilder {
    config: MqttDriverConfig,
}

impl MqttDriverConfigBuilder {
    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the MQTT client id (default: `tagwatch_<pid>_<n>`).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Sets the QoS (default: at least once).
    #[must_use]
    pub fn qos(mut self, qos: QoS) -> Self {
        self.config.qos = qos;
        self
    }

    /// Sets the clean session flag (default: true).
    #[must_use]
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.config.clean_session = clean;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> MqttDriverConfig {
        self.config
    }
}

struct Session {
    client: AsyncClient,
    task: JoinHandle<()>,
    connected: Arc<AtomicBool>,
}

/// Driver for an MQTT broker, built on `rumqttc`.
///
/// One driver holds one broker session. Handles map to topics.
pub struct MqttDriver {
    config: MqttDriverConfig,
    session: Mutex<Option<Session>>,
    topics: Mutex<HashMap<DriverHandle, String>>,
    next_handle: AtomicU64,
}

impl MqttDriver {
    /// Creates a driver. No connection is made until [`Driver::connect`].
    #[must_use]
    pub fn new(config: MqttDriverConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            topics: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Returns the driver configuration.
    #[must_use]
    pub fn config(&self) -> &MqttDriverConfig {
        &self.config
    }

    /// Returns whether the broker session is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| s.connected.load(Ordering::Acquire))
    }

    /// Returns the number of subscribed topics.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    fn client(&self) -> Result<AsyncClient, DriverError> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(DriverError::NotConnected)
    }

    fn mqtt_options(&self) -> MqttOptions {
        let client_id = self.config.client_id.clone().unwrap_or_else(|| {
            let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("tagwatch_{}_{}", std::process::id(), counter)
        });

        let mut options = MqttOptions::new(client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(self.config.clean_session);
        if let Some((ref username, ref password)) = self.config.credentials {
            options.set_credentials(username, password);
        }
        options
    }
}

impl Driver for MqttDriver {
    async fn connect(&self, sink: Weak<dyn ChangeSink>) -> Result<(), DriverError> {
        if self.config.host.is_empty() {
            return Err(DriverError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }
        {
            let mut session = self.session.lock();
            if session
                .as_ref()
                .is_some_and(|s| s.connected.load(Ordering::Acquire))
            {
                tracing::debug!(host = %self.config.host, "MQTT session already open");
                return Ok(());
            }
            if let Some(dead) = session.take() {
                tracing::debug!(host = %self.config.host, "Replacing lost MQTT session");
                dead.task.abort();
                self.topics.lock().clear();
            }
        }

        let (client, event_loop) = AsyncClient::new(self.mqtt_options(), 10);
        let connected = Arc::new(AtomicBool::new(false));
        let (connack_tx, connack_rx) = oneshot::channel();
        let task = tokio::spawn(handle_events(
            event_loop,
            sink,
            connack_tx,
            Arc::clone(&connected),
        ));

        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                task.abort();
                return Err(DriverError::ConnectionFailed(format!(
                    "MQTT broker {}:{} closed the connection",
                    self.config.host, self.config.port
                )));
            }
            Err(_) => {
                task.abort();
                return Err(DriverError::Timeout(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                ));
            }
        }

        tracing::info!(
            host = %self.config.host,
            port = %self.config.port,
            "Connected to MQTT broker"
        );
        *self.session.lock() = Some(Session {
            client,
            task,
            connected,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DriverError> {
        let Some(session) = self.session.lock().take() else {
            return Ok(());
        };
        self.topics.lock().clear();

        tracing::info!(
            host = %self.config.host,
            port = %self.config.port,
            "Disconnecting from MQTT broker"
        );
        session.connected.store(false, Ordering::Release);
        let result = session.client.disconnect().await;

        // Let the event loop flush the DISCONNECT packet, then stop it
        let mut task = session.task;
        if tokio::time::timeout(self.config.connection_timeout, &mut task)
            .await
            .is_err()
        {
            task.abort();
        }

        result.map_err(DriverError::from)
    }

    async fn subscribe(
        &self,
        key: &str,
        _options: &SubscribeOptions,
    ) -> Result<DriverHandle, DriverError> {
        let client = self.client()?;
        client.subscribe(key, self.config.qos).await?;

        let handle = DriverHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.topics.lock().insert(handle, key.to_string());
        tracing::debug!(topic = %key, %handle, "Subscribed to MQTT topic");
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: DriverHandle) -> Result<(), DriverError> {
        let topic = self
            .topics
            .lock()
            .remove(&handle)
            .ok_or(DriverError::UnknownHandle(handle))?;
        let client = self.client()?;
        client.unsubscribe(&topic).await?;
        tracing::debug!(topic = %topic, %handle, "Unsubscribed from MQTT topic");
        Ok(())
    }

    async fn publish(&self, key: &str, value: &str) -> Result<(), DriverError> {
        let client = self.client()?;
        client
            .publish(key, self.config.qos, false, value.as_bytes().to_vec())
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for MqttDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttDriver")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("connected", &self.is_connected())
            .field("topics", &self.topic_count())
            .finish()
    }
}

/// Parses an MQTT URL into host and port.
fn parse_mqtt_url(url: &str) -> Result<(String, u16), DriverError> {
    let url = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url)
        .trim_end_matches('/');

    let (host, port) = if let Some((h, p)) = url.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| DriverError::InvalidAddress(format!("Invalid port: {p}")))?;
        (h.to_string(), port)
    } else {
        (url.to_string(), DEFAULT_PORT)
    };

    if host.is_empty() {
        return Err(DriverError::InvalidAddress(
            "MQTT broker host is required".to_string(),
        ));
    }
    Ok((host, port))
}

/// Drives the `rumqttc` event loop and forwards publishes to the sink.
///
/// The loop stops on the first error instead of letting `rumqttc`
/// reconnect. An end not caused by [`MqttDriver::disconnect`] is reported
/// to the sink as a lost connection.
async fn handle_events(
    mut event_loop: EventLoop,
    sink: Weak<dyn ChangeSink>,
    connack_tx: oneshot::Sender<()>,
    connected: Arc<AtomicBool>,
) {
    let mut connack_tx = Some(connack_tx);

    let lost = loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                connected.store(true, Ordering::Release);
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(sink) = sink.upgrade() else {
                    tracing::debug!("Change sink dropped, stopping MQTT event loop");
                    break None;
                };
                tracing::trace!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "MQTT message received"
                );
                sink.on_change(
                    EventTarget::Key(&publish.topic),
                    RawValue::from_payload(&publish.payload),
                    Some(Utc::now()),
                );
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                break Some("broker closed the session".to_string());
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT disconnect sent");
                break None;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT event loop error");
                break Some(e.to_string());
            }
        }
    };

    // `disconnect` clears the flag first, so only unrequested ends report
    if connected.swap(false, Ordering::AcqRel)
        && let Some(reason) = lost
        && let Some(sink) = sink.upgrade()
    {
        sink.on_connection_lost(&reason);
    }
}
