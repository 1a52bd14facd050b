// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`Transport`] over a `rumqttc` client.
//!
//! [`MqttTransportBuilder::connect`] opens the session, waits for the
//! broker's `ConnAck`, and leaves a task behind that polls the `rumqttc`
//! event loop. That task reports [`TransportEvent`]s on an unbounded
//! channel, so it never blocks on the bridge.
//!
//! Once the first `ConnAck` has arrived, a lost connection is retried with
//! an exponential backoff: every new `ConnAck` is reported as another
//! [`TransportEvent::Connected`]. The task only ends after
//! [`MqttTransport::disconnect`] or when the event receiver is dropped.
//!
//! # Examples
//!
//! ```no_run
//! use niko_bridge::protocol::MqttTransport;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> niko_bridge::Result<()> {
//! let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//!
//! let transport = MqttTransport::builder()
//!     .host("broker.local")
//!     .credentials("user", "password")
//!     .connect(events_tx)
//!     .await?;
//!
//! while let Some(event) = events_rx.recv().await {
//!     println!("{event:?}");
//! }
//!
//! transport.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, oneshot};

use super::{Transport, TransportEvent};
use crate::error::ProtocolError;

/// MQTT over TLS.
pub const DEFAULT_PORT: u16 = 8883;

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// First delay before reconnecting, doubled after each failed attempt.
const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

/// Pending requests between [`AsyncClient`] and the event loop.
const REQUEST_QUEUE: usize = 64;

/// Distinguishes several sessions opened by the same process.
static SESSION_SEQ: AtomicU32 = AtomicU32::new(0);

/// Connection parameters collected by [`MqttTransportBuilder`].
#[derive(Clone, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
    login: Option<(String, String)>,
    tls: bool,
    keep_alive: Duration,
    connect_timeout: Duration,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.login.as_ref().map(|(user, _)| user))
            .field("tls", &self.tls)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Endpoint {
    fn options(&self) -> MqttOptions {
        let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("niko_bridge_{}_{seq}", std::process::id());

        let mut options = MqttOptions::new(client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some((user, pass)) = &self.login {
            options.set_credentials(user, pass);
        }
        if self.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        options
    }
}

/// A live MQTT session. Clones share the same session.
#[derive(Clone)]
pub struct MqttTransport {
    session: Arc<Session>,
}

struct Session {
    client: AsyncClient,
    endpoint: Endpoint,
    online: AtomicBool,
    closing: AtomicBool,
}

impl MqttTransport {
    /// Starts configuring a session.
    #[must_use]
    pub fn builder() -> MqttTransportBuilder {
        MqttTransportBuilder::default()
    }

    /// Returns whether the broker has acknowledged the session and it has
    /// not been closed since.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.online.load(Ordering::Acquire)
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.session.endpoint.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.session.endpoint.port
    }

    /// Asks the broker to close the session.
    ///
    /// The event task reports [`TransportEvent::Disconnected`] once the
    /// session is gone.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!(host = %self.host(), port = self.port(), "Closing MQTT session");
        self.session.closing.store(true, Ordering::Release);
        self.session.client.disconnect().await?;
        self.session.online.store(false, Ordering::Release);
        Ok(())
    }
}

impl Transport for MqttTransport {
    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<(), ProtocolError>> + Send {
        let client = self.session.client.clone();
        let filter = filter.to_string();
        async move {
            tracing::debug!(filter = %filter, "Subscribing");
            client.subscribe(filter, QoS::AtLeastOnce).await?;
            Ok(())
        }
    }

    fn publish(
        &self,
        topic: String,
        payload: String,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send {
        let client = self.session.client.clone();
        async move {
            tracing::debug!(topic = %topic, payload = %payload, "Publishing");
            client.publish(topic, QoS::AtLeastOnce, false, payload).await?;
            Ok(())
        }
    }
}

impl fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttTransport")
            .field("endpoint", &self.session.endpoint)
            .field("online", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Builder for an [`MqttTransport`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use niko_bridge::protocol::MqttTransport;
/// use tokio::sync::mpsc;
///
/// # async fn example() -> niko_bridge::Result<()> {
/// let (events_tx, _events_rx) = mpsc::unbounded_channel();
/// let transport = MqttTransport::builder()
///     .host("192.168.1.50")
///     .port(1883)
///     .tls(false)
///     .keep_alive(Duration::from_secs(60))
///     .connect_timeout(Duration::from_secs(5))
///     .connect(events_tx)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MqttTransportBuilder {
    endpoint: Endpoint,
}

impl Default for MqttTransportBuilder {
    fn default() -> Self {
        Self {
            endpoint: Endpoint {
                host: String::new(),
                port: DEFAULT_PORT,
                login: None,
                tls: true,
                keep_alive: DEFAULT_KEEP_ALIVE,
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            },
        }
    }
}

impl MqttTransportBuilder {
    /// Broker host name or address. Required.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.endpoint.host = host.into();
        self
    }

    /// Broker port, 8883 unless set.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.endpoint.port = port;
        self
    }

    /// User name and password.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.endpoint.login = Some((user.into(), pass.into()));
        self
    }

    /// TLS with the platform's root certificates, on unless disabled.
    #[must_use]
    pub fn tls(mut self, enabled: bool) -> Self {
        self.endpoint.tls = enabled;
        self
    }

    /// MQTT keep-alive, 30 seconds unless set.
    #[must_use]
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.endpoint.keep_alive = interval;
        self
    }

    /// How long to wait for `ConnAck`, 10 seconds unless set.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.connect_timeout = timeout;
        self
    }

    /// Opens the session and starts reporting to `events`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - no host was given
    /// - the broker refuses or drops the connection before `ConnAck`
    /// - `ConnAck` does not arrive within the connect timeout
    pub async fn connect(
        self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<MqttTransport, ProtocolError> {
        let Self { endpoint } = self;
        if endpoint.host.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let (client, event_loop) = AsyncClient::new(endpoint.options(), REQUEST_QUEUE);
        let transport = MqttTransport {
            session: Arc::new(Session {
                client,
                endpoint,
                online: AtomicBool::new(false),
                closing: AtomicBool::new(false),
            }),
        };

        let (acked_tx, acked_rx) = oneshot::channel();
        tokio::spawn(pump_events(event_loop, transport.clone(), acked_tx, events));

        let wait = transport.session.endpoint.connect_timeout;
        match tokio::time::timeout(wait, acked_rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    host = %transport.host(),
                    port = transport.port(),
                    tls = transport.session.endpoint.tls,
                    "MQTT session established"
                );
                Ok(transport)
            }
            Ok(Err(_)) => Err(ProtocolError::ConnectionFailed(format!(
                "{}:{} closed the connection before acknowledging",
                transport.host(),
                transport.port()
            ))),
            Err(_) => Err(ProtocolError::Timeout(
                u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }
}

/// Doubling reconnect delay, reset by every successful `ConnAck`.
#[derive(Debug)]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next: RECONNECT_MIN,
        }
    }

    fn reset(&mut self) {
        self.next = RECONNECT_MIN;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(RECONNECT_MAX);
        delay
    }
}

/// Polls the `rumqttc` event loop for the lifetime of the session.
///
/// An error before the first `ConnAck` ends the task, which fails
/// [`MqttTransportBuilder::connect`]. Later errors are reported as
/// [`TransportEvent::Disconnected`] and polling resumes after a backoff,
/// which makes `rumqttc` open a new connection.
async fn pump_events(
    mut event_loop: EventLoop,
    transport: MqttTransport,
    acked: oneshot::Sender<()>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let session = &transport.session;
    let mut acked = Some(acked);
    let mut backoff = Backoff::new();

    // Send errors mean the bridge is gone; the closed check below ends the task.
    while !events.is_closed() {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::debug!(code = ?ack.code, "ConnAck received");
                session.online.store(true, Ordering::Release);
                backoff.reset();
                if let Some(acked) = acked.take() {
                    let _ = acked.send(());
                }
                let _ = events.send(TransportEvent::Connected);
            }
            Ok(Event::Incoming(Packet::Publish(message))) => {
                tracing::trace!(
                    topic = %message.topic,
                    bytes = message.payload.len(),
                    "Inbound message"
                );
                let _ = events.send(TransportEvent::Message {
                    topic: message.topic,
                    payload: message.payload.to_vec(),
                });
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                tracing::debug!(pkid = ack.pkid, "SubAck received");
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("Broker closed the session");
            }
            Ok(_) => {}
            Err(e) if session.closing.load(Ordering::Acquire) => {
                tracing::info!(error = %e, "MQTT session closed");
                break;
            }
            Err(e) if acked.is_some() => {
                tracing::info!(error = %e, "MQTT connection failed");
                break;
            }
            Err(e) => {
                if session.online.swap(false, Ordering::AcqRel) {
                    tracing::error!(error = %e, "MQTT connection lost");
                    let _ = events.send(TransportEvent::Disconnected);
                } else {
                    tracing::warn!(error = %e, "MQTT reconnect failed");
                }
                let delay = backoff.next_delay();
                tracing::info!(delay_secs = delay.as_secs(), "Reconnecting to MQTT broker");
                tokio::time::sleep(delay).await;
            }
        }
    }

    if session.online.swap(false, Ordering::AcqRel) || acked.is_some() {
        let _ = events.send(TransportEvent::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let endpoint = MqttTransportBuilder::default().endpoint;
        assert!(endpoint.host.is_empty());
        assert_eq!(endpoint.port, 8883);
        assert!(endpoint.login.is_none());
        assert!(endpoint.tls);
        assert_eq!(endpoint.keep_alive, Duration::from_secs(30));
        assert_eq!(endpoint.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_overrides() {
        let endpoint = MqttTransport::builder()
            .host("192.168.1.50")
            .port(1883)
            .credentials("niko", "secret")
            .tls(false)
            .keep_alive(Duration::from_secs(45))
            .connect_timeout(Duration::from_secs(15))
            .endpoint;

        assert_eq!(
            endpoint,
            Endpoint {
                host: "192.168.1.50".to_string(),
                port: 1883,
                login: Some(("niko".to_string(), "secret".to_string())),
                tls: false,
                keep_alive: Duration::from_secs(45),
                connect_timeout: Duration::from_secs(15),
            }
        );
    }

    #[test]
    fn client_ids_are_unique() {
        let endpoint = MqttTransport::builder().host("h").endpoint;
        let first = endpoint.options();
        let second = endpoint.options();
        assert_ne!(first.client_id(), second.client_id());
        assert!(first.client_id().starts_with("niko_bridge_"));
    }

    #[test]
    fn debug_output_hides_password() {
        let builder = MqttTransport::builder().host("h").credentials("niko", "hunter2");
        let debug = format!("{builder:?}");
        assert!(debug.contains("niko"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn backoff_doubles_up_to_limit_and_resets() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), RECONNECT_MAX);

        backoff.reset();
        assert_eq!(backoff.next_delay(), RECONNECT_MIN);
    }

    /// Minimal broker: acknowledges each connection, then drops the first one.
    async fn flaky_broker() -> (u16, tokio::task::JoinHandle<()>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let mut kept = Vec::new();
            for attempt in 0..2 {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut connect = [0_u8; 256];
                let _ = socket.read(&mut connect).await.unwrap();
                // CONNACK, session not present, accepted.
                socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
                if attempt > 0 {
                    kept.push(socket);
                }
            }
            std::future::pending::<()>().await;
            drop(kept);
        });
        (port, task)
    }

    #[tokio::test]
    async fn dropped_connection_is_reestablished() {
        let (port, broker) = flaky_broker().await;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let transport = MqttTransport::builder()
            .host("127.0.0.1")
            .port(port)
            .tls(false)
            .connect_timeout(Duration::from_secs(2))
            .connect(events_tx)
            .await
            .unwrap();

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(event);
        }
        assert_eq!(
            seen,
            [
                TransportEvent::Connected,
                TransportEvent::Disconnected,
                TransportEvent::Connected,
            ]
        );
        assert!(transport.is_connected());
        broker.abort();
    }

    #[tokio::test]
    async fn missing_host_is_rejected() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let result = MqttTransport::builder().connect(events_tx).await;
        assert!(matches!(result, Err(ProtocolError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn refused_connection_reports_disconnected() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        // Nothing listens on port 1.
        let result = MqttTransport::builder()
            .host("127.0.0.1")
            .port(1)
            .tls(false)
            .connect_timeout(Duration::from_secs(2))
            .connect(events_tx)
            .await;

        assert!(result.is_err());
        assert_eq!(events_rx.recv().await, Some(TransportEvent::Disconnected));
    }
}
