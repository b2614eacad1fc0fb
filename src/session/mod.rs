//! Broker Session Manager
//!
//! Owns the MQTT client/event-loop pair and the session state. The state
//! is written here and nowhere else; the scheduler only reads it. The
//! event loop must be serviced regularly so connect/disconnect events and
//! in-flight publishes make progress; [`Session::service_events`] does one
//! bounded pass. After a drop the session reconnects on its own with
//! exponential backoff.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::publish::{MessageSink, OutboundMessage, PublishError};

/// Bound for one service pass while a connect attempt is in flight.
/// Cancelling the poll mid-handshake would discard the attempt and restart
/// it on the next pass, so reconnects get a wider window than steady-state
/// servicing.
const CONNECT_GRACE: Duration = Duration::from_secs(10);

/// Connection state of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected; a reconnect attempt is pending or backing off
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Handshake acknowledged, publishes may be submitted
    Connected,
}

/// Session error types
#[derive(Debug)]
pub enum SessionError {
    /// The transport could not reach the broker
    Connect(String),
    /// The broker refused the handshake
    Rejected(String),
    /// No acknowledgement within the allowed time
    Timeout,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Connect(msg) => write!(f, "connect failed: {}", msg),
            SessionError::Rejected(msg) => write!(f, "broker rejected session: {}", msg),
            SessionError::Timeout => write!(f, "no acknowledgement from broker"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Reconnect delay policy: doubles from a floor up to a cap, reset on a
/// successful connect.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(floor: Duration, cap: Duration) -> Self {
        Self {
            floor,
            cap,
            current: floor,
        }
    }

    /// The delay to apply now; subsequent delays grow until the cap.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.cap);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.floor;
    }
}

/// Submission handle cloned out of the session for the publisher.
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
}

impl MessageSink for MqttSink {
    fn submit(&self, message: OutboundMessage) -> Result<(), PublishError> {
        self.client
            .try_publish(
                message.topic.clone(),
                message.qos,
                message.retain,
                message.payload.to_vec(),
            )
            .map_err(|e| PublishError::new(&message.topic, e.to_string()))
    }
}

/// The broker session: client, event loop, state and reconnect policy.
pub struct Session {
    client: AsyncClient,
    event_loop: rumqttc::EventLoop,
    state: SessionState,
    backoff: Backoff,
    retry_at: Option<Instant>,
}

impl Session {
    /// Build the session and its submission handle. No I/O happens until
    /// the event loop is first polled.
    pub fn open(cfg: &MqttConfig) -> (Self, MqttSink) {
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(cfg.keepalive_duration());

        let (client, event_loop) = AsyncClient::new(options, cfg.queue_capacity);
        let sink = MqttSink {
            client: client.clone(),
        };
        let session = Self {
            client,
            event_loop,
            state: SessionState::Disconnected,
            backoff: Backoff::new(
                cfg.reconnect_interval_duration(),
                cfg.max_reconnect_interval_duration(),
            ),
            retry_at: None,
        };
        (session, sink)
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the initial connect and wait for the broker to acknowledge.
    /// Any failure here is final; recovery by backoff only applies to
    /// sessions that were established once.
    pub async fn wait_connected(&mut self, deadline: Duration) -> Result<(), SessionError> {
        let until = Instant::now() + deadline;
        self.state = SessionState::Connecting;
        loop {
            let remaining = match until.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => {
                    self.state = SessionState::Disconnected;
                    return Err(SessionError::Timeout);
                }
            };
            match timeout(remaining, self.event_loop.poll()).await {
                Err(_) => {
                    self.state = SessionState::Disconnected;
                    return Err(SessionError::Timeout);
                }
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!(
                            "Broker session established (session_present={})",
                            ack.session_present
                        );
                        self.state = SessionState::Connected;
                        self.backoff.reset();
                        return Ok(());
                    }
                    self.state = SessionState::Disconnected;
                    return Err(SessionError::Rejected(format!("{:?}", ack.code)));
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    self.state = SessionState::Disconnected;
                    return Err(SessionError::Connect(e.to_string()));
                }
            }
        }
    }

    /// One bounded service pass over the event loop. Translates transport
    /// events into state transitions; while disconnected, holds reconnect
    /// attempts back until the backoff delay has elapsed.
    pub async fn service_events(&mut self, bound: Duration) {
        if self.state != SessionState::Connected {
            if let Some(at) = self.retry_at {
                let now = Instant::now();
                if now < at {
                    sleep(std::cmp::min(at - now, bound)).await;
                    if Instant::now() < at {
                        return;
                    }
                }
                self.retry_at = None;
                self.state = SessionState::Connecting;
                debug!("Reconnecting to broker");
            }
        }

        let bound = if self.state == SessionState::Connected {
            bound
        } else {
            std::cmp::max(bound, CONNECT_GRACE)
        };
        match timeout(bound, self.event_loop.poll()).await {
            Err(_) => {} // nothing happened within the bound
            Ok(Ok(event)) => self.on_event(event),
            Ok(Err(e)) => self.on_error(e),
        }
    }

    /// Drop the active connection after a publish fault. The next service
    /// passes reconnect with backoff.
    pub fn teardown(&mut self) {
        let _ = self.client.try_disconnect();
        self.state = SessionState::Disconnected;
        self.retry_at = Some(Instant::now() + self.backoff.next_delay());
    }

    /// Graceful shutdown: send DISCONNECT and give queued messages a
    /// moment to reach the wire.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Connected && self.client.try_disconnect().is_ok() {
            let _ = timeout(Duration::from_secs(1), async {
                loop {
                    match self.event_loop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            })
            .await;
        }
        self.state = SessionState::Disconnected;
    }

    fn on_event(&mut self, event: Event) {
        if let Event::Incoming(Packet::ConnAck(ack)) = event {
            if ack.code == ConnectReturnCode::Success {
                info!(
                    "Broker session established (session_present={})",
                    ack.session_present
                );
                self.state = SessionState::Connected;
                self.backoff.reset();
            } else {
                warn!("Broker rejected session: {:?}", ack.code);
                self.lost();
            }
        }
    }

    fn on_error(&mut self, error: ConnectionError) {
        if self.state == SessionState::Connected {
            warn!("Broker connection lost: {}", error);
        } else {
            debug!("Broker connect attempt failed: {}", error);
        }
        self.lost();
    }

    fn lost(&mut self) {
        self.state = SessionState::Disconnected;
        let delay = self.backoff.next_delay();
        debug!("Next broker connect attempt in {:?}", delay);
        self.retry_at = Some(Instant::now() + delay);
    }
}

/// Map a configured QoS level to the transport's enum.
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}
