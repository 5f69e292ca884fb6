//! # Connection Manager
//!
//! Owns the link to the control plane for the lifetime of the agent:
//! connect, run the handshake, route inbound events, and reconnect with
//! bounded backoff when the link fails or drops.
//!
//! Every new link starts from a fresh [`Session`]; nothing is resumed.

use crate::domain::{AgentConfig, Session};
use crate::ports::{CommandApi, ControlPlaneLink, InboundMessage, LinkConnector, LinkEvent, LinkSession};
use crate::service::handshake::{events, HandshakeProtocol};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uplink_telemetry::{metric_inc, LINK_CONNECTED, RECONNECT_ATTEMPTS};

/// Inbound command event.
pub const TODO_EVENT: &str = "todo";
/// Inbound error report from the control plane.
pub const ERR_EVENT: &str = "err";

const LIFECYCLE_BUFFER: usize = 32;

/// Lifecycle notifications published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Link established; handshake starting.
    Connected,
    /// Session is trusted.
    HandshakeComplete,
    /// Link dropped; session reset.
    Disconnected,
    /// Connect failure or transport error on a live link.
    TransportError(String),
    /// Waiting before reconnect attempt `attempt`.
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Attempts exhausted; `run` is returning.
    ReconnectFailed,
}

/// Why [`ConnectionManager::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// Agent disabled in configuration.
    Disabled,
    /// Shutdown signal received.
    Shutdown,
    /// Reconnect attempts exhausted.
    ReconnectExhausted,
}

/// Reconnect bookkeeping for [`ConnectionManager::run`].
///
/// The "initial connection failed" warning fires at most once, and only
/// before the first successful connect. The attempt count restarts after
/// every successful connect.
#[derive(Debug)]
struct AttemptCounter {
    before_first_connect: bool,
    attempt: u32,
}

impl Default for AttemptCounter {
    fn default() -> Self {
        Self {
            before_first_connect: true,
            attempt: 0,
        }
    }
}

impl AttemptCounter {
    fn connected(&mut self) {
        self.before_first_connect = false;
        self.attempt = 0;
    }

    /// Whether this failure is the initial one worth a warning.
    fn connect_failed(&mut self) -> bool {
        std::mem::replace(&mut self.before_first_connect, false)
    }

    /// 1-based number of the reconnect about to be attempted.
    fn next(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }
}

/// Drives connect, handshake and event routing.
pub struct ConnectionManager {
    config: Arc<AgentConfig>,
    connector: Arc<dyn LinkConnector>,
    session: Arc<RwLock<Session>>,
    handshake: HandshakeProtocol,
    commands: Arc<dyn CommandApi>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl ConnectionManager {
    /// Create a manager. Nothing connects until [`run`](Self::run).
    pub fn new(
        config: Arc<AgentConfig>,
        connector: Arc<dyn LinkConnector>,
        session: Arc<RwLock<Session>>,
        handshake: HandshakeProtocol,
        commands: Arc<dyn CommandApi>,
    ) -> Self {
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_BUFFER);
        Self {
            config,
            connector,
            session,
            handshake,
            commands,
            lifecycle,
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Connect and stay connected until shutdown or until the reconnect
    /// policy gives up.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RunExit {
        if !self.config.enabled {
            info!("[uplink] Agent disabled in configuration, not connecting.");
            return RunExit::Disabled;
        }

        let policy = &self.config.reconnect;
        let mut attempts = AttemptCounter::default();

        loop {
            if *shutdown.borrow() {
                return RunExit::Shutdown;
            }

            let connected = tokio::select! {
                result = self.connector.connect() => result,
                _ = shutdown.changed() => return RunExit::Shutdown,
            };

            match connected {
                Ok(link_session) => {
                    attempts.connected();

                    LINK_CONNECTED.set(1.0);
                    info!("[uplink] Connection with the control plane found, please wait a few seconds...");
                    self.publish(LifecycleEvent::Connected);

                    let stopped = self.serve(link_session, &mut shutdown).await;

                    self.session.write().reset();
                    LINK_CONNECTED.set(0.0);
                    warn!("[uplink] Disconnected from the control plane.");
                    self.publish(LifecycleEvent::Disconnected);

                    if stopped {
                        return RunExit::Shutdown;
                    }
                }
                Err(e) => {
                    self.session.write().reset();
                    if attempts.connect_failed() {
                        warn!(error = %e, "[uplink] Connection to the control plane failed!");
                    } else {
                        debug!(error = %e, "[uplink] Connect attempt failed");
                    }
                    self.publish(LifecycleEvent::TransportError(e.to_string()));
                }
            }

            let attempt = attempts.next();
            if !policy.allows(attempt) {
                warn!(
                    attempts = policy.max_attempts,
                    "[uplink] Reconnection to the control plane failed!"
                );
                self.publish(LifecycleEvent::ReconnectFailed);
                return RunExit::ReconnectExhausted;
            }

            metric_inc!(RECONNECT_ATTEMPTS);
            let delay = policy.delay_for(attempt, &mut rand::thread_rng());
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "[uplink] Connection error with the control plane, new attempt in progress... ({})",
                attempt
            );
            self.publish(LifecycleEvent::Reconnecting { attempt });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return RunExit::Shutdown,
            }
        }
    }

    /// Serve one link until it drops or reports a transport error.
    /// Returns `true` on shutdown.
    async fn serve(&self, link_session: LinkSession, shutdown: &mut watch::Receiver<bool>) -> bool {
        let LinkSession { link, mut events } = link_session;

        let started = tokio::select! {
            result = self.handshake.begin(link.as_ref()) => result,
            _ = shutdown.changed() => {
                link.close().await;
                return true;
            }
        };
        match started {
            Ok(true) => debug!("[uplink] Waiting for the control plane challenge"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "[uplink] Handshake failed"),
        }

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(LinkEvent::Message(message)) => self.route(&link, message).await,
                    Some(LinkEvent::Error(reason)) => {
                        // Trust never outlives a transport failure
                        self.session.write().reset();
                        warn!(error = %reason, "[uplink] Transport error");
                        self.publish(LifecycleEvent::TransportError(reason));
                        link.close().await;
                        return false;
                    }
                    None => {
                        link.close().await;
                        return false;
                    }
                },
                _ = shutdown.changed() => {
                    link.close().await;
                    return true;
                }
            }
        }
    }

    async fn route(&self, link: &Arc<dyn ControlPlaneLink>, message: InboundMessage) {
        let InboundMessage { event, data, ack } = message;

        match event.as_str() {
            events::AUTHORIZED => match self.handshake.on_challenge(link.as_ref(), &data).await {
                Ok(_) => self.publish(LifecycleEvent::HandshakeComplete),
                Err(e) => warn!(error = %e, "[uplink] Handshake challenge failed"),
            },
            TODO_EVENT => {
                // Commands run concurrently; the ack goes back on this link only
                let commands = Arc::clone(&self.commands);
                tokio::spawn(async move {
                    let reply = commands.handle_command(data).await;
                    match ack {
                        Some(ack) => {
                            if !ack.send(reply.into_ack()) {
                                debug!("[uplink] Link gone before the command reply");
                            }
                        }
                        None => debug!("[uplink] Command without acknowledgement, reply dropped"),
                    }
                });
            }
            ERR_EVENT => {
                let text = data.get("text").and_then(Value::as_str).unwrap_or_default();
                warn!("[uplink] {}", text);
            }
            other => debug!(event = other, "[uplink] Ignoring event"),
        }
    }

    fn publish(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.lifecycle.send(event);
    }
}
