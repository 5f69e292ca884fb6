//! # In-Memory Link
//!
//! Channel-backed [`LinkConnector`]. Each successful `connect` hands the
//! matching [`PeerEnd`] to whoever plays the control plane (tests, local
//! tooling).

use crate::domain::TransportError;
use crate::ports::{Ack, ControlPlaneLink, InboundMessage, LinkConnector, LinkEvent, LinkSession};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const EVENT_BUFFER: usize = 64;
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector producing in-memory links.
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<PeerEnd>,
    failures_left: AtomicUsize,
    attempts: Arc<AtomicUsize>,
    call_timeout: Duration,
}

impl MemoryConnector {
    /// New connector plus the stream of peer ends, one per connection.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PeerEnd>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        (
            Self {
                peers,
                failures_left: AtomicUsize::new(0),
                attempts: Arc::new(AtomicUsize::new(0)),
                call_timeout: DEFAULT_CALL_TIMEOUT,
            },
            peers_rx,
        )
    }

    /// The next `count` connection attempts fail.
    pub fn fail_next(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Timeout for acknowledged calls.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Counter of connection attempts, shared with the connector.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl LinkConnector for MemoryConnector {
    async fn connect(&self) -> Result<LinkSession, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::ConnectFailed("connection refused".to_string()));
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let link = Arc::new(MemoryLink {
            outbound: outbound_tx,
            closed: AtomicBool::new(false),
            call_timeout: self.call_timeout,
        });
        let peer = PeerEnd {
            events: Some(events_tx),
            outbound: outbound_rx,
        };

        // Nobody listening for peers is fine; the link just sees silence
        let _ = self.peers.send(peer);

        Ok(LinkSession {
            link,
            events: events_rx,
        })
    }
}

/// Agent-side half of an in-memory link.
pub struct MemoryLink {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    closed: AtomicBool,
    call_timeout: Duration,
}

impl MemoryLink {
    fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl ControlPlaneLink for MemoryLink {
    async fn emit(&self, event: &str, data: Value) -> Result<(), TransportError> {
        self.send(OutboundFrame {
            event: event.to_string(),
            data,
            reply: None,
        })
    }

    async fn call(&self, event: &str, data: Value) -> Result<Vec<Value>, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.send(OutboundFrame {
            event: event.to_string(),
            data,
            reply: Some(tx),
        })?;

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(args)) => Ok(args),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout {
                event: event.to_string(),
                secs: self.call_timeout.as_secs(),
            }),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Frame the agent sent to the control plane.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Event name.
    pub event: String,
    /// Payload.
    pub data: Value,
    reply: Option<oneshot::Sender<Vec<Value>>>,
}

impl OutboundFrame {
    /// Whether the agent waits for an acknowledgement.
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Acknowledge the frame. No-op for fire-and-forget frames.
    pub fn reply(self, args: Vec<Value>) {
        if let Some(reply) = self.reply {
            let _ = reply.send(args);
        }
    }
}

/// Control-plane half of an in-memory link.
pub struct PeerEnd {
    events: Option<mpsc::Sender<LinkEvent>>,
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
}

impl PeerEnd {
    /// Next frame from the agent; `None` once the agent dropped the link.
    pub async fn next_outbound(&mut self) -> Option<OutboundFrame> {
        self.outbound.recv().await
    }

    /// Send an event without expecting an acknowledgement.
    pub async fn send(&self, event: &str, data: Value) -> bool {
        self.push(LinkEvent::Message(InboundMessage {
            event: event.to_string(),
            data,
            ack: None,
        }))
        .await
    }

    /// Send an event and wait for the agent's acknowledgement.
    pub async fn call(&self, event: &str, data: Value) -> Option<Vec<Value>> {
        let (ack, rx) = Ack::channel();
        let sent = self
            .push(LinkEvent::Message(InboundMessage {
                event: event.to_string(),
                data,
                ack: Some(ack),
            }))
            .await;
        if !sent {
            return None;
        }
        rx.await.ok()
    }

    /// Report a transport error to the agent.
    pub async fn send_error(&self, message: &str) -> bool {
        self.push(LinkEvent::Error(message.to_string())).await
    }

    /// Drop the inbound stream; the agent sees a disconnect.
    pub fn disconnect(&mut self) {
        self.events.take();
    }

    async fn push(&self, event: LinkEvent) -> bool {
        match &self.events {
            Some(events) => events.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_round_trip() {
        let (connector, mut peers) = MemoryConnector::new();
        let session = connector.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        let answer = async {
            let frame = peer.next_outbound().await.unwrap();
            assert!(frame.expects_reply());
            assert_eq!(frame.data, json!({"q": 1}));
            frame.reply(vec![json!("pong")]);
        };
        let (reply, _) = tokio::join!(session.link.call("ping", json!({"q": 1})), answer);
        assert_eq!(reply.unwrap(), vec![json!("pong")]);
    }

    #[tokio::test]
    async fn test_unanswered_call_times_out() {
        let (connector, mut peers) = MemoryConnector::new();
        let connector = connector.with_call_timeout(Duration::from_millis(20));
        let session = connector.connect().await.unwrap();
        let _peer = peers.recv().await.unwrap();

        let err = session.link.call("getPublicKey", Value::Null).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_closed_link_rejects_emit() {
        let (connector, _peers) = MemoryConnector::new();
        let session = connector.connect().await.unwrap();
        session.link.close().await;
        assert_eq!(
            session.link.emit("check", Value::Null).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_injected_failures_then_success() {
        let (connector, _peers) = MemoryConnector::new();
        let connector = connector.fail_next(2);
        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_ok());
        assert_eq!(connector.attempts().load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disconnect_ends_event_stream() {
        let (connector, mut peers) = MemoryConnector::new();
        let mut session = connector.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        assert!(peer.send("err", json!({"text": "boom"})).await);
        peer.disconnect();

        assert!(matches!(session.events.recv().await, Some(LinkEvent::Message(_))));
        assert!(session.events.recv().await.is_none());
    }
}
