//! WebSocket link to the control plane.
//!
//! Text frames carry JSON:
//!
//! ```text
//! {"event": "todo", "id": 7, "data": {...}}   event, ack expected when `id` is set
//! {"ack": 7, "args": [...]}                   acknowledgement
//! ```

use crate::domain::TransportError;
use crate::ports::{Ack, ControlPlaneLink, InboundMessage, LinkConnector, LinkEvent, LinkSession};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

const EVENT_BUFFER: usize = 256;

type PendingAcks = Arc<DashMap<u64, oneshot::Sender<Vec<Value>>>>;

/// One JSON text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum WireFrame {
    Ack {
        ack: u64,
        #[serde(default)]
        args: Vec<Value>,
    },
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        #[serde(default)]
        data: Value,
    },
}

impl WireFrame {
    fn to_message(&self) -> Result<Message, TransportError> {
        let text =
            serde_json::to_string(self).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(Message::Text(text.into()))
    }
}

/// [`LinkConnector`] over tokio-tungstenite.
pub struct WsLinkConnector {
    url: String,
    call_timeout: Duration,
}

impl WsLinkConnector {
    /// Connector for `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            call_timeout,
        }
    }
}

#[async_trait]
impl LinkConnector for WsLinkConnector {
    async fn connect(&self) -> Result<LinkSession, TransportError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let pending: PendingAcks = Arc::new(DashMap::new());

        // Writer
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "[uplink] Socket write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        // Reader
        let reader_pending = Arc::clone(&pending);
        let reader_outbound = outbound_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let event = route_frame(&text, &reader_pending, &reader_outbound);
                        if let Some(event) = event {
                            if events_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = events_tx.send(LinkEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
            // Pending callers see `Closed`
            reader_pending.clear();
        });

        let link = Arc::new(WsLink {
            outbound: outbound_tx,
            pending,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            call_timeout: self.call_timeout,
        });

        Ok(LinkSession {
            link,
            events: events_rx,
        })
    }
}

/// Turn one text frame into a link event, resolving acks in place.
fn route_frame(
    text: &str,
    pending: &PendingAcks,
    outbound: &mpsc::UnboundedSender<Message>,
) -> Option<LinkEvent> {
    let frame: WireFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            // Dropped; the socket itself is still healthy
            warn!(error = %TransportError::MalformedFrame(e.to_string()), "[uplink] Ignoring frame");
            return None;
        }
    };

    match frame {
        WireFrame::Ack { ack, args } => {
            match pending.remove(&ack) {
                Some((_, waiter)) => {
                    let _ = waiter.send(args);
                }
                None => debug!(id = ack, "[uplink] Ack for unknown call"),
            }
            None
        }
        WireFrame::Event { event, id, data } => {
            let ack = id.map(|id| {
                let (ack, reply) = Ack::channel();
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    if let Ok(args) = reply.await {
                        if let Ok(message) = (WireFrame::Ack { ack: id, args }).to_message() {
                            let _ = outbound.send(message);
                        }
                    }
                });
                ack
            });
            Some(LinkEvent::Message(InboundMessage { event, data, ack }))
        }
    }
}

/// Outbound half of a WebSocket link.
pub struct WsLink {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingAcks,
    next_id: AtomicU64,
    closed: AtomicBool,
    call_timeout: Duration,
}

impl WsLink {
    fn send(&self, frame: &WireFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(frame.to_message()?)
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl ControlPlaneLink for WsLink {
    async fn emit(&self, event: &str, data: Value) -> Result<(), TransportError> {
        self.send(&WireFrame::Event {
            event: event.to_string(),
            id: None,
            data,
        })
    }

    async fn call(&self, event: &str, data: Value) -> Result<Vec<Value>, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if let Err(e) = self.send(&WireFrame::Event {
            event: event.to_string(),
            id: Some(id),
            data,
        }) {
            self.pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(args)) => Ok(args),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                Err(TransportError::Timeout {
                    event: event.to_string(),
                    secs: self.call_timeout.as_secs(),
                })
            }
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.outbound.send(Message::Close(None));
        }
    }
}
