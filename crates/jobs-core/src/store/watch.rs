//! Change-feed subscription over a single multiplexed WebSocket connection.
//!
//! Mirrors the teacher's `websocket::connection` module in spirit (tungstenite
//! stream split into a sink half and a stream half, driven by a background
//! task that fans frames out over `mpsc` channels) but as a *client*: we
//! `connect_async` to the store instead of accepting inbound sockets, and we
//! demultiplex by subscription id instead of by connection id.

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{error, warn};

use crate::error::Result;
use crate::store::{Rev, SubscriptionId};

/// The kind of change a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Merge,
    Delete,
}

/// The payload of one change frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeBody {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub body: Value,
}

/// One change event delivered to a watcher, with the post-change revision.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub change: ChangeBody,
    pub rev: Rev,
}

/// A stream of change events for one subscription.
pub type ChangeStream = mpsc::UnboundedReceiver<ChangeEvent>;

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "subscriptionId")]
    subscription_id: u64,
    #[serde(rename = "type")]
    kind: ChangeKind,
    body: Value,
    #[serde(default)]
    rev: Option<String>,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the single connection shared by every `watch()` call from one
/// `HttpStoreClient`, demultiplexing frames by subscription id.
pub struct WatchHub {
    senders: Arc<DashMap<u64, mpsc::UnboundedSender<ChangeEvent>>>,
    writer: Mutex<Option<futures::stream::SplitSink<WsStream, Message>>>,
    connected: Mutex<bool>,
}

impl WatchHub {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(DashMap::new()),
            writer: Mutex::new(None),
            connected: Mutex::new(false),
        }
    }

    pub async fn subscribe(
        &self,
        ws_url: String,
        token: &str,
        id: SubscriptionId,
        path: &str,
        from_rev: Option<Rev>,
    ) -> Result<(SubscriptionId, ChangeStream)> {
        self.ensure_connected(ws_url, token).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(id.0, tx);

        let subscribe_frame = serde_json::json!({
            "subscriptionId": id.0,
            "path": path,
            "fromRev": from_rev,
        });
        let mut writer_guard = self.writer.lock().await;
        if let Some(writer) = writer_guard.as_mut() {
            writer
                .send(Message::Text(subscribe_frame.to_string()))
                .await?;
        }
        Ok((id, rx))
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.senders.remove(&id.0);
        let mut writer_guard = self.writer.lock().await;
        if let Some(writer) = writer_guard.as_mut() {
            let frame = serde_json::json!({ "unsubscribe": id.0 });
            let _ = writer.send(Message::Text(frame.to_string())).await;
        }
    }

    async fn ensure_connected(&self, ws_url: String, token: &str) -> Result<()> {
        let mut connected = self.connected.lock().await;
        if *connected {
            return Ok(());
        }
        let request = format!("{ws_url}?token={token}");
        let (stream, _response) = connect_async(request).await?;
        let (sink, mut source) = stream.split();
        *self.writer.lock().await = Some(sink);
        *connected = true;

        let senders = self.senders.clone();
        tokio::spawn(async move {
            loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_frame(&senders, &text);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        error!("change feed connection closed; subscriptions collapsed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        error!(%err, "change feed read error; subscriptions collapsed");
                        break;
                    }
                }
            }
        });
        Ok(())
    }
}

impl Default for WatchHub {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch_frame(senders: &DashMap<u64, mpsc::UnboundedSender<ChangeEvent>>, text: &str) {
    let frame: RawFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%err, "malformed change frame, ignoring");
            return;
        }
    };
    let Some(sender) = senders.get(&frame.subscription_id) else {
        return;
    };
    let event = ChangeEvent {
        change: ChangeBody {
            kind: frame.kind,
            body: frame.body,
        },
        rev: frame.rev.unwrap_or_default(),
    };
    if sender.send(event).is_err() {
        drop(sender);
        senders.remove(&frame.subscription_id);
    }
}
