//! WebSocket route handler.
//!
//! Each connection is one broadcast hub observer. Handles upgrade, the message loop and cleanup.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::messages::{msg_types, system, ClientMessage, ServerMessage};
use crate::activity_log::{BroadcastHub, LogEntry, ObserverFilter, ObserverId};
use crate::server::state::GuardedActivityLog;

const OUTGOING_QUEUE_SIZE: usize = 16;

/// Work for the task that owns the socket's write half.
enum Outgoing {
    Message(ServerMessage),
    /// Start forwarding entries from a fresh subscription.
    Attach(mpsc::Receiver<Arc<LogEntry>>),
}

/// Per-connection observer bookkeeping.
struct ObserverSession {
    hub: Arc<BroadcastHub>,
    observer_id: Option<ObserverId>,
    outgoing: mpsc::Sender<Outgoing>,
}

impl ObserverSession {
    async fn send(&self, msg: ServerMessage) {
        let _ = self.outgoing.send(Outgoing::Message(msg)).await;
    }

    async fn send_error(&self, code: &str, message: String) {
        self.send(ServerMessage::new(
            msg_types::ERROR,
            system::Error::new(code, message),
        ))
        .await;
    }

    async fn subscribe(&mut self, filter: ObserverFilter) {
        if let Some(id) = self.observer_id {
            if self.hub.set_filter(id, filter.clone()).await {
                return;
            }
        }
        let subscription = self.hub.subscribe(filter).await;
        self.observer_id = Some(subscription.id);
        let _ = self
            .outgoing
            .send(Outgoing::Attach(subscription.receiver))
            .await;
    }

    async fn unsubscribe(&mut self) {
        if let Some(id) = self.observer_id.take() {
            self.hub.unsubscribe(id).await;
        }
    }
}

/// WebSocket upgrade handler.
///
/// This is the route handler for `GET /v1/ws`. New connections receive every log entry until
/// they send a `subscribe` with a narrower filter.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(activity_log): State<GuardedActivityLog>,
) -> Response {
    let hub = activity_log.hub().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle an established WebSocket connection.
async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let subscription = hub.subscribe(ObserverFilter::default()).await;
    let observer_id = subscription.id;
    debug!("WebSocket connected: observer {}", observer_id);

    let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_SIZE);
    let mut session = ObserverSession {
        hub,
        observer_id: Some(observer_id),
        outgoing: outgoing_tx,
    };

    let (ws_sink, ws_stream) = socket.split();

    let connected_msg = ServerMessage::new(
        msg_types::CONNECTED,
        system::Connected {
            observer_id,
            server_version: format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")),
        },
    );

    // Spawn task to forward outgoing messages to WebSocket
    let outgoing_handle = tokio::spawn(forward_outgoing(
        ws_sink,
        outgoing_rx,
        connected_msg,
        subscription.receiver,
    ));

    // Process incoming messages
    process_incoming(ws_stream, &mut session).await;

    // Cleanup
    debug!("WebSocket disconnected: observer {}", observer_id);
    session.unsubscribe().await;
    outgoing_handle.abort();
}

async fn next_entry(receiver: &mut Option<mpsc::Receiver<Arc<LogEntry>>>) -> Option<Arc<LogEntry>> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

enum ForwardEvent {
    Outgoing(Option<Outgoing>),
    Entry(Option<Arc<LogEntry>>),
}

/// Forward control replies and matching log entries to the WebSocket.
async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<Outgoing>,
    initial_msg: ServerMessage,
    entries: mpsc::Receiver<Arc<LogEntry>>,
) {
    // Send initial connected message
    if let Ok(json) = serde_json::to_string(&initial_msg) {
        if ws_sink.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    let mut entries = Some(entries);
    loop {
        let event = tokio::select! {
            outgoing = outgoing_rx.recv() => ForwardEvent::Outgoing(outgoing),
            entry = next_entry(&mut entries) => ForwardEvent::Entry(entry),
        };

        let msg = match event {
            ForwardEvent::Outgoing(Some(Outgoing::Message(msg))) => msg,
            ForwardEvent::Outgoing(Some(Outgoing::Attach(receiver))) => {
                entries = Some(receiver);
                continue;
            }
            ForwardEvent::Outgoing(None) => break,
            ForwardEvent::Entry(Some(entry)) => ServerMessage::new(msg_types::LOG, entry.as_ref()),
            // Unsubscribed: the hub dropped our sender
            ForwardEvent::Entry(None) => {
                entries = None;
                continue;
            }
        };

        match serde_json::to_string(&msg) {
            Ok(json) => {
                if ws_sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to serialize WebSocket message: {}", e);
            }
        }
    }
}

/// Process incoming messages from the WebSocket.
async fn process_incoming(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    session: &mut ObserverSession,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(msg, session).await,
                Err(e) => {
                    debug!("Failed to parse client message: {}", e);
                    session
                        .send_error("parse_error", format!("Invalid message format: {}", e))
                        .await;
                }
            },
            Ok(Message::Binary(_)) => {
                debug!("Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                // Axum/tungstenite handles pong automatically
                debug!("Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!("Received pong");
            }
            Ok(Message::Close(_)) => {
                debug!("Received close frame");
                break;
            }
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        }
    }
}

/// Handle a parsed client message.
async fn handle_client_message(msg: ClientMessage, session: &mut ObserverSession) {
    match msg.msg_type.as_str() {
        msg_types::PING => {
            session.send(ServerMessage::empty(msg_types::PONG)).await;
        }
        msg_types::SUBSCRIBE => {
            let data = if msg.data.is_null() {
                serde_json::Value::Object(Default::default())
            } else {
                msg.data
            };
            match serde_json::from_value::<ObserverFilter>(data) {
                Ok(filter) => {
                    debug!("Observer filter updated: {:?}", filter);
                    session.subscribe(filter).await;
                }
                Err(e) => {
                    session
                        .send_error("invalid_filter", format!("Invalid subscribe data: {}", e))
                        .await;
                }
            }
        }
        msg_types::UNSUBSCRIBE => {
            session.unsubscribe().await;
        }
        other => {
            debug!("Unknown message type: {}", other);
            session
                .send_error("unknown_type", format!("Unknown message type: {}", other))
                .await;
        }
    }
}
