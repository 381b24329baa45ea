use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct MarketEvent {
    /// `None` reaches every connected client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub event: &'static str,
    pub payload: serde_json::Value,
}

pub fn listing_room(listing_id: i64) -> String {
    format!("listing_{listing_id}")
}

pub fn farmer_room(farmer_id: Uuid) -> String {
    format!("farmer_{farmer_id}")
}

pub fn buyer_room(buyer_id: Uuid) -> String {
    format!("buyer_{buyer_id}")
}

pub fn inquiry_room(inquiry_id: i64) -> String {
    format!("inquiry_{inquiry_id}")
}

/// Fan-out of marketplace events to websocket sessions. Clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MarketEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.sender.subscribe()
    }

    pub fn broadcast<T: Serialize>(&self, event: &'static str, payload: &T) {
        self.publish(None, event, payload);
    }

    pub fn to_room<T: Serialize>(&self, room: String, event: &'static str, payload: &T) {
        self.publish(Some(room), event, payload);
    }

    fn publish<T: Serialize>(&self, room: Option<String>, event: &'static str, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, event, "event payload not serializable; dropped");
                return;
            }
        };
        // no subscribers is fine
        let _ = self.sender.send(MarketEvent { room, event, payload });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ClientCommand {
    JoinRoom { room: String },
    LeaveRoom { room: String },
}

/// Whether a session that joined `rooms` should see `event`.
pub fn is_addressed_to(event: &MarketEvent, rooms: &HashSet<String>) -> bool {
    match &event.room {
        None => true,
        Some(room) => rooms.contains(room),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| run_session(socket, events))
}

async fn run_session(socket: WebSocket, mut events: broadcast::Receiver<MarketEvent>) {
    let (mut sink, mut stream) = socket.split();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCommand>(16);

    let mut forward = tokio::spawn(async move {
        let mut rooms: HashSet<String> = HashSet::new();
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(ClientCommand::JoinRoom { room }) => {
                        debug!(%room, "session joined room");
                        rooms.insert(room);
                    }
                    Some(ClientCommand::LeaveRoom { room }) => {
                        debug!(%room, "session left room");
                        rooms.remove(&room);
                    }
                    None => break,
                },
                ev = events.recv() => match ev {
                    Ok(ev) if is_addressed_to(&ev, &rooms) => {
                        let Ok(text) = serde_json::to_string(&ev) else { continue };
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket session lagging; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });

    let mut read = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => {
                        if cmd_tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!(error = %e, "ignoring unknown websocket message"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward => read.abort(),
        _ = &mut read => forward.abort(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn every_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.broadcast("new-listing", &serde_json::json!({ "id": 7 }));

        let e1 = timeout(Duration::from_millis(100), rx1.recv()).await.unwrap().unwrap();
        let e2 = timeout(Duration::from_millis(100), rx2.recv()).await.unwrap().unwrap();
        assert_eq!(e1.event, "new-listing");
        assert_eq!(e2.payload["id"], 7);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.to_room(listing_room(1), "new-inquiry", &"hello");
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.clone().to_room(farmer_room(Uuid::nil()), "new-inquiry", &1);
        let ev = timeout(Duration::from_millis(100), rx.recv()).await.unwrap().unwrap();
        assert_eq!(ev.room.as_deref(), Some("farmer_00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn room_addressing() {
        let mut rooms = HashSet::new();
        rooms.insert(listing_room(3));
        let broadcast = MarketEvent { room: None, event: "new-listing", payload: serde_json::Value::Null };
        let mine = MarketEvent { room: Some(listing_room(3)), ..broadcast.clone() };
        let other = MarketEvent { room: Some(listing_room(4)), ..broadcast.clone() };
        assert!(is_addressed_to(&broadcast, &rooms));
        assert!(is_addressed_to(&mine, &rooms));
        assert!(!is_addressed_to(&other, &rooms));
    }

    #[test]
    fn parses_client_commands() {
        let join: ClientCommand =
            serde_json::from_str(r#"{"action":"join-room","room":"listing_1"}"#).unwrap();
        assert_eq!(join, ClientCommand::JoinRoom { room: "listing_1".into() });
        let leave: ClientCommand =
            serde_json::from_str(r#"{"action":"leave-room","room":"listing_1"}"#).unwrap();
        assert_eq!(leave, ClientCommand::LeaveRoom { room: "listing_1".into() });
    }
}
