//! HTTP and websocket boundary between clients and the room directory.
//!
//! `GET /rooms/{room_type}` lists live rooms of a type. `GET /ws/{room_type}`
//! upgrades to a websocket; join options travel in the query string, and
//! from then on every inbound text frame is a client message for the room.

use crate::client_manager::frame_channel;
use crate::directory::{JoinRequest, RoomDirectory};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, Frame, JoinOptions, RoomListing, ServerMessage, SnapshotFormat};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub struct Server {
    listener: TcpListener,
    directory: Arc<RoomDirectory>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        directory: Arc<RoomDirectory>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server {
            listener,
            directory,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(self.listener.local_addr()?)
    }

    pub fn directory(&self) -> Arc<RoomDirectory> {
        Arc::clone(&self.directory)
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        axum::serve(self.listener, router(self.directory)).await?;
        Ok(())
    }
}

pub fn router(directory: Arc<RoomDirectory>) -> Router {
    Router::new()
        .route("/rooms/{room_type}", get(list_rooms))
        .route("/ws/{room_type}", get(ws_handler))
        .with_state(directory)
}

async fn list_rooms(
    State(directory): State<Arc<RoomDirectory>>,
    Path(room_type): Path<String>,
) -> Json<Vec<RoomListing>> {
    Json(directory.query(&room_type).await)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(directory): State<Arc<RoomDirectory>>,
    Path(room_type): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, directory, room_type, params))
}

fn frame_to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}

async fn handle_socket(
    socket: WebSocket,
    directory: Arc<RoomDirectory>,
    room_type: String,
    params: HashMap<String, String>,
) {
    let session_id = Uuid::new_v4().simple().to_string();
    let options = JoinOptions::from_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let format = params
        .get("format")
        .and_then(|f| f.parse::<SnapshotFormat>().ok())
        .unwrap_or_default();

    let (tx, mut rx) = frame_channel();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let request = JoinRequest {
        session_id: session_id.clone(),
        options,
        format,
        sender: tx,
    };

    let room_id = params.get("roomId").map(|id| id.trim()).filter(|id| !id.is_empty());
    let create = params.get("create").is_some_and(|v| v.trim() == "true");

    let joined = match room_id {
        Some(room_id) => directory.join_by_id(room_id, request).await,
        None if create => directory.create(&room_type, request).await,
        None => directory.join_or_create(&room_type, request).await,
    };

    let room = match joined {
        Ok(room) => room,
        Err(e) => {
            warn!("Session {} could not join {}: {}", session_id, room_type, e);
            let rejection = ServerMessage::Error {
                message: e.to_string(),
            };
            if let Ok(frame) = shared::encode_server_message(&rejection) {
                let _ = ws_sender.send(frame_to_message(frame)).await;
            }
            let _ = ws_sender.close().await;
            return;
        }
    };

    debug!("Session {} attached to room {}", session_id, room.id());

    // Writer: drains frames queued by the room until the room drops the sender
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(frame_to_message(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut consented = false;
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match ClientMessage::from_json(text.as_str()) {
                Ok(message) => room.send_message(&session_id, message),
                Err(e) => warn!("Dropping malformed message from {}: {}", session_id, e),
            },
            Ok(Message::Binary(_)) => {
                warn!("Dropping binary frame from {}", session_id);
            }
            Ok(Message::Close(_)) => {
                consented = true;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Websocket error for {}: {}", session_id, e);
                break;
            }
        }
    }

    room.leave(&session_id, consented);
    if let Err(e) = writer.await {
        error!("Writer task for {} failed: {}", session_id, e);
    }
}
