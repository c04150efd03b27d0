//! Connection registry for a single room.
//!
//! Tracks the outbound channel of every joined session and fans messages out
//! to them. Delivery is fire-and-forget: a closed or slow connection never
//! blocks the room, and a failed send to one client does not affect others.

use crate::error::RoomError;
use log::{debug, error, info};
use shared::{encode_server_message, encode_snapshot, Frame, ServerMessage, Snapshot, SnapshotFormat};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub type FrameSender = mpsc::Sender<Frame>;
pub type FrameReceiver = mpsc::Receiver<Frame>;

/// Frames a connection may have queued before new ones are dropped.
/// About one second of snapshots at the default tick rate.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Outbound queue for one connection.
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::channel(OUTBOUND_QUEUE_CAPACITY)
}

/// A joined session and the channel its transport task drains.
#[derive(Debug)]
pub struct Connection {
    pub session_id: String,
    pub format: SnapshotFormat,
    pub connected_at: Instant,
    sender: FrameSender,
}

impl Connection {
    pub fn new(session_id: &str, format: SnapshotFormat, sender: FrameSender) -> Self {
        Self {
            session_id: session_id.to_string(),
            format,
            connected_at: Instant::now(),
            sender,
        }
    }

    /// Queues a frame without waiting. Returns false if the frame was
    /// dropped because the queue is full or the transport side has gone away.
    pub fn send(&self, frame: Frame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Outbound queue full for {}, dropping frame", self.session_id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

pub struct ClientManager {
    clients: HashMap<String, Connection>,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a connection, enforcing room capacity.
    pub fn add_client(&mut self, connection: Connection) -> Result<(), RoomError> {
        if self.is_full() {
            return Err(RoomError::Full);
        }

        info!("Client {} connected", connection.session_id);
        self.clients
            .insert(connection.session_id.clone(), connection);
        Ok(())
    }

    pub fn remove_client(&mut self, session_id: &str) -> bool {
        if let Some(client) = self.clients.remove(session_id) {
            info!(
                "Client {} disconnected after {:.1}s",
                client.session_id,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.clients.contains_key(session_id)
    }

    pub fn send_to(&self, session_id: &str, message: &ServerMessage) {
        let Some(client) = self.clients.get(session_id) else {
            return;
        };

        match encode_server_message(message) {
            Ok(frame) => {
                if !client.send(frame) {
                    debug!("Dropped message for client {}", session_id);
                }
            }
            Err(e) => error!("Failed to encode message: {}", e),
        }
    }

    /// Sends to every client except `exclude`.
    pub fn broadcast(&self, message: &ServerMessage, exclude: Option<&str>) {
        let frame = match encode_server_message(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode broadcast: {}", e);
                return;
            }
        };

        for (session_id, client) in &self.clients {
            if Some(session_id.as_str()) == exclude {
                continue;
            }
            if !client.send(frame.clone()) {
                debug!("Dropped broadcast for client {}", session_id);
            }
        }
    }

    /// Encodes the snapshot at most once per format in use and sends it to all.
    pub fn broadcast_snapshot(&self, snapshot: &Snapshot) {
        let mut encoded: HashMap<SnapshotFormat, Frame> = HashMap::new();

        for (session_id, client) in &self.clients {
            let frame = match encoded.get(&client.format) {
                Some(frame) => frame.clone(),
                None => match encode_snapshot(snapshot, client.format) {
                    Ok(frame) => {
                        encoded.insert(client.format, frame.clone());
                        frame
                    }
                    Err(e) => {
                        error!("Failed to encode {} snapshot: {}", client.format.as_str(), e);
                        continue;
                    }
                },
            };

            if !client.send(frame) {
                debug!("Dropped snapshot for client {}", session_id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.clients.clear();
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
