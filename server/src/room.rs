//! Room session management.
//!
//! A `Room` owns one shared world: its entity store, character slots and
//! connected clients. All mutation happens on the room's own task; joins,
//! leaves, client messages and simulation ticks are queued onto a single
//! command loop so no two of them ever interleave. Other tasks talk to the
//! room only through a cloneable `RoomHandle`.

use crate::characters::CharacterSlots;
use crate::client_manager::{ClientManager, Connection, FrameSender};
use crate::clock::Clock;
use crate::error::RoomError;
use crate::game::GameState;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    ClientMessage, JoinOptions, MoveMessage, RoomListing, RoomMetadata, ServerMessage, Snapshot,
    SnapshotFormat, DEFAULT_MAX_CLIENTS, TICK_RATE,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Tunables shared by every room a directory creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Capacity used when a room is created without `maxClients`.
    pub default_max_clients: usize,
    /// Dispose the room as soon as its last client leaves.
    pub auto_dispose: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            default_max_clients: DEFAULT_MAX_CLIENTS,
            auto_dispose: true,
        }
    }
}

impl RoomConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    /// Fixed simulation step in seconds.
    pub fn delta_time(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Created,
    Active,
    Disposed,
}

/// Work queued onto a room's task.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        session_id: String,
        options: JoinOptions,
        format: SnapshotFormat,
        sender: FrameSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave {
        session_id: String,
        consented: bool,
    },
    Message {
        session_id: String,
        message: ClientMessage,
    },
    SetPrivate(bool),
    Dispose,
}

/// Room facts readable without a round trip through the command queue.
#[derive(Debug)]
pub struct RoomShared {
    room_id: String,
    room_type: String,
    metadata: RoomMetadata,
    clients: AtomicUsize,
    is_private: AtomicBool,
    disposed: AtomicBool,
}

impl RoomShared {
    fn new(room_id: &str, room_type: &str, metadata: RoomMetadata) -> Self {
        Self {
            room_id: room_id.to_string(),
            room_type: room_type.to_string(),
            is_private: AtomicBool::new(metadata.is_private),
            metadata,
            clients: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn listing(&self) -> RoomListing {
        let mut metadata = self.metadata.clone();
        metadata.is_private = self.is_private.load(Ordering::SeqCst);

        RoomListing {
            room_id: self.room_id.clone(),
            clients: self.clients.load(Ordering::SeqCst),
            max_clients: self.metadata.max_clients,
            metadata,
        }
    }
}

/// Cloneable sender side of a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    commands: mpsc::UnboundedSender<RoomCommand>,
    shared: Arc<RoomShared>,
}

impl RoomHandle {
    pub fn id(&self) -> &str {
        &self.shared.room_id
    }

    pub fn room_type(&self) -> &str {
        &self.shared.room_type
    }

    pub fn metadata(&self) -> &RoomMetadata {
        &self.shared.metadata
    }

    pub fn listing(&self) -> RoomListing {
        self.shared.listing()
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.load(Ordering::SeqCst)
    }

    pub fn max_clients(&self) -> usize {
        self.shared.metadata.max_clients
    }

    pub fn is_private(&self) -> bool {
        self.shared.is_private.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst) || self.commands.is_closed()
    }

    /// Whether join-or-create may place a new client here.
    pub fn is_joinable(&self) -> bool {
        !self.is_disposed() && !self.is_private() && self.client_count() < self.max_clients()
    }

    pub async fn join(
        &self,
        session_id: &str,
        options: JoinOptions,
        format: SnapshotFormat,
        sender: FrameSender,
    ) -> Result<(), RoomError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Join {
                session_id: session_id.to_string(),
                options,
                format,
                sender,
                reply,
            })
            .map_err(|_| RoomError::Disposed)?;

        response.await.unwrap_or(Err(RoomError::Disposed))
    }

    pub fn leave(&self, session_id: &str, consented: bool) {
        let _ = self.commands.send(RoomCommand::Leave {
            session_id: session_id.to_string(),
            consented,
        });
    }

    pub fn send_message(&self, session_id: &str, message: ClientMessage) {
        let _ = self.commands.send(RoomCommand::Message {
            session_id: session_id.to_string(),
            message,
        });
    }

    pub fn set_private(&self, is_private: bool) {
        let _ = self.commands.send(RoomCommand::SetPrivate(is_private));
    }

    /// Safe to call any number of times.
    pub fn dispose(&self) {
        let _ = self.commands.send(RoomCommand::Dispose);
    }
}

pub struct Room {
    id: String,
    config: RoomConfig,
    status: RoomStatus,
    state: GameState,
    slots: CharacterSlots,
    clients: ClientManager,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    shared: Arc<RoomShared>,
}

impl Room {
    pub fn create(
        room_id: &str,
        room_type: &str,
        options: &JoinOptions,
        config: RoomConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_rng(room_id, room_type, options, config, clock, StdRng::from_entropy())
    }

    /// Same as `create` with a caller-supplied random source.
    pub fn with_rng(
        room_id: &str,
        room_type: &str,
        options: &JoinOptions,
        config: RoomConfig,
        clock: Arc<dyn Clock>,
        rng: StdRng,
    ) -> Self {
        let metadata = RoomMetadata::from_options(options, config.default_max_clients);
        let shared = Arc::new(RoomShared::new(room_id, room_type, metadata.clone()));

        let mut room = Self {
            id: room_id.to_string(),
            config,
            status: RoomStatus::Created,
            state: GameState::new(clock.now_millis()),
            slots: CharacterSlots::new(),
            clients: ClientManager::new(metadata.max_clients),
            clock,
            rng,
            shared,
        };

        room.state.seed_npcs();
        room.status = RoomStatus::Active;

        info!(
            "Room {} \"{}\" created (max {} clients, {} Hz)",
            room.id, metadata.room_name, metadata.max_clients, config.tick_rate
        );
        room
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn slots(&self) -> &CharacterSlots {
        &self.slots
    }

    pub fn listing(&self) -> RoomListing {
        self.shared.listing()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn max_clients(&self) -> usize {
        self.clients.max_clients()
    }

    /// Admits a connection and creates its player.
    ///
    /// The only rejections are capacity, a disposed room and a session that
    /// is already joined; archetype collisions are logged and allowed.
    pub fn join(
        &mut self,
        session_id: &str,
        options: &JoinOptions,
        connection: Connection,
    ) -> Result<(), RoomError> {
        if self.status == RoomStatus::Disposed {
            return Err(RoomError::Disposed);
        }
        if self.clients.contains(session_id) {
            warn!("Session {} tried to join room {} twice", session_id, self.id);
            return Err(RoomError::DuplicateSession);
        }

        self.clients.add_client(connection)?;

        let character = options.character();
        let username = match options.username() {
            Some(name) => name.to_string(),
            None => self.generated_username(),
        };

        if self.slots.claim(character) {
            warn!(
                "Character {} already in use, assigning to {} anyway",
                character, session_id
            );
        }

        self.state
            .add_player(session_id, &username, character, &mut self.rng);

        self.clients.send_to(
            session_id,
            &ServerMessage::Joined {
                session_id: session_id.to_string(),
                room_id: self.id.clone(),
            },
        );
        self.clients.broadcast(
            &ServerMessage::PlayerJoined {
                player_id: session_id.to_string(),
                username: username.clone(),
            },
            Some(session_id),
        );

        self.publish_client_count();
        info!("Player {} ({}) joined room {}", username, session_id, self.id);
        Ok(())
    }

    /// `Player<N>` where N is the current player count, bumped past any
    /// name already taken in this room.
    fn generated_username(&self) -> String {
        let mut n = self.clients.len();
        loop {
            let candidate = format!("Player{}", n);
            if !self.state.players().any(|p| p.username == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Removes a session. Unknown sessions are a no-op.
    pub fn leave(&mut self, session_id: &str, consented: bool) -> bool {
        let was_connected = self.clients.remove_client(session_id);
        let player = self.state.remove_player(session_id);

        if let Some(player) = &player {
            self.slots.release(player.character_type);
            self.clients.broadcast(
                &ServerMessage::PlayerLeft {
                    player_id: session_id.to_string(),
                    username: player.username.clone(),
                },
                None,
            );
            info!(
                "Player \"{}\" ({}) left room {} (consented: {})",
                player.username, player.character_type, self.id, consented
            );
        }

        if !was_connected && player.is_none() {
            return false;
        }

        self.publish_client_count();

        if self.config.auto_dispose && self.clients.is_empty() {
            info!("Room {} is empty", self.id);
            self.dispose();
        }
        true
    }

    pub fn handle_message(&mut self, session_id: &str, message: ClientMessage) {
        if self.status != RoomStatus::Active {
            return;
        }
        if !self.clients.contains(session_id) {
            debug!("Ignoring message from unknown session {}", session_id);
            return;
        }

        match message {
            ClientMessage::Move(update) => self.handle_move(session_id, &update),
            ClientMessage::Chat { text } => self.handle_chat(session_id, text),
            ClientMessage::GetAvailableCharacters => {
                let response = self.available_characters();
                self.clients.send_to(session_id, &response);
            }
        }
    }

    fn handle_move(&mut self, session_id: &str, update: &MoveMessage) {
        let now = self.clock.now_millis();
        self.state.apply_move(session_id, update, now);
    }

    fn handle_chat(&mut self, session_id: &str, text: String) {
        let timestamp = self.clock.now_millis();
        self.clients.broadcast(
            &ServerMessage::Chat {
                player_id: session_id.to_string(),
                message: text,
                timestamp,
            },
            Some(session_id),
        );
    }

    pub fn available_characters(&self) -> ServerMessage {
        ServerMessage::AvailableCharacters {
            available: self.slots.available(),
            used: self.slots.used(),
        }
    }

    /// Runs one simulation step and broadcasts the snapshot.
    ///
    /// A fault inside the step is logged and the tick skipped; the room keeps
    /// running on the next interval.
    pub fn tick(&mut self) -> Option<Snapshot> {
        if self.status != RoomStatus::Active {
            return None;
        }

        let now = self.clock.now_millis();
        let dt = self.config.delta_time();

        let state = &mut self.state;
        let rng = &mut self.rng;
        let result = panic::catch_unwind(AssertUnwindSafe(|| state.step(now, dt, rng)));

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(_) => {
                error!("Room {} tick {} failed, skipping", self.id, self.state.tick);
                return None;
            }
        };

        if !self.clients.is_empty() {
            self.clients.broadcast_snapshot(&snapshot);
        }

        if snapshot.tick % 60 == 0 && !self.clients.is_empty() {
            debug!(
                "Room {} tick {}: {} clients, {} npcs",
                self.id,
                snapshot.tick,
                self.clients.len(),
                snapshot.npcs.len()
            );
        }

        Some(snapshot)
    }

    pub fn set_private(&mut self, is_private: bool) {
        self.shared.is_private.store(is_private, Ordering::SeqCst);
    }

    /// Stops the room for good. Later calls do nothing.
    pub fn dispose(&mut self) {
        if self.status == RoomStatus::Disposed {
            return;
        }

        self.status = RoomStatus::Disposed;
        self.clients.clear();
        self.shared.disposed.store(true, Ordering::SeqCst);
        self.publish_client_count();
        info!("Room {} disposed", self.id);
    }

    fn publish_client_count(&self) {
        self.shared
            .clients
            .store(self.clients.len(), Ordering::SeqCst);
    }

    fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                session_id,
                options,
                format,
                sender,
                reply,
            } => {
                let connection = Connection::new(&session_id, format, sender);
                let result = self.join(&session_id, &options, connection);
                let _ = reply.send(result);
            }
            RoomCommand::Leave {
                session_id,
                consented,
            } => {
                self.leave(&session_id, consented);
            }
            RoomCommand::Message {
                session_id,
                message,
            } => self.handle_message(&session_id, message),
            RoomCommand::SetPrivate(is_private) => self.set_private(is_private),
            RoomCommand::Dispose => self.dispose(),
        }
    }

    /// Moves the room onto its own task and returns a handle to it.
    pub fn spawn(self) -> (RoomHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let handle = RoomHandle {
            commands,
            shared: Arc::clone(&self.shared),
        };
        let task = tokio::spawn(self.run(receiver));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RoomCommand>) {
        let mut ticker = interval(self.config.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick fires immediately
        ticker.tick().await;

        while self.status == RoomStatus::Active {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => self.dispose(),
                },
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        // Fail any joins that raced with disposal
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let RoomCommand::Join { reply, .. } = command {
                let _ = reply.send(Err(RoomError::Disposed));
            }
        }
    }
}
