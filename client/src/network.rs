//! Websocket connection to a room server.

use crate::game::ClientGameState;
use crate::input::BotController;
use crate::interpolation::InterpolationConfig;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{decode_server_frame, ClientMessage, Frame, JoinOptions, ServerMessage, SnapshotFormat};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const STATS_INTERVAL: Duration = Duration::from_secs(5);
const BOT_LOOP_EXTENT: f32 = 4.0;
const BOT_SPEED: f32 = 3.0;

/// How and where to connect.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the server, e.g. `ws://127.0.0.1:2567`.
    pub server: String,
    pub room_type: String,
    pub join: JoinOptions,
    pub format: SnapshotFormat,
    pub room_id: Option<String>,
    pub create: bool,
    pub fake_ping_ms: u64,
    pub bot: bool,
    pub interpolation: InterpolationConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server: "ws://127.0.0.1:2567".to_string(),
            room_type: "game_room".to_string(),
            join: JoinOptions::default(),
            format: SnapshotFormat::Json,
            room_id: None,
            create: false,
            fake_ping_ms: 0,
            bot: false,
            interpolation: InterpolationConfig::default(),
        }
    }
}

impl ClientOptions {
    /// Websocket URL carrying the join options in its query string.
    pub fn url(&self) -> String {
        let mut pairs = self.join.to_pairs();
        pairs.push(("format", self.format.as_str().to_string()));
        if let Some(room_id) = &self.room_id {
            pairs.push(("roomId", room_id.clone()));
        }
        if self.create {
            pairs.push(("create", "true".to_string()));
        }

        let query: Vec<String> = pairs
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect();

        format!(
            "{}/ws/{}?{}",
            self.server.trim_end_matches('/'),
            urlencoding::encode(&self.room_type),
            query.join("&")
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClientStats {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub snapshots: u64,
    pub dropped: u64,
}

enum Incoming {
    Message(ServerMessage),
    Closed,
    Ignored,
}

pub struct Client {
    socket: WsStream,
    game_state: ClientGameState,
    bot_enabled: bool,
    bot: Option<BotController>,
    fake_ping_ms: u64,
    stats: ClientStats,
}

impl Client {
    pub async fn connect(options: &ClientOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let url = options.url();
        info!("Connecting to {}", url);

        let (socket, _response) = connect_async(url.as_str()).await?;

        Ok(Client {
            socket,
            game_state: ClientGameState::new(options.interpolation),
            bot_enabled: options.bot,
            bot: None,
            fake_ping_ms: options.fake_ping_ms,
            stats: ClientStats::default(),
        })
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let text = message.to_json()?;
        self.socket.send(Message::Text(text)).await?;
        self.stats.messages_sent += 1;
        Ok(())
    }

    /// Waits for the next server message, applies it to the local replica and
    /// returns it. `None` once the connection has closed.
    pub async fn receive(&mut self) -> Result<Option<ServerMessage>, Box<dyn std::error::Error>> {
        while let Some(message) = self.socket.next().await {
            match self.process(message?).await {
                Incoming::Message(message) => return Ok(Some(message)),
                Incoming::Closed => return Ok(None),
                Incoming::Ignored => {}
            }
        }
        Ok(None)
    }

    async fn process(&mut self, message: Message) -> Incoming {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let frame = match message {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(bytes) => Frame::Binary(bytes),
            Message::Close(reason) => {
                info!("Server closed the connection: {:?}", reason);
                return Incoming::Closed;
            }
            _ => return Incoming::Ignored,
        };

        match decode_server_frame(&frame) {
            Ok(message) => {
                self.stats.messages_received += 1;
                if matches!(message, ServerMessage::State(_)) {
                    self.stats.snapshots += 1;
                }
                self.game_state.apply_server_message(message.clone());
                Incoming::Message(message)
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!("Dropping undecodable server frame: {}", e);
                Incoming::Ignored
            }
        }
    }

    /// One rendered frame: advance interpolation and, in bot mode, walk.
    async fn frame(&mut self, dt: f32) -> Result<(), Box<dyn std::error::Error>> {
        self.game_state.step_frame();

        if !self.bot_enabled {
            return Ok(());
        }

        if self.bot.is_none() {
            if let Some(player) = self.game_state.local_player() {
                debug!("Starting bot walk at ({:.2}, {:.2})", player.x, player.z);
                self.bot = Some(BotController::new(
                    player.x,
                    player.z,
                    BOT_LOOP_EXTENT,
                    BOT_SPEED,
                ));
            }
        }

        let colliders = self.game_state.npc_colliders();
        let update = match self.bot.as_mut() {
            Some(bot) => bot.update(dt, &colliders),
            None => None,
        };

        if let Some(update) = update {
            if let (Some(x), Some(z)) = (update.x, update.z) {
                self.game_state.set_local_position(
                    x,
                    z,
                    update.rotation.unwrap_or_default(),
                    update.is_moving.unwrap_or(false),
                );
            }
            self.send(&ClientMessage::Move(update)).await?;
        }
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.send(&ClientMessage::GetAvailableCharacters).await?;

        let mut frame_interval = interval(FRAME_INTERVAL);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_interval = interval(STATS_INTERVAL);
        let dt = FRAME_INTERVAL.as_secs_f32();

        loop {
            tokio::select! {
                message = self.socket.next() => match message {
                    Some(Ok(message)) => {
                        if let Incoming::Closed = self.process(message).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Connection error: {}", e);
                        break;
                    }
                    None => break,
                },

                _ = frame_interval.tick() => {
                    if let Err(e) = self.frame(dt).await {
                        error!("Error sending move: {}", e);
                    }
                },

                _ = stats_interval.tick() => {
                    let snapshot_tick = self.game_state.last_snapshot().map(|s| s.tick);
                    info!(
                        "Tick {:?}: {} remote players, {} NPCs, {} received, {} sent, {} dropped",
                        snapshot_tick,
                        self.game_state.remote_player_count(),
                        self.game_state.npc_count(),
                        self.stats.messages_received,
                        self.stats.messages_sent,
                        self.stats.dropped
                    );
                },
            }
        }

        info!("Disconnected");
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.socket.close(None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_contains_join_options() {
        let options = ClientOptions {
            join: JoinOptions {
                character_type: Some("mage".to_string()),
                username: Some("Ann Lee".to_string()),
                max_clients: Some(8.0),
                ..Default::default()
            },
            format: SnapshotFormat::Binary,
            ..Default::default()
        };

        let url = options.url();
        assert!(url.starts_with("ws://127.0.0.1:2567/ws/game_room?"));
        assert!(url.contains("characterType=mage"));
        assert!(url.contains("username=Ann%20Lee"));
        assert!(url.contains("maxClients=8"));
        assert!(url.contains("format=binary"));
        assert!(!url.contains("create="));
    }

    #[test]
    fn test_url_by_room_id() {
        let options = ClientOptions {
            server: "ws://example.test:9000/".to_string(),
            room_id: Some("abc123".to_string()),
            create: true,
            ..Default::default()
        };
        let url = options.url();
        assert!(url.starts_with("ws://example.test:9000/ws/game_room?"));
        assert!(url.contains("roomId=abc123"));
        assert!(url.contains("create=true"));
    }
}
