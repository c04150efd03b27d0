use crate::interpolation::{InterpolationConfig, Interpolator, NetworkState};
use log::{debug, info, warn};
use shared::{CharacterType, CircleCollider, Npc, Player, ServerMessage, Snapshot};
use std::collections::{BTreeMap, VecDeque};

const CHAT_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    LocalPlayer,
    RemotePlayer,
    Npc,
}

/// Something a renderer would draw this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEntity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub state: NetworkState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub player_id: String,
    pub username: Option<String>,
    pub message: String,
    pub timestamp: u64,
}

/// Client-side replica of one room.
///
/// Remote players and NPCs are drawn through an interpolator each; the local
/// player is drawn exactly where the client last put it.
pub struct ClientGameState {
    config: InterpolationConfig,
    pub session_id: Option<String>,
    pub room_id: Option<String>,
    last_snapshot: Option<Snapshot>,
    local_player: Option<Player>,
    players: BTreeMap<String, Interpolator>,
    npcs: BTreeMap<String, Interpolator>,
    chat_log: VecDeque<ChatEntry>,
    available_characters: Option<(Vec<CharacterType>, Vec<CharacterType>)>,
    last_error: Option<String>,
}

impl ClientGameState {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            session_id: None,
            room_id: None,
            last_snapshot: None,
            local_player: None,
            players: BTreeMap::new(),
            npcs: BTreeMap::new(),
            chat_log: VecDeque::new(),
            available_characters: None,
            last_error: None,
        }
    }

    pub fn apply_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Joined {
                session_id,
                room_id,
            } => {
                info!("Joined room {} as {}", room_id, session_id);
                self.session_id = Some(session_id);
                self.room_id = Some(room_id);
            }
            ServerMessage::PlayerJoined {
                player_id,
                username,
            } => {
                info!("{} ({}) joined", username, player_id);
            }
            ServerMessage::PlayerLeft {
                player_id,
                username,
            } => {
                info!("{} ({}) left", username, player_id);
                self.players.remove(&player_id);
            }
            ServerMessage::Chat {
                player_id,
                message,
                timestamp,
            } => {
                let username = self.username_of(&player_id);
                info!(
                    "[chat] {}: {}",
                    username.as_deref().unwrap_or(&player_id),
                    message
                );
                self.chat_log.push_back(ChatEntry {
                    player_id,
                    username,
                    message,
                    timestamp,
                });
                while self.chat_log.len() > CHAT_HISTORY {
                    self.chat_log.pop_front();
                }
            }
            ServerMessage::AvailableCharacters { available, used } => {
                debug!("Available characters: {:?}, in use: {:?}", available, used);
                self.available_characters = Some((available, used));
            }
            ServerMessage::State(snapshot) => self.apply_snapshot(snapshot),
            ServerMessage::Error { message } => {
                warn!("Server error: {}", message);
                self.last_error = Some(message);
            }
        }
    }

    /// Retargets every interpolator from a full snapshot. Entities missing
    /// from the snapshot are dropped; an out-of-order snapshot is ignored.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        if let Some(last) = &self.last_snapshot {
            if snapshot.tick < last.tick {
                debug!("Ignoring stale snapshot {} < {}", snapshot.tick, last.tick);
                return;
            }
        }

        let config = self.config;
        let local_id = self.session_id.clone();
        self.players
            .retain(|id, _| snapshot.players.iter().any(|p| &p.id == id));
        self.npcs
            .retain(|id, _| snapshot.npcs.iter().any(|n| &n.id == id));

        for player in &snapshot.players {
            if Some(&player.id) == local_id.as_ref() {
                if self.local_player.is_none() {
                    self.local_player = Some(player.clone());
                }
                continue;
            }
            self.players
                .entry(player.id.clone())
                .or_insert_with(|| Interpolator::new(config))
                .set_target(NetworkState::from(player));
        }

        for npc in &snapshot.npcs {
            self.npcs
                .entry(npc.id.clone())
                .or_insert_with(|| Interpolator::new(config))
                .set_target(NetworkState::from_npc(npc, snapshot.server_time));
        }

        self.last_snapshot = Some(snapshot);
    }

    /// Advances every interpolator by one rendered frame.
    pub fn step_frame(&mut self) {
        for interpolator in self.players.values_mut().chain(self.npcs.values_mut()) {
            interpolator.step();
        }
    }

    /// Moves the local player. Its position is never smoothed.
    pub fn set_local_position(&mut self, x: f32, z: f32, heading: f32, is_moving: bool) {
        if let Some(player) = self.local_player.as_mut() {
            player.x = x;
            player.z = z;
            player.heading = heading;
            player.is_moving = is_moving;
        }
    }

    pub fn render_entities(&self) -> Vec<RenderEntity> {
        let mut entities = Vec::new();

        if let Some(player) = &self.local_player {
            entities.push(RenderEntity {
                id: player.id.clone(),
                name: player.username.clone(),
                kind: EntityKind::LocalPlayer,
                state: NetworkState::from(player),
            });
        }

        for (id, interpolator) in &self.players {
            if let Some(state) = interpolator.current() {
                entities.push(RenderEntity {
                    id: id.clone(),
                    name: self.username_of(id).unwrap_or_else(|| id.clone()),
                    kind: EntityKind::RemotePlayer,
                    state,
                });
            }
        }

        for (id, interpolator) in &self.npcs {
            if let Some(state) = interpolator.current() {
                let name = self
                    .snapshot_npc(id)
                    .map(|npc| npc.name.clone())
                    .unwrap_or_else(|| id.clone());
                entities.push(RenderEntity {
                    id: id.clone(),
                    name,
                    kind: EntityKind::Npc,
                    state,
                });
            }
        }

        entities
    }

    /// Colliders of every NPC as of the last snapshot.
    pub fn npc_colliders(&self) -> Vec<CircleCollider> {
        self.last_snapshot
            .as_ref()
            .map(|s| s.npcs.iter().map(Npc::collider).collect())
            .unwrap_or_default()
    }

    fn username_of(&self, player_id: &str) -> Option<String> {
        self.last_snapshot
            .as_ref()?
            .players
            .iter()
            .find(|p| p.id == player_id)
            .map(|p| p.username.clone())
    }

    fn snapshot_npc(&self, npc_id: &str) -> Option<&Npc> {
        self.last_snapshot
            .as_ref()?
            .npcs
            .iter()
            .find(|n| n.id == npc_id)
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.local_player.as_ref()
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn remote_player_count(&self) -> usize {
        self.players.len()
    }

    pub fn npc_count(&self) -> usize {
        self.npcs.len()
    }

    pub fn chat_log(&self) -> impl Iterator<Item = &ChatEntry> {
        self.chat_log.iter()
    }

    pub fn available_characters(&self) -> Option<&(Vec<CharacterType>, Vec<CharacterType>)> {
        self.available_characters.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new(InterpolationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{NpcArchetype, NpcBehavior};

    fn player(id: &str, x: f32) -> Player {
        Player::new(id, &format!("user-{}", id), CharacterType::Warrior, x, 0.0)
    }

    fn snapshot(tick: u64, players: Vec<Player>, npcs: Vec<Npc>) -> Snapshot {
        Snapshot {
            tick,
            server_time: 1_000 + tick,
            players,
            npcs,
        }
    }

    fn joined_state() -> ClientGameState {
        let mut state = ClientGameState::default();
        state.apply_server_message(ServerMessage::Joined {
            session_id: "me".to_string(),
            room_id: "r1".to_string(),
        });
        state
    }

    #[test]
    fn test_local_player_not_interpolated() {
        let mut state = joined_state();
        state.apply_snapshot(snapshot(1, vec![player("me", 1.0), player("other", 2.0)], vec![]));

        assert_eq!(state.remote_player_count(), 1);
        state.set_local_position(4.0, 4.0, 0.0, true);
        state.apply_snapshot(snapshot(2, vec![player("me", 1.0), player("other", 2.0)], vec![]));

        let local = state.local_player().unwrap();
        assert_eq!((local.x, local.z), (4.0, 4.0));
    }

    #[test]
    fn test_remote_players_smoothed() {
        let mut state = joined_state();
        state.apply_snapshot(snapshot(1, vec![player("other", 0.0)], vec![]));
        state.apply_snapshot(snapshot(2, vec![player("other", 10.0)], vec![]));
        state.step_frame();

        let entity = state
            .render_entities()
            .into_iter()
            .find(|e| e.id == "other")
            .unwrap();
        assert_eq!(entity.kind, EntityKind::RemotePlayer);
        assert_eq!(entity.name, "user-other");
        assert_approx_eq!(entity.state.x, 1.5);
    }

    #[test]
    fn test_departed_entities_dropped() {
        let mut state = joined_state();
        let dog = Npc::new("npc_3", "Dog", NpcArchetype::Animal, NpcBehavior::Wander, -5.0, -5.0);
        state.apply_snapshot(snapshot(1, vec![player("a", 0.0), player("b", 0.0)], vec![dog]));
        assert_eq!((state.remote_player_count(), state.npc_count()), (2, 1));

        state.apply_snapshot(snapshot(2, vec![player("a", 0.0)], vec![]));
        assert_eq!((state.remote_player_count(), state.npc_count()), (1, 0));
    }

    #[test]
    fn test_stale_snapshot_ignored() {
        let mut state = joined_state();
        state.apply_snapshot(snapshot(5, vec![player("a", 3.0)], vec![]));
        state.apply_snapshot(snapshot(4, vec![], vec![]));
        assert_eq!(state.last_snapshot().unwrap().tick, 5);
        assert_eq!(state.remote_player_count(), 1);
    }

    #[test]
    fn test_chat_and_characters_recorded() {
        let mut state = joined_state();
        state.apply_snapshot(snapshot(1, vec![player("a", 0.0)], vec![]));
        state.apply_server_message(ServerMessage::Chat {
            player_id: "a".to_string(),
            message: "hi".to_string(),
            timestamp: 42,
        });
        state.apply_server_message(ServerMessage::AvailableCharacters {
            available: vec![CharacterType::Mage],
            used: vec![CharacterType::Warrior],
        });

        let entry = state.chat_log().next().unwrap();
        assert_eq!(entry.username.as_deref(), Some("user-a"));
        assert_eq!(entry.message, "hi");
        assert_eq!(
            state.available_characters().unwrap().1,
            vec![CharacterType::Warrior]
        );
    }

    #[test]
    fn test_chat_history_is_bounded() {
        let mut state = joined_state();
        for i in 0..(CHAT_HISTORY + 10) {
            state.apply_server_message(ServerMessage::Chat {
                player_id: "a".to_string(),
                message: format!("m{}", i),
                timestamp: i as u64,
            });
        }
        assert_eq!(state.chat_log().count(), CHAT_HISTORY);
        assert_eq!(state.chat_log().next().unwrap().message, "m10");
    }
}
