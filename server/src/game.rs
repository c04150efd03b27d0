use crate::npc::{self, STARTER_NPCS};
use log::{info, warn};
use rand::Rng;
use shared::{CharacterType, MoveMessage, Npc, Player, Snapshot, SPAWN_HALF_EXTENT};
use std::collections::{BTreeMap, HashMap};

/// Authoritative state of one room: every player and NPC plus server time.
///
/// Only the owning room mutates it, one operation at a time.
#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u64,
    /// Milliseconds since the Unix epoch, never decreasing.
    pub server_time: u64,
    players: HashMap<String, Player>,
    npcs: BTreeMap<String, Npc>,
    next_npc_id: u32,
}

impl GameState {
    pub fn new(server_time: u64) -> Self {
        Self {
            tick: 0,
            server_time,
            players: HashMap::new(),
            npcs: BTreeMap::new(),
            next_npc_id: 0,
        }
    }

    pub fn seed_npcs(&mut self) {
        for seed in STARTER_NPCS.iter() {
            let id = format!("npc_{}", self.next_npc_id);
            self.next_npc_id += 1;
            self.npcs.insert(id.clone(), seed.spawn(&id));
        }
        info!("Spawned {} NPCs", self.npcs.len());
    }

    /// Adds a player at a random spot inside the spawn square.
    /// Returns None if the session already owns a player.
    pub fn add_player<R: Rng + ?Sized>(
        &mut self,
        session_id: &str,
        username: &str,
        character_type: CharacterType,
        rng: &mut R,
    ) -> Option<&Player> {
        if self.players.contains_key(session_id) {
            warn!("Session {} already has a player", session_id);
            return None;
        }

        let spawn_x = rng.gen_range(-SPAWN_HALF_EXTENT..=SPAWN_HALF_EXTENT);
        let spawn_z = rng.gen_range(-SPAWN_HALF_EXTENT..=SPAWN_HALF_EXTENT);

        let mut player = Player::new(session_id, username, character_type, spawn_x, spawn_z);
        player.last_update = self.server_time;

        info!(
            "Player \"{}\" spawned at ({:.2}, {:.2})",
            player.username, player.x, player.z
        );
        self.players.insert(session_id.to_string(), player);
        self.players.get(session_id)
    }

    pub fn remove_player(&mut self, session_id: &str) -> Option<Player> {
        self.players.remove(session_id)
    }

    /// Applies a partial move. Unknown sessions are ignored.
    ///
    /// `now` only stamps the player; server time moves on ticks alone.
    pub fn apply_move(&mut self, session_id: &str, update: &MoveMessage, now: u64) -> bool {
        let Some(player) = self.players.get_mut(session_id) else {
            return false;
        };

        if let Some(x) = update.x.filter(|v| v.is_finite()) {
            player.x = x;
        }
        if let Some(y) = update.y.filter(|v| v.is_finite()) {
            player.y = y;
        }
        if let Some(z) = update.z.filter(|v| v.is_finite()) {
            player.z = z;
        }
        if let Some(rotation) = update.rotation.filter(|v| v.is_finite()) {
            player.heading = rotation;
        }
        player.is_moving = update.is_moving.unwrap_or(false);
        player.last_update = player.last_update.max(now);
        true
    }

    /// Moves server time forward to `now`; a clock that steps back is ignored.
    fn advance_time(&mut self, now: u64) -> u64 {
        self.server_time = self.server_time.max(now);
        self.server_time
    }

    /// Runs one simulation step and returns the resulting snapshot.
    pub fn step<R: Rng + ?Sized>(&mut self, now: u64, dt: f32, rng: &mut R) -> Snapshot {
        let server_time = self.advance_time(now);
        let server_time_secs = server_time as f64 / 1000.0;

        for npc in self.npcs.values_mut() {
            npc::advance(npc, dt, server_time_secs, rng);
        }

        self.tick += 1;
        self.snapshot()
    }

    /// Full copy of replicated state, players ordered by id.
    pub fn snapshot(&self) -> Snapshot {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));

        Snapshot {
            tick: self.tick,
            server_time: self.server_time,
            players,
            npcs: self.npcs.values().cloned().collect(),
        }
    }

    pub fn player(&self, session_id: &str) -> Option<&Player> {
        self.players.get(session_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn npc(&self, id: &str) -> Option<&Npc> {
        self.npcs.get(id)
    }

    pub fn npc_by_name(&self, name: &str) -> Option<&Npc> {
        self.npcs.values().find(|npc| npc.name == name)
    }

    pub fn npcs(&self) -> impl Iterator<Item = &Npc> {
        self.npcs.values()
    }
}
