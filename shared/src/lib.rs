use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod protocol;

pub use protocol::{
    decode_server_frame, encode_server_message, encode_snapshot, ClientMessage, CodecError, Frame,
    JoinOptions, MoveMessage, RoomListing, RoomMetadata, ServerMessage, Snapshot, SnapshotFormat,
};

pub const TICK_RATE: u32 = 60;
pub const DEFAULT_MAX_CLIENTS: usize = 50;
pub const MIN_ROOM_CLIENTS: usize = 1;
pub const MAX_ROOM_CLIENTS: usize = 100;
pub const DEFAULT_ROOM_NAME: &str = "Game Room";

/// Half-width of the square players spawn in, centred on the origin.
pub const SPAWN_HALF_EXTENT: f32 = 5.0;
/// Wandering NPCs are kept inside [-WORLD_BOUND, WORLD_BOUND] on x and z.
pub const WORLD_BOUND: f32 = 45.0;

pub const NPC_DEFAULT_SPEED: f32 = 1.5;
pub const NPC_DEFAULT_HEALTH: f32 = 100.0;
pub const PLAYER_RADIUS: f32 = 0.5;
pub const NPC_RADIUS: f32 = 0.6;

/// Visual archetype a player picks when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CharacterType {
    #[default]
    Warrior,
    Mage,
    Archer,
    Rogue,
}

impl CharacterType {
    pub const ALL: [CharacterType; 4] = [
        CharacterType::Warrior,
        CharacterType::Mage,
        CharacterType::Archer,
        CharacterType::Rogue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterType::Warrior => "warrior",
            CharacterType::Mage => "mage",
            CharacterType::Archer => "archer",
            CharacterType::Rogue => "rogue",
        }
    }

    /// Parses a requested archetype, falling back to the default for
    /// missing or unrecognised values.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for CharacterType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CharacterType::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl fmt::Display for CharacterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NpcArchetype {
    Villager,
    Merchant,
    Guard,
    Animal,
}

/// Movement strategy driving an NPC on every simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NpcBehavior {
    Idle,
    Wander,
    Patrol,
}

/// Circular orbit followed by patrolling NPCs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatrolRoute {
    pub center_x: f32,
    pub center_z: f32,
    pub radius: f32,
    /// Radians per second.
    pub angular_rate: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub username: String,
    pub character_type: CharacterType,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(rename = "rotation")]
    pub heading: f32,
    pub is_moving: bool,
    /// Server time (ms) of the last accepted update.
    #[serde(rename = "timestamp")]
    pub last_update: u64,
}

impl Player {
    pub fn new(id: &str, username: &str, character_type: CharacterType, x: f32, z: f32) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            character_type,
            x,
            y: 0.0,
            z,
            heading: 0.0,
            is_moving: false,
            last_update: 0,
        }
    }

    pub fn collider(&self) -> CircleCollider {
        CircleCollider {
            x: self.x,
            z: self.z,
            radius: PLAYER_RADIUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Npc {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub archetype: NpcArchetype,
    pub behavior: NpcBehavior,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(rename = "rotation")]
    pub heading: f32,
    pub speed: f32,
    pub health: f32,
    pub max_health: f32,
    pub is_interactable: bool,
    pub patrol: Option<PatrolRoute>,
}

impl Npc {
    pub fn new(
        id: &str,
        name: &str,
        archetype: NpcArchetype,
        behavior: NpcBehavior,
        x: f32,
        z: f32,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            archetype,
            behavior,
            x,
            y: 0.0,
            z,
            heading: 0.0,
            speed: NPC_DEFAULT_SPEED,
            health: NPC_DEFAULT_HEALTH,
            max_health: NPC_DEFAULT_HEALTH,
            is_interactable: true,
            patrol: None,
        }
    }

    pub fn with_patrol(mut self, route: PatrolRoute) -> Self {
        self.patrol = Some(route);
        self
    }

    pub fn collider(&self) -> CircleCollider {
        CircleCollider {
            x: self.x,
            z: self.z,
            radius: NPC_RADIUS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleCollider {
    pub x: f32,
    pub z: f32,
    pub radius: f32,
}

pub fn check_circle_collision(a: &CircleCollider, b: &CircleCollider) -> bool {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    let min_distance = a.radius + b.radius;

    dx * dx + dz * dz < min_distance * min_distance
}

/// Pushes `a` out of `b` along the line between their centres and
/// returns the corrected position of `a`. `b` is treated as immovable.
pub fn resolve_circle_collision(a: &CircleCollider, b: &CircleCollider) -> (f32, f32) {
    if !check_circle_collision(a, b) {
        return (a.x, a.z);
    }

    let dx = a.x - b.x;
    let dz = a.z - b.z;
    let distance = (dx * dx + dz * dz).sqrt();

    if distance < 0.001 {
        return (a.x + a.radius + b.radius, a.z);
    }

    let overlap = a.radius + b.radius - distance;
    let nx = dx / distance;
    let nz = dz / distance;

    (a.x + nx * overlap, a.z + nz * overlap)
}

/// Maps any angle into [0, 2π).
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Signed difference `to - from` wrapped into (-π, π].
pub fn shortest_angle_delta(from: f32, to: f32) -> f32 {
    let mut diff = normalize_angle(to) - normalize_angle(from);
    if diff > PI {
        diff -= TAU;
    } else if diff <= -PI {
        diff += TAU;
    }
    diff
}

/// Milliseconds since the Unix epoch.
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
