//! Wire protocol shared by the room server and its clients.
//!
//! Control traffic travels as JSON text frames using a `{"type", "data"}`
//! envelope in both directions. The per-tick state snapshot is either sent
//! in the same envelope or, for clients that ask for it, as a compact
//! bincode binary frame.

use crate::{CharacterType, Npc, Player, DEFAULT_ROOM_NAME, MAX_ROOM_CLIENTS, MIN_ROOM_CLIENTS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// Messages a joined client may send to its room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    Move(MoveMessage),
    Chat {
        #[serde(default)]
        text: String,
    },
    GetAvailableCharacters,
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Partial position update. Omitted fields leave the player unchanged,
/// except `is_moving` which resets to false.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoveMessage {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub rotation: Option<f32>,
    pub is_moving: Option<bool>,
}

/// Messages a room sends to its clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Joined {
        session_id: String,
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        player_id: String,
        username: String,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        player_id: String,
        username: String,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        player_id: String,
        message: String,
        timestamp: u64,
    },
    AvailableCharacters {
        available: Vec<CharacterType>,
        used: Vec<CharacterType>,
    },
    State(Snapshot),
    Error { message: String },
}

/// Full copy of a room's replicated state at the end of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tick: u64,
    pub server_time: u64,
    pub players: Vec<Player>,
    pub npcs: Vec<Npc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SnapshotFormat {
    #[default]
    Json,
    Binary,
}

impl SnapshotFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Binary => "binary",
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = crate::UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(SnapshotFormat::Json),
            "binary" | "bin" => Ok(SnapshotFormat::Binary),
            other => Err(crate::UnknownVariant(other.to_string())),
        }
    }
}

/// A single websocket payload, independent of the websocket library in use.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json codec: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary codec: {0}")]
    Binary(#[from] bincode::Error),
}

#[derive(Serialize)]
struct StateEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a Snapshot,
}

pub fn encode_server_message(message: &ServerMessage) -> Result<Frame, CodecError> {
    Ok(Frame::Text(serde_json::to_string(message)?))
}

/// Encodes a snapshot without cloning it into a `ServerMessage`.
pub fn encode_snapshot(snapshot: &Snapshot, format: SnapshotFormat) -> Result<Frame, CodecError> {
    match format {
        SnapshotFormat::Json => Ok(Frame::Text(serde_json::to_string(&StateEnvelope {
            kind: "state",
            data: snapshot,
        })?)),
        SnapshotFormat::Binary => Ok(Frame::Binary(bincode::serialize(snapshot)?)),
    }
}

/// Binary frames only ever carry snapshots.
pub fn decode_server_frame(frame: &Frame) -> Result<ServerMessage, CodecError> {
    match frame {
        Frame::Text(text) => Ok(serde_json::from_str(text)?),
        Frame::Binary(bytes) => Ok(ServerMessage::State(bincode::deserialize(bytes)?)),
    }
}

/// Options supplied when a client creates or joins a room.
///
/// Every field is optional; malformed values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinOptions {
    pub character_type: Option<String>,
    pub username: Option<String>,
    pub room_name: Option<String>,
    pub max_clients: Option<f64>,
    pub is_private: Option<bool>,
    pub mode: Option<String>,
    pub map_name: Option<String>,
}

impl JoinOptions {
    /// Builds options from decoded query-string pairs, ignoring unknown keys
    /// and values that do not parse.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut options = JoinOptions::default();
        for (key, value) in pairs {
            match key {
                "characterType" => options.character_type = non_empty(value),
                "username" => options.username = non_empty(value),
                "roomName" => options.room_name = non_empty(value),
                "maxClients" => {
                    options.max_clients = value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
                }
                "isPrivate" => options.is_private = value.trim().parse::<bool>().ok(),
                "mode" => options.mode = non_empty(value),
                "mapName" => options.map_name = non_empty(value),
                _ => {}
            }
        }
        options
    }

    /// Inverse of `from_pairs`, used by clients to build a join URL.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(v) = &self.character_type {
            pairs.push(("characterType", v.clone()));
        }
        if let Some(v) = &self.username {
            pairs.push(("username", v.clone()));
        }
        if let Some(v) = &self.room_name {
            pairs.push(("roomName", v.clone()));
        }
        if let Some(v) = self.max_clients {
            pairs.push(("maxClients", v.to_string()));
        }
        if let Some(v) = self.is_private {
            pairs.push(("isPrivate", v.to_string()));
        }
        if let Some(v) = &self.mode {
            pairs.push(("mode", v.clone()));
        }
        if let Some(v) = &self.map_name {
            pairs.push(("mapName", v.clone()));
        }
        pairs
    }

    pub fn character(&self) -> CharacterType {
        CharacterType::parse_or_default(self.character_type.as_deref())
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// Value of a matchmaking filter key, as used by the room directory.
    pub fn filter_value(&self, key: &str) -> Option<&str> {
        match key {
            "mode" => self.mode.as_deref(),
            "mapName" => self.map_name.as_deref(),
            "roomName" => self.room_name.as_deref(),
            _ => None,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Floors and clamps a requested capacity into the supported range.
/// Non-finite values are rejected so the caller can fall back to a default.
pub fn clamp_max_clients(requested: f64) -> Option<usize> {
    if !requested.is_finite() {
        return None;
    }
    let floored = requested.floor();
    let clamped = floored.clamp(MIN_ROOM_CLIENTS as f64, MAX_ROOM_CLIENTS as f64);
    Some(clamped as usize)
}

/// Room description published to the directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetadata {
    pub room_name: String,
    pub max_clients: usize,
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub map_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_by: Option<String>,
}

impl RoomMetadata {
    pub fn from_options(options: &JoinOptions, default_max_clients: usize) -> Self {
        let max_clients = options
            .max_clients
            .and_then(clamp_max_clients)
            .unwrap_or(default_max_clients);

        let room_name = options
            .room_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_ROOM_NAME)
            .to_string();

        Self {
            room_name,
            max_clients,
            is_private: options.is_private.unwrap_or(false),
            mode: options.mode.clone(),
            map_name: options.map_name.clone(),
            created_by: options.username().map(str::to_string),
        }
    }

    /// Flattened view used when matching directory filters.
    pub fn filter_values(&self) -> BTreeMap<&'static str, Option<&str>> {
        let mut values = BTreeMap::new();
        values.insert("mode", self.mode.as_deref());
        values.insert("mapName", self.map_name.as_deref());
        values.insert("roomName", Some(self.room_name.as_str()));
        values
    }
}

/// One entry of the `GET /rooms/{roomName}` discovery response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListing {
    pub room_id: String,
    pub clients: usize,
    pub max_clients: usize,
    pub metadata: RoomMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NpcArchetype, NpcBehavior, PatrolRoute};

    fn sample_snapshot() -> Snapshot {
        let guard = Npc::new("npc_2", "Guard Tom", NpcArchetype::Guard, NpcBehavior::Patrol, 0.0, -10.0)
            .with_patrol(PatrolRoute {
                center_x: 0.0,
                center_z: -10.0,
                radius: 5.0,
                angular_rate: 0.5,
            });
        Snapshot {
            tick: 42,
            server_time: 1_700_000_000_000,
            players: vec![Player::new("s1", "Alice", CharacterType::Rogue, 1.0, 2.0)],
            npcs: vec![guard],
        }
    }

    #[test]
    fn test_client_message_parsing() {
        let msg = ClientMessage::from_json(r#"{"type":"move","data":{"x":1.5,"isMoving":true}}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Move(MoveMessage {
                x: Some(1.5),
                is_moving: Some(true),
                ..Default::default()
            })
        );

        let msg = ClientMessage::from_json(r#"{"type":"chat","data":{"text":"hi"}}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Chat {
                text: "hi".to_string()
            }
        );

        let msg = ClientMessage::from_json(r#"{"type":"get_available_characters"}"#).unwrap();
        assert_eq!(msg, ClientMessage::GetAvailableCharacters);
    }

    #[test]
    fn test_empty_move_is_all_none() {
        let msg = ClientMessage::from_json(r#"{"type":"move","data":{}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Move(MoveMessage::default()));
    }

    #[test]
    fn test_unknown_client_message_is_error() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport","data":{}}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::PlayerLeft {
            player_id: "s1".to_string(),
            username: "Alice".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "player_left");
        assert_eq!(value["data"]["playerId"], "s1");
        assert_eq!(value["data"]["username"], "Alice");

        let msg = ServerMessage::AvailableCharacters {
            available: vec![CharacterType::Mage],
            used: vec![CharacterType::Warrior],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "available_characters");
        assert_eq!(value["data"]["available"][0], "mage");
        assert_eq!(value["data"]["used"][0], "warrior");
    }

    #[test]
    fn test_snapshot_json_envelope_matches_server_message() {
        let snapshot = sample_snapshot();
        let frame = encode_snapshot(&snapshot, SnapshotFormat::Json).unwrap();
        match &frame {
            Frame::Text(text) => assert!(text.starts_with(r#"{"type":"state""#)),
            Frame::Binary(_) => panic!("expected text frame"),
        }
        assert_eq!(decode_server_frame(&frame).unwrap(), ServerMessage::State(snapshot));
    }

    #[test]
    fn test_snapshot_binary_frame() {
        let snapshot = sample_snapshot();
        let frame = encode_snapshot(&snapshot, SnapshotFormat::Binary).unwrap();
        let json = encode_snapshot(&snapshot, SnapshotFormat::Json).unwrap();
        match (&frame, &json) {
            (Frame::Binary(bytes), Frame::Text(text)) => assert!(bytes.len() < text.len()),
            _ => panic!("unexpected frame kinds"),
        }
        assert_eq!(decode_server_frame(&frame).unwrap(), ServerMessage::State(snapshot));
    }

    #[test]
    fn test_snapshot_format_parse() {
        assert_eq!("json".parse::<SnapshotFormat>(), Ok(SnapshotFormat::Json));
        assert_eq!("Binary".parse::<SnapshotFormat>(), Ok(SnapshotFormat::Binary));
        assert!("xml".parse::<SnapshotFormat>().is_err());
    }

    #[test]
    fn test_clamp_max_clients() {
        assert_eq!(clamp_max_clients(150.0), Some(100));
        assert_eq!(clamp_max_clients(0.0), Some(1));
        assert_eq!(clamp_max_clients(-20.0), Some(1));
        assert_eq!(clamp_max_clients(12.9), Some(12));
        assert_eq!(clamp_max_clients(f64::NAN), None);
        assert_eq!(clamp_max_clients(f64::INFINITY), None);
    }

    #[test]
    fn test_join_options_from_pairs_tolerates_garbage() {
        let options = JoinOptions::from_pairs(vec![
            ("characterType", "mage"),
            ("username", "  "),
            ("maxClients", "lots"),
            ("isPrivate", "maybe"),
            ("mode", "pvp"),
            ("unknown", "x"),
        ]);
        assert_eq!(options.character(), CharacterType::Mage);
        assert_eq!(options.username(), None);
        assert_eq!(options.max_clients, None);
        assert_eq!(options.is_private, None);
        assert_eq!(options.mode.as_deref(), Some("pvp"));
    }

    #[test]
    fn test_join_options_pairs_round_trip() {
        let options = JoinOptions {
            character_type: Some("rogue".to_string()),
            username: Some("Alice".to_string()),
            max_clients: Some(8.0),
            is_private: Some(true),
            ..Default::default()
        };
        let pairs = options.to_pairs();
        let parsed = JoinOptions::from_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
        assert_eq!(parsed, options);
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata = RoomMetadata::from_options(&JoinOptions::default(), 50);
        assert_eq!(metadata.room_name, DEFAULT_ROOM_NAME);
        assert_eq!(metadata.max_clients, 50);
        assert!(!metadata.is_private);
        assert!(metadata.created_by.is_none());

        let value = serde_json::to_value(&metadata).unwrap();
        assert!(value.get("mode").is_none());
        assert!(value.get("createdBy").is_none());
    }

    #[test]
    fn test_metadata_from_options() {
        let options = JoinOptions {
            room_name: Some("  Tavern ".to_string()),
            max_clients: Some(150.0),
            is_private: Some(true),
            username: Some("Alice".to_string()),
            mode: Some("coop".to_string()),
            map_name: Some("village".to_string()),
            ..Default::default()
        };
        let metadata = RoomMetadata::from_options(&options, 50);
        assert_eq!(metadata.room_name, "Tavern");
        assert_eq!(metadata.max_clients, 100);
        assert!(metadata.is_private);
        assert_eq!(metadata.created_by.as_deref(), Some("Alice"));
        assert_eq!(metadata.filter_values()["mode"], Some("coop"));
    }
}
