//! Registry of room types and live rooms.

use crate::client_manager::FrameSender;
use crate::clock::Clock;
use crate::error::RoomError;
use crate::room::{Room, RoomConfig, RoomHandle};
use log::{debug, info};
use shared::{JoinOptions, RoomListing, SnapshotFormat};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A registered room type.
#[derive(Debug, Clone)]
pub struct RoomDefinition {
    pub name: String,
    pub config: RoomConfig,
    /// Metadata keys that must match for join-or-create to reuse a room.
    pub filter_by: Vec<String>,
}

/// Everything a room needs to admit one connection.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub session_id: String,
    pub options: JoinOptions,
    pub format: SnapshotFormat,
    pub sender: FrameSender,
}

pub struct RoomDirectory {
    definitions: RwLock<HashMap<String, RoomDefinition>>,
    rooms: RwLock<BTreeMap<String, RoomHandle>>,
    clock: Arc<dyn Clock>,
}

impl RoomDirectory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            rooms: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    pub async fn define(&self, name: &str, config: RoomConfig, filter_by: &[&str]) {
        let definition = RoomDefinition {
            name: name.to_string(),
            config,
            filter_by: filter_by.iter().map(|key| key.to_string()).collect(),
        };
        info!(
            "Defined room type \"{}\" (filter by {:?})",
            name, definition.filter_by
        );
        self.definitions
            .write()
            .await
            .insert(name.to_string(), definition);
    }

    async fn definition(&self, room_type: &str) -> Result<RoomDefinition, RoomError> {
        self.definitions
            .read()
            .await
            .get(room_type)
            .cloned()
            .ok_or_else(|| RoomError::UnknownRoomType(room_type.to_string()))
    }

    fn spawn_room(&self, definition: &RoomDefinition, options: &JoinOptions) -> RoomHandle {
        let room_id = Uuid::new_v4().simple().to_string();
        let room = Room::create(
            &room_id,
            &definition.name,
            options,
            definition.config,
            Arc::clone(&self.clock),
        );
        let (handle, _task) = room.spawn();
        handle
    }

    /// Creates a new room of `room_type` without joining it.
    pub async fn create_room(
        &self,
        room_type: &str,
        options: &JoinOptions,
    ) -> Result<RoomHandle, RoomError> {
        let definition = self.definition(room_type).await?;
        let handle = self.spawn_room(&definition, options);

        let mut rooms = self.rooms.write().await;
        prune(&mut rooms);
        rooms.insert(handle.id().to_string(), handle.clone());
        Ok(handle)
    }

    /// Creates a room and joins it as its first client.
    pub async fn create(
        &self,
        room_type: &str,
        request: JoinRequest,
    ) -> Result<RoomHandle, RoomError> {
        let handle = self.create_room(room_type, &request.options).await?;
        join(&handle, request).await?;
        Ok(handle)
    }

    /// Joins the first public, non-full room whose filtered metadata matches
    /// the request, creating one if none does.
    pub async fn join_or_create(
        &self,
        room_type: &str,
        request: JoinRequest,
    ) -> Result<RoomHandle, RoomError> {
        let definition = self.definition(room_type).await?;

        // Matchmaking is serialized so two joins can't race for the last seat
        let mut rooms = self.rooms.write().await;
        prune(&mut rooms);

        let candidates: Vec<RoomHandle> = rooms
            .values()
            .filter(|handle| handle.room_type() == room_type && handle.is_joinable())
            .filter(|handle| matches_filters(handle, &definition.filter_by, &request.options))
            .cloned()
            .collect();

        for handle in candidates {
            match join(&handle, request.clone()).await {
                Ok(()) => return Ok(handle),
                Err(RoomError::Full) | Err(RoomError::Disposed) => {
                    debug!("Room {} no longer joinable, trying next", handle.id());
                }
                Err(e) => return Err(e),
            }
        }

        let handle = self.spawn_room(&definition, &request.options);
        rooms.insert(handle.id().to_string(), handle.clone());
        drop(rooms);

        join(&handle, request).await?;
        Ok(handle)
    }

    pub async fn find_by_id(&self, room_id: &str) -> Result<RoomHandle, RoomError> {
        let rooms = self.rooms.read().await;
        match rooms.get(room_id) {
            Some(handle) if !handle.is_disposed() => Ok(handle.clone()),
            _ => Err(RoomError::NotFound(room_id.to_string())),
        }
    }

    /// Joins a specific room. Private rooms are reachable this way.
    pub async fn join_by_id(
        &self,
        room_id: &str,
        request: JoinRequest,
    ) -> Result<RoomHandle, RoomError> {
        let handle = self.find_by_id(room_id).await?;
        join(&handle, request).await?;
        Ok(handle)
    }

    /// Listings for every live room of `room_type`.
    pub async fn query(&self, room_type: &str) -> Vec<RoomListing> {
        let mut rooms = self.rooms.write().await;
        prune(&mut rooms);
        rooms
            .values()
            .filter(|handle| handle.room_type() == room_type)
            .map(RoomHandle::listing)
            .collect()
    }

    pub async fn room_count(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        prune(&mut rooms);
        rooms.len()
    }

    pub async fn dispose_all(&self) {
        let mut rooms = self.rooms.write().await;
        for handle in rooms.values() {
            handle.dispose();
        }
        info!("Disposing {} rooms", rooms.len());
        rooms.clear();
    }
}

async fn join(handle: &RoomHandle, request: JoinRequest) -> Result<(), RoomError> {
    handle
        .join(
            &request.session_id,
            request.options,
            request.format,
            request.sender,
        )
        .await
}

fn prune(rooms: &mut BTreeMap<String, RoomHandle>) {
    rooms.retain(|id, handle| {
        let keep = !handle.is_disposed();
        if !keep {
            debug!("Removing disposed room {}", id);
        }
        keep
    });
}

fn matches_filters(handle: &RoomHandle, filter_by: &[String], options: &JoinOptions) -> bool {
    let values = handle.metadata().filter_values();
    filter_by.iter().all(|key| {
        let existing = values.get(key.as_str()).copied().flatten();
        existing == options.filter_value(key)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_manager::{frame_channel, FrameReceiver};
    use crate::clock::ManualClock;
    use tokio_test::{assert_err, assert_ok};

    async fn directory() -> RoomDirectory {
        let directory = RoomDirectory::new(Arc::new(ManualClock::new(1_700_000_000_000)));
        directory
            .define("game_room", RoomConfig::default(), &["mode"])
            .await;
        directory
    }

    fn request(
        session_id: &str,
        options: JoinOptions,
    ) -> (JoinRequest, FrameReceiver) {
        let (sender, rx) = frame_channel();
        (
            JoinRequest {
                session_id: session_id.to_string(),
                options,
                format: SnapshotFormat::Json,
                sender,
            },
            rx,
        )
    }

    async fn wait_for_dispose(handle: &RoomHandle) {
        for _ in 0..100 {
            if handle.is_disposed() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("room {} was not disposed", handle.id());
    }

    #[tokio::test]
    async fn test_unknown_room_type() {
        let directory = directory().await;
        let (req, _rx) = request("s1", JoinOptions::default());
        let result = directory.join_or_create("arena", req).await;
        assert_eq!(
            result.unwrap_err(),
            RoomError::UnknownRoomType("arena".to_string())
        );
    }

    #[tokio::test]
    async fn test_join_or_create_reuses_room() {
        let directory = directory().await;
        let (a, _rx1) = request("s1", JoinOptions::default());
        let (b, _rx2) = request("s2", JoinOptions::default());

        let first = assert_ok!(directory.join_or_create("game_room", a).await);
        let second = assert_ok!(directory.join_or_create("game_room", b).await);

        assert_eq!(first.id(), second.id());
        assert_eq!(first.client_count(), 2);
        assert_eq!(directory.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_filter_separates_modes() {
        let directory = directory().await;
        let coop = JoinOptions {
            mode: Some("coop".to_string()),
            ..Default::default()
        };
        let (a, _rx1) = request("s1", coop.clone());
        let (b, _rx2) = request("s2", JoinOptions::default());
        let (c, _rx3) = request("s3", coop);

        let first = directory.join_or_create("game_room", a).await.unwrap();
        let second = directory.join_or_create("game_room", b).await.unwrap();
        let third = directory.join_or_create("game_room", c).await.unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.id(), third.id());
    }

    #[tokio::test]
    async fn test_full_room_spills_into_new_room() {
        let directory = directory().await;
        let solo = JoinOptions {
            max_clients: Some(1.0),
            ..Default::default()
        };
        let (a, _rx1) = request("s1", solo);
        let (b, _rx2) = request("s2", JoinOptions::default());

        let first = directory.join_or_create("game_room", a).await.unwrap();
        let second = directory.join_or_create("game_room", b).await.unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.max_clients(), 1);
        assert_eq!(second.max_clients(), 50);
    }

    #[tokio::test]
    async fn test_private_room_only_joinable_by_id() {
        let directory = directory().await;
        let private = JoinOptions {
            is_private: Some(true),
            ..Default::default()
        };
        let (a, _rx1) = request("s1", private);
        let room = directory.create("game_room", a).await.unwrap();

        let (b, _rx2) = request("s2", JoinOptions::default());
        let other = directory.join_or_create("game_room", b).await.unwrap();
        assert_ne!(room.id(), other.id());

        let (c, _rx3) = request("s3", JoinOptions::default());
        let same = assert_ok!(directory.join_by_id(room.id(), c).await);
        assert_eq!(same.id(), room.id());
        assert_eq!(room.client_count(), 2);
    }

    #[tokio::test]
    async fn test_find_missing_room() {
        let directory = directory().await;
        let (req, _rx) = request("s1", JoinOptions::default());
        let error = assert_err!(directory.join_by_id("nope", req).await);
        assert_eq!(error, RoomError::NotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn test_query_lists_rooms_of_type() {
        let directory = directory().await;
        directory
            .define("lobby", RoomConfig::default(), &[])
            .await;

        let options = JoinOptions {
            room_name: Some("Tavern".to_string()),
            max_clients: Some(8.0),
            ..Default::default()
        };
        let (a, _rx1) = request("s1", options);
        let (b, _rx2) = request("s2", JoinOptions::default());
        let room = directory.join_or_create("game_room", a).await.unwrap();
        directory.join_or_create("lobby", b).await.unwrap();

        let listings = directory.query("game_room").await;
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].room_id, room.id());
        assert_eq!(listings[0].clients, 1);
        assert_eq!(listings[0].max_clients, 8);
        assert_eq!(listings[0].metadata.room_name, "Tavern");
        assert!(directory.query("nothing").await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_room_is_pruned() {
        let directory = directory().await;
        let (a, _rx) = request("s1", JoinOptions::default());
        let room = directory.join_or_create("game_room", a).await.unwrap();

        room.leave("s1", true);
        wait_for_dispose(&room).await;

        assert!(directory.query("game_room").await.is_empty());
        assert!(directory.find_by_id(room.id()).await.is_err());
    }

    #[tokio::test]
    async fn test_dispose_all() {
        let directory = directory().await;
        let (a, _rx1) = request("s1", JoinOptions::default());
        let room = directory.join_or_create("game_room", a).await.unwrap();

        directory.dispose_all().await;
        wait_for_dispose(&room).await;
        assert_eq!(directory.room_count().await, 0);
    }
}
