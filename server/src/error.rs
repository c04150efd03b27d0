use thiserror::Error;

/// Failures surfaced to the transport when locating or joining a room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room type \"{0}\" is not defined")]
    UnknownRoomType(String),
    #[error("room \"{0}\" not found")]
    NotFound(String),
    #[error("room is full")]
    Full,
    #[error("session is already in this room")]
    DuplicateSession,
    #[error("room has been disposed")]
    Disposed,
}
