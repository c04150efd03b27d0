//! # Realm Server Library
//!
//! Authoritative room server for a small shared 3D world. Each room holds the
//! players connected to it plus a handful of scripted NPCs, advances the NPCs
//! on a fixed tick and broadcasts a full snapshot of the world to every client
//! after each tick.
//!
//! ## Module Organization
//!
//! - `game`: entity store for one room (players, NPCs, tick and server time)
//! - `npc`: starter NPC roster and the idle / wander / patrol behaviors
//! - `characters`: tracks which character archetypes are in use
//! - `client_manager`: connected sessions and their outbound frame queues
//! - `room`: room lifecycle, message handling and the tick loop
//! - `directory`: room types, matchmaking and room listings
//! - `network`: HTTP listing and websocket transport
//! - `clock`: wall-clock source, replaceable in tests
//!
//! ## Concurrency
//!
//! Every room runs on its own task and processes joins, leaves, messages and
//! ticks strictly one at a time from a single command queue. Rooms share
//! nothing with each other.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::clock::SystemClock;
//! use server::directory::RoomDirectory;
//! use server::network::Server;
//! use server::room::RoomConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(RoomDirectory::new(Arc::new(SystemClock)));
//!     directory.define("game_room", RoomConfig::default(), &["mode"]).await;
//!
//!     let server = Server::bind("127.0.0.1:2567", directory).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod characters;
pub mod client_manager;
pub mod clock;
pub mod directory;
pub mod error;
pub mod game;
pub mod network;
pub mod npc;
pub mod room;

pub use error::RoomError;
