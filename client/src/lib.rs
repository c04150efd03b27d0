//! # Realm Client Library
//!
//! Headless client for the room server. It joins a room over a websocket,
//! keeps a local replica of the world from the snapshots it receives and
//! smooths every remote entity between snapshots so a renderer could draw
//! continuous motion from sparse, jittery updates.
//!
//! ## Module Organization
//!
//! ### Interpolation Module (`interpolation`)
//! Per-entity exponential smoothing of position and heading. Headings always
//! travel the short way around the circle, and nothing is extrapolated past
//! the latest sample.
//!
//! ### Game Module (`game`)
//! The client's replica of a room: last snapshot, one interpolator per
//! remote player and NPC, chat history and the latest character availability.
//! The local player is never interpolated.
//!
//! ### Input Module (`input`)
//! Scripted waypoint walking for bot clients, kept clear of NPCs with the
//! shared collision helpers and throttled by change detection.
//!
//! ### Network Module (`network`)
//! Websocket connection, join URL building, optional simulated latency and
//! the frame loop tying the other modules together.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions {
//!         bot: true,
//!         ..Default::default()
//!     };
//!     let mut client = Client::connect(&options).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod interpolation;
pub mod network;
