//! # Tile World Server Library
//!
//! This library provides the authoritative server for a tile-based multiplayer
//! world. It owns every map, player and NPC, runs the per-map simulation tick,
//! and tells clients what changed.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Each map advances its players and then its NPCs once per tick. NPCs are
//! driven by a timed state machine (idle, hunt, attack, dead) and find their
//! way around with A* over the map grid. Movement is only committed when the
//! target tile is free; clients that guessed wrong get their position back.
//!
//! ### Combat and Loot
//! Players and NPCs trade blows through a small set of pure formulas for
//! damage, blocking, critical hits and experience. Slain NPCs drop loot rolled
//! from their loot table and respawn on the same tile after a delay.
//!
//! ### Client Management
//! Connections arrive over UDP and are turned into players on the starting
//! map. Silent clients are dropped after a timeout.
//!
//! ## Architecture Design
//!
//! ### Single Simulation Thread
//! Network tasks never touch the world. They decode datagrams and hand them to
//! the main loop, which buffers them and applies them at the start of the next
//! tick. Within a tick nothing blocks: outgoing packets are queued to the
//! sender task.
//!
//! ### Serialize Once
//! A broadcast encodes its packet a single time and hands the same shared
//! frame to every recipient.
//!
//! ## Module Organization
//!
//! - `content`: read-only map and NPC definitions, loaded from JSON
//! - `combat`: damage, experience and loot formulas
//! - `pathfinding`: A* over the tile grid
//! - `behavior`: the NPC state machine
//! - `npc`: NPC instances and their actions
//! - `map`: one live map and its occupancy rules
//! - `player`: what the simulation needs from a player, and the networked player
//! - `world`: all maps plus player routing and warps
//! - `client_manager`: connection bookkeeping
//! - `network`: UDP transport and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::content::ContentRepository;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let content = ContentRepository::builtin()?;
//!
//!     // 20Hz tick, at most 32 players, random NPC behavior
//!     let mut server = Server::new(
//!         "127.0.0.1:7777",
//!         Duration::from_millis(50),
//!         32,
//!         content,
//!         None,
//!     )
//!     .await?;
//!
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod behavior;
pub mod client_manager;
pub mod combat;
pub mod content;
pub mod map;
pub mod network;
pub mod npc;
pub mod pathfinding;
pub mod player;
pub mod world;

#[cfg(test)]
mod testing;
