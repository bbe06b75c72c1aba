//! # Snake Arena Server Library
//!
//! This library provides the authoritative server for the multiplayer grid
//! snake game. Clients only send intents (create, join, start, steer, reset);
//! every room's board is simulated here and broadcast back as snapshots.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Each room advances in fixed ticks. A tick moves every living, unfrozen
//! snake one cell on a toroidal board, resolves all collisions against the
//! same pre-move board, applies food and powerups and decides whether the
//! match is over. Speed-boosted snakes get a second movement pass per tick.
//!
//! ### Room Management
//! Rooms are identified by four-letter codes and owned by their own actor
//! task. The actor serializes commands and ticks, so no room state is ever
//! shared between tasks.
//!
//! ### Client Management
//! Handles the lifecycle of UDP clients:
//! - Connection establishment and id assignment
//! - Room membership and packet routing
//! - Disconnection and timeout cleanup
//!
//! ## Module Organization
//!
//! ### Simulation core
//! - `placement`: random free-cell search with a bounded attempt budget
//! - `food`: target counts per food policy, spawning and consumption
//! - `powerup`: spawn throttling, collection and timed effects
//! - `collision`: order-independent fatality resolution for one sub-tick
//! - `tick`: the tick orchestrator tying the above together
//! - `game`: the `Room` model and its waiting/playing/ended lifecycle
//!
//! ### Serving
//! - `rooms`: per-room actors, their command queue and tick timer
//! - `client_manager`: connected clients, addresses and room membership
//! - `network`: UDP transport, packet handling and the room registry
//! - `config`: server and per-room settings
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", GameConfig::default()).await?;
//!
//!     // Runs until a shutdown message arrives:
//!     // - Receives packets and routes them to room actors
//!     // - Creates rooms and removes them once empty
//!     // - Drops clients that stop sending
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Processes outgoing packet queue and room broadcasts
//! - **Timeout Checker**: Monitors client health and removes inactive connections
//! - **Room Actors**: One per room, each with its own tick timer

pub mod client_manager;
pub mod collision;
pub mod config;
pub mod food;
pub mod game;
pub mod network;
pub mod placement;
pub mod powerup;
pub mod rooms;
pub mod tick;
pub mod utils;
