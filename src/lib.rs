//! Invite-gated TCP Chat Relay Library
//!
//! A plaintext, line-based multi-client chat relay built on tokio.
//!
//! # Features
//! - Invite gate with base64-published codes (reusable or single-use)
//! - Username validation (Unicode letters/digits, `_`, `-`, space; 1-25 chars)
//! - Broadcast of every chat line to all other registered clients
//! - Join and leave announcements
//! - Per-peer write deadline; failing peers are dropped without
//!   affecting anyone else
//!
//! # Architecture
//! - `Registry` is an actor owning the client map; register, unregister and
//!   snapshot requests are serialized through an `mpsc` channel
//! - `Broadcaster` iterates a registry snapshot, so no registry access is
//!   held while writing to peers
//! - Each connection has a `handler` task (reads lines, drives the
//!   handshake state machine) and a writer task (owns the socket write half)
//!
//! # Example
//! ```ignore
//! use invite_chat::{ChatServer, Config, InviteGate, InvitePolicy};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let gate = InviteGate::from_raw_codes(["Pancakes67"], InvitePolicy::Reusable);
//!
//!     let server = ChatServer::bind(&config, gate).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod invite;
pub mod message;
pub mod registry;
pub mod server;
pub mod types;
pub mod username;

// Re-export main types for convenience
pub use broadcast::{BroadcastReport, Broadcaster};
pub use client::{Client, ClientHandle};
pub use config::Config;
pub use error::{AppError, InviteError, SendError, UsernameError};
pub use handler::{handle_connection, HandlerContext, HandlerSettings};
pub use invite::{InviteGate, InvitePolicy};
pub use message::{ErrorCode, ServerMessage};
pub use registry::{Registry, RegistryCommand, RegistryHandle};
pub use server::ChatServer;
pub use types::ClientId;
pub use username::{is_valid_username, validate_username, MAX_USERNAME_LENGTH};
