//! Rendezvous file relay.
//!
//! A sender and a receiver connect to the same listener and present
//! the same session token; the relay streams the sender's bytes to
//! the receiver through an in-memory queue, without touching disk.
//!
//! # Main Components
//!
//! - `session`: the session registry and per-token transfer buffers.
//! - `handshake`: the line-oriented hello/status protocol.
//! - `negotiator`: drives one connection from hello to a running pump.
//! - `pump`: the reader (sender side) and writer (receiver side) pumps.
//! - `server`: the listener and its shutdown.

pub mod config;
pub mod handshake;
pub mod negotiator;
pub mod pump;
pub mod server;
pub mod session;

pub use config::RelayConfig;
pub use negotiator::Relay;
pub use server::Server;
pub use session::{ClaimId, InMemorySessionStore, Role, SessionStore, Token};
