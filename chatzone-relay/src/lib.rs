//! `ChatZone` relay server library.
//!
//! Exposes the relay server for use in tests and embedding. The relay
//! accepts WebSocket connections, tracks which connection is joined to
//! which room, and fans chat messages and typing indicators out to the
//! other members of the same room.

pub mod config;
pub mod registry;
pub mod relay;
