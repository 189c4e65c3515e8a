//! Daemon mode: socket server, command table, state store.
//!
//! CHANGELOG:
//! - 10/16/2026 - Initial module structure

pub mod protocol;
pub mod server;
pub mod service;
pub mod state;
