//! kilo-personality library
//!
//! Exposes modules for use by the daemon and client binaries.
//!
//! CHANGELOG:
//! - 10/16/2026 - Initial library structure

pub mod client;
pub mod config;
pub mod daemon;
pub mod persona;
pub mod speech;
