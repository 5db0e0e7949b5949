//! reso-helper - publishes session activity from headless hosts as a Discord bot status
//!
//! This library crate exposes internal modules for integration testing.

pub mod config;
pub mod data;
pub mod integrations;
pub mod presence;
pub mod util;
