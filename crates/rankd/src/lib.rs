//! rankd - XP and leveling daemon.
//!
//! Accepts activity events from the chat gateway over HTTP, feeds them
//! through the leveling engine and serves the rank and admin API.

pub mod bridge;
pub mod config;
pub mod events;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod voice;
