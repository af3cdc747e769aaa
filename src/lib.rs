//! Stateless streaming relay for browser video players.
//!
//! Relays media requests to arbitrary origins with spoofed browser headers,
//! passes binary bodies (including ranged 206 responses) straight through,
//! and rewrites HLS playlists so every segment and variant is fetched via the
//! relay as well.

pub mod config;
pub mod error;
pub mod hls;
pub mod metrics;
pub mod server;
pub mod upstream;
