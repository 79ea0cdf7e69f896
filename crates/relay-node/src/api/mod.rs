//! HTTP and WebSocket endpoints.

pub mod dapp;
pub mod health;
pub mod rpc;
pub mod solver;

use chrono::Utc;

/// UTC wall-clock time with microsecond precision, as sent in pongs.
pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}
