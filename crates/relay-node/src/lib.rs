//! # Intent Relay Node
//!
//! HTTP and WebSocket front end that relays dApp intents to solvers and
//! collects solver solutions for the dApp to poll.

pub mod api;
pub mod config;
pub mod relay;
pub mod server;
pub mod state;

pub use config::{ConfigError, ConfigLoader, RelayConfig};
pub use relay::IntentRelay;
pub use state::AppState;
