//! # Relay Upstream
//!
//! The relay's only contact with the upstream intent network.
//!
//! - [`Upstream`] - submit/query/subscribe primitives
//! - [`WsUpstream`] - JSON-RPC gateway client over WebSocket
//! - [`LocalUpstream`] - in-process network for development and tests

pub mod client;
pub mod error;
pub mod local;
pub mod types;
pub mod ws;

pub use client::{IntentHandler, SolutionHandler, Upstream};
pub use error::{Result, UpstreamError};
pub use local::LocalUpstream;
pub use types::*;
pub use ws::{WsUpstream, WsUpstreamConfig};
