//! # Relay Core
//!
//! Core types shared by every part of the intent relay.
//!
//! This crate provides:
//! - [`Intent`] and [`SolverSolution`] - the opaque payloads being relayed
//! - [`Notification`] - upstream push events fanned out to solvers
//! - [`SubscriptionType`] - the closed set of notification streams
//! - [`RelayError`] - relay error kinds

pub mod encoding;
pub mod error;
pub mod intent;
pub mod types;

pub use error::{RelayError, Result};
pub use intent::{Intent, IntentId, IntentNotification, SolutionNotification, SolverSolution};
pub use types::{Notification, SubscriptionType};
