//! Application state.

use std::sync::Arc;

use relay_state::SubscriptionRegistry;

use crate::relay::IntentRelay;

/// Handles shared by every request-handling task.
#[derive(Clone)]
pub struct AppState {
    /// Facade over the upstream network and the solution cache.
    pub relay: Arc<IntentRelay>,

    /// Solver subscriptions.
    pub registry: Arc<SubscriptionRegistry>,
}

impl AppState {
    pub fn new(relay: Arc<IntentRelay>, registry: Arc<SubscriptionRegistry>) -> Self {
        Self { relay, registry }
    }
}
