//! The intent relay: every call to the upstream network goes through here.
//!
//! Upstream wraps binary fields (intent payloads, solutions) as base64 text
//! inside JSON. Decoding them is this module's job; the HTTP and streaming
//! layers only ever see decoded values.

use std::sync::Arc;

use relay_core::{
    encoding, IntentId, IntentNotification, Notification, RelayError, Result, SolverSolution,
};
use relay_state::{SolutionCache, SubscriptionRegistry};
use relay_upstream::{
    GetIntentSolutionsParams, IntentSolutionsParams, IntentsParams, OnIntentSolutionsNotification,
    OnIntentsNotification, SubmitIntentParams, SubmitIntentSolutionParams, Upstream,
    UpstreamError,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::{DappConfig, SolverConfig};

#[derive(Debug, Deserialize)]
struct SubmitIntentAck {
    #[serde(default)]
    intent_id: String,
}

/// Facade over the upstream network, the solution cache and the registry.
pub struct IntentRelay {
    upstream: Arc<dyn Upstream>,
    cache: Arc<SolutionCache>,
    registry: Arc<SubscriptionRegistry>,
    dapp: Option<DappConfig>,
    solver: Option<SolverConfig>,
}

impl IntentRelay {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        cache: Arc<SolutionCache>,
        registry: Arc<SubscriptionRegistry>,
        dapp: Option<DappConfig>,
        solver: Option<SolverConfig>,
    ) -> Self {
        Self {
            upstream,
            cache,
            registry,
            dapp,
            solver,
        }
    }

    /// True when dApp credentials are configured.
    pub fn serves_dapp(&self) -> bool {
        self.dapp.is_some()
    }

    /// True when solver credentials are configured.
    pub fn serves_solvers(&self) -> bool {
        self.solver.is_some()
    }

    fn dapp(&self) -> Result<&DappConfig> {
        self.dapp
            .as_ref()
            .ok_or_else(|| RelayError::InvalidRequest("relay has no dApp credentials".to_string()))
    }

    fn solver(&self) -> Result<&SolverConfig> {
        self.solver.as_ref().ok_or_else(|| {
            RelayError::InvalidRequest("relay has no solver credentials".to_string())
        })
    }

    /// Install the long-lived upstream subscriptions for the configured roles.
    pub async fn start(&self) -> Result<()> {
        if let Some(solver) = &self.solver {
            self.subscribe_to_intents(solver).await?;
        }
        if let Some(dapp) = &self.dapp {
            self.subscribe_to_solutions(dapp).await?;
        }
        Ok(())
    }

    /// Submit an intent and return the id upstream assigned to it.
    pub async fn submit_intent(&self, payload: Vec<u8>) -> Result<IntentId> {
        let dapp = self.dapp()?;
        let params = SubmitIntentParams {
            dapp_address: dapp.address.clone(),
            sender_private_key: dapp.private_key.clone(),
            intent: payload,
        };

        let reply = self
            .upstream
            .submit_intent(params)
            .await
            .map_err(|e| upstream_error("failed to submit intent", e))?;

        let ack: SubmitIntentAck = serde_json::from_slice(&reply).map_err(|e| {
            RelayError::MalformedUpstreamResponse(format!("failed to parse message: {}", e))
        })?;

        if ack.intent_id.is_empty() {
            return Err(RelayError::MalformedUpstreamResponse(
                "acknowledgment carries no intent_id".to_string(),
            ));
        }

        Ok(ack.intent_id)
    }

    /// Start collecting solutions pushed for this intent.
    pub fn register_interest(&self, intent_id: &str) {
        self.cache.create(intent_id);
    }

    /// Solutions for an intent, from cache when tracked, otherwise from upstream.
    ///
    /// Items that fail to decode are logged and skipped.
    pub async fn get_solutions(&self, intent_id: &str) -> Result<Vec<SolverSolution>> {
        if let Some(solutions) = self.cache.get(intent_id) {
            debug!(intent_id, "returning cached intent solutions");
            return Ok(solutions);
        }

        let dapp = self.dapp()?;
        let params = GetIntentSolutionsParams {
            dapp_or_sender_private_key: dapp.private_key.clone(),
            intent_id: intent_id.to_string(),
        };

        let reply = self
            .upstream
            .get_intent_solutions(params)
            .await
            .map_err(|e| upstream_error("failed to get intent solutions", e))?;

        // A gateway reports "no solutions" as `null`.
        let items: Vec<serde_json::Value> = serde_json::from_slice::<Option<Vec<serde_json::Value>>>(&reply)
            .map_err(|e| {
                RelayError::MalformedUpstreamResponse(format!("failed to parse message: {}", e))
            })?
            .unwrap_or_default();

        let mut solutions = Vec::with_capacity(items.len());
        for item in items {
            let Some(encoded) = item.get("intent_solution").and_then(|v| v.as_str()) else {
                error!(intent_id, "intent solution item has no intent_solution field");
                continue;
            };

            match SolverSolution::from_base64(encoded.as_bytes()) {
                Ok(solution) => solutions.push(solution),
                Err(e) => {
                    error!(intent_id, error = %e, intent_solution = encoded, "failed to decode intent solution");
                }
            }
        }

        Ok(solutions)
    }

    /// Forward a solver's solution upstream. Nothing is cached here; the
    /// solution comes back through the upstream solution feed.
    pub async fn submit_solution(&self, intent_id: &str, payload: Vec<u8>) -> Result<()> {
        let solver = self.solver()?;
        let params = SubmitIntentSolutionParams {
            solver_private_key: solver.private_key.clone(),
            intent_id: intent_id.to_string(),
            intent_solution: payload,
        };

        self.upstream
            .submit_intent_solution(params)
            .await
            .map_err(|e| upstream_error("failed to submit intent solution", e))?;

        Ok(())
    }

    async fn subscribe_to_intents(&self, solver: &SolverConfig) -> Result<()> {
        debug!("subscribing to intents");

        let registry = Arc::clone(&self.registry);
        let params = IntentsParams {
            solver_private_key: solver.private_key.clone(),
            dapp_address: solver.dapp_address.clone(),
        };

        self.upstream
            .on_intents(
                params,
                Arc::new(move |result: relay_upstream::Result<OnIntentsNotification>| {
                    on_upstream_intent(&registry, result)
                }),
            )
            .await
            .map_err(|e| upstream_error("failed to subscribe to intents", e))?;

        info!(dapp_address = %solver.dapp_address, "subscribed to upstream intents");
        Ok(())
    }

    async fn subscribe_to_solutions(&self, dapp: &DappConfig) -> Result<()> {
        debug!("subscribing to intent solutions");

        let cache = Arc::clone(&self.cache);
        let params = IntentSolutionsParams {
            dapp_private_key: dapp.private_key.clone(),
        };

        self.upstream
            .on_intent_solutions(
                params,
                Arc::new(move |result: relay_upstream::Result<OnIntentSolutionsNotification>| {
                    on_upstream_solution(&cache, result)
                }),
            )
            .await
            .map_err(|e| upstream_error("failed to subscribe to intent solutions", e))?;

        info!("subscribed to upstream intent solutions");
        Ok(())
    }

    /// Release the upstream connection.
    pub async fn close(&self) -> Result<()> {
        self.upstream
            .close()
            .await
            .map_err(|e| upstream_error("failed to close upstream connection", e))
    }
}

/// Decode a pushed intent where possible and fan it out to solvers.
fn on_upstream_intent(
    registry: &SubscriptionRegistry,
    result: relay_upstream::Result<OnIntentsNotification>,
) {
    let notification = match result {
        Ok(notification) => notification,
        Err(e) => {
            error!(error = %e, "error receiving intent");
            return;
        }
    };

    debug!(
        dapp_address = %notification.dapp_address,
        sender_address = %notification.sender_address,
        intent_id = %notification.intent_id,
        "received intent"
    );

    // The decode is best effort; undecodable payloads are forwarded as received.
    let intent = match encoding::decode(notification.intent.as_bytes()) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(intent_id = %notification.intent_id, error = %e, "forwarding intent payload undecoded");
            notification.intent.into_bytes()
        }
    };

    registry.notify(Notification::Intent(IntentNotification {
        dapp_address: notification.dapp_address,
        sender_address: notification.sender_address,
        intent_id: notification.intent_id,
        intent,
        timestamp: notification.timestamp,
    }));
}

/// Decode a pushed solution and append it to the cache if the intent is tracked.
fn on_upstream_solution(
    cache: &SolutionCache,
    result: relay_upstream::Result<OnIntentSolutionsNotification>,
) {
    let notification = match result {
        Ok(notification) => notification,
        Err(e) => {
            error!(error = %e, "error receiving intent solution");
            return;
        }
    };

    debug!(intent_id = %notification.intent_id, "received intent solution");

    let solution = match SolverSolution::from_base64(notification.intent_solution.as_bytes()) {
        Ok(solution) => solution,
        Err(e) => {
            error!(
                intent_id = %notification.intent_id,
                error = %e,
                intent_solution = %notification.intent_solution,
                "failed to decode intent solution"
            );
            return;
        }
    };

    if !cache.append(&notification.intent_id, solution) {
        debug!(intent_id = %notification.intent_id, "solution for untracked intent discarded");
    }
}

fn upstream_error(context: &str, err: UpstreamError) -> RelayError {
    warn!(error = %err, "{}", context);
    match err {
        UpstreamError::Serialization(msg) => {
            RelayError::MalformedUpstreamResponse(format!("{}: {}", context, msg))
        }
        other => RelayError::UpstreamUnavailable(format!("{}: {}", context, other)),
    }
}
