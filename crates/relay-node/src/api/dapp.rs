//! dApp endpoints: intent submission and solution polling.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use relay_core::{RelayError, SolverSolution};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::state::AppState;

/// Response after submitting an intent.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitIntentResponse {
    pub intent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SolverOperationsQuery {
    #[serde(rename = "intentID", alias = "intent_id")]
    pub intent_id: Option<String>,
}

fn into_http(err: RelayError) -> (StatusCode, String) {
    if err.is_client_error() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    }
}

/// Submit a user operation as an intent.
///
/// The body must be a JSON object; its content is passed through untouched.
pub async fn user_operation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SubmitIntentResponse>, (StatusCode, String)> {
    let operation: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&body)
        .map_err(|e| {
            error!(error = %e, "failed to parse request");
            (StatusCode::BAD_REQUEST, format!("invalid request: {}", e))
        })?;

    let payload = serde_json::to_vec(&operation).map_err(|e| {
        error!(error = %e, "failed to marshal user operation");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    })?;

    let intent_id = state.relay.submit_intent(payload).await.map_err(|e| {
        error!(error = %e, "failed to submit intent");
        into_http(e)
    })?;

    state.relay.register_interest(&intent_id);

    Ok(Json(SubmitIntentResponse { intent_id }))
}

/// Solutions collected so far for an intent.
pub async fn solver_operations(
    State(state): State<AppState>,
    Query(query): Query<SolverOperationsQuery>,
) -> Result<Json<Vec<SolverSolution>>, (StatusCode, String)> {
    let intent_id = query
        .intent_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            error!("intentID is required");
            (StatusCode::BAD_REQUEST, "intentID is required".to_string())
        })?;

    let solutions = state.relay.get_solutions(&intent_id).await.map_err(|e| {
        error!(intent_id = %intent_id, error = %e, "failed to get intent solutions");
        into_http(e)
    })?;

    Ok(Json(solutions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum_test::TestServer;
    use relay_core::encoding;
    use relay_state::{SolutionCache, SubscriptionRegistry};
    use relay_upstream::{LocalUpstream, OnIntentSolutionsNotification, SecretKey};
    use serde_json::json;

    use crate::config::DappConfig;
    use crate::relay::IntentRelay;
    use crate::server::create_router;

    async fn server(upstream: LocalUpstream) -> TestServer {
        let cache = Arc::new(SolutionCache::default());
        let registry = Arc::new(SubscriptionRegistry::new());
        let relay = Arc::new(IntentRelay::new(
            Arc::new(upstream),
            cache,
            Arc::clone(&registry),
            Some(DappConfig {
                address: "0xdapp".into(),
                private_key: SecretKey::new("dapp-key"),
            }),
            None,
        ));
        relay.start().await.unwrap();

        TestServer::new(create_router(AppState::new(relay, registry))).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let server = server(LocalUpstream::new()).await;

        let response = server.get("/ping").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert!(body["pong"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_submit_and_poll_empty() {
        let server = server(LocalUpstream::new()).await;

        let response = server
            .post("/userOperation")
            .json(&json!({"chainId": 1, "userOperation": {"sender": "0x01"}}))
            .await;
        response.assert_status_ok();
        let submitted: SubmitIntentResponse = response.json();

        let response = server
            .get("/solverOperations")
            .add_query_param("intentID", &submitted.intent_id)
            .await;
        response.assert_status_ok();
        let solutions: Vec<serde_json::Value> = response.json();
        assert!(solutions.is_empty());
    }

    #[tokio::test]
    async fn test_pushed_solution_is_polled() {
        let upstream = LocalUpstream::new();
        let server = server(upstream.clone()).await;

        let submitted: SubmitIntentResponse = server
            .post("/userOperation")
            .json(&json!({"op": 1}))
            .await
            .json();

        upstream.push_solution(OnIntentSolutionsNotification {
            intent_id: submitted.intent_id.clone(),
            intent_solution: encoding::encode(br#"{"bid":9}"#),
        });

        let mut solutions: Vec<serde_json::Value> = Vec::new();
        for _ in 0..100 {
            solutions = server
                .get("/solverOperations")
                .add_query_param("intent_id", &submitted.intent_id)
                .await
                .json();
            if !solutions.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(solutions, vec![json!({"bid": 9})]);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let server = server(LocalUpstream::new()).await;

        let response = server
            .post("/userOperation")
            .text("{not json")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_intent_id_is_bad_request() {
        let server = server(LocalUpstream::new()).await;

        let response = server.get("/solverOperations").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_internal_error() {
        let upstream = LocalUpstream::new();
        let server = server(upstream.clone()).await;
        upstream.set_available(false);

        let response = server.post("/userOperation").json(&json!({"op": 1})).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let response = server
            .get("/solverOperations")
            .add_query_param("intentID", "untracked")
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_solver_route_absent_without_solver_credentials() {
        let server = server(LocalUpstream::new()).await;

        let response = server.get("/ws/solver").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
