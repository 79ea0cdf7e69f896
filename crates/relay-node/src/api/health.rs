//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

use super::timestamp;

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub pong: String,
}

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { pong: timestamp() })
}
