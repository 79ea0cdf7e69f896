//! Solver streaming endpoint.
//!
//! Each accepted WebSocket gets one [`SolverSession`]. Every incoming request
//! is handled on its own task, so a `subscribe` that turns into a long-lived
//! delivery loop does not hold up later pings, unsubscribes or submissions
//! on the same connection.
//!
//! Connection lifecycle: idle until a `subscribe` succeeds, then streaming
//! until the socket disconnects or the subscription's queue is closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use relay_core::error::CODE_INVALID_PARAMS;
use relay_state::{ConnectionHandle, Subscription};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::rpc::{
    RpcError, RpcPush, RpcRequest, RpcResponse, SubmitSolverOperationParams, SubscribeParams,
    UnsubscribeParams,
};
use super::timestamp;
use crate::state::AppState;

const METHOD_PING: &str = "ping";
const METHOD_SUBSCRIBE: &str = "subscribe";
const METHOD_UNSUBSCRIBE: &str = "unsubscribe";
const METHOD_SUBMIT_SOLVER_OPERATION: &str = "submitSolverOperation";

/// Frames waiting for the socket writer. Delivery loops wait when it is full,
/// so a solver that stops reading backs up into its subscription queue.
const OUTBOUND_CAPACITY: usize = 100;

/// How long a closing connection waits for its writer before aborting it.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Upgrade a solver connection to the streaming protocol.
pub async fn solver_stream(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_solver_connection(socket, remote.to_string(), state))
}

async fn handle_solver_connection(socket: WebSocket, caller: String, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
    let connection = ConnectionHandle::new();

    let writer_connection = connection.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                _ = writer_connection.closed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let session = Arc::new(SolverSession {
        caller,
        state,
        outbound,
        connection: connection.clone(),
    });

    info!(caller = %session.caller, "solver connected");

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let session = Arc::clone(&session);
                        tokio::spawn(async move { session.handle_text(&text).await });
                    }
                    Some(Ok(Message::Ping(data))) => {
                        // Skipped while the writer is backed up.
                        let _ = session.outbound.try_send(Message::Pong(data));
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            _ = connection.closed() => break,
        }
    }

    // Wakes every delivery loop of this connection and stops the writer.
    connection.close();
    if tokio::time::timeout(WRITER_CLOSE_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }

    info!(caller = %session.caller, "client disconnected");
}

/// Per-connection protocol state.
struct SolverSession {
    /// Owner identity used in the registry.
    caller: String,
    state: AppState,
    outbound: mpsc::Sender<Message>,
    connection: ConnectionHandle,
}

impl SolverSession {
    async fn handle_text(&self, text: &str) {
        let request: RpcRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                self.reply_error(
                    Value::Null,
                    RpcError::invalid_params(format!("failed to parse request: {}", e)),
                )
                .await;
                return;
            }
        };

        let id = request.id.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            METHOD_PING => self.reply(id, json!({ "pong": timestamp() })).await,
            METHOD_SUBSCRIBE => self.handle_subscribe(id, &request).await,
            METHOD_UNSUBSCRIBE => self.handle_unsubscribe(id, &request).await,
            METHOD_SUBMIT_SOLVER_OPERATION => self.handle_submit_solver_operation(id, &request).await,
            other => self.reply_error(id, RpcError::method_not_found(other)).await,
        }
    }

    async fn handle_subscribe(&self, id: Value, request: &RpcRequest) {
        let params: SubscribeParams = match request.params() {
            Ok(params) => params,
            Err(e) => return self.reply_error(id, e).await,
        };
        if params.subscription_type.is_empty() {
            return self
                .reply_error(id, RpcError::invalid_params("subscription_type value is missing"))
                .await;
        }

        let subscription = match self.state.registry.subscribe(
            &self.caller,
            &params.subscription_type,
            self.connection.clone(),
        ) {
            Ok(subscription) => subscription,
            Err(e) => {
                return self
                    .reply_error(id, RpcError::from_relay("failed to subscribe", &e))
                    .await
            }
        };

        let subscription_id = subscription.id.to_string();
        self.reply(id, json!({ "subscription_id": subscription_id })).await;

        info!(
            caller = %self.caller,
            subscription_type = %params.subscription_type,
            subscription_id = %subscription_id,
            "client subscribed"
        );

        self.deliver(subscription).await;

        // Already gone if the client unsubscribed explicitly.
        let _ = self
            .state
            .registry
            .unsubscribe(&self.caller, &subscription_id);
    }

    /// Push queued notifications until disconnect or until the queue closes.
    async fn deliver(&self, mut subscription: Subscription) {
        let subscription_id = subscription.id.to_string();

        loop {
            tokio::select! {
                _ = self.connection.closed() => return,
                notification = subscription.recv() => {
                    let Some(notification) = notification else {
                        debug!(caller = %self.caller, subscription_id = %subscription_id, "subscription queue closed");
                        return;
                    };
                    let push = RpcPush::subscription(&subscription_id, notification.as_ref());
                    // Waits for the writer; the next item stays queued meanwhile.
                    tokio::select! {
                        _ = self.connection.closed() => return,
                        sent = self.send(&push) => {
                            if !sent {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn handle_unsubscribe(&self, id: Value, request: &RpcRequest) {
        let params: UnsubscribeParams = match request.params() {
            Ok(params) => params,
            Err(e) => return self.reply_error(id, e).await,
        };
        if params.subscription_id.is_empty() {
            return self
                .reply_error(id, RpcError::invalid_params("subscription_id value is missing"))
                .await;
        }

        if let Err(e) = self
            .state
            .registry
            .unsubscribe(&self.caller, &params.subscription_id)
        {
            return self
                .reply_error(id, RpcError::from_relay("failed to unsubscribe", &e))
                .await;
        }

        self.reply(id, Value::Bool(true)).await;
        info!(caller = %self.caller, subscription_id = %params.subscription_id, "client unsubscribed");
    }

    async fn handle_submit_solver_operation(&self, id: Value, request: &RpcRequest) {
        let params: SubmitSolverOperationParams = match request.params() {
            Ok(params) => params,
            Err(e) => return self.reply_error(id, e).await,
        };
        if params.intent_id.is_empty() {
            return self
                .reply_error(id, RpcError::new(CODE_INVALID_PARAMS, "intent_id value is missing"))
                .await;
        }

        debug!(caller = %self.caller, intent_id = %params.intent_id, "client submitted solver operation");

        let payload = match serde_json::to_vec(&params.intent_solution) {
            Ok(payload) => payload,
            Err(e) => {
                return self
                    .reply_error(id, RpcError::invalid_params(e.to_string()))
                    .await
            }
        };

        match self.state.relay.submit_solution(&params.intent_id, payload).await {
            Ok(()) => self.reply(id, Value::Null).await,
            Err(e) => {
                self.reply_error(
                    id,
                    RpcError::from_relay("failed to submit solver operation", &e),
                )
                .await
            }
        }
    }

    async fn reply(&self, id: Value, result: Value) {
        self.send(&RpcResponse::success(id, result)).await;
    }

    async fn reply_error(&self, id: Value, err: RpcError) {
        debug!(caller = %self.caller, code = err.code, message = %err.message, "replying with error");
        self.send(&RpcResponse::failure(id, err)).await;
    }

    /// Queue a frame for the writer, waiting while it is backed up.
    /// Returns false once the connection is gone.
    async fn send<T: Serialize>(&self, frame: &T) -> bool {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                error!(caller = %self.caller, error = %e, "failed to serialize frame");
                return true;
            }
        };
        self.outbound.send(Message::Text(text)).await.is_ok()
    }
}
