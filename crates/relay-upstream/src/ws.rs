//! JSON-RPC gateway client over WebSocket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::client::{spawn_dispatcher, IntentHandler, SolutionHandler, Upstream};
use crate::error::{Result, UpstreamError};
use crate::types::{
    GetIntentSolutionsParams, IntentSolutionsParams, IntentsParams, OnIntentSolutionsNotification,
    OnIntentsNotification, SubmitIntentParams, SubmitIntentSolutionParams, INTENTS_FEED,
    INTENT_SOLUTIONS_FEED,
};

const METHOD_SUBMIT_INTENT: &str = "blxr_submit_intent";
const METHOD_SUBMIT_INTENT_SOLUTION: &str = "blxr_submit_intent_solution";
const METHOD_GET_INTENT_SOLUTIONS: &str = "blxr_get_intent_solutions";
const METHOD_SUBSCRIBE: &str = "subscribe";

/// Connection settings for [`WsUpstream`].
#[derive(Debug, Clone)]
pub struct WsUpstreamConfig {
    pub url: String,
    pub auth_header: Option<String>,
}

/// Where a subscription's pushes are routed.
enum FeedSink {
    Intents(mpsc::UnboundedSender<Result<OnIntentsNotification>>),
    Solutions(mpsc::UnboundedSender<Result<OnIntentSolutionsNotification>>),
}

impl FeedSink {
    fn deliver(&self, result: Value) {
        match self {
            FeedSink::Intents(tx) => {
                let _ = tx.send(serde_json::from_value(result).map_err(UpstreamError::from));
            }
            FeedSink::Solutions(tx) => {
                let _ = tx.send(serde_json::from_value(result).map_err(UpstreamError::from));
            }
        }
    }

    fn fail(&self, err: UpstreamError) {
        match self {
            FeedSink::Intents(tx) => {
                let _ = tx.send(Err(err));
            }
            FeedSink::Solutions(tx) => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Any frame the gateway sends: a reply or a subscription push.
#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PushParams {
    subscription: String,
    result: Value,
}

/// State shared between the client and its reader task.
struct Shared {
    pending: DashMap<u64, oneshot::Sender<Result<Value>>>,
    feeds: DashMap<String, FeedSink>,
    closed: AtomicBool,
}

impl Shared {
    fn route(&self, text: &str) {
        let incoming: Incoming = match serde_json::from_str(text) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!(error = %e, "unparsable frame from upstream");
                return;
            }
        };

        if let Some(id) = incoming.id.as_ref().and_then(request_id) {
            let Some((_, waiter)) = self.pending.remove(&id) else {
                debug!(id, "reply for unknown request");
                return;
            };
            let reply = match incoming.error {
                Some(err) => Err(UpstreamError::Rpc {
                    code: err.code,
                    message: err.message,
                }),
                None => Ok(incoming.result.unwrap_or(Value::Null)),
            };
            let _ = waiter.send(reply);
            return;
        }

        if incoming.method.as_deref() == Some(METHOD_SUBSCRIBE) {
            let push: PushParams = match incoming.params.map(serde_json::from_value).transpose() {
                Ok(Some(push)) => push,
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "malformed subscription push from upstream");
                    return;
                }
            };
            match self.feeds.get(&push.subscription) {
                Some(feed) => feed.deliver(push.result),
                None => debug!(subscription = %push.subscription, "push for unknown subscription"),
            }
        }
    }

    /// Register a waiter for the reply to request `id`.
    ///
    /// The waiter is inserted before `closed` is checked, so a concurrent
    /// `shut_down` either fails it or makes this call fail.
    fn register(&self, id: u64) -> Result<oneshot::Receiver<Result<Value>>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(UpstreamError::Closed);
        }
        Ok(rx)
    }

    /// Fail every waiter and feed. Safe to call more than once.
    fn shut_down(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                let _ = waiter.send(Err(UpstreamError::Closed));
            }
        }

        for feed in self.feeds.iter() {
            feed.value().fail(UpstreamError::Closed);
        }
        self.feeds.clear();
    }
}

fn request_id(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Upstream client speaking JSON-RPC to a gateway over one WebSocket.
pub struct WsUpstream {
    outbound: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WsUpstream {
    /// Open the gateway connection.
    pub async fn connect(config: WsUpstreamConfig) -> Result<Self> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;

        if let Some(auth) = config.auth_header.as_deref().filter(|a| !a.is_empty()) {
            let value =
                HeaderValue::from_str(auth).map_err(|e| UpstreamError::Connection(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;

        debug!(url = %config.url, "connected to upstream gateway");

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if write.send(msg).await.is_err() || is_close {
                    break;
                }
            }
        });

        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            feeds: DashMap::new(),
            closed: AtomicBool::new(false),
        });

        let reader_shared = Arc::clone(&shared);
        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => reader_shared.route(&text),
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        warn!(error = %e, "upstream connection failed");
                        break;
                    }
                    _ => {}
                }
            }
            reader_shared.shut_down();
        });

        Ok(Self {
            outbound,
            shared,
            next_id: AtomicU64::new(1),
            reader: Mutex::new(Some(reader)),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.shared.register(id)?;

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        if self.outbound.send(Message::Text(request.to_string())).is_err() {
            self.shared.pending.remove(&id);
            return Err(UpstreamError::Closed);
        }

        rx.await.map_err(|_| UpstreamError::Closed)?
    }

    async fn subscribe_feed(&self, feed: &str, params: Value, sink: FeedSink) -> Result<()> {
        let reply = self.call(METHOD_SUBSCRIBE, json!([feed, params])).await?;
        let subscription = reply
            .as_str()
            .ok_or_else(|| {
                UpstreamError::Serialization(format!("subscribe reply is not an id: {}", reply))
            })?
            .to_string();

        debug!(feed, %subscription, "subscribed to upstream feed");
        self.shared.feeds.insert(subscription, sink);
        Ok(())
    }
}

#[async_trait]
impl Upstream for WsUpstream {
    async fn submit_intent(&self, params: SubmitIntentParams) -> Result<Vec<u8>> {
        let reply = self
            .call(METHOD_SUBMIT_INTENT, serde_json::to_value(&params)?)
            .await?;
        Ok(serde_json::to_vec(&reply)?)
    }

    async fn submit_intent_solution(&self, params: SubmitIntentSolutionParams) -> Result<Vec<u8>> {
        let reply = self
            .call(METHOD_SUBMIT_INTENT_SOLUTION, serde_json::to_value(&params)?)
            .await?;
        Ok(serde_json::to_vec(&reply)?)
    }

    async fn get_intent_solutions(&self, params: GetIntentSolutionsParams) -> Result<Vec<u8>> {
        let reply = self
            .call(METHOD_GET_INTENT_SOLUTIONS, serde_json::to_value(&params)?)
            .await?;
        Ok(serde_json::to_vec(&reply)?)
    }

    async fn on_intents(&self, params: IntentsParams, handler: IntentHandler) -> Result<()> {
        let sink = FeedSink::Intents(spawn_dispatcher(handler));
        self.subscribe_feed(INTENTS_FEED, serde_json::to_value(&params)?, sink)
            .await
    }

    async fn on_intent_solutions(
        &self,
        params: IntentSolutionsParams,
        handler: SolutionHandler,
    ) -> Result<()> {
        let sink = FeedSink::Solutions(spawn_dispatcher(handler));
        self.subscribe_feed(INTENT_SOLUTIONS_FEED, serde_json::to_value(&params)?, sink)
            .await
    }

    async fn close(&self) -> Result<()> {
        let _ = self.outbound.send(Message::Close(None));

        let reader = self
            .reader
            .lock()
            .map_err(|_| UpstreamError::Connection("reader handle poisoned".into()))?
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }

        self.shared.shut_down();
        Ok(())
    }
}
