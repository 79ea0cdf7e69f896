//! In-process upstream network.
//!
//! Behaves like a single gateway attached to the network: submitted intents
//! are pushed to intent subscribers of the same dApp, submitted solutions are
//! pushed to solution subscribers and kept for later queries. Binary fields
//! are base64-encoded exactly as the real gateway encodes them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use relay_core::{encoding, Intent};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::client::{spawn_dispatcher, IntentHandler, SolutionHandler, Upstream};
use crate::error::{Result, UpstreamError};
use crate::types::{
    GetIntentSolutionsParams, IntentSolutionsParams, IntentsParams, OnIntentSolutionsNotification,
    OnIntentsNotification, SubmitIntentParams, SubmitIntentSolutionParams,
};

struct IntentFeed {
    dapp_address: String,
    sink: mpsc::UnboundedSender<Result<OnIntentsNotification>>,
}

#[derive(Default)]
struct Network {
    intents: DashMap<String, Intent>,
    solutions: DashMap<String, Vec<Vec<u8>>>,
    intent_feeds: Mutex<Vec<IntentFeed>>,
    solution_feeds: Mutex<Vec<mpsc::UnboundedSender<Result<OnIntentSolutionsNotification>>>>,
    unavailable: AtomicBool,
    closed: AtomicBool,
}

/// An [`Upstream`] living entirely inside this process.
#[derive(Clone, Default)]
pub struct LocalUpstream {
    network: Arc<Network>,
}

impl LocalUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a transport outage. Every call fails while unavailable.
    pub fn set_available(&self, available: bool) {
        self.network.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of intents the network has accepted.
    pub fn intent_count(&self) -> usize {
        self.network.intents.len()
    }

    /// Push a raw solution notification, bypassing submission.
    pub fn push_solution(&self, notification: OnIntentSolutionsNotification) {
        if let Ok(feeds) = self.network.solution_feeds.lock() {
            for feed in feeds.iter() {
                let _ = feed.send(Ok(notification.clone()));
            }
        }
    }

    /// Push a raw intent notification, bypassing submission.
    pub fn push_intent(&self, notification: OnIntentsNotification) {
        if let Ok(feeds) = self.network.intent_feeds.lock() {
            for feed in feeds
                .iter()
                .filter(|f| f.dapp_address.is_empty() || f.dapp_address == notification.dapp_address)
            {
                let _ = feed.sink.send(Ok(notification.clone()));
            }
        }
    }

    fn check(&self) -> Result<()> {
        if self.network.closed.load(Ordering::SeqCst) {
            return Err(UpstreamError::Closed);
        }
        if self.network.unavailable.load(Ordering::SeqCst) {
            return Err(UpstreamError::Connection("network unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Upstream for LocalUpstream {
    async fn submit_intent(&self, params: SubmitIntentParams) -> Result<Vec<u8>> {
        self.check()?;

        let intent = Intent {
            id: Uuid::new_v4().to_string(),
            submitter: params.dapp_address,
            payload: params.intent,
        };
        let intent_id = intent.id.clone();
        let notification = OnIntentsNotification {
            dapp_address: intent.submitter.clone(),
            sender_address: intent.submitter.clone(),
            intent_id: intent.id.clone(),
            intent: encoding::encode(&intent.payload),
            timestamp: Some(Utc::now()),
        };

        self.network.intents.insert(intent_id.clone(), intent);
        self.push_intent(notification);

        Ok(serde_json::to_vec(&json!({ "intent_id": intent_id }))?)
    }

    async fn submit_intent_solution(&self, params: SubmitIntentSolutionParams) -> Result<Vec<u8>> {
        self.check()?;

        if !self.network.intents.contains_key(&params.intent_id) {
            return Err(UpstreamError::Rpc {
                code: -32602,
                message: format!("unknown intent: {}", params.intent_id),
            });
        }

        self.network
            .solutions
            .entry(params.intent_id.clone())
            .or_default()
            .push(params.intent_solution.clone());

        self.push_solution(OnIntentSolutionsNotification {
            intent_id: params.intent_id,
            intent_solution: encoding::encode(&params.intent_solution),
        });

        let solution_id = Uuid::new_v4().to_string();
        Ok(serde_json::to_vec(&json!({ "solution_id": solution_id }))?)
    }

    async fn get_intent_solutions(&self, params: GetIntentSolutionsParams) -> Result<Vec<u8>> {
        self.check()?;

        let items: Vec<_> = self
            .network
            .solutions
            .get(&params.intent_id)
            .map(|solutions| {
                solutions
                    .iter()
                    .map(|solution| {
                        json!({
                            "intent_id": params.intent_id,
                            "intent_solution": encoding::encode(solution),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(serde_json::to_vec(&items)?)
    }

    async fn on_intents(&self, params: IntentsParams, handler: IntentHandler) -> Result<()> {
        self.check()?;

        let sink = spawn_dispatcher(handler);
        self.network
            .intent_feeds
            .lock()
            .map_err(|_| UpstreamError::Connection("feed registry poisoned".into()))?
            .push(IntentFeed {
                dapp_address: params.dapp_address,
                sink,
            });
        Ok(())
    }

    async fn on_intent_solutions(
        &self,
        _params: IntentSolutionsParams,
        handler: SolutionHandler,
    ) -> Result<()> {
        self.check()?;

        let sink = spawn_dispatcher(handler);
        self.network
            .solution_feeds
            .lock()
            .map_err(|_| UpstreamError::Connection("feed registry poisoned".into()))?
            .push(sink);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.network.closed.store(true, Ordering::SeqCst);
        if let Ok(mut feeds) = self.network.intent_feeds.lock() {
            feeds.clear();
        }
        if let Ok(mut feeds) = self.network.solution_feeds.lock() {
            feeds.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SecretKey;
    use std::time::Duration;

    fn submit(dapp: &str, payload: &[u8]) -> SubmitIntentParams {
        SubmitIntentParams {
            dapp_address: dapp.into(),
            sender_private_key: SecretKey::new("dapp-key"),
            intent: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_submit_assigns_id() {
        let upstream = LocalUpstream::new();

        let reply = upstream.submit_intent(submit("0xdapp", b"p1")).await.unwrap();
        let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();

        assert!(reply["intent_id"].as_str().is_some());
        assert_eq!(upstream.intent_count(), 1);
    }

    #[tokio::test]
    async fn test_intents_pushed_to_matching_dapp_only() {
        let upstream = LocalUpstream::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        upstream
            .on_intents(
                IntentsParams {
                    solver_private_key: SecretKey::new("solver-key"),
                    dapp_address: "0xdapp".into(),
                },
                Arc::new(move |n: Result<OnIntentsNotification>| {
                    let _ = tx.send(n);
                }),
            )
            .await
            .unwrap();

        upstream.submit_intent(submit("0xother", b"skip")).await.unwrap();
        upstream.submit_intent(submit("0xdapp", b"p1")).await.unwrap();

        let pushed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(pushed.dapp_address, "0xdapp");
        assert_eq!(pushed.intent, encoding::encode(b"p1"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_solution_for_unknown_intent_rejected() {
        let upstream = LocalUpstream::new();
        let result = upstream
            .submit_intent_solution(SubmitIntentSolutionParams {
                solver_private_key: SecretKey::new("solver-key"),
                intent_id: "missing".into(),
                intent_solution: b"{}".to_vec(),
            })
            .await;
        assert!(matches!(result, Err(UpstreamError::Rpc { .. })));
    }

    #[tokio::test]
    async fn test_unavailable_network_fails_calls() {
        let upstream = LocalUpstream::new();
        upstream.set_available(false);

        let result = upstream.submit_intent(submit("0xdapp", b"p1")).await;
        assert!(matches!(result, Err(UpstreamError::Connection(_))));

        upstream.set_available(true);
        assert!(upstream.submit_intent(submit("0xdapp", b"p1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_network_rejects_calls() {
        let upstream = LocalUpstream::new();
        upstream.close().await.unwrap();

        let result = upstream.submit_intent(submit("0xdapp", b"p1")).await;
        assert_eq!(result, Err(UpstreamError::Closed));
    }
}
