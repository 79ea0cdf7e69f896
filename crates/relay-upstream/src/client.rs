//! The upstream collaborator seam.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{
    GetIntentSolutionsParams, IntentSolutionsParams, IntentsParams, OnIntentSolutionsNotification,
    OnIntentsNotification, SubmitIntentParams, SubmitIntentSolutionParams,
};

/// Callback for pushed intents. Errors report a broken feed item.
pub type IntentHandler = Arc<dyn Fn(Result<OnIntentsNotification>) + Send + Sync>;

/// Callback for pushed solutions.
pub type SolutionHandler = Arc<dyn Fn(Result<OnIntentSolutionsNotification>) + Send + Sync>;

/// Submit, query and subscribe primitives of the upstream network.
///
/// Replies are returned as the raw JSON bytes the network produced; parsing
/// them is the caller's business.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Submit an intent. The reply carries the assigned `intent_id`.
    async fn submit_intent(&self, params: SubmitIntentParams) -> Result<Vec<u8>>;

    /// Submit a solver's solution for an intent.
    async fn submit_intent_solution(&self, params: SubmitIntentSolutionParams) -> Result<Vec<u8>>;

    /// Query every solution upstream holds for an intent.
    async fn get_intent_solutions(&self, params: GetIntentSolutionsParams) -> Result<Vec<u8>>;

    /// Register `handler` for every intent pushed until the connection closes.
    async fn on_intents(&self, params: IntentsParams, handler: IntentHandler) -> Result<()>;

    /// Register `handler` for every solution pushed until the connection closes.
    async fn on_intent_solutions(
        &self,
        params: IntentSolutionsParams,
        handler: SolutionHandler,
    ) -> Result<()>;

    /// Release the connection.
    async fn close(&self) -> Result<()>;
}

/// Run `handler` on its own task for every item sent into the returned channel.
///
/// Items of one feed are handled one at a time, in arrival order. The task
/// ends when every sender is dropped.
pub(crate) fn spawn_dispatcher<T: Send + 'static>(
    handler: Arc<dyn Fn(Result<T>) + Send + Sync>,
) -> mpsc::UnboundedSender<Result<T>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Result<T>>();

    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            handler(item);
        }
    });

    tx
}
