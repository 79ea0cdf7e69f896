//! Request parameters and push notifications exchanged with upstream.

use std::fmt;

use chrono::{DateTime, Utc};
use relay_core::encoding::base64_bytes;
use serde::{Deserialize, Serialize};

/// Key material handed to the gateway, which signs on the relay's behalf.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitIntentParams {
    pub dapp_address: String,
    pub sender_private_key: SecretKey,
    #[serde(with = "base64_bytes")]
    pub intent: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitIntentSolutionParams {
    pub solver_private_key: SecretKey,
    pub intent_id: String,
    #[serde(with = "base64_bytes")]
    pub intent_solution: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetIntentSolutionsParams {
    pub dapp_or_sender_private_key: SecretKey,
    pub intent_id: String,
}

/// Subscription to new intents submitted for one dApp.
#[derive(Debug, Clone, Serialize)]
pub struct IntentsParams {
    pub solver_private_key: SecretKey,
    pub dapp_address: String,
}

/// Subscription to solutions for the dApp's own intents.
#[derive(Debug, Clone, Serialize)]
pub struct IntentSolutionsParams {
    pub dapp_private_key: SecretKey,
}

/// An intent pushed by upstream. `intent` is still in its wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnIntentsNotification {
    pub dapp_address: String,
    pub sender_address: String,
    pub intent_id: String,
    pub intent: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A solution pushed by upstream. `intent_solution` is base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnIntentSolutionsNotification {
    pub intent_id: String,
    pub intent_solution: String,
}

/// Feed names understood by the gateway's `subscribe` method.
pub const INTENTS_FEED: &str = "userIntentFeed";
pub const INTENT_SOLUTIONS_FEED: &str = "userIntentSolutionsFeed";
