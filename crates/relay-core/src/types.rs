//! Subscription types and the notifications routed to them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::intent::{IntentNotification, SolutionNotification};

/// Kind of notification stream a solver can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    /// New intents pushed by upstream.
    Intent,
}

impl SubscriptionType {
    /// Every supported subscription type.
    pub const ALL: [SubscriptionType; 1] = [SubscriptionType::Intent];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Intent => "intent",
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RelayError::InvalidSubscriptionType {
                requested: s.to_string(),
                valid: format!(
                    "[{}]",
                    SubscriptionType::ALL
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                ),
            })
    }
}

/// An upstream push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Notification {
    Intent(IntentNotification),
    Solution(SolutionNotification),
}

impl Notification {
    /// The subscription type this event is delivered to, if any.
    ///
    /// Solutions are cached rather than fanned out, so they map to nothing.
    pub fn subscription_type(&self) -> Option<SubscriptionType> {
        match self {
            Notification::Intent(_) => Some(SubscriptionType::Intent),
            Notification::Solution(_) => None,
        }
    }
}
