//! Rate-Limit Policies
//!
//! Tiers, the per-operation policies built from them, and the decision taken
//! when the counter store is unreachable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Identifier shared by every caller on a global tier.
pub const GLOBAL_IDENTIFIER: &str = "global";

const MINUTE: u64 = 60;
const DAY: u64 = 24 * 60 * 60;

// == Operation Class ==
/// Billable operations gated by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationClass {
    /// Extracting lesson context with the AI provider
    #[serde(rename = "ai-context")]
    AiContext,
    /// Conversational AI assistant
    #[serde(rename = "ai-chat")]
    AiChat,
}

impl OperationClass {
    pub const ALL: [OperationClass; 2] = [OperationClass::AiContext, OperationClass::AiChat];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::AiContext => "ai-context",
            OperationClass::AiChat => "ai-chat",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai-context" | "context" => Ok(OperationClass::AiContext),
            "ai-chat" | "chat" => Ok(OperationClass::AiChat),
            other => Err(format!("unknown operation class '{}'", other)),
        }
    }
}

// == Tier Scope ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TierScope {
    /// One counter per caller identifier
    PerIdentifier,
    /// One counter shared by all callers
    Global,
}

// == Rate Limit Tier ==
/// A fixed-window quota: at most `max_requests` per `window_secs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitTier {
    pub name: String,
    pub scope: TierScope,
    pub window_secs: u64,
    pub max_requests: u64,
}

impl RateLimitTier {
    pub fn global(name: impl Into<String>, max_requests: u64, window_secs: u64) -> Self {
        Self::new(name, TierScope::Global, max_requests, window_secs)
    }

    pub fn per_identifier(name: impl Into<String>, max_requests: u64, window_secs: u64) -> Self {
        Self::new(name, TierScope::PerIdentifier, max_requests, window_secs)
    }

    fn new(name: impl Into<String>, scope: TierScope, max_requests: u64, window_secs: u64) -> Self {
        Self {
            name: name.into(),
            scope,
            window_secs: window_secs.max(1),
            max_requests,
        }
    }

    /// Counter identifier for `caller` on this tier.
    pub fn identifier_for<'a>(&self, caller: &'a str) -> &'a str {
        match self.scope {
            TierScope::Global => GLOBAL_IDENTIFIER,
            TierScope::PerIdentifier => caller,
        }
    }
}

// == Rate Limit Policy ==
/// The tiers that must all pass for one operation class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitPolicy {
    tiers: Vec<RateLimitTier>,
}

impl RateLimitPolicy {
    /// Orders tiers for evaluation: global tiers first, then per-identifier
    /// tiers from the shortest window (burst) to the longest (daily).
    pub fn new(mut tiers: Vec<RateLimitTier>) -> Self {
        tiers.sort_by_key(|tier| (tier.scope != TierScope::Global, tier.window_secs));
        Self { tiers }
    }

    pub fn tiers(&self) -> &[RateLimitTier] {
        &self.tiers
    }

    /// Global cap, per-user burst per minute and per-user daily budget.
    pub fn standard(global_per_minute: u64, burst_per_minute: u64, daily_quota: u64) -> Self {
        Self::new(vec![
            RateLimitTier::global("global", global_per_minute, MINUTE),
            RateLimitTier::per_identifier("burst", burst_per_minute, MINUTE),
            RateLimitTier::per_identifier("daily", daily_quota, DAY),
        ])
    }

    /// The policy for an operation class under the given configuration.
    pub fn for_operation(op: OperationClass, config: &Config) -> Self {
        let burst = match op {
            OperationClass::AiContext => config.ai_context_per_minute,
            OperationClass::AiChat => config.ai_chat_per_minute,
        };
        Self::standard(config.ai_global_per_minute, burst, config.ai_daily_quota)
    }
}

// == Failure Policy ==
/// Decision when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Allow the request, accepting possible cost overrun
    Open,
    /// Deny the request, accepting possible availability loss
    Closed,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" | "fail-open" | "allow" => Ok(FailurePolicy::Open),
            "closed" | "fail-closed" | "deny" => Ok(FailurePolicy::Closed),
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}
