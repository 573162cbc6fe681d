use std::fmt;

use serde::{Deserialize, Serialize};

/// Entitlement tier. Only the purchase subsystem's outcome moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
}

impl Tier {
    /// Persisted token for this tier.
    pub fn as_token(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
        }
    }

    /// Anything other than `pro` reads as free.
    pub fn from_token(s: &str) -> Self {
        if s.trim() == "pro" { Tier::Pro } else { Tier::Free }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Persisted entitlement and quota counters.
///
/// `total_log_count` counts every capture ever recorded and is independent of
/// the current collection size: deleting a log does not refund quota.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitlementState {
    pub tier: Tier,
    pub total_log_count: u64,
    pub soft_prompt_seen: bool,
    pub badge_seen: bool,
    pub paywall_seen: bool,
}

impl EntitlementState {
    pub fn is_pro(&self) -> bool {
        self.tier == Tier::Pro
    }
}

/// Remaining capacity under the current tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Unbounded,
    Count(u64),
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Unbounded => f.write_str("unlimited"),
            Remaining::Count(n) => write!(f, "{}", n),
        }
    }
}
