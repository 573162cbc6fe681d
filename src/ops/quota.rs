use serde::Serialize;

use crate::io::store::{KvStore, StoreError, keys};
use crate::model::config::LimitsConfig;
use crate::model::entitlement::{EntitlementState, Remaining, Tier};

/// Which one-shot prompt was acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    SoftPrompt,
    Badge,
    Paywall,
}

impl Prompt {
    fn key(&self) -> &'static str {
        match self {
            Prompt::SoftPrompt => keys::SOFT_PROMPT_SEEN,
            Prompt::Badge => keys::BADGE_SEEN,
            Prompt::Paywall => keys::PAYWALL_SEEN,
        }
    }
}

/// Advisory nudges that fired for this check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Nudges {
    pub soft_prompt: bool,
    pub badge: bool,
}

/// Free-tier capacity controller.
///
/// Everything is derived from the persisted tier, the monotonic
/// `total_log_count` and the seen flags. Checking the gate before capturing
/// and recording afterwards is the caller's job; the gate never re-derives
/// the counter from the collection length.
#[derive(Debug, Clone)]
pub struct QuotaGate {
    limits: LimitsConfig,
    state: EntitlementState,
    counter_persisted: bool,
}

impl QuotaGate {
    /// Load the persisted entitlement state.
    pub fn load<S: KvStore>(store: &S, limits: LimitsConfig) -> Self {
        let tier = match store.read(keys::TIER) {
            Ok(Some(token)) => Tier::from_token(&token),
            Ok(None) => Tier::Free,
            Err(e) => {
                tracing::warn!(error = %e, "could not read tier, assuming free");
                Tier::Free
            }
        };
        let (total, counter_persisted) = match store.read(keys::TOTAL_LOG_COUNT) {
            Ok(None) => (0, false),
            Ok(Some(raw)) => match raw.trim().parse() {
                Ok(n) => (n, true),
                Err(_) => {
                    tracing::warn!(value = %raw, "malformed log counter, treating free quota as spent");
                    (limits.free_log_cap, true)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "could not read log counter, treating free quota as spent");
                (limits.free_log_cap, true)
            }
        };
        QuotaGate {
            limits,
            state: EntitlementState {
                tier,
                total_log_count: total,
                soft_prompt_seen: store.read_flag(keys::SOFT_PROMPT_SEEN),
                badge_seen: store.read_flag(keys::BADGE_SEEN),
                paywall_seen: store.read_flag(keys::PAYWALL_SEEN),
            },
            counter_persisted,
        }
    }

    /// Seed the counter from the collection length when it was never
    /// persisted (installs that predate the counter). A counter that exists
    /// but cannot be read is never re-derived. Returns whether it seeded.
    pub fn seed_if_unset<S: KvStore>(
        &mut self,
        store: &mut S,
        collection_len: usize,
    ) -> Result<bool, StoreError> {
        if self.counter_persisted {
            return Ok(false);
        }
        self.state.total_log_count = collection_len as u64;
        self.persist_count(store)?;
        Ok(true)
    }

    pub fn state(&self) -> &EntitlementState {
        &self.state
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn tier(&self) -> Tier {
        self.state.tier
    }

    pub fn total_log_count(&self) -> u64 {
        self.state.total_log_count
    }

    /// True in pro, or while the total is strictly below the free cap.
    pub fn can_create_log(&self) -> bool {
        self.state.is_pro() || self.state.total_log_count < self.limits.free_log_cap
    }

    pub fn can_create_bucket(&self, existing: usize) -> bool {
        self.state.is_pro() || existing < self.limits.free_bucket_cap
    }

    pub fn can_create_preset(&self, existing: usize) -> bool {
        self.state.is_pro() || existing < self.limits.free_preset_cap
    }

    pub fn logs_remaining(&self) -> Remaining {
        if self.state.is_pro() {
            Remaining::Unbounded
        } else {
            Remaining::Count(
                self.limits
                    .free_log_cap
                    .saturating_sub(self.state.total_log_count),
            )
        }
    }

    pub fn should_show_soft_prompt(&self) -> bool {
        !self.state.is_pro()
            && !self.state.soft_prompt_seen
            && self.state.total_log_count >= self.limits.soft_prompt_threshold
    }

    pub fn should_show_badge(&self) -> bool {
        !self.state.is_pro()
            && !self.state.badge_seen
            && self.state.total_log_count >= self.limits.badge_threshold
    }

    /// Count one successful capture.
    pub fn record_log_created<S: KvStore>(&mut self, store: &mut S) -> Result<(), StoreError> {
        self.record_logs_created(store, 1)
    }

    /// Count `n` successful captures (e.g. widget captures found at reconciliation).
    pub fn record_logs_created<S: KvStore>(
        &mut self,
        store: &mut S,
        n: u64,
    ) -> Result<(), StoreError> {
        if n == 0 {
            return Ok(());
        }
        self.state.total_log_count = self.state.total_log_count.saturating_add(n);
        self.persist_count(store)
    }

    /// Record the purchase subsystem's outcome.
    pub fn set_entitled<S: KvStore>(&mut self, store: &mut S, entitled: bool) -> Result<(), StoreError> {
        let tier = if entitled { Tier::Pro } else { Tier::Free };
        if tier != self.state.tier {
            tracing::info!(from = %self.state.tier, to = %tier, "entitlement changed");
        }
        self.state.tier = tier;
        store.write(keys::TIER, tier.as_token())
    }

    pub fn mark_seen<S: KvStore>(&mut self, store: &mut S, prompt: Prompt) -> Result<(), StoreError> {
        match prompt {
            Prompt::SoftPrompt => self.state.soft_prompt_seen = true,
            Prompt::Badge => self.state.badge_seen = true,
            Prompt::Paywall => self.state.paywall_seen = true,
        }
        store.write(prompt.key(), "true")
    }

    /// Report the nudges that are due and mark them seen, so each fires once.
    pub fn take_nudges<S: KvStore>(&mut self, store: &mut S) -> Result<Nudges, StoreError> {
        let nudges = Nudges {
            soft_prompt: self.should_show_soft_prompt(),
            badge: self.should_show_badge(),
        };
        if nudges.soft_prompt {
            self.mark_seen(store, Prompt::SoftPrompt)?;
        }
        if nudges.badge {
            self.mark_seen(store, Prompt::Badge)?;
        }
        Ok(nudges)
    }

    fn persist_count<S: KvStore>(&mut self, store: &mut S) -> Result<(), StoreError> {
        store.write(keys::TOTAL_LOG_COUNT, &self.state.total_log_count.to_string())?;
        self.counter_persisted = true;
        Ok(())
    }
}
