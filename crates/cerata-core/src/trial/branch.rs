//! Per-branch counters and the rates derived from them.

use super::{LossReason, Outcome, OutcomeKind};
use crate::Tier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters for one side of a trial.
///
/// Owned by its [`super::Trial`] and only mutated through the trial's
/// recording operations. Every counter only grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialBranch {
    records_qualified: u64,
    tier_counts: [u64; 5],
    outcomes_won: u64,
    outcomes_lost: u64,
    loss_reasons: BTreeMap<LossReason, u64>,
    total_value: f64,
    total_cost: f64,
}

impl TrialBranch {
    pub(crate) fn record_tier(&mut self, tier: Tier) {
        self.records_qualified += 1;
        self.tier_counts[tier.index()] += 1;
    }

    pub(crate) fn record_outcome(&mut self, outcome: &Outcome) {
        match outcome.kind {
            OutcomeKind::Won => {
                self.outcomes_won += 1;
                self.total_value += outcome.value;
            }
            OutcomeKind::Lost(reason) => {
                self.outcomes_lost += 1;
                *self.loss_reasons.entry(reason).or_insert(0) += 1;
            }
        }
        self.total_cost += outcome.cost;
    }

    /// Records qualified through this branch (every tier, NOT_READY included).
    #[must_use]
    pub fn records_qualified(&self) -> u64 {
        self.records_qualified
    }

    #[must_use]
    pub fn tier_count(&self, tier: Tier) -> u64 {
        self.tier_counts[tier.index()]
    }

    #[must_use]
    pub fn outcomes_won(&self) -> u64 {
        self.outcomes_won
    }

    #[must_use]
    pub fn outcomes_lost(&self) -> u64 {
        self.outcomes_lost
    }

    /// Loss counts keyed by reason.
    #[must_use]
    pub fn loss_reasons(&self) -> &BTreeMap<LossReason, u64> {
        &self.loss_reasons
    }

    /// Revenue from won outcomes.
    #[must_use]
    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Share of records that landed in any tier but NOT_READY.
    #[must_use]
    pub fn qualification_rate(&self) -> f64 {
        if self.records_qualified == 0 {
            return 0.0;
        }
        let qualified = self.records_qualified - self.tier_count(Tier::NotReady);
        qualified as f64 / self.records_qualified as f64
    }

    /// Won / (won + lost). Zero until the first outcome.
    #[must_use]
    pub fn conversion_rate(&self) -> f64 {
        let resolved = self.outcomes_won + self.outcomes_lost;
        if resolved == 0 {
            return 0.0;
        }
        self.outcomes_won as f64 / resolved as f64
    }

    /// Revenue per won deal.
    #[must_use]
    pub fn avg_deal_value(&self) -> f64 {
        self.total_value / self.outcomes_won.max(1) as f64
    }

    /// (revenue − cost) / cost. Zero while nothing was spent.
    #[must_use]
    pub fn roi(&self) -> f64 {
        if self.total_cost <= 0.0 {
            return 0.0;
        }
        (self.total_value - self.total_cost) / self.total_cost
    }

    /// Share of records classified HOT.
    #[must_use]
    pub fn hot_rate(&self) -> f64 {
        if self.records_qualified == 0 {
            return 0.0;
        }
        self.tier_count(Tier::Hot) as f64 / self.records_qualified as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_zero_when_empty() {
        let b = TrialBranch::default();
        assert_eq!(b.qualification_rate(), 0.0);
        assert_eq!(b.conversion_rate(), 0.0);
        assert_eq!(b.avg_deal_value(), 0.0);
        assert_eq!(b.roi(), 0.0);
    }

    #[test]
    fn not_ready_does_not_count_as_qualified() {
        let mut b = TrialBranch::default();
        b.record_tier(Tier::Hot);
        b.record_tier(Tier::Warm);
        b.record_tier(Tier::NotReady);
        b.record_tier(Tier::Crisis);
        assert_eq!(b.records_qualified(), 4);
        assert!((b.qualification_rate() - 0.75).abs() < 1e-12);
        assert!((b.hot_rate() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn lost_deals_add_cost_but_no_revenue() {
        let mut b = TrialBranch::default();
        b.record_outcome(&Outcome::won(10_000.0, 500.0));
        b.record_outcome(&Outcome::lost(LossReason::Competitor, 300.0));
        b.record_outcome(&Outcome::lost(LossReason::Competitor, 200.0));

        assert_eq!(b.total_value(), 10_000.0);
        assert_eq!(b.total_cost(), 1_000.0);
        assert!((b.conversion_rate() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(b.loss_reasons().get(&LossReason::Competitor), Some(&2));
        assert!((b.roi() - 9.0).abs() < 1e-12);
    }
}
