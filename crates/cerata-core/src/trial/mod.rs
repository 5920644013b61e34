//! # Trial Module
//!
//! Classic-vs-experimental lens trials.
//!
//! A [`Trial`] pairs the classic lens with an experimental one, splits
//! traffic between them, accumulates per-branch counters while RUNNING and
//! walks a one-way lifecycle:
//!
//! ```text
//! PLANNED ──start──▶ RUNNING ──evaluate/conclude──▶ COMPLETED ──▶ PROMOTED
//!                                                          └────▶ ARCHIVED
//! ```
//!
//! All mutable state of a trial (status, both branches, last evaluation)
//! lives behind one mutex. Counter updates are a single critical section, so
//! a snapshot never observes a half-recorded event.

mod branch;
mod evaluator;
mod manager;
pub mod sampler;

pub use branch::TrialBranch;
pub use evaluator::{
    BranchFitness, EvaluatorConfig, Recommendation, TrialEvaluator, TrialResult, Winner,
};
pub use manager::{ManagerConfig, TrialManager};

use crate::error::{CerataError, Result};
use crate::lens::Lens;
use crate::standard::{StandardCell, StandardLens, StandardRecord};
use crate::{Branch, Tier, TrialId};
use sampler::BranchSampler;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// =============================================================================
// STATUS & OUTCOMES
// =============================================================================

/// Trial lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Created, not yet receiving traffic.
    Planned,
    /// Receiving traffic and accumulating counters.
    Running,
    /// Evaluated; waiting for promotion or archival.
    Completed,
    /// Experimental lens became the standard. Terminal.
    Promoted,
    /// Closed without promotion. Terminal; counters stay queryable.
    Archived,
}

impl TrialStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TrialStatus::Promoted | TrialStatus::Archived)
    }
}

/// Why a deal was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReason {
    /// Chose a competing product.
    Competitor,
    /// No budget available.
    NoBudget,
    /// No decision was reached.
    NoDecision,
    /// Wrong time to buy.
    Timing,
    /// Stopped responding.
    WentDark,
    /// Anything else.
    Other,
}

/// Resolution of a qualified record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// Deal closed.
    Won,
    /// Deal lost, with the reason.
    Lost(LossReason),
}

/// An outcome event reported after a record resolves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Won or lost, with the loss reason.
    pub kind: OutcomeKind,
    /// Deal value. Only counted as revenue when won.
    pub value: f64,
    /// Cost of pursuing the record. Always counted.
    pub cost: f64,
}

impl Outcome {
    /// A won deal.
    #[must_use]
    pub fn won(value: f64, cost: f64) -> Self {
        Self {
            kind: OutcomeKind::Won,
            value,
            cost,
        }
    }

    /// A lost deal.
    #[must_use]
    pub fn lost(reason: LossReason, cost: f64) -> Self {
        Self {
            kind: OutcomeKind::Lost(reason),
            value: 0.0,
            cost,
        }
    }

    /// Reject negative or non-finite amounts.
    pub fn validate(&self) -> Result<()> {
        for (label, amount) in [("value", self.value), ("cost", self.cost)] {
            if !amount.is_finite() || amount < 0.0 {
                return Err(CerataError::InvalidOutcome(format!(
                    "{label} must be finite and >= 0, got {amount}"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TRIAL
// =============================================================================

/// Point-in-time copy of a trial, including its counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSnapshot {
    /// Trial id.
    pub id: TrialId,
    /// Human-readable name.
    pub name: String,
    /// Lens serving the classic branch.
    pub classic: Lens,
    /// Lens serving the experimental branch.
    pub experimental: Lens,
    /// Probability of the experimental branch.
    pub traffic_split: f64,
    /// Records each branch needs before evaluation.
    pub min_sample_size: u64,
    /// Standard version current when the trial was created.
    pub baseline_version: u64,
    /// Lifecycle status.
    pub status: TrialStatus,
    /// Classic branch counters.
    pub classic_branch: TrialBranch,
    /// Experimental branch counters.
    pub experimental_branch: TrialBranch,
    /// Most recent evaluation.
    pub last_result: Option<TrialResult>,
    /// Incremented on every mutation.
    pub revision: u64,
}

impl TrialSnapshot {
    /// Counters of one branch.
    #[must_use]
    pub fn branch(&self, branch: Branch) -> &TrialBranch {
        match branch {
            Branch::Classic => &self.classic_branch,
            Branch::Experimental => &self.experimental_branch,
        }
    }

    /// Whether both branches reached the minimum sample size.
    #[must_use]
    pub fn has_min_samples(&self) -> bool {
        self.classic_branch.records_qualified() >= self.min_sample_size
            && self.experimental_branch.records_qualified() >= self.min_sample_size
    }
}

/// Persistence hook run before a transition is committed.
pub(crate) type Persist<'a> = &'a dyn Fn(&TrialSnapshot) -> Result<()>;

/// Persistence hook for a promotion: trial plus new standard and history.
pub(crate) type PersistPromotion<'a> =
    &'a dyn Fn(&TrialSnapshot, &StandardLens, &[StandardRecord]) -> Result<()>;

#[derive(Debug, Clone)]
struct TrialState {
    status: TrialStatus,
    classic: TrialBranch,
    experimental: TrialBranch,
    last_result: Option<TrialResult>,
    revision: u64,
}

impl TrialState {
    fn branch_mut(&mut self, branch: Branch) -> &mut TrialBranch {
        match branch {
            Branch::Classic => &mut self.classic,
            Branch::Experimental => &mut self.experimental,
        }
    }
}

/// A classic-vs-experimental experiment.
///
/// Configuration is immutable after creation. Lifecycle transitions go
/// through [`TrialManager`], which enforces the single-RUNNING rule.
#[derive(Debug)]
pub struct Trial {
    id: TrialId,
    name: String,
    classic: Lens,
    experimental: Lens,
    traffic_split: f64,
    min_sample_size: u64,
    baseline_version: u64,
    state: Mutex<TrialState>,
}

impl Trial {
    pub(crate) fn new(
        id: TrialId,
        name: String,
        classic: Lens,
        experimental: Lens,
        traffic_split: f64,
        min_sample_size: u64,
        baseline_version: u64,
    ) -> Result<Self> {
        if !(traffic_split > 0.0 && traffic_split < 1.0) {
            return Err(CerataError::InvalidTrialConfig(format!(
                "traffic_split must be strictly between 0 and 1, got {traffic_split}"
            )));
        }
        if min_sample_size == 0 {
            return Err(CerataError::InvalidTrialConfig(
                "min_sample_size must be at least 1".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(CerataError::InvalidTrialConfig(
                "trial name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id,
            name,
            classic,
            experimental,
            traffic_split,
            min_sample_size,
            baseline_version,
            state: Mutex::new(TrialState {
                status: TrialStatus::Planned,
                classic: TrialBranch::default(),
                experimental: TrialBranch::default(),
                last_result: None,
                revision: 0,
            }),
        })
    }

    pub(crate) fn from_snapshot(snapshot: TrialSnapshot) -> Self {
        Self {
            id: snapshot.id,
            name: snapshot.name,
            classic: snapshot.classic,
            experimental: snapshot.experimental,
            traffic_split: snapshot.traffic_split,
            min_sample_size: snapshot.min_sample_size,
            baseline_version: snapshot.baseline_version,
            state: Mutex::new(TrialState {
                status: snapshot.status,
                classic: snapshot.classic_branch,
                experimental: snapshot.experimental_branch,
                last_result: snapshot.last_result,
                revision: snapshot.revision,
            }),
        }
    }

    /// Trial id.
    #[must_use]
    pub fn id(&self) -> TrialId {
        self.id
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lens serving the classic branch.
    #[must_use]
    pub fn classic_lens(&self) -> &Lens {
        &self.classic
    }

    /// Lens serving the experimental branch.
    #[must_use]
    pub fn experimental_lens(&self) -> &Lens {
        &self.experimental
    }

    /// Lens serving `branch`.
    #[must_use]
    pub fn lens_for(&self, branch: Branch) -> &Lens {
        match branch {
            Branch::Classic => &self.classic,
            Branch::Experimental => &self.experimental,
        }
    }

    /// Probability of assigning a record to the experimental branch.
    #[must_use]
    pub fn traffic_split(&self) -> f64 {
        self.traffic_split
    }

    /// Records each branch needs before evaluation.
    #[must_use]
    pub fn min_sample_size(&self) -> u64 {
        self.min_sample_size
    }

    /// Standard version the trial was created against. Promotion requires
    /// the standard to still be at this version.
    #[must_use]
    pub fn baseline_version(&self) -> u64 {
        self.baseline_version
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> TrialStatus {
        self.lock().status
    }

    /// Most recent evaluation, if any.
    #[must_use]
    pub fn last_result(&self) -> Option<TrialResult> {
        self.lock().last_result.clone()
    }

    /// Consistent copy of configuration and counters.
    #[must_use]
    pub fn snapshot(&self) -> TrialSnapshot {
        let state = self.lock();
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &TrialState) -> TrialSnapshot {
        TrialSnapshot {
            id: self.id,
            name: self.name.clone(),
            classic: self.classic.clone(),
            experimental: self.experimental.clone(),
            traffic_split: self.traffic_split,
            min_sample_size: self.min_sample_size,
            baseline_version: self.baseline_version,
            status: state.status,
            classic_branch: state.classic.clone(),
            experimental_branch: state.experimental.clone(),
            last_result: state.last_result.clone(),
            revision: state.revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrialState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require(&self, state: &TrialState, expected: TrialStatus, action: &'static str) -> Result<()> {
        if state.status == expected {
            Ok(())
        } else {
            Err(CerataError::InvalidTransition {
                trial: self.id,
                from: state.status,
                action,
            })
        }
    }

    // -------------------------------------------------------------------------
    // Transitions (driven by TrialManager)
    // -------------------------------------------------------------------------

    /// Apply `change` to a copy of the state, persist the resulting snapshot,
    /// then commit. A failed persist leaves the trial untouched.
    fn transition<T>(
        &self,
        persist: Persist<'_>,
        change: impl FnOnce(&mut TrialState) -> Result<T>,
    ) -> Result<(T, TrialSnapshot)> {
        let mut state = self.lock();
        let mut next = state.clone();
        let out = change(&mut next)?;
        next.revision += 1;
        let snapshot = self.snapshot_locked(&next);
        persist(&snapshot)?;
        *state = next;
        Ok((out, snapshot))
    }

    pub(crate) fn start(&self, persist: Persist<'_>) -> Result<TrialSnapshot> {
        self.transition(persist, |state| {
            self.require(state, TrialStatus::Planned, "start")?;
            state.status = TrialStatus::Running;
            Ok(())
        })
        .map(|((), snapshot)| snapshot)
    }

    pub(crate) fn assign(&self, sampler: &mut dyn BranchSampler) -> Result<Branch> {
        let state = self.lock();
        self.require(&state, TrialStatus::Running, "assign a branch in")?;
        Ok(sampler::choose(sampler, self.traffic_split))
    }

    pub(crate) fn record_qualification(
        &self,
        branch: Branch,
        tier: Tier,
        persist: Persist<'_>,
    ) -> Result<TrialSnapshot> {
        self.transition(persist, |state| {
            self.require(state, TrialStatus::Running, "record a qualification in")?;
            state.branch_mut(branch).record_tier(tier);
            Ok(())
        })
        .map(|((), snapshot)| snapshot)
    }

    pub(crate) fn record_outcome(
        &self,
        branch: Branch,
        outcome: &Outcome,
        persist: Persist<'_>,
    ) -> Result<TrialSnapshot> {
        outcome.validate()?;
        self.transition(persist, |state| {
            self.require(state, TrialStatus::Running, "record an outcome in")?;
            state.branch_mut(branch).record_outcome(outcome);
            Ok(())
        })
        .map(|((), snapshot)| snapshot)
    }

    /// Evaluate under the lock. A decisive recommendation completes the
    /// trial; `force` completes it regardless.
    pub(crate) fn evaluate(
        &self,
        evaluator: &TrialEvaluator,
        force: bool,
        persist: Persist<'_>,
    ) -> Result<(TrialResult, TrialSnapshot)> {
        let action = if force { "conclude" } else { "evaluate" };
        self.transition(persist, |state| {
            self.require(state, TrialStatus::Running, action)?;
            let result = evaluator.evaluate(&self.snapshot_locked(state))?;
            if force || result.recommendation != Recommendation::Continue {
                state.status = TrialStatus::Completed;
            }
            state.last_result = Some(result.clone());
            Ok(result)
        })
    }

    /// Swap the standard to the experimental lens and mark PROMOTED.
    ///
    /// The trial lock is held across the standard swap, and both are
    /// persisted together before either becomes visible. Refused with
    /// [`CerataError::StandardChanged`] if another promotion replaced the
    /// standard this trial was created against.
    pub(crate) fn promote_into(
        &self,
        cell: &StandardCell,
        persist: PersistPromotion<'_>,
    ) -> Result<(Arc<StandardLens>, TrialSnapshot)> {
        let mut state = self.lock();
        self.require(&state, TrialStatus::Completed, "promote")?;
        let experimental_won = state
            .last_result
            .as_ref()
            .is_some_and(|r| r.winner == Winner::Experimental);
        if !experimental_won {
            return Err(CerataError::InvalidTransition {
                trial: self.id,
                from: state.status,
                action: "promote a non-winning experiment in",
            });
        }

        let mut next = state.clone();
        next.status = TrialStatus::Promoted;
        next.revision += 1;
        let snapshot = self.snapshot_locked(&next);

        let standard = cell.promote_with(self.experimental.clone(), self.id, |standard, history| {
            // The last record holds the standard being replaced.
            let current = history.last().map_or(0, |r| r.replaced.version);
            if current != self.baseline_version {
                return Err(CerataError::StandardChanged {
                    trial: self.id,
                    baseline: self.baseline_version,
                    current,
                });
            }
            persist(&snapshot, standard, history)
        })?;
        *state = next;
        Ok((standard, snapshot))
    }

    pub(crate) fn archive(&self, persist: Persist<'_>) -> Result<TrialSnapshot> {
        self.transition(persist, |state| {
            self.require(state, TrialStatus::Completed, "archive")?;
            state.status = TrialStatus::Archived;
            Ok(())
        })
        .map(|((), snapshot)| snapshot)
    }
}

// =============================================================================
// TESTS
// =============================================================================
