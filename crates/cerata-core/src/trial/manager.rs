//! # Trial Manager
//!
//! Owns every trial, the current standard lens and the branch sampler.
//!
//! Concurrency:
//! - The registry mutex makes the single-RUNNING check and the start
//!   transition one critical section.
//! - Counter updates lock only the affected trial.
//! - Promotion holds the trial lock while swapping the [`StandardCell`];
//!   readers see the old or the new standard, never a mixture.
//!
//! When a [`TrialStore`] is attached, each mutation is persisted before it is
//! committed in memory and before the call returns.

use super::sampler::{BranchSampler, RngSampler};
use super::{
    EvaluatorConfig, Outcome, Trial, TrialEvaluator, TrialResult, TrialSnapshot, TrialStatus,
};
use crate::error::{CerataError, Result};
use crate::formats::ManagerSnapshot;
use crate::lens::{ExperimentConfig, Lens};
use crate::standard::{StandardCell, StandardLens, StandardRecord};
use crate::storage::TrialStore;
use crate::{Branch, Tier, TrialId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Default bound on retained qualification results.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1_000;

/// Manager configuration. Every field has a serde default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub evaluator: EvaluatorConfig,
    /// Qualification results kept for read-only history queries.
    pub history_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            evaluator: EvaluatorConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug)]
struct Registry {
    trials: BTreeMap<TrialId, Arc<Trial>>,
    next_id: u64,
}

/// Trial lifecycle orchestration and the current standard.
pub struct TrialManager {
    config: ManagerConfig,
    evaluator: TrialEvaluator,
    standard: StandardCell,
    registry: Mutex<Registry>,
    sampler: Mutex<Box<dyn BranchSampler>>,
    store: Option<Arc<dyn TrialStore>>,
}

impl std::fmt::Debug for TrialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialManager")
            .field("config", &self.config)
            .field("standard_version", &self.standard.snapshot().version)
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl TrialManager {
    /// New manager with `standard` as version 1 and an entropy-seeded sampler.
    #[must_use]
    pub fn new(standard: Lens) -> Self {
        Self::from_parts(StandardCell::new(standard), Registry {
            trials: BTreeMap::new(),
            next_id: 1,
        })
    }

    fn from_parts(standard: StandardCell, registry: Registry) -> Self {
        let config = ManagerConfig::default();
        Self {
            config,
            evaluator: TrialEvaluator::new(config.evaluator),
            standard,
            registry: Mutex::new(registry),
            sampler: Mutex::new(Box::new(RngSampler::from_entropy())),
            store: None,
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ManagerConfig) -> Result<Self> {
        config.evaluator.validate()?;
        self.config = config;
        self.evaluator = TrialEvaluator::new(config.evaluator);
        Ok(self)
    }

    /// Replace the branch sampler.
    #[must_use]
    pub fn with_sampler(mut self, sampler: impl BranchSampler + 'static) -> Self {
        self.sampler = Mutex::new(Box::new(sampler));
        self
    }

    /// Attach a store and write the current state to it.
    pub fn with_store(mut self, store: Arc<dyn TrialStore>) -> Result<Self> {
        let (standard, history) = self.standard.snapshot_with_history();
        store.save_standard(&standard, &history)?;
        {
            let registry = self.registry();
            for trial in registry.trials.values() {
                store.save_created_trial(&trial.snapshot(), registry.next_id)?;
            }
        }
        self.store = Some(store);
        Ok(self)
    }

    /// Resume from `store`, or start fresh with `initial_standard` if the
    /// store is empty.
    ///
    /// Configuration is not stored, so the caller passes it again. The
    /// sampler is always reseeded from entropy; replace it with
    /// [`TrialManager::with_sampler`] for reproducible assignment.
    pub fn restore(
        store: Arc<dyn TrialStore>,
        initial_standard: Lens,
        config: ManagerConfig,
    ) -> Result<Self> {
        let manager = match store.load()? {
            Some(snapshot) => {
                info!(
                    trials = snapshot.trials.len(),
                    standard_version = snapshot.standard.version,
                    next_trial_id = snapshot.next_trial_id,
                    "restored trial manager"
                );
                let mut manager = Self::from_snapshot(snapshot);
                manager.store = Some(store);
                manager
            }
            None => Self::new(initial_standard).with_store(store)?,
        };
        manager.with_config(config)
    }

    /// Rebuild an in-memory manager from a snapshot.
    ///
    /// Uses the default [`ManagerConfig`] and an entropy-seeded sampler.
    #[must_use]
    pub fn from_snapshot(snapshot: ManagerSnapshot) -> Self {
        let trials = snapshot
            .trials
            .into_iter()
            .map(|t| (t.id, Arc::new(Trial::from_snapshot(t))))
            .collect::<BTreeMap<_, _>>();
        let next_id = trials
            .keys()
            .next_back()
            .map_or(1, |id| id.0 + 1)
            .max(snapshot.next_trial_id);
        Self::from_parts(
            StandardCell::from_parts(snapshot.standard, snapshot.history),
            Registry { trials, next_id },
        )
    }

    /// Consistent copy of everything needed to resume.
    #[must_use]
    pub fn snapshot(&self) -> ManagerSnapshot {
        let registry = self.registry();
        let (standard, history) = self.standard.snapshot_with_history();
        ManagerSnapshot {
            standard: (*standard).clone(),
            history,
            trials: registry.trials.values().map(|t| t.snapshot()).collect(),
            next_trial_id: registry.next_id,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, snapshot: &TrialSnapshot) -> Result<()> {
        match &self.store {
            Some(store) => store.save_trial(snapshot),
            None => Ok(()),
        }
    }

    fn save_created(&self, snapshot: &TrialSnapshot, next_trial_id: u64) -> Result<()> {
        match &self.store {
            Some(store) => store.save_created_trial(snapshot, next_trial_id),
            None => Ok(()),
        }
    }

    fn save_promotion(
        &self,
        trial: &TrialSnapshot,
        standard: &StandardLens,
        history: &[StandardRecord],
    ) -> Result<()> {
        match &self.store {
            Some(store) => store.save_promotion(trial, standard, history),
            None => Ok(()),
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Create a PLANNED trial.
    ///
    /// `classic` defaults to the current standard. The experimental config
    /// is resolved against the classic lens. The current standard version is
    /// recorded as the trial's baseline for promotion.
    pub fn create_trial(
        &self,
        name: impl Into<String>,
        classic: Option<Lens>,
        experimental: impl Into<ExperimentConfig>,
        traffic_split: f64,
        min_sample_size: u64,
    ) -> Result<Arc<Trial>> {
        let current = self.standard.snapshot();
        let classic = classic.unwrap_or_else(|| current.lens.clone());
        let experimental = experimental.into().resolve(&classic)?;

        let mut registry = self.registry();
        let id = TrialId(registry.next_id);
        let trial = Arc::new(Trial::new(
            id,
            name.into(),
            classic,
            experimental,
            traffic_split,
            min_sample_size,
            current.version,
        )?);
        self.save_created(&trial.snapshot(), registry.next_id + 1)?;
        registry.trials.insert(id, Arc::clone(&trial));
        registry.next_id += 1;

        info!(
            trial = %id,
            name = trial.name(),
            classic = trial.classic_lens().name(),
            experimental = trial.experimental_lens().name(),
            baseline_version = current.version,
            traffic_split,
            min_sample_size,
            "trial created"
        );
        Ok(trial)
    }

    /// PLANNED → RUNNING. Fails if another trial is already running.
    pub fn start(&self, id: TrialId) -> Result<()> {
        let registry = self.registry();
        let trial = registry
            .trials
            .get(&id)
            .ok_or(CerataError::TrialNotFound(id))?;

        if let Some(running) = registry
            .trials
            .values()
            .find(|t| t.id() != id && t.status() == TrialStatus::Running)
        {
            warn!(trial = %id, running = %running.id(), "start rejected: trial already running");
            return Err(CerataError::ActiveTrialExists {
                running: running.id(),
            });
        }

        trial.start(&|s| self.save(s))?;
        info!(trial = %id, "trial started");
        Ok(())
    }

    /// Draw a branch for one incoming record.
    pub fn assign_branch(&self, id: TrialId) -> Result<Branch> {
        let trial = self.trial(id)?;
        let mut sampler = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
        let branch = trial.assign(&mut **sampler)?;
        debug!(trial = %id, branch = %branch, "branch assigned");
        Ok(branch)
    }

    /// Count one qualified record against a branch.
    pub fn record_qualification(&self, id: TrialId, branch: Branch, tier: Tier) -> Result<()> {
        self.trial(id)?
            .record_qualification(branch, tier, &|s| self.save(s))?;
        debug!(trial = %id, branch = %branch, tier = %tier, "qualification recorded");
        Ok(())
    }

    /// Record a resolved outcome. Durable before this returns when a store
    /// is attached.
    pub fn record_outcome(&self, id: TrialId, branch: Branch, outcome: Outcome) -> Result<()> {
        self.trial(id)?
            .record_outcome(branch, &outcome, &|s| self.save(s))?;
        debug!(trial = %id, branch = %branch, outcome = ?outcome.kind, "outcome recorded");
        Ok(())
    }

    /// Evaluate a RUNNING trial.
    ///
    /// A promote or archive recommendation moves the trial to COMPLETED; a
    /// continue recommendation leaves it RUNNING.
    pub fn evaluate(&self, id: TrialId) -> Result<TrialResult> {
        self.evaluate_inner(id, false)
    }

    /// Evaluate a RUNNING trial and move it to COMPLETED whatever the
    /// recommendation.
    pub fn conclude(&self, id: TrialId) -> Result<TrialResult> {
        self.evaluate_inner(id, true)
    }

    fn evaluate_inner(&self, id: TrialId, force: bool) -> Result<TrialResult> {
        let trial = self.trial(id)?;
        let (result, snapshot) = trial.evaluate(&self.evaluator, force, &|s| self.save(s))?;
        info!(
            trial = %id,
            winner = ?result.winner,
            confidence = result.confidence,
            improvement = result.improvement,
            recommendation = ?result.recommendation,
            status = ?snapshot.status,
            "trial evaluated"
        );
        Ok(result)
    }

    /// COMPLETED → PROMOTED. The experimental lens becomes the standard.
    ///
    /// Requires the stored evaluation to name the experimental branch as
    /// winner, and the standard to still be the version the trial was
    /// created against. Irreversible.
    pub fn promote(&self, id: TrialId) -> Result<Arc<StandardLens>> {
        let trial = self.trial(id)?;
        let (standard, _) = trial
            .promote_into(&self.standard, &|t, s, h| self.save_promotion(t, s, h))
            .inspect_err(|err| warn!(trial = %id, error = %err, "promotion rejected"))?;
        info!(
            trial = %id,
            lens = standard.lens.name(),
            version = standard.version,
            "standard promoted"
        );
        Ok(standard)
    }

    /// COMPLETED → ARCHIVED. Counters stay queryable.
    pub fn archive(&self, id: TrialId) -> Result<()> {
        self.trial(id)?.archive(&|s| self.save(s))?;
        info!(trial = %id, "trial archived");
        Ok(())
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Look up a trial.
    pub fn trial(&self, id: TrialId) -> Result<Arc<Trial>> {
        self.registry()
            .trials
            .get(&id)
            .cloned()
            .ok_or(CerataError::TrialNotFound(id))
    }

    /// Snapshots of every trial, by id.
    #[must_use]
    pub fn trials(&self) -> Vec<TrialSnapshot> {
        self.registry().trials.values().map(|t| t.snapshot()).collect()
    }

    /// The RUNNING trial, if any.
    #[must_use]
    pub fn active_trial(&self) -> Option<Arc<Trial>> {
        self.registry()
            .trials
            .values()
            .find(|t| t.status() == TrialStatus::Running)
            .cloned()
    }

    /// Archived trials with their final counters.
    #[must_use]
    pub fn archived_trials(&self) -> Vec<TrialSnapshot> {
        self.registry()
            .trials
            .values()
            .map(|t| t.snapshot())
            .filter(|s| s.status == TrialStatus::Archived)
            .collect()
    }

    /// Current standard.
    #[must_use]
    pub fn standard(&self) -> Arc<StandardLens> {
        self.standard.snapshot()
    }

    /// Replaced standards, oldest first.
    #[must_use]
    pub fn standards_history(&self) -> Vec<StandardRecord> {
        self.standard.history()
    }
}

// =============================================================================
// TESTS
// =============================================================================
