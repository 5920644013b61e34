//! # Qualification Service
//!
//! Orchestrates perception for one or many records, optionally under a trial
//! branch, and keeps per-lens statistics plus a bounded result history.
//!
//! Lens resolution:
//! - `"standard"` resolves to the trial manager's current standard snapshot.
//! - Any other name is looked up in the [`LensCatalog`].
//! - A tagged call uses the tagged branch's lens.
//!
//! The lens is resolved once at the start of a call (or batch). A promotion
//! landing mid-batch does not change the lens the batch is using.

use crate::cancel::CancellationToken;
use crate::error::{CerataError, Result};
use crate::lens::{Lens, LensCatalog};
use crate::perception::{CoherenceResult, perceive};
use crate::record::LeadRecord;
use crate::trial::TrialManager;
use crate::{Branch, BranchTag, STANDARD_LENS, Tier, TrialId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

// =============================================================================
// STATS
// =============================================================================

/// Tier counts for one lens or trial branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationStats {
    total: u64,
    tier_counts: [u64; 5],
}

impl QualificationStats {
    fn record(&mut self, tier: Tier) {
        self.total += 1;
        self.tier_counts[tier.index()] += 1;
    }

    /// Records classified so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Records classified into `tier`.
    #[must_use]
    pub fn tier_count(&self, tier: Tier) -> u64 {
        self.tier_counts[tier.index()]
    }

    /// Share of records in any tier except NOT_READY.
    #[must_use]
    pub fn qualification_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.total - self.tier_count(Tier::NotReady)) as f64 / self.total as f64
    }

    /// Share of records classified HOT.
    #[must_use]
    pub fn hot_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.tier_count(Tier::Hot) as f64 / self.total as f64
    }
}

/// Result of a batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Successful results, highest priority first. Ties keep input order.
    pub results: Vec<CoherenceResult>,
    /// Records that failed, by lead id.
    pub failures: Vec<(String, CerataError)>,
    /// Whether the batch stopped early on cancellation.
    pub cancelled: bool,
}

// =============================================================================
// SERVICE
// =============================================================================

/// Entry point for qualifying records.
pub struct QualificationService {
    catalog: LensCatalog,
    manager: Arc<TrialManager>,
    stats: Mutex<BTreeMap<String, QualificationStats>>,
    history: Mutex<VecDeque<CoherenceResult>>,
    history_capacity: usize,
}

impl std::fmt::Debug for QualificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualificationService")
            .field("lenses", &self.catalog.len())
            .field("history_capacity", &self.history_capacity)
            .finish_non_exhaustive()
    }
}

impl QualificationService {
    /// History capacity comes from the manager's configuration.
    #[must_use]
    pub fn new(catalog: LensCatalog, manager: Arc<TrialManager>) -> Self {
        let history_capacity = manager.config().history_capacity;
        Self {
            catalog,
            manager,
            stats: Mutex::new(BTreeMap::new()),
            history: Mutex::new(VecDeque::with_capacity(history_capacity.min(1_024))),
            history_capacity,
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<TrialManager> {
        &self.manager
    }

    #[must_use]
    pub fn catalog(&self) -> &LensCatalog {
        &self.catalog
    }

    /// Resolve a lens name to a concrete lens.
    pub fn resolve_lens(&self, name: &str) -> Result<Lens> {
        if name == STANDARD_LENS {
            return Ok(self.manager.standard().lens.clone());
        }
        self.catalog
            .get(name)
            .cloned()
            .ok_or_else(|| CerataError::NoActiveStandard(name.to_string()))
    }

    /// Qualify one record.
    ///
    /// With a branch tag the tagged branch's lens is used and the tier is
    /// counted against that branch. `lens_name` must then be `"standard"` or
    /// the branch lens name.
    pub fn qualify(
        &self,
        record: &LeadRecord,
        lens_name: &str,
        tag: Option<BranchTag>,
    ) -> Result<CoherenceResult> {
        let lens = match tag {
            Some(tag) => self.branch_lens(tag, lens_name)?,
            None => self.resolve_lens(lens_name)?,
        };
        let result = perceive(record, &lens)?;

        if let Some(tag) = tag {
            self.manager
                .record_qualification(tag.trial, tag.branch, result.tier)?;
        }
        self.observe(&result, tag);
        Ok(result)
    }

    /// Assign a branch in a running trial, then qualify under it.
    pub fn qualify_in_trial(
        &self,
        record: &LeadRecord,
        trial: TrialId,
    ) -> Result<(BranchTag, CoherenceResult)> {
        let branch = self.manager.assign_branch(trial)?;
        let tag = BranchTag::new(trial, branch);
        let result = self.qualify(record, STANDARD_LENS, Some(tag))?;
        Ok((tag, result))
    }

    /// Qualify many records through one lens.
    ///
    /// The lens is resolved once. Per-record failures are collected, not
    /// fatal. Cancellation is checked between records.
    pub fn qualify_batch(
        &self,
        records: &[LeadRecord],
        lens_name: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome> {
        let lens = self.resolve_lens(lens_name)?;
        let mut results = Vec::with_capacity(records.len());
        let mut failures = Vec::new();
        let mut cancelled = false;

        for record in records {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match perceive(record, &lens) {
                Ok(result) => {
                    self.observe(&result, None);
                    results.push(result);
                }
                Err(err) => {
                    warn!(lead = %record.lead_id, error = %err, "record rejected");
                    failures.push((record.lead_id.clone(), err));
                }
            }
        }

        results.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        info!(
            lens = lens.name(),
            qualified = results.len(),
            failed = failures.len(),
            cancelled,
            "batch qualified"
        );
        Ok(BatchOutcome {
            results,
            failures,
            cancelled,
        })
    }

    fn branch_lens(&self, tag: BranchTag, lens_name: &str) -> Result<Lens> {
        let trial = self.manager.trial(tag.trial)?;
        let lens = trial.lens_for(tag.branch);
        if lens_name != STANDARD_LENS && lens_name != lens.name() {
            return Err(CerataError::BranchMismatch {
                trial: tag.trial,
                branch: tag.branch,
            });
        }
        Ok(lens.clone())
    }

    fn observe(&self, result: &CoherenceResult, tag: Option<BranchTag>) {
        if result.is_crisis() {
            warn!(
                lead = %result.lead_id,
                lens = %result.lens,
                urgency = result.dimensions.urgency(),
                "crisis classification"
            );
        } else {
            debug!(
                lead = %result.lead_id,
                lens = %result.lens,
                tier = %result.tier,
                score = result.coherence_score,
                "record qualified"
            );
        }

        let key = match tag {
            Some(tag) => stats_key(tag.trial, tag.branch),
            None => result.lens.clone(),
        };
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .record(result.tier);

        if self.history_capacity == 0 {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == self.history_capacity {
            history.pop_front();
        }
        history.push_back(result.clone());
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Stats for a lens name.
    #[must_use]
    pub fn stats(&self, lens_name: &str) -> Option<QualificationStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(lens_name)
            .copied()
    }

    /// Stats for one trial branch.
    #[must_use]
    pub fn branch_stats(&self, trial: TrialId, branch: Branch) -> Option<QualificationStats> {
        self.stats(&stats_key(trial, branch))
    }

    /// All stats, keyed by lens name or `trial_NNNN/branch`.
    #[must_use]
    pub fn all_stats(&self) -> BTreeMap<String, QualificationStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Recent results, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<CoherenceResult> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Recent NOT_READY results, for pattern mining outside the core.
    #[must_use]
    pub fn graveyard(&self) -> Vec<CoherenceResult> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.tier == Tier::NotReady)
            .cloned()
            .collect()
    }
}

fn stats_key(trial: TrialId, branch: Branch) -> String {
    format!("{trial}/{branch}")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::LensDelta;
    use crate::record::SignalOverrides;
    use crate::trial::ManagerConfig;
    use crate::trial::sampler::ScriptedSampler;

    fn service() -> QualificationService {
        let catalog = LensCatalog::builtin().expect("builtin");
        let standard = catalog.standard().cloned().expect("standard");
        let manager = TrialManager::new(standard).with_sampler(ScriptedSampler::new([0.1, 0.9]));
        QualificationService::new(catalog, Arc::new(manager))
    }

    fn scored(id: &str, psi: f64, rho: f64, q: f64, f: f64) -> LeadRecord {
        LeadRecord::new(id, id).with_overrides(SignalOverrides {
            intent: Some(psi),
            authority: Some(rho),
            urgency: Some(q),
            fit: Some(f),
        })
    }

    #[test]
    fn standard_name_resolves_to_manager_standard() {
        let s = service();
        assert_eq!(s.resolve_lens("standard").expect("resolves").name(), "enterprise_saas");
        assert!(matches!(
            s.resolve_lens("nope"),
            Err(CerataError::NoActiveStandard(name)) if name == "nope"
        ));
    }

    #[test]
    fn untagged_qualify_updates_lens_stats_and_history() {
        let s = service();
        s.qualify(&scored("a", 0.8, 0.5, 0.6, 0.7), "smb_tech", None).expect("qualify");
        s.qualify(&scored("b", 0.1, 0.05, 0.1, 0.1), "smb_tech", None).expect("qualify");

        let stats = s.stats("smb_tech").expect("stats");
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.tier_count(Tier::NotReady), 1);
        assert!((stats.qualification_rate() - 0.5).abs() < 1e-12);
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.graveyard().len(), 1);
    }

    #[test]
    fn batch_sorts_by_priority_and_reports_failures() {
        let s = service();
        let records = vec![
            scored("cold", 0.2, 0.3, 0.1, 0.3),
            scored("bad", f64::NAN, 0.5, 0.5, 0.5),
            scored("crisis", 0.0, 0.0, 0.9, 0.0),
            scored("warm", 0.8, 0.5, 0.6, 0.7),
        ];
        let out = s
            .qualify_batch(&records, "standard", &CancellationToken::new())
            .expect("batch");
        let ids: Vec<_> = out.results.iter().map(|r| r.lead_id.as_str()).collect();
        assert_eq!(ids, vec!["crisis", "warm", "cold"]);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].0, "bad");
        assert!(!out.cancelled);
    }

    #[test]
    fn cancelled_batch_stops_before_first_record() {
        let s = service();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = s
            .qualify_batch(&[scored("a", 0.5, 0.5, 0.5, 0.5)], "standard", &cancel)
            .expect("batch");
        assert!(out.cancelled);
        assert!(out.results.is_empty());
    }

    #[test]
    fn trial_qualification_counts_against_assigned_branch() {
        let s = service();
        let m = s.manager();
        let t = m
            .create_trial("t", None, LensDelta::default(), 0.5, 1)
            .expect("create");
        m.start(t.id()).expect("start");

        let (tag, result) = s
            .qualify_in_trial(&scored("x", 0.8, 0.5, 0.6, 0.7), t.id())
            .expect("qualify");
        assert_eq!(tag.branch, Branch::Experimental);
        assert_eq!(result.lens, "enterprise_saas+experimental");

        let (tag, _) = s
            .qualify_in_trial(&scored("y", 0.8, 0.5, 0.6, 0.7), t.id())
            .expect("qualify");
        assert_eq!(tag.branch, Branch::Classic);

        let snapshot = t.snapshot();
        assert_eq!(snapshot.classic_branch.records_qualified(), 1);
        assert_eq!(snapshot.experimental_branch.records_qualified(), 1);
        assert_eq!(s.branch_stats(t.id(), Branch::Classic).map(|s| s.total()), Some(1));
    }

    #[test]
    fn tagged_call_rejects_foreign_lens_name() {
        let s = service();
        let m = s.manager();
        let t = m
            .create_trial("t", None, LensDelta::default(), 0.5, 1)
            .expect("create");
        m.start(t.id()).expect("start");
        let tag = BranchTag::new(t.id(), Branch::Classic);
        assert!(matches!(
            s.qualify(&scored("z", 0.5, 0.5, 0.5, 0.5), "healthcare", Some(tag)),
            Err(CerataError::BranchMismatch { .. })
        ));
    }

    #[test]
    fn history_is_bounded() {
        let catalog = LensCatalog::builtin().expect("builtin");
        let standard = catalog.standard().cloned().expect("standard");
        let config = ManagerConfig {
            history_capacity: 2,
            ..ManagerConfig::default()
        };
        let manager = TrialManager::new(standard).with_config(config).expect("config");
        let s = QualificationService::new(catalog, Arc::new(manager));
        for id in ["a", "b", "c"] {
            s.qualify(&scored(id, 0.5, 0.5, 0.5, 0.5), "standard", None).expect("qualify");
        }
        let ids: Vec<_> = s.history().into_iter().map(|r| r.lead_id).collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
    }
}
