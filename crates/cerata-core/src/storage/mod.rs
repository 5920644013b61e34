//! # Storage Module
//!
//! Durable trial state, so a process can resume an experiment.
//!
//! The manager calls the store before committing each mutation in memory.
//! Values are written as [`crate::formats`] frames, so every backend stores
//! checksummed bytes.
//!
//! Backends:
//! - [`RedbTrialStore`]: redb embedded database (ACID, crash safe, MVCC).
//! - [`MemoryTrialStore`]: in-process map for tests and embedding.

mod memory;
mod redb_store;

pub use memory::MemoryTrialStore;
pub use redb_store::RedbTrialStore;

use crate::error::Result;
use crate::formats::ManagerSnapshot;
use crate::standard::{StandardLens, StandardRecord};
use crate::trial::TrialSnapshot;

/// Persistence seam for [`crate::TrialManager`].
pub trait TrialStore: Send + Sync {
    /// Insert or replace one trial.
    fn save_trial(&self, trial: &TrialSnapshot) -> Result<()>;

    /// Persist a newly created trial together with the next trial id.
    ///
    /// The counter is stored on its own, so an id is never handed out twice
    /// even if the trial holding the highest id is removed from the store.
    fn save_created_trial(&self, trial: &TrialSnapshot, next_trial_id: u64) -> Result<()>;

    /// Replace the current standard and its history.
    fn save_standard(&self, standard: &StandardLens, history: &[StandardRecord]) -> Result<()>;

    /// Persist a promotion: the promoted trial and the new standard.
    ///
    /// Backends with transactions should write both atomically.
    fn save_promotion(
        &self,
        trial: &TrialSnapshot,
        standard: &StandardLens,
        history: &[StandardRecord],
    ) -> Result<()> {
        self.save_standard(standard, history)?;
        self.save_trial(trial)
    }

    /// Everything stored, or `None` if no standard was ever saved.
    fn load(&self) -> Result<Option<ManagerSnapshot>>;
}

/// Serialized form of the standard entry.
#[derive(serde::Serialize, serde::Deserialize)]
pub(crate) struct StoredStandard {
    pub(crate) standard: StandardLens,
    pub(crate) history: Vec<StandardRecord>,
}

/// Assemble a manager snapshot from stored parts.
///
/// The stored counter is authoritative; the largest stored id is only a
/// floor for it.
pub(crate) fn assemble(
    standard: StoredStandard,
    mut trials: Vec<TrialSnapshot>,
    stored_next_id: Option<u64>,
) -> ManagerSnapshot {
    trials.sort_by_key(|t| t.id);
    let floor = trials.last().map_or(1, |t| t.id.0 + 1);
    let next_trial_id = stored_next_id.map_or(floor, |next| next.max(floor));
    ManagerSnapshot {
        standard: standard.standard,
        history: standard.history,
        trials,
        next_trial_id,
    }
}
