//! In-memory trial store.

use super::{StoredStandard, TrialStore, assemble};
use crate::error::Result;
use crate::formats::{ManagerSnapshot, decode_frame, encode_frame};
use crate::standard::{StandardLens, StandardRecord};
use crate::trial::TrialSnapshot;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    standard: Option<Vec<u8>>,
    trials: BTreeMap<u64, Vec<u8>>,
    next_trial_id: Option<u64>,
    writes: u64,
}

/// Trial store kept in process memory.
///
/// Holds encoded frames, not live values, so a restore exercises the same
/// decode path as the redb backend.
#[derive(Debug, Default)]
pub struct MemoryTrialStore {
    inner: Mutex<Inner>,
}

impl MemoryTrialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).writes
    }
}

impl TrialStore for MemoryTrialStore {
    fn save_trial(&self, trial: &TrialSnapshot) -> Result<()> {
        let bytes = encode_frame(trial)?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.trials.insert(trial.id.0, bytes);
        inner.writes += 1;
        Ok(())
    }

    fn save_created_trial(&self, trial: &TrialSnapshot, next_trial_id: u64) -> Result<()> {
        let bytes = encode_frame(trial)?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.trials.insert(trial.id.0, bytes);
        inner.next_trial_id = Some(next_trial_id);
        inner.writes += 1;
        Ok(())
    }

    fn save_standard(&self, standard: &StandardLens, history: &[StandardRecord]) -> Result<()> {
        let bytes = encode_frame(&StoredStandard {
            standard: standard.clone(),
            history: history.to_vec(),
        })?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.standard = Some(bytes);
        inner.writes += 1;
        Ok(())
    }

    fn save_promotion(
        &self,
        trial: &TrialSnapshot,
        standard: &StandardLens,
        history: &[StandardRecord],
    ) -> Result<()> {
        let trial_bytes = encode_frame(trial)?;
        let standard_bytes = encode_frame(&StoredStandard {
            standard: standard.clone(),
            history: history.to_vec(),
        })?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.trials.insert(trial.id.0, trial_bytes);
        inner.standard = Some(standard_bytes);
        inner.writes += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<ManagerSnapshot>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(standard) = &inner.standard else {
            return Ok(None);
        };
        let standard: StoredStandard = decode_frame(standard)?;
        let trials = inner
            .trials
            .values()
            .map(|bytes| decode_frame(bytes))
            .collect::<Result<Vec<TrialSnapshot>>>()?;
        Ok(Some(assemble(standard, trials, inner.next_trial_id)))
    }
}
