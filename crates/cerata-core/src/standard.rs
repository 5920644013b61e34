//! # Standard Module
//!
//! The "current standard" lens as a versioned, atomically swappable cell.
//!
//! Readers take an `Arc` snapshot at the start of a qualification call and
//! keep using it even if a promotion lands mid-call. Promotion replaces the
//! whole `Arc` under the write lock, so no reader can observe a mixture of the
//! old and new configuration.

use crate::error::Result;
use crate::lens::Lens;
use crate::TrialId;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// One version of the standard lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardLens {
    /// Monotonic version, starting at 1.
    pub version: u64,
    /// The lens.
    pub lens: Lens,
    /// Trial that promoted this version, `None` for the initial standard.
    pub promoted_by: Option<TrialId>,
}

/// A replaced standard, kept for history queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardRecord {
    /// The standard that was replaced.
    pub replaced: StandardLens,
    /// Version that replaced it.
    pub replaced_by_version: u64,
    /// Trial whose experimental lens replaced it.
    pub trial: TrialId,
}

/// Atomically swappable reference to the current standard.
///
/// The history of replaced versions is updated under the same write lock as
/// the swap, so a history reader never sees a version that is not yet (or no
/// longer) reachable.
#[derive(Debug)]
pub struct StandardCell {
    current: RwLock<Arc<StandardLens>>,
    history: RwLock<Vec<StandardRecord>>,
}

impl StandardCell {
    /// Create a cell holding version 1 of `lens`.
    #[must_use]
    pub fn new(lens: Lens) -> Self {
        Self::from_standard(StandardLens {
            version: 1,
            lens,
            promoted_by: None,
        })
    }

    /// Create a cell holding an existing version (used on restore).
    #[must_use]
    pub fn from_standard(standard: StandardLens) -> Self {
        Self::from_parts(standard, Vec::new())
    }

    /// Create a cell from a stored version and its history.
    #[must_use]
    pub fn from_parts(standard: StandardLens, history: Vec<StandardRecord>) -> Self {
        Self {
            current: RwLock::new(Arc::new(standard)),
            history: RwLock::new(history),
        }
    }

    /// Snapshot of the current standard.
    #[must_use]
    pub fn snapshot(&self) -> Arc<StandardLens> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaced versions, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<StandardRecord> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current standard and history read as one consistent pair.
    #[must_use]
    pub fn snapshot_with_history(&self) -> (Arc<StandardLens>, Vec<StandardRecord>) {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        (Arc::clone(&current), history.clone())
    }

    /// Replace the standard with `lens`, returning the new version.
    ///
    /// `commit` sees the new version and the extended history before either
    /// becomes visible; an error from it aborts the promotion.
    pub fn promote_with<F>(&self, lens: Lens, trial: TrialId, commit: F) -> Result<Arc<StandardLens>>
    where
        F: FnOnce(&StandardLens, &[StandardRecord]) -> Result<()>,
    {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);

        let next = StandardLens {
            version: current.version.saturating_add(1),
            lens,
            promoted_by: Some(trial),
        };
        let mut next_history = history.clone();
        next_history.push(StandardRecord {
            replaced: (**current).clone(),
            replaced_by_version: next.version,
            trial,
        });

        commit(&next, &next_history)?;

        let next = Arc::new(next);
        *current = Arc::clone(&next);
        *history = next_history;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CerataError;

    fn promote(cell: &StandardCell, name: &str, trial: u64) -> Arc<StandardLens> {
        cell.promote_with(Lens::with_defaults(name).expect("valid"), TrialId(trial), |_, _| Ok(()))
            .expect("no commit hook failure")
    }

    #[test]
    fn snapshot_survives_promotion() {
        let cell = StandardCell::new(Lens::with_defaults("v1").expect("valid"));
        let before = cell.snapshot();

        let promoted = promote(&cell, "v2", 1);
        let after = cell.snapshot();

        assert_eq!(before.lens.name(), "v1");
        assert_eq!(promoted.version, 2);
        assert_eq!(after.version, 2);
        assert_eq!(after.lens.name(), "v2");
        assert_eq!(after.promoted_by, Some(TrialId(1)));
    }

    #[test]
    fn promotion_appends_history() {
        let cell = StandardCell::new(Lens::with_defaults("v1").expect("valid"));
        promote(&cell, "v2", 3);
        promote(&cell, "v3", 5);

        let history = cell.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].replaced.lens.name(), "v1");
        assert_eq!(history[0].replaced_by_version, 2);
        assert_eq!(history[1].trial, TrialId(5));
    }

    #[test]
    fn failed_commit_keeps_old_standard() {
        let cell = StandardCell::new(Lens::with_defaults("v1").expect("valid"));
        let err = cell.promote_with(Lens::with_defaults("v2").expect("valid"), TrialId(1), |_, _| {
            Err(CerataError::Storage("unavailable".to_string()))
        });
        assert!(err.is_err());
        assert_eq!(cell.snapshot().lens.name(), "v1");
        assert!(cell.history().is_empty());
    }

    #[test]
    fn concurrent_readers_see_whole_versions() {
        let cell = Arc::new(StandardCell::new(Lens::with_defaults("v1").expect("valid")));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snap = cell.snapshot();
                        let expected = if snap.version == 1 { "v1" } else { "v2" };
                        assert_eq!(snap.lens.name(), expected);
                    }
                })
            })
            .collect();

        promote(&cell, "v2", 9);

        for reader in readers {
            reader.join().expect("reader thread");
        }
        assert_eq!(cell.snapshot().version, 2);
    }
}
