//! Integration tests for durable trial state.
//!
//! Uses tempfile for the redb database file.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use cerata_core::{
    Branch, Lens, LensDelta, LossReason, ManagerConfig, ManagerSnapshot, MemoryTrialStore, Outcome,
    RedbTrialStore, ScriptedSampler, Tier, TrialManager, TrialStatus, TrialStore, Weights,
};
use std::sync::Arc;
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn base_lens() -> Lens {
    Lens::with_defaults("enterprise_saas").unwrap()
}

fn delta() -> LensDelta {
    LensDelta {
        name: Some("fit_heavy".to_string()),
        weights: Some(Weights::new(0.2, 0.25, 0.2, 0.35)),
        ..LensDelta::default()
    }
}

/// Run a trial to a promotable state on `manager`.
fn promotable(manager: &TrialManager) -> cerata_core::TrialId {
    let trial = manager.create_trial("fit", None, delta(), 0.5, 2).unwrap();
    let id = trial.id();
    manager.start(id).unwrap();
    for _ in 0..4 {
        manager.record_qualification(id, Branch::Classic, Tier::NotReady).unwrap();
        manager.record_qualification(id, Branch::Experimental, Tier::Hot).unwrap();
        manager.record_outcome(id, Branch::Experimental, Outcome::won(9_000.0, 100.0)).unwrap();
        manager
            .record_outcome(id, Branch::Classic, Outcome::lost(LossReason::Competitor, 100.0))
            .unwrap();
    }
    id
}

// =============================================================================
// REDB STORE TESTS
// =============================================================================

#[test]
fn test_fresh_database_starts_from_initial_standard() {
    let dir = create_temp_dir();
    let store: Arc<dyn TrialStore> = Arc::new(RedbTrialStore::open(dir.path().join("trials.redb")).unwrap());

    let manager =
        TrialManager::restore(Arc::clone(&store), base_lens(), ManagerConfig::default()).unwrap();
    assert_eq!(manager.standard().version, 1);

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.standard.lens.name(), "enterprise_saas");
    assert!(loaded.trials.is_empty());
}

#[test]
fn test_running_trial_survives_reopen() {
    let dir = create_temp_dir();
    let path = dir.path().join("trials.redb");

    let id = {
        let store = Arc::new(RedbTrialStore::open(&path).unwrap());
        let manager = TrialManager::restore(store, base_lens(), ManagerConfig::default())
            .unwrap()
            .with_sampler(ScriptedSampler::new([0.2]));
        let trial = manager.create_trial("resume", None, delta(), 0.5, 10).unwrap();
        manager.start(trial.id()).unwrap();
        let branch = manager.assign_branch(trial.id()).unwrap();
        assert_eq!(branch, Branch::Experimental);
        manager.record_qualification(trial.id(), branch, Tier::Warm).unwrap();
        manager
            .record_outcome(trial.id(), branch, Outcome::won(12_000.0, 300.0))
            .unwrap();
        trial.id()
    };

    let store = Arc::new(RedbTrialStore::open(&path).unwrap());
    let manager = TrialManager::restore(
        store,
        Lens::with_defaults("ignored").unwrap(),
        ManagerConfig::default(),
    )
    .unwrap();
    let snapshot = manager.trial(id).unwrap().snapshot();

    assert_eq!(snapshot.status, TrialStatus::Running);
    assert_eq!(snapshot.experimental.name(), "fit_heavy");
    assert_eq!(snapshot.experimental_branch.records_qualified(), 1);
    assert_eq!(snapshot.experimental_branch.total_value(), 12_000.0);
    assert_eq!(snapshot.experimental_branch.total_cost(), 300.0);
    assert_eq!(manager.standard().lens.name(), "enterprise_saas");

    // Counting resumes where it stopped.
    manager.record_qualification(id, Branch::Classic, Tier::Cold).unwrap();
    assert_eq!(manager.trial(id).unwrap().snapshot().revision, snapshot.revision + 1);
}

#[test]
fn test_promotion_is_persisted_with_history() {
    let dir = create_temp_dir();
    let path = dir.path().join("trials.redb");

    {
        let store = Arc::new(RedbTrialStore::open(&path).unwrap());
        let manager = TrialManager::restore(store, base_lens(), ManagerConfig::default()).unwrap();
        let id = promotable(&manager);
        manager.evaluate(id).unwrap();
        manager.promote(id).unwrap();
    }

    let store = Arc::new(RedbTrialStore::open(&path).unwrap());
    let manager = TrialManager::restore(store, base_lens(), ManagerConfig::default()).unwrap();
    assert_eq!(manager.standard().version, 2);
    assert_eq!(manager.standard().lens.name(), "fit_heavy");
    assert_eq!(manager.standards_history().len(), 1);
    assert_eq!(manager.trials()[0].status, TrialStatus::Promoted);

    // A new trial gets a fresh id.
    let next = manager.create_trial("after", None, delta(), 0.5, 2).unwrap();
    assert_eq!(next.id().0, 2);
}

// =============================================================================
// SNAPSHOT TESTS
// =============================================================================

#[test]
fn test_manager_snapshot_bytes_restore_equivalent_state() {
    let manager = TrialManager::new(base_lens());
    let id = promotable(&manager);
    manager.conclude(id).unwrap();
    manager.archive(id).unwrap();

    let bytes = manager.snapshot().to_bytes().unwrap();
    let decoded = ManagerSnapshot::from_bytes(&bytes).unwrap();
    let restored = TrialManager::from_snapshot(decoded);

    assert_eq!(restored.snapshot(), manager.snapshot());
    assert_eq!(restored.archived_trials().len(), 1);
}

#[test]
fn test_memory_store_counts_one_write_per_mutation() {
    let store = Arc::new(MemoryTrialStore::new());
    let manager = TrialManager::new(base_lens())
        .with_store(store.clone())
        .unwrap();
    // Initial standard.
    assert_eq!(store.writes(), 1);

    let trial = manager.create_trial("w", None, delta(), 0.5, 1).unwrap();
    manager.start(trial.id()).unwrap();
    manager
        .record_outcome(trial.id(), Branch::Classic, Outcome::lost(LossReason::Timing, 10.0))
        .unwrap();
    assert_eq!(store.writes(), 4);

    // Rejected mutations write nothing.
    assert!(manager
        .record_outcome(trial.id(), Branch::Classic, Outcome::won(f64::NAN, 0.0))
        .is_err());
    assert_eq!(store.writes(), 4);
}
