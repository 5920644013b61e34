//! Integration tests for the trial lifecycle through the public API.
//!
//! Drives records through `QualificationService` under a running trial,
//! reports outcomes, evaluates and promotes.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use cerata_core::{
    Branch, BranchTag, CerataError, LeadRecord, LensCatalog, LensDelta, LossReason, Outcome,
    QualificationService, Recommendation, ScriptedSampler, SignalOverrides, Tier, TrialManager,
    TrialStatus, Weights, Winner,
};
use std::sync::Arc;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn service_with_sampler(sampler: ScriptedSampler) -> QualificationService {
    let catalog = LensCatalog::builtin().unwrap();
    let standard = catalog.standard().cloned().unwrap();
    let manager = TrialManager::new(standard).with_sampler(sampler);
    QualificationService::new(catalog, Arc::new(manager))
}

fn record(id: usize, psi: f64, rho: f64, q: f64, f: f64) -> LeadRecord {
    LeadRecord::new(format!("lead_{id}"), format!("Company {id}")).with_overrides(SignalOverrides {
        intent: Some(psi),
        authority: Some(rho),
        urgency: Some(q),
        fit: Some(f),
    })
}

fn heavier_authority() -> LensDelta {
    LensDelta {
        weights: Some(Weights::new(0.2, 0.45, 0.15, 0.2)),
        ..LensDelta::default()
    }
}

// =============================================================================
// LIFECYCLE TESTS
// =============================================================================

#[test]
fn test_full_promotion_flow() {
    let service = service_with_sampler(ScriptedSampler::new([0.1, 0.9]));
    let manager = Arc::clone(service.manager());
    let trial = manager
        .create_trial("authority-heavy", None, heavier_authority(), 0.5, 20)
        .unwrap();
    manager.start(trial.id()).unwrap();

    let mut tags = Vec::new();
    for i in 0..60 {
        let (tag, result) = service
            .qualify_in_trial(&record(i, 0.8, 0.6, 0.4, 0.7), trial.id())
            .unwrap();
        assert!(result.is_qualified());
        tags.push(tag);
    }

    let experimental = tags.iter().filter(|t| t.branch == Branch::Experimental).count();
    assert_eq!(experimental, 30);

    // Experimental converts far better.
    for (i, tag) in tags.iter().enumerate() {
        let outcome = match tag.branch {
            Branch::Experimental if i % 10 != 0 => Outcome::won(25_000.0, 500.0),
            Branch::Classic if i % 8 == 1 => Outcome::won(20_000.0, 500.0),
            _ => Outcome::lost(LossReason::Competitor, 500.0),
        };
        manager.record_outcome(tag.trial, tag.branch, outcome).unwrap();
    }

    let result = manager.evaluate(trial.id()).unwrap();
    assert_eq!(result.winner, Winner::Experimental);
    assert_eq!(result.recommendation, Recommendation::Promote);
    assert!(result.confidence >= 0.8 && result.confidence <= 1.0);
    assert!(result.improvement > 0.0);

    let before = manager.standard();
    let after = manager.promote(trial.id()).unwrap();
    assert_eq!(after.version, before.version + 1);
    assert_eq!(service.resolve_lens("standard").unwrap().name(), "enterprise_saas+experimental");
    assert_eq!(trial.status(), TrialStatus::Promoted);

    let history = manager.standards_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].replaced.lens.name(), "enterprise_saas");
    assert_eq!(history[0].trial, trial.id());
}

#[test]
fn test_second_promote_is_invalid_transition() {
    let service = service_with_sampler(ScriptedSampler::new([0.1, 0.9]));
    let manager = service.manager();
    let trial = manager
        .create_trial("once", None, heavier_authority(), 0.5, 1)
        .unwrap();
    manager.start(trial.id()).unwrap();
    for _ in 0..2 {
        manager.record_qualification(trial.id(), Branch::Classic, Tier::NotReady).unwrap();
        manager.record_qualification(trial.id(), Branch::Experimental, Tier::Hot).unwrap();
    }
    for _ in 0..4 {
        manager.record_outcome(trial.id(), Branch::Experimental, Outcome::won(1_000.0, 0.0)).unwrap();
        manager
            .record_outcome(trial.id(), Branch::Classic, Outcome::lost(LossReason::NoDecision, 0.0))
            .unwrap();
    }

    manager.evaluate(trial.id()).unwrap();
    manager.promote(trial.id()).unwrap();
    let err = manager.promote(trial.id()).unwrap_err();
    assert!(matches!(
        err,
        CerataError::InvalidTransition {
            from: TrialStatus::Promoted,
            ..
        }
    ));
}

#[test]
fn test_evaluation_waits_for_min_sample() {
    let service = service_with_sampler(ScriptedSampler::new([0.1, 0.9]));
    let manager = service.manager();
    let trial = manager.create_trial("slow", None, heavier_authority(), 0.5, 3).unwrap();
    manager.start(trial.id()).unwrap();

    for i in 0..5 {
        service.qualify_in_trial(&record(i, 0.6, 0.5, 0.3, 0.6), trial.id()).unwrap();
    }
    // 3 experimental, 2 classic.
    let err = manager.evaluate(trial.id()).unwrap_err();
    assert!(matches!(
        err,
        CerataError::InsufficientSample {
            classic: 2,
            experimental: 3,
            required: 3
        }
    ));

    service.qualify_in_trial(&record(5, 0.6, 0.5, 0.3, 0.6), trial.id()).unwrap();
    let first = manager.evaluate(trial.id()).unwrap();
    assert_eq!(first.classic_samples, 3);
    assert_eq!(first.experimental_samples, 3);
}

#[test]
fn test_planned_trial_cannot_be_evaluated() {
    let service = service_with_sampler(ScriptedSampler::new([0.5]));
    let manager = service.manager();
    let trial = manager.create_trial("idle", None, heavier_authority(), 0.5, 1).unwrap();
    assert!(matches!(
        manager.evaluate(trial.id()),
        Err(CerataError::InvalidTransition {
            from: TrialStatus::Planned,
            ..
        })
    ));
    assert!(matches!(
        manager.archive(trial.id()),
        Err(CerataError::InvalidTransition { .. })
    ));
}

#[test]
fn test_archived_trial_keeps_counters() {
    let service = service_with_sampler(ScriptedSampler::new([0.9, 0.1]));
    let manager = service.manager();
    let trial = manager.create_trial("keep", None, heavier_authority(), 0.5, 1).unwrap();
    manager.start(trial.id()).unwrap();
    for i in 0..4 {
        service.qualify_in_trial(&record(i, 0.2, 0.3, 0.1, 0.3), trial.id()).unwrap();
    }
    manager.conclude(trial.id()).unwrap();
    manager.archive(trial.id()).unwrap();

    let archived = manager.archived_trials();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].classic_branch.records_qualified(), 2);
    assert_eq!(archived[0].experimental_branch.records_qualified(), 2);
    assert!(manager.active_trial().is_none());

    // A new trial can start once nothing is running.
    let next = manager.create_trial("next", None, heavier_authority(), 0.5, 1).unwrap();
    manager.start(next.id()).unwrap();
}

#[test]
fn test_crisis_is_counted_not_raised() {
    let service = service_with_sampler(ScriptedSampler::new([0.9]));
    let manager = service.manager();
    let trial = manager.create_trial("crisis", None, heavier_authority(), 0.5, 1).unwrap();
    manager.start(trial.id()).unwrap();

    let caller = LeadRecord::new("c1", "Caller").with_crisis_flag();
    let (tag, result) = service.qualify_in_trial(&caller, trial.id()).unwrap();
    assert_eq!(tag, BranchTag::new(trial.id(), Branch::Classic));
    assert_eq!(result.tier, Tier::Crisis);
    assert_eq!(trial.snapshot().classic_branch.tier_count(Tier::Crisis), 1);
}

#[test]
fn test_concurrent_recording_loses_no_updates() {
    let service = Arc::new(service_with_sampler(ScriptedSampler::new([0.1, 0.9])));
    let manager = Arc::clone(service.manager());
    let trial = manager.create_trial("parallel", None, heavier_authority(), 0.5, 1).unwrap();
    manager.start(trial.id()).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|w| {
            let service = Arc::clone(&service);
            let id = trial.id();
            std::thread::spawn(move || {
                for i in 0..50 {
                    service
                        .qualify_in_trial(&record(w * 100 + i, 0.7, 0.6, 0.4, 0.6), id)
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let snapshot = trial.snapshot();
    let total = snapshot.classic_branch.records_qualified()
        + snapshot.experimental_branch.records_qualified();
    assert_eq!(total, 400);
    assert_eq!(snapshot.classic_branch.records_qualified(), 200);
    assert_eq!(snapshot.revision, 401);
}
