//! # Cerata Core
//!
//! Lead qualification through coherence perception, and controlled evolution
//! of the scoring configuration through classic-vs-experimental trials.
//!
//! ## The pipeline
//!
//! ```text
//! LeadRecord → DimensionExtractor → CoherenceCalculator → TierClassifier → CoherenceResult
//!                     ↑                      ↑                   ↑
//!                     └──────────────── Lens ────────────────────┘
//!                                        ↑
//!                 StandardCell ← TrialManager (assign / record / evaluate / promote)
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`lens`] | [`Lens`], [`LensCatalog`] | Validated scoring configuration, TOML/JSON loading |
//! | [`record`] | [`LeadRecord`] | Normalized intake record supplied by ingestion |
//! | [`extractor`] | [`Dimensions`], [`DimensionExtractor`] | Record → four [0,1] dimensions |
//! | [`coherence`] | [`CoherenceCalculator`] | Saturated, coupled composite score |
//! | [`tier`] | [`TierClassifier`] | Crisis check, floor override, cutoff ladder |
//! | [`perception`] | [`CoherenceResult`], [`perceive`] | One full perception pass |
//! | [`qualification`] | [`QualificationService`] | Orchestration, stats, history, trial tagging |
//! | [`standard`] | [`StandardCell`] | Atomically swappable current standard lens |
//! | [`trial`] | [`Trial`], [`TrialManager`], [`TrialEvaluator`] | Experiment lifecycle and promotion |
//! | [`formats`] | [`ManagerSnapshot`] | Binary snapshot format (postcard + header) |
//! | [`storage`] | [`TrialStore`], [`RedbTrialStore`] | Durable trial state for resume |

pub mod cancel;
pub mod coherence;
pub mod error;
pub mod extractor;
pub mod formats;
pub mod lens;
pub mod perception;
pub mod qualification;
pub mod record;
pub mod standard;
pub mod storage;
pub mod tier;
pub mod trial;

pub use cancel::CancellationToken;
pub use coherence::{CoherenceCalculator, saturate_urgency};
pub use error::{CerataError, Result};
pub use extractor::{DimensionExtractor, Dimensions};
pub use formats::ManagerSnapshot;
pub use lens::{ExperimentConfig, Lens, LensCatalog, LensDelta, Saturation, Weights};
pub use perception::{CoherenceResult, perceive};
pub use qualification::{BatchOutcome, QualificationService, QualificationStats};
pub use record::{CompanySize, LeadRecord, LeadSource, SignalOverrides, Timeline};
pub use standard::{StandardCell, StandardLens, StandardRecord};
pub use storage::{MemoryTrialStore, RedbTrialStore, TrialStore};
pub use tier::TierClassifier;
pub use trial::{
    EvaluatorConfig, LossReason, ManagerConfig, Outcome, OutcomeKind, Recommendation, Trial,
    TrialBranch, TrialEvaluator, TrialManager, TrialResult, TrialSnapshot, TrialStatus, Winner,
};
pub use trial::sampler::{BranchSampler, RngSampler, ScriptedSampler};

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// Reserved lens name that resolves to the current standard lens.
pub const STANDARD_LENS: &str = "standard";

/// Unique identifier of a trial within one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrialId(pub u64);

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trial_{:04}", self.0)
    }
}

/// Qualification tier, declared in priority order (most urgent first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Safety override: raw urgency above the lens crisis threshold.
    Crisis,
    /// Strong coherence with authority and urgency behind it.
    Hot,
    /// Worth nurturing toward a meeting.
    Warm,
    /// Long-term nurture.
    Cold,
    /// Below the cold cutoff, or disqualified by a floor.
    NotReady,
}

impl Tier {
    /// All tiers in priority order.
    pub const ALL: [Tier; 5] = [Tier::Crisis, Tier::Hot, Tier::Warm, Tier::Cold, Tier::NotReady];

    /// Position in [`Tier::ALL`], usable as an array index.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Tier::Crisis => 0,
            Tier::Hot => 1,
            Tier::Warm => 2,
            Tier::Cold => 3,
            Tier::NotReady => 4,
        }
    }

    /// Whether a record in this tier counts as qualified.
    #[must_use]
    pub fn is_qualified(self) -> bool {
        self != Tier::NotReady
    }

    /// Lowercase label used in logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Crisis => "crisis",
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
            Tier::NotReady => "not_ready",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Branch {
    /// The current standard configuration.
    Classic,
    /// The configuration under test.
    Experimental,
}

impl Branch {
    /// Lowercase label used in logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Branch::Classic => "classic",
            Branch::Experimental => "experimental",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision attached to a qualification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Crisis: hand to a human responder immediately.
    Escalate,
    /// Hot: straight to active sales.
    ActiveSales,
    /// Warm nurture sequence.
    NurtureWarm,
    /// Cold nurture sequence.
    NurtureCold,
    /// Not ready: parked for later pattern mining.
    Graveyard,
}

impl From<Tier> for Stage {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Crisis => Stage::Escalate,
            Tier::Hot => Stage::ActiveSales,
            Tier::Warm => Stage::NurtureWarm,
            Tier::Cold => Stage::NurtureCold,
            Tier::NotReady => Stage::Graveyard,
        }
    }
}

/// A trial branch tag attached to a qualification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchTag {
    /// Trial the record was assigned under.
    pub trial: TrialId,
    /// Branch the record was assigned to.
    pub branch: Branch,
}

impl BranchTag {
    /// Create a new tag.
    #[must_use]
    pub fn new(trial: TrialId, branch: Branch) -> Self {
        Self { trial, branch }
    }
}

// =============================================================================
// TESTS
// =============================================================================
