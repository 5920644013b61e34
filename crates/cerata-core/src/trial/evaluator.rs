//! # Trial Evaluator
//!
//! Per-branch fitness, winner, confidence and recommendation.
//!
//! ```text
//! qualification_rate = (records − not_ready) / records
//! conversion_rate    = won / (won + lost)                 (0 with no outcomes)
//! revenue_component  = min-max of value / max(won, 1) across both branches
//! fitness            = 0.3 × qualification + 0.5 × conversion + 0.2 × revenue
//! ```
//!
//! Confidence is the mean of two saturating terms, each in [0,1] and
//! non-decreasing in its input:
//!
//! ```text
//! sample = min(total_records / (min_sample_size × sample_saturation), 1)
//! effect = min(|fitness_exp − fitness_classic| / effect_saturation, 1)
//! ```

use super::{TrialBranch, TrialSnapshot};
use crate::error::{CerataError, Result};
use crate::TrialId;
use serde::{Deserialize, Serialize};

const QUALIFICATION_WEIGHT: f64 = 0.3;
const CONVERSION_WEIGHT: f64 = 0.5;
const REVENUE_WEIGHT: f64 = 0.2;

/// Evaluator tuning. Every field has a serde default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Confidence needed for a promote or archive recommendation.
    pub confidence_threshold: f64,
    /// Relative fitness margin a branch must clear to win.
    pub win_margin: f64,
    /// Multiple of `min_sample_size` at which sample confidence saturates.
    pub sample_saturation: f64,
    /// Absolute fitness gap at which effect confidence saturates.
    pub effect_saturation: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            win_margin: 1.05,
            sample_saturation: 4.0,
            effect_saturation: 0.2,
        }
    }
}

impl EvaluatorConfig {
    /// Reject thresholds outside their ranges: confidence in [0, 1], margin
    /// at least 1, saturation constants finite and positive.
    pub fn validate(&self) -> Result<()> {
        let ok = (0.0..=1.0).contains(&self.confidence_threshold)
            && self.win_margin.is_finite()
            && self.win_margin >= 1.0
            && self.sample_saturation.is_finite()
            && self.sample_saturation > 0.0
            && self.effect_saturation.is_finite()
            && self.effect_saturation > 0.0;
        if ok {
            Ok(())
        } else {
            Err(CerataError::Config(format!("invalid evaluator config: {self:?}")))
        }
    }
}

/// Which branch won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// Classic fitness cleared the margin.
    Classic,
    /// Experimental fitness cleared the margin.
    Experimental,
    /// Neither cleared the margin.
    Inconclusive,
}

/// What the operator should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Make the experimental lens the new standard.
    Promote,
    /// Keep collecting samples.
    Continue,
    /// Close the trial; the classic lens stays.
    Archive,
}

/// Fitness breakdown for one branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BranchFitness {
    /// Share of records that reached a qualified tier.
    pub qualification_rate: f64,
    /// Won outcomes over all outcomes.
    pub conversion_rate: f64,
    /// Revenue min-max normalized across both branches.
    pub revenue_component: f64,
    /// Weighted sum of the three components.
    pub fitness: f64,
}

impl BranchFitness {
    /// Weighted fitness from its three components.
    #[must_use]
    pub fn from_components(qualification_rate: f64, conversion_rate: f64, revenue_component: f64) -> Self {
        let mut fitness = QUALIFICATION_WEIGHT * qualification_rate;
        fitness += CONVERSION_WEIGHT * conversion_rate;
        fitness += REVENUE_WEIGHT * revenue_component;
        Self {
            qualification_rate,
            conversion_rate,
            revenue_component,
            fitness,
        }
    }
}

/// Immutable output of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Evaluated trial.
    pub trial: TrialId,
    /// Winning branch, if any.
    pub winner: Winner,
    /// In [0, 1].
    pub confidence: f64,
    /// Signed percentage change of experimental over classic fitness.
    pub improvement: f64,
    /// Next step for the operator.
    pub recommendation: Recommendation,
    /// One-line explanation of the recommendation.
    pub rationale: String,
    /// Classic branch fitness.
    pub classic: BranchFitness,
    /// Experimental branch fitness.
    pub experimental: BranchFitness,
    /// Records qualified on the classic branch.
    pub classic_samples: u64,
    /// Records qualified on the experimental branch.
    pub experimental_samples: u64,
}

/// Stateless evaluator with fixed tuning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrialEvaluator {
    config: EvaluatorConfig,
}

impl TrialEvaluator {
    #[must_use]
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Fitness of both branches; revenue is normalized across the pair.
    #[must_use]
    pub fn branch_fitness(classic: &TrialBranch, experimental: &TrialBranch) -> (BranchFitness, BranchFitness) {
        let (rc, re) = normalize_pair(classic.avg_deal_value(), experimental.avg_deal_value());
        (
            BranchFitness::from_components(classic.qualification_rate(), classic.conversion_rate(), rc),
            BranchFitness::from_components(
                experimental.qualification_rate(),
                experimental.conversion_rate(),
                re,
            ),
        )
    }

    /// Confidence from total sample size and fitness gap.
    #[must_use]
    pub fn confidence(&self, total_samples: u64, min_sample_size: u64, gap: f64) -> f64 {
        let saturation = min_sample_size.max(1) as f64 * self.config.sample_saturation;
        let sample = (total_samples as f64 / saturation).min(1.0);
        let effect = (gap.abs() / self.config.effect_saturation).min(1.0);
        ((sample + effect) / 2.0).clamp(0.0, 1.0)
    }

    /// Evaluate a trial snapshot.
    ///
    /// Fails with [`CerataError::InsufficientSample`] until both branches
    /// have at least `min_sample_size` records. Status is not checked here.
    pub fn evaluate(&self, trial: &TrialSnapshot) -> Result<TrialResult> {
        let classic_n = trial.classic_branch.records_qualified();
        let experimental_n = trial.experimental_branch.records_qualified();
        if !trial.has_min_samples() {
            return Err(CerataError::InsufficientSample {
                classic: classic_n,
                experimental: experimental_n,
                required: trial.min_sample_size,
            });
        }

        let (classic, experimental) =
            Self::branch_fitness(&trial.classic_branch, &trial.experimental_branch);
        let fc = classic.fitness;
        let fe = experimental.fitness;
        let margin = self.config.win_margin;

        let winner = if fe > fc * margin {
            Winner::Experimental
        } else if fc > fe * margin {
            Winner::Classic
        } else {
            Winner::Inconclusive
        };

        let improvement = if fc > 0.0 {
            (fe - fc) / fc * 100.0
        } else {
            fe * 100.0
        };
        let confidence = self.confidence(classic_n + experimental_n, trial.min_sample_size, fe - fc);
        let decisive = confidence >= self.config.confidence_threshold;

        let (recommendation, rationale) = match winner {
            Winner::Experimental if decisive => (
                Recommendation::Promote,
                format!(
                    "Experimental outperforms classic by {improvement:.1}% with {:.0}% confidence",
                    confidence * 100.0
                ),
            ),
            Winner::Classic if decisive => (
                Recommendation::Archive,
                format!(
                    "Classic outperforms experimental by {:.1}% with {:.0}% confidence",
                    -improvement,
                    confidence * 100.0
                ),
            ),
            Winner::Inconclusive => (
                Recommendation::Continue,
                format!(
                    "Fitness within {:.0}% margin ({improvement:+.1}%); collect more samples",
                    (margin - 1.0) * 100.0
                ),
            ),
            _ => (
                Recommendation::Continue,
                format!(
                    "{} leads by {:.1}% but confidence {:.0}% is below {:.0}%",
                    if winner == Winner::Experimental { "Experimental" } else { "Classic" },
                    improvement.abs(),
                    confidence * 100.0,
                    self.config.confidence_threshold * 100.0
                ),
            ),
        };

        Ok(TrialResult {
            trial: trial.id,
            winner,
            confidence,
            improvement,
            recommendation,
            rationale,
            classic,
            experimental,
            classic_samples: classic_n,
            experimental_samples: experimental_n,
        })
    }
}

/// Min-max normalize two values against each other.
fn normalize_pair(a: f64, b: f64) -> (f64, f64) {
    let lo = a.min(b);
    let hi = a.max(b);
    let spread = hi - lo;
    if spread > 0.0 {
        ((a - lo) / spread, (b - lo) / spread)
    } else if hi > 0.0 {
        (1.0, 1.0)
    } else {
        (0.0, 0.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
