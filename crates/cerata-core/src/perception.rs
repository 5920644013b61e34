//! # Perception Module
//!
//! One full pass of Extractor → Calculator → Classifier over a record,
//! producing an immutable [`CoherenceResult`].
//!
//! The tier is a pure function of the dimensions and the lens. Signals,
//! actions, confidence and priority are derived annotations for reporting
//! and routing; they never feed back into the tier.

use crate::coherence::{CoherenceCalculator, saturate_urgency};
use crate::error::Result;
use crate::extractor::{DimensionExtractor, Dimensions};
use crate::lens::Lens;
use crate::record::{CompanySize, LeadRecord, LeadSource};
use crate::tier::TierClassifier;
use crate::{Stage, Tier};
use serde::{Deserialize, Serialize};

/// Weight of the lens-weighted dimension mean in the priority score.
const PRIORITY_SIGNAL_WEIGHT: f64 = 0.2;

/// Number of data points counted by the completeness confidence.
const CONFIDENCE_DATA_POINTS: f64 = 10.0;

/// Result of perceiving one record through one lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceResult {
    /// Record id.
    pub lead_id: String,
    /// Company name.
    pub company_name: String,
    /// Lens the record was perceived through.
    pub lens: String,
    /// The four dimensions (urgency is raw).
    pub dimensions: Dimensions,
    /// Saturated urgency `q_opt`.
    pub urgency_activation: f64,
    /// Composite coherence score C.
    pub coherence_score: f64,
    /// Assigned tier.
    pub tier: Tier,
    /// Data completeness in [0,1].
    pub confidence: f64,
    /// Routing priority in [0,1].
    pub priority: f64,
    /// Routing decision.
    pub stage: Stage,
    /// Signals in the record's favour.
    pub positive_signals: Vec<String>,
    /// Concerns worth a human look.
    pub warning_signals: Vec<String>,
    /// Reasons the record was disqualified.
    pub disqualifiers: Vec<String>,
    /// Recommended next actions.
    pub next_actions: Vec<String>,
}

impl CoherenceResult {
    /// Whether the record qualified (any tier except NOT_READY).
    #[must_use]
    pub fn is_qualified(&self) -> bool {
        self.tier.is_qualified()
    }

    /// Whether the record needs the safety protocol.
    #[must_use]
    pub fn is_crisis(&self) -> bool {
        self.tier == Tier::Crisis
    }
}

/// Score and tier for already-extracted dimensions.
#[must_use]
pub fn assess(dims: &Dimensions, lens: &Lens) -> (f64, Tier) {
    let score = CoherenceCalculator::score(dims, lens);
    let tier = TierClassifier::classify(score, dims, lens);
    (score, tier)
}

/// Perceive a record through a lens.
pub fn perceive(record: &LeadRecord, lens: &Lens) -> Result<CoherenceResult> {
    let dims = DimensionExtractor::extract(record, lens)?;
    let (score, tier) = assess(&dims, lens);

    Ok(CoherenceResult {
        lead_id: record.lead_id.clone(),
        company_name: record.company_name.clone(),
        lens: lens.name().to_string(),
        dimensions: dims,
        urgency_activation: saturate_urgency(dims.urgency(), lens.saturation()),
        coherence_score: score,
        tier,
        confidence: completeness(record),
        priority: priority(tier, &dims, lens),
        stage: Stage::from(tier),
        positive_signals: positive_signals(record, &dims),
        warning_signals: warning_signals(record, &dims, lens, tier),
        disqualifiers: disqualifiers(record, &dims, lens),
        next_actions: next_actions(record, &dims, tier),
    })
}

// =============================================================================
// ANNOTATIONS
// =============================================================================

/// Tier base plus a boost from the lens-weighted dimension mean.
///
/// The boost goes through the lens weights so that a lens emphasizing, say,
/// authority also ranks authority-heavy leads first within a tier; the
/// coherence score itself stays unweighted.
fn priority(tier: Tier, dims: &Dimensions, lens: &Lens) -> f64 {
    let base = match tier {
        Tier::Crisis | Tier::Hot => 1.0,
        Tier::Warm => 0.6,
        Tier::Cold => 0.3,
        Tier::NotReady => 0.0,
    };
    let signal = lens.weights().weighted_mean(dims.as_array());
    (base + PRIORITY_SIGNAL_WEIGHT * signal).min(1.0)
}

fn completeness(record: &LeadRecord) -> f64 {
    let mut points = 0u32;
    if record.contact_name.is_some() {
        points += 1;
    }
    if record.contact_title.is_some() {
        points += 1;
    }
    if record.industry.is_some() {
        points += 1;
    }
    if record.company_size.is_some() {
        points += 1;
    }
    if !record.pain_points.is_empty() {
        points += 1;
    }
    if record.is_decision_maker.is_some() {
        points += 1;
    }
    if record.budget_mentioned.is_some() {
        points += 1;
    }
    if record.timeline.is_some() {
        points += 1;
    }
    if !record.text_for_analysis().trim().is_empty() {
        points += 2;
    }
    f64::from(points) / CONFIDENCE_DATA_POINTS
}

fn positive_signals(record: &LeadRecord, dims: &Dimensions) -> Vec<String> {
    let mut signals = Vec::new();
    if dims.intent() >= 0.6 {
        signals.push("Strong intent signals".to_string());
    }
    if dims.authority() >= 0.6 {
        signals.push("Decision-making authority".to_string());
    }
    if dims.urgency() >= 0.5 {
        signals.push("Urgency expressed".to_string());
    }
    if dims.fit() >= 0.6 {
        signals.push("Strong ICP fit".to_string());
    }
    if record.source == LeadSource::Referral {
        signals.push("Referral lead (ecosystem validated)".to_string());
    }
    if record.budget_mentioned == Some(true) {
        signals.push("Budget discussed".to_string());
    }
    signals
}

fn warning_signals(record: &LeadRecord, dims: &Dimensions, lens: &Lens, tier: Tier) -> Vec<String> {
    let mut warnings = Vec::new();
    if tier == Tier::Crisis {
        warnings.push("Crisis indicators present - safety protocol overrides qualification".to_string());
    }
    if dims.authority() < 0.4 && dims.intent() > 0.5 {
        warnings.push("Intent without authority - may need champion".to_string());
    }
    if dims.urgency() > 0.6 && dims.authority() < 0.4 {
        warnings.push("High urgency with low authority - may be researcher".to_string());
    }
    if dims.urgency() > lens.saturation().peak() {
        warnings.push("Urgency past saturation peak - extra urgency lowers the score".to_string());
    }
    if !record.competitors_mentioned.is_empty() {
        warnings.push(format!(
            "Currently using: {}",
            record.competitors_mentioned.join(", ")
        ));
    }
    if dims.intent() < 0.3 {
        warnings.push("Unclear intent - needs discovery".to_string());
    }
    warnings
}

fn disqualifiers(record: &LeadRecord, dims: &Dimensions, lens: &Lens) -> Vec<String> {
    let mut reasons = Vec::new();
    if dims.fit() < lens.fit_floor() {
        reasons.push("Poor ICP fit".to_string());
    }
    if dims.authority() < lens.authority_floor() {
        if record.company_size == Some(CompanySize::Enterprise) {
            reasons.push("Too junior for enterprise deal".to_string());
        } else {
            reasons.push("Insufficient decision authority".to_string());
        }
    }
    reasons
}

fn next_actions(record: &LeadRecord, dims: &Dimensions, tier: Tier) -> Vec<String> {
    let mut actions = Vec::new();
    match tier {
        Tier::Crisis => {
            actions.push("Escalate to on-call responder now".to_string());
            actions.push("Follow safety protocol before any qualification".to_string());
            actions.push("Log crisis contact and follow up within 24 hours".to_string());
        }
        Tier::Hot => {
            actions.push("Schedule demo/meeting ASAP".to_string());
            if record.budget_mentioned != Some(true) {
                actions.push("Confirm budget in first call".to_string());
            }
            if dims.urgency() >= 0.6 {
                actions.push("Offer accelerated timeline".to_string());
            }
        }
        Tier::Warm => {
            if dims.intent() < 0.5 {
                actions.push("Discovery call to understand needs".to_string());
            }
            if dims.authority() < 0.5 {
                actions.push("Identify decision-maker / champion".to_string());
            }
            if dims.urgency() < 0.3 {
                actions.push("Create urgency - share ROI data".to_string());
            }
            actions.push("Add to nurture sequence".to_string());
        }
        Tier::Cold => {
            actions.push("Add to long-term nurture".to_string());
            if dims.intent() < 0.3 {
                actions.push("Send educational content".to_string());
            }
            actions.push("Re-evaluate in 30 days".to_string());
        }
        Tier::NotReady => {
            actions.push("Archive - does not meet qualification criteria".to_string());
        }
    }
    actions
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::Weights;
    use crate::record::{SignalOverrides, Timeline};

    fn scenario_lens() -> Lens {
        Lens::with_weights("scenario", Weights::new(0.25, 0.30, 0.30, 0.15)).expect("valid")
    }

    fn overridden(psi: f64, rho: f64, q: f64, f: f64) -> LeadRecord {
        LeadRecord::new("s1", "Scenario Co").with_overrides(SignalOverrides {
            intent: Some(psi),
            authority: Some(rho),
            urgency: Some(q),
            fit: Some(f),
        })
    }

    #[test]
    fn end_to_end_scenario_is_warm() {
        let result = perceive(&overridden(0.8, 0.5, 0.6, 0.7), &scenario_lens()).expect("valid");
        assert!((result.urgency_activation - 0.48).abs() < 1e-9);
        assert!((result.coherence_score - 2.30).abs() < 1e-9);
        assert_eq!(result.tier, Tier::Warm);
        assert_eq!(result.stage, Stage::NurtureWarm);
        assert!(result.disqualifiers.is_empty());
        assert_eq!(result.lens, "scenario");
    }

    #[test]
    fn crisis_is_a_successful_result() {
        let record = LeadRecord::new("c1", "Caller").with_crisis_flag();
        let result = perceive(&record, &scenario_lens()).expect("crisis is not an error");
        assert!(result.is_crisis());
        assert_eq!(result.stage, Stage::Escalate);
        assert_eq!(result.priority, 1.0);
        assert!(result.next_actions[0].contains("Escalate"));
    }

    #[test]
    fn not_ready_lists_disqualifiers() {
        let result = perceive(&overridden(1.0, 0.1, 0.6, 1.0), &scenario_lens()).expect("valid");
        assert_eq!(result.tier, Tier::NotReady);
        assert_eq!(result.disqualifiers, vec!["Insufficient decision authority".to_string()]);
        assert_eq!(result.next_actions.len(), 1);
    }

    #[test]
    fn completeness_counts_data_points() {
        let record = LeadRecord::new("d", "D")
            .with_contact("Jane", "IT Manager")
            .with_industry("Fintech")
            .with_timeline(Timeline::NextQuarter);
        let result = perceive(&record, &scenario_lens()).expect("valid");
        assert!((result.confidence - 0.4).abs() < 1e-12);
    }

    #[test]
    fn priority_orders_tiers() {
        let lens = scenario_lens();
        let warm = perceive(&overridden(0.8, 0.5, 0.6, 0.7), &lens).expect("valid");
        let cold = perceive(&overridden(0.2, 0.3, 0.1, 0.3), &lens).expect("valid");
        assert_eq!(cold.tier, Tier::Cold);
        assert!(warm.priority > cold.priority);
        assert!(warm.priority <= 1.0);
    }

    #[test]
    fn priority_boost_follows_lens_weights() {
        let record = overridden(0.8, 0.5, 0.6, 0.7);
        let scenario = perceive(&record, &scenario_lens()).expect("valid");
        assert!((scenario.priority - 0.727).abs() < 1e-9);

        let authority_only =
            Lens::with_weights("authority_only", Weights::new(0.0, 1.0, 0.0, 0.0)).expect("valid");
        let reweighted = perceive(&record, &authority_only).expect("valid");
        assert_eq!(reweighted.tier, Tier::Warm);
        assert_eq!(reweighted.coherence_score.to_bits(), scenario.coherence_score.to_bits());
        assert!((reweighted.priority - 0.7).abs() < 1e-9);
    }

    #[test]
    fn same_record_same_result() {
        let lens = scenario_lens();
        let record = overridden(0.41, 0.77, 0.33, 0.58);
        let a = perceive(&record, &lens).expect("valid");
        let b = perceive(&record, &lens).expect("valid");
        assert_eq!(a, b);
        assert_eq!(a.coherence_score.to_bits(), b.coherence_score.to_bits());
    }
}
