//! # Tier Classifier
//!
//! Maps a coherence score and the raw dimensions to a [`Tier`].
//!
//! Evaluation order is fixed:
//!
//! 1. CRISIS: raw urgency above the lens crisis threshold, regardless of C.
//! 2. Floor override: authority or fit below its floor forces NOT_READY.
//! 3. Cutoff ladder: HOT (with authority and urgency minimums), WARM, COLD,
//!    otherwise NOT_READY.

use crate::extractor::Dimensions;
use crate::lens::Lens;
use crate::Tier;

/// Stateless tier classifier.
pub struct TierClassifier;

impl TierClassifier {
    /// Classify one record.
    #[must_use]
    pub fn classify(score: f64, dims: &Dimensions, lens: &Lens) -> Tier {
        let urgency = dims.urgency();
        let authority = dims.authority();

        if urgency > lens.crisis_threshold() {
            return Tier::Crisis;
        }

        if Self::below_floor(dims, lens) {
            return Tier::NotReady;
        }

        let cutoffs = lens.cutoffs();
        if score >= cutoffs.hot
            && authority >= lens.hot_min_authority()
            && urgency >= lens.hot_min_urgency()
        {
            Tier::Hot
        } else if score >= cutoffs.warm {
            Tier::Warm
        } else if score >= cutoffs.cold {
            Tier::Cold
        } else {
            Tier::NotReady
        }
    }

    /// Whether the floor override disqualifies these dimensions. Both floors
    /// are strict: a value equal to its floor passes.
    #[must_use]
    pub fn below_floor(dims: &Dimensions, lens: &Lens) -> bool {
        dims.authority() < lens.authority_floor() || dims.fit() < lens.fit_floor()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coherence::CoherenceCalculator;

    fn lens() -> Lens {
        Lens::with_defaults("test").expect("valid lens")
    }

    fn classify(psi: f64, rho: f64, q: f64, f: f64) -> Tier {
        let lens = lens();
        let dims = Dimensions::new(psi, rho, q, f).expect("finite");
        let score = CoherenceCalculator::score(&dims, &lens);
        TierClassifier::classify(score, &dims, &lens)
    }

    #[test]
    fn crisis_short_circuits_everything() {
        assert_eq!(classify(0.0, 0.0, 0.71, 0.0), Tier::Crisis);
    }

    #[test]
    fn crisis_threshold_is_strict() {
        assert_ne!(classify(0.9, 0.9, 0.7, 0.9), Tier::Crisis);
    }

    #[test]
    fn authority_floor_beats_hot_score() {
        let lens = lens();
        let dims = Dimensions::new(1.0, 0.1, 0.6, 1.0).expect("finite");
        let score = CoherenceCalculator::score(&dims, &lens);
        assert!(score >= lens.cutoffs().hot);
        assert_eq!(TierClassifier::classify(score, &dims, &lens), Tier::NotReady);
    }

    #[test]
    fn fit_floor_beats_warm_score() {
        assert_eq!(classify(1.0, 0.6, 0.4, 0.1), Tier::NotReady);
    }

    #[test]
    fn hot_requires_authority_and_urgency() {
        assert_eq!(classify(1.0, 0.9, 0.5, 0.9), Tier::Hot);
        // Same score region but urgency below hot_min_urgency.
        assert_eq!(classify(1.0, 0.9, 0.2, 0.9), Tier::Warm);
    }

    #[test]
    fn worked_example_is_warm() {
        assert_eq!(classify(0.8, 0.5, 0.6, 0.7), Tier::Warm);
    }

    #[test]
    fn ladder_bottom() {
        assert_eq!(classify(0.2, 0.3, 0.1, 0.3), Tier::Cold);
        assert_eq!(classify(0.0, 0.3, 0.05, 0.3), Tier::NotReady);
    }

    // Equality edges: dimensions built directly, score passed explicitly.

    fn at(score: f64, rho: f64, q: f64, f: f64) -> Tier {
        let dims = Dimensions::new(0.5, rho, q, f).expect("finite");
        TierClassifier::classify(score, &dims, &lens())
    }

    #[test]
    fn cutoffs_are_inclusive() {
        let cutoffs = lens().cutoffs();
        assert_eq!(at(cutoffs.hot, 0.6, 0.5, 0.6), Tier::Hot);
        assert_eq!(at(cutoffs.warm, 0.6, 0.5, 0.6), Tier::Warm);
        assert_eq!(at(cutoffs.cold, 0.6, 0.5, 0.6), Tier::Cold);
        assert_eq!(at(cutoffs.cold - 1e-9, 0.6, 0.5, 0.6), Tier::NotReady);
    }

    #[test]
    fn value_at_floor_is_not_disqualified() {
        let lens = lens();
        let warm = lens.cutoffs().warm;
        assert_eq!(at(warm, lens.authority_floor(), 0.5, 0.6), Tier::Warm);
        assert_eq!(at(warm, 0.6, 0.5, lens.fit_floor()), Tier::Warm);
        assert_eq!(at(warm, lens.authority_floor() - 1e-9, 0.5, 0.6), Tier::NotReady);
        assert_eq!(at(warm, 0.6, 0.5, lens.fit_floor() - 1e-9), Tier::NotReady);
    }

    #[test]
    fn hot_minimums_are_inclusive() {
        let lens = lens();
        let hot = lens.cutoffs().hot;
        assert_eq!(at(hot, lens.hot_min_authority(), 0.5, 0.6), Tier::Hot);
        assert_eq!(at(hot, 0.6, lens.hot_min_urgency(), 0.6), Tier::Hot);
        assert_eq!(at(hot, lens.hot_min_authority() - 1e-9, 0.5, 0.6), Tier::Warm);
        assert_eq!(at(hot, 0.6, lens.hot_min_urgency() - 1e-9, 0.6), Tier::Warm);
    }

    #[test]
    fn below_floor_matches_classification() {
        let lens = lens();
        for (rho, f) in [(0.1, 0.6), (0.6, 0.1), (0.15, 0.2), (0.6, 0.6)] {
            let dims = Dimensions::new(0.5, rho, 0.5, f).expect("finite");
            let forced = TierClassifier::classify(lens.cutoffs().warm, &dims, &lens) == Tier::NotReady;
            assert_eq!(TierClassifier::below_floor(&dims, &lens), forced);
        }
    }
}
