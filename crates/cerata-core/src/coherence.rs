//! # Coherence Calculator
//!
//! Combines the four dimensions into one bounded composite score.
//!
//! ```text
//! q_opt    = q / (Km + q + q²/Ki)
//! coupling = 0.15 × ρ × Ψ
//! C        = Ψ + (ρ × Ψ) + q_opt + (f × Ψ) + coupling
//! ```
//!
//! The urgency transform saturates and then falls: it peaks at
//! `q = sqrt(Km × Ki)` (0.4 with the default constants) and decreases beyond
//! it, so extreme urgency alone cannot inflate the score. Callers must not
//! assume `q_opt` is monotonic in `q`.
//!
//! With Ψ = 0 every intent-coupled term vanishes and C is exactly `q_opt`.
//! Zero intent means authority and fit cannot compensate.
//!
//! The summation order above is fixed. Trials compare scores across
//! configurations, so identical inputs must give bit-identical output.

use crate::extractor::Dimensions;
use crate::lens::{Lens, Saturation};

/// Strength of the authority × intent coupling term.
pub const COUPLING_STRENGTH: f64 = 0.15;

/// Apply the urgency saturation transform.
///
/// Input is clamped to [0,1]. Returns 0.0 for `q <= 0`.
#[must_use]
pub fn saturate_urgency(q: f64, saturation: Saturation) -> f64 {
    let q = q.clamp(0.0, 1.0);
    if q <= 0.0 {
        return 0.0;
    }
    q / (saturation.km + q + (q * q) / saturation.ki)
}

/// Pure composite-score calculator.
pub struct CoherenceCalculator;

impl CoherenceCalculator {
    /// Compute C for the given dimensions under the lens's saturation constants.
    #[must_use]
    pub fn score(dims: &Dimensions, lens: &Lens) -> f64 {
        Self::score_with(dims, lens.saturation())
    }

    /// Compute C with explicit saturation constants.
    #[must_use]
    pub fn score_with(dims: &Dimensions, saturation: Saturation) -> f64 {
        let psi = dims.intent().clamp(0.0, 1.0);
        let rho = dims.authority().clamp(0.0, 1.0);
        let q = dims.urgency().clamp(0.0, 1.0);
        let f = dims.fit().clamp(0.0, 1.0);

        let q_opt = saturate_urgency(q, saturation);
        let coupling = COUPLING_STRENGTH * rho * psi;

        let mut c = psi;
        c += rho * psi;
        c += q_opt;
        c += f * psi;
        c += coupling;
        c
    }

    /// Theoretical maximum of C for the given saturation constants.
    #[must_use]
    pub fn max_score(saturation: Saturation) -> f64 {
        let peak = saturate_urgency(saturation.peak(), saturation);
        3.0 + peak + COUPLING_STRENGTH
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(psi: f64, rho: f64, q: f64, f: f64) -> Dimensions {
        Dimensions::new(psi, rho, q, f).expect("finite")
    }

    #[test]
    fn urgency_transform_is_non_monotonic() {
        let s = Saturation::default();
        let low = saturate_urgency(0.1, s);
        let peak = saturate_urgency(0.4, s);
        let high = saturate_urgency(0.9, s);
        assert!(peak > low);
        assert!(peak > high);
        assert!((peak - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_urgency_is_zero() {
        assert_eq!(saturate_urgency(0.0, Saturation::default()), 0.0);
        assert_eq!(saturate_urgency(-3.0, Saturation::default()), 0.0);
    }

    #[test]
    fn zero_intent_degenerates_to_q_opt() {
        let s = Saturation::default();
        let d = dims(0.0, 0.9, 0.6, 0.9);
        assert_eq!(CoherenceCalculator::score_with(&d, s), saturate_urgency(0.6, s));
    }

    #[test]
    fn worked_example() {
        let d = dims(0.8, 0.5, 0.6, 0.7);
        let c = CoherenceCalculator::score_with(&d, Saturation::default());
        // 0.8 + 0.4 + 0.48 + 0.56 + 0.06
        assert!((c - 2.30).abs() < 1e-9);
    }

    #[test]
    fn score_is_bit_reproducible() {
        let d = dims(0.37, 0.61, 0.83, 0.29);
        let a = CoherenceCalculator::score_with(&d, Saturation::default());
        let b = CoherenceCalculator::score_with(&d, Saturation::default());
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn max_score_bounds_all_corners() {
        let s = Saturation::default();
        let max = CoherenceCalculator::max_score(s);
        let best = dims(1.0, 1.0, s.peak(), 1.0);
        assert!((CoherenceCalculator::score_with(&best, s) - max).abs() < 1e-12);
    }
}
