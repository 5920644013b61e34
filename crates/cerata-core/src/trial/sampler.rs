//! # Branch Sampler
//!
//! Injectable randomness for traffic splitting. Each assignment is an
//! independent draw; nothing is memoized per record.

use crate::Branch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of uniform draws in [0, 1).
pub trait BranchSampler: Send {
    /// Next draw.
    fn draw(&mut self) -> f64;
}

/// Experimental iff the draw falls below the split.
pub(crate) fn choose(sampler: &mut dyn BranchSampler, traffic_split: f64) -> Branch {
    if sampler.draw() < traffic_split {
        Branch::Experimental
    } else {
        Branch::Classic
    }
}

/// Sampler backed by any [`rand::Rng`].
#[derive(Debug, Clone)]
pub struct RngSampler<R> {
    rng: R,
}

impl<R: Rng> RngSampler<R> {
    /// Wrap an existing generator.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSampler<StdRng> {
    /// Reproducible sampler.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Sampler seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng + Send> BranchSampler for RngSampler<R> {
    fn draw(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
///
/// Used by tests to force branch sequences.
#[derive(Debug, Clone)]
pub struct ScriptedSampler {
    draws: VecDeque<f64>,
}

impl ScriptedSampler {
    /// Draws are clamped into [0, 1). An empty script always draws 0.0.
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            draws: draws
                .into_iter()
                .map(|d| if d.is_finite() { d.clamp(0.0, 1.0 - f64::EPSILON) } else { 0.0 })
                .collect(),
        }
    }

    /// Force a branch sequence for the given split.
    pub fn branches(branches: impl IntoIterator<Item = Branch>, traffic_split: f64) -> Self {
        Self::new(branches.into_iter().map(|b| match b {
            Branch::Experimental => 0.0,
            Branch::Classic => traffic_split,
        }))
    }
}

impl BranchSampler for ScriptedSampler {
    fn draw(&mut self) -> f64 {
        match self.draws.pop_front() {
            Some(d) => {
                self.draws.push_back(d);
                d
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_samplers_agree() {
        let mut a = RngSampler::seeded(42);
        let mut b = RngSampler::seeded(42);
        for _ in 0..32 {
            let d = a.draw();
            assert_eq!(d.to_bits(), b.draw().to_bits());
            assert!((0.0..1.0).contains(&d));
        }
    }

    #[test]
    fn split_is_respected_on_average() {
        let mut sampler = RngSampler::seeded(7);
        let experimental = (0..10_000)
            .filter(|_| choose(&mut sampler, 0.2) == Branch::Experimental)
            .count();
        assert!((1_700..2_300).contains(&experimental), "{experimental}");
    }

    #[test]
    fn scripted_branches_replay_in_order() {
        let mut sampler = ScriptedSampler::branches(
            [Branch::Experimental, Branch::Classic, Branch::Classic],
            0.5,
        );
        let got: Vec<_> = (0..4).map(|_| choose(&mut sampler, 0.5)).collect();
        assert_eq!(
            got,
            vec![
                Branch::Experimental,
                Branch::Classic,
                Branch::Classic,
                Branch::Experimental
            ]
        );
    }
}
