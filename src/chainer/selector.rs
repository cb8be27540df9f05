//! Bandit rule selection.
//!
//! Given the rules valid for a source, pick one by Thompson sampling over
//! their truth values. Rules with a high, well-established success rate are
//! exploited, while untried rules keep getting explored.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tracing::trace;

use crate::rule::{BetaDistribution, Rule, ThompsonSampling};

/// Default number of Thompson-sampling rounds per selection.
pub const DEFAULT_SAMPLES: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct RuleSelector {
    samples: usize,
}

impl RuleSelector {
    pub fn new(samples: usize) -> Self {
        Self {
            samples: samples.max(1),
        }
    }

    /// Draw one rule from `candidates`.
    ///
    /// Returns the rule with its estimated probability of success (the mean
    /// of its Beta distribution), or `None` if there are no candidates.
    pub fn select<R: Rng + ?Sized>(&self, mut candidates: Vec<Rule>, rng: &mut R) -> Option<(Rule, f64)> {
        let weights = match candidates.len() {
            0 => return None,
            1 => vec![1.0],
            _ => ThompsonSampling::new(candidates.iter().map(Rule::truth_value))
                .distribution(rng, self.samples),
        };

        if tracing::enabled!(tracing::Level::TRACE) {
            for (rule, weight) in candidates.iter().zip(&weights) {
                trace!(rule = %rule.name, weight, "rule weight");
            }
        }

        let chosen = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => 0,
        };
        let rule = candidates.swap_remove(chosen);
        let prob = BetaDistribution::from_tv(rule.truth_value()).mean();
        Some((rule, prob))
    }
}

impl Default for RuleSelector {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLES)
    }
}
