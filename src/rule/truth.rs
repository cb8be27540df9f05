//! Truth values and the Thompson-sampling bandit built on them.
//!
//! A rule's truth value is a success-probability estimate (`mean`) with a
//! `confidence` weight. It is turned into a Beta distribution over the
//! rule's success rate; Thompson sampling then estimates, for a set of
//! candidate rules, how likely each one is to be the best.

use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

/// Evidence count at which confidence reaches 0.5.
pub const DEFAULT_K: f64 = 800.0;

/// Pseudo-counts of the uniform prior, so an untried rule sits at 50%.
pub const PRIOR_ALPHA: f64 = 1.0;
pub const PRIOR_BETA: f64 = 1.0;

const MAX_CONFIDENCE: f64 = 0.9999;

/// Probability-of-success estimate with a confidence weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthValue {
    pub mean: f64,
    pub confidence: f64,
}

impl TruthValue {
    /// Create a truth value, returning `None` if either component is outside `[0, 1]`.
    pub fn new(mean: f64, confidence: f64) -> Option<Self> {
        let tv = Self { mean, confidence };
        tv.is_valid().then_some(tv)
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.mean) && (0.0..=1.0).contains(&self.confidence)
    }

    /// Amount of evidence the confidence stands for.
    pub fn count(&self) -> f64 {
        let c = self.confidence.clamp(0.0, MAX_CONFIDENCE);
        DEFAULT_K * c / (1.0 - c)
    }
}

impl Default for TruthValue {
    /// Full strength, no evidence.
    fn default() -> Self {
        Self {
            mean: 1.0,
            confidence: 0.0,
        }
    }
}

/// Beta distribution over a rule's success rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaDistribution {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaDistribution {
    pub fn from_tv(tv: TruthValue) -> Self {
        let count = tv.count();
        let positive = tv.mean.clamp(0.0, 1.0) * count;
        Self {
            alpha: PRIOR_ALPHA + positive,
            beta: PRIOR_BETA + (count - positive),
        }
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Draw a success rate. Falls back to the mean if the parameters are
    /// rejected by the sampler.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match Beta::new(self.alpha, self.beta) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.mean(),
        }
    }
}

/// Thompson sampling over a set of arms.
#[derive(Debug, Clone)]
pub struct ThompsonSampling {
    arms: Vec<BetaDistribution>,
}

impl ThompsonSampling {
    pub fn new(tvs: impl IntoIterator<Item = TruthValue>) -> Self {
        Self {
            arms: tvs.into_iter().map(BetaDistribution::from_tv).collect(),
        }
    }

    /// Estimate, for every arm, the probability that it is the best one.
    ///
    /// Runs `samples` rounds of one draw per arm and counts argmax wins.
    /// Every arm starts with one win so none is ever given zero weight.
    pub fn distribution<R: Rng + ?Sized>(&self, rng: &mut R, samples: usize) -> Vec<f64> {
        match self.arms.len() {
            0 => return Vec::new(),
            1 => return vec![1.0],
            _ => {}
        }

        let mut wins = vec![1.0; self.arms.len()];
        for _ in 0..samples {
            let mut best = 0;
            let mut best_draw = f64::NEG_INFINITY;
            for (i, arm) in self.arms.iter().enumerate() {
                let draw = arm.sample(rng);
                if draw > best_draw {
                    best = i;
                    best_draw = draw;
                }
            }
            wins[best] += 1.0;
        }

        let total: f64 = wins.iter().sum();
        wins.iter().map(|w| w / total).collect()
    }
}
