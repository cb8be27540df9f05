//! The population of sources the chainer picks from.
//!
//! A source is a fact eligible for rule application. It remembers which
//! rules have been tried against it and becomes fully exhausted once no
//! untried rule applies. Sources are never removed during a run.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::fact::FactId;
use crate::rule::Rule;

/// Index of a source in its population. Stable for the population's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub usize);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// A fact eligible for rule application.
#[derive(Debug, Clone)]
pub struct Source {
    pub body: FactId,
    pub vardecl: Option<FactId>,
    /// Accumulated `-ln(probability)` of the inference chain that produced
    /// this source.
    pub complexity: f64,
    tried: HashSet<Rule>,
    exhausted: bool,
}

impl Source {
    pub fn new(body: FactId, vardecl: Option<FactId>) -> Self {
        Self {
            body,
            vardecl,
            complexity: 0.0,
            tried: HashSet::new(),
            exhausted: false,
        }
    }

    /// Complexity of a source derived from this one by a rule that succeeds
    /// with probability `prob`.
    pub fn expand_complexity(&self, prob: f64) -> f64 {
        self.complexity - prob.max(f64::MIN_POSITIVE).ln()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_rule_exhausted(&self, rule: &Rule) -> bool {
        self.tried.contains(rule)
    }
}

/// Point-in-time copy of the parts of a source rule selection needs, taken
/// so the population lock is not held while unifying.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub id: SourceId,
    pub body: FactId,
    pub vardecl: Option<FactId>,
    pub tried: HashSet<Rule>,
}

/// Every source of a run, in insertion order.
#[derive(Debug, Default)]
pub struct SourcePopulation {
    sources: Vec<Source>,
    index: HashMap<FactId, SourceId>,
    exhausted: bool,
    /// Whether a retry reset may still happen: set initially and whenever
    /// new sources arrive, cleared by every reset.
    retry_armed: bool,
    complexity_penalty: f64,
}

impl SourcePopulation {
    pub fn new(complexity_penalty: f64) -> Self {
        Self {
            complexity_penalty,
            retry_armed: true,
            ..Self::default()
        }
    }

    /// Add a starting source. Returns `None` if the body is already a source.
    pub fn push(&mut self, body: FactId, vardecl: Option<FactId>) -> Option<SourceId> {
        if self.index.contains_key(&body) {
            return None;
        }
        let id = SourceId(self.sources.len());
        self.sources.push(Source::new(body, vardecl));
        self.index.insert(body, id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(id.0)
    }

    pub fn find(&self, body: FactId) -> Option<SourceId> {
        self.index.get(&body).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    /// Selection weight of every source, in population order.
    ///
    /// Fully exhausted sources weigh nothing; the rest decay exponentially
    /// with their complexity.
    pub fn weights(&self) -> Vec<f64> {
        self.sources
            .iter()
            .map(|s| {
                if s.exhausted {
                    0.0
                } else {
                    (-self.complexity_penalty * s.complexity).exp()
                }
            })
            .collect()
    }

    /// Insert produced facts as new sources derived from `parent`.
    ///
    /// Facts that are already sources are left alone. Returns the number of
    /// sources added.
    pub fn insert(&mut self, products: &BTreeSet<FactId>, parent: SourceId, prob: f64) -> usize {
        let complexity = match self.get(parent) {
            Some(source) => source.expand_complexity(prob),
            None => 0.0,
        };

        let mut added = 0;
        for &body in products {
            if let Some(id) = self.push(body, None) {
                self.sources[id.0].complexity = complexity;
                added += 1;
            }
        }
        if added > 0 {
            self.retry_armed = true;
        }
        added
    }

    /// True once the population has been marked exhausted, or every source
    /// is individually exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted || (!self.sources.is_empty() && self.sources.iter().all(|s| s.exhausted))
    }

    /// True only if [`set_exhausted`](Self::set_exhausted) was called since
    /// the last reset.
    pub fn is_marked_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Mark every source, and the population itself, exhausted.
    pub fn set_exhausted(&mut self) {
        self.exhausted = true;
        for source in &mut self.sources {
            source.exhausted = true;
        }
    }

    /// Clear every exhaustion flag and every tried-rule set.
    pub fn reset_exhausted(&mut self) {
        self.exhausted = false;
        self.retry_armed = false;
        for source in &mut self.sources {
            source.exhausted = false;
            source.tried.clear();
        }
    }

    /// Retry an exhausted population.
    ///
    /// Resets exhaustion if no reset has happened yet or new sources arrived
    /// since the last one. Otherwise another round could not derive anything
    /// new, so the population is marked exhausted for good. Returns `true` if
    /// the sources were reset.
    pub fn retry_exhausted(&mut self) -> bool {
        if self.retry_armed {
            self.reset_exhausted();
            true
        } else {
            self.set_exhausted();
            false
        }
    }

    /// Claim `(source, rule)`. Returns `false` if it was already claimed.
    pub fn mark_rule_tried(&mut self, source: SourceId, rule: &Rule) -> bool {
        match self.sources.get_mut(source.0) {
            Some(s) => s.tried.insert(rule.clone()),
            None => false,
        }
    }

    pub fn is_rule_exhausted(&self, source: SourceId, rule: &Rule) -> bool {
        self.get(source).is_some_and(|s| s.is_rule_exhausted(rule))
    }

    pub fn set_source_exhausted(&mut self, source: SourceId) {
        if let Some(s) = self.sources.get_mut(source.0) {
            s.exhausted = true;
        }
    }

    pub fn snapshot(&self, id: SourceId) -> Option<SourceSnapshot> {
        self.get(id).map(|s| SourceSnapshot {
            id,
            body: s.body,
            vardecl: s.vardecl,
            tried: s.tried.clone(),
        })
    }
}
