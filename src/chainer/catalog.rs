//! The active rule set of a run.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::debug;

use crate::fact::FactId;
use crate::kb::KnowledgeBase;
use crate::rule::meta::expand_meta;
use crate::rule::Rule;

/// Catalogs at least this large are unified against a source in parallel.
const PARALLEL_UNIFY_THRESHOLD: usize = 32;

/// Duplicate-free, append-only collection of rules.
#[derive(Debug, Default)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
    index: HashSet<Rule>,
}

impl RuleCatalog {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut catalog = Self::default();
        for rule in rules {
            catalog.insert(rule);
        }
        catalog
    }

    /// Add a rule. Returns `false` if an equal rule is already present.
    pub fn insert(&mut self, rule: Rule) -> bool {
        if self.index.contains(&rule) {
            return false;
        }
        self.index.insert(rule.clone());
        self.rules.push(rule);
        true
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Expand every meta-rule against `kb` and add the resulting rules.
    ///
    /// Returns the catalog size before and after. Running it again without
    /// new matching facts leaves the size unchanged.
    pub fn expand_meta_rules(&mut self, kb: &dyn KnowledgeBase) -> (usize, usize) {
        let before = self.rules.len();
        let expanded: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| r.is_meta())
            .flat_map(|r| expand_meta(r, kb))
            .collect();
        for rule in expanded {
            self.insert(rule);
        }
        let after = self.rules.len();
        if after != before {
            debug!(before, after, "meta-rule expansion grew the rule set");
        }
        (before, after)
    }

    /// Rules that may still be applied to the source `body`.
    ///
    /// In full application mode a rule qualifies as-is if any of its
    /// specializations unifies with the source; otherwise every distinct
    /// specialization qualifies on its own. Rules in `tried` are left out,
    /// and meta-rules never qualify.
    pub fn valid_rules(
        &self,
        body: FactId,
        vardecl: Option<FactId>,
        tried: &HashSet<Rule>,
        context: &dyn KnowledgeBase,
        full_rule_application: bool,
    ) -> Vec<Rule> {
        let candidates = |rule: &Rule| -> Vec<Rule> {
            if rule.is_meta() {
                return Vec::new();
            }
            let unified = rule.unify_source(body, vardecl, context);
            if full_rule_application {
                if !unified.is_empty() && !tried.contains(rule) {
                    vec![rule.clone()]
                } else {
                    Vec::new()
                }
            } else {
                unified
                    .into_iter()
                    .map(|(specialized, _)| specialized)
                    .filter(|r| !tried.contains(r))
                    .collect()
            }
        };

        let per_rule: Vec<Vec<Rule>> = if self.rules.len() >= PARALLEL_UNIFY_THRESHOLD {
            self.rules.par_iter().map(candidates).collect()
        } else {
            self.rules.iter().map(candidates).collect()
        };

        let mut seen = HashSet::new();
        per_rule
            .into_iter()
            .flatten()
            .filter(|r| seen.insert(r.clone()))
            .collect()
    }
}
