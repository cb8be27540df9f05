//! Forward chaining over a knowledge base.
//!
//! A run starts from one or more source facts. Each step picks a source
//! (weighted by complexity), picks a rule valid for it (Thompson sampling
//! over rule truth values), applies the rule, and adds the products back as
//! new sources. The run ends once every source is exhausted or the iteration
//! bound is reached.
//!
//! ```no_run
//! use std::sync::Arc;
//! use akh_chainer::chainer::{ChainerConfig, ForwardChainer, RuleBase};
//! use akh_chainer::kb::{load_facts, MemoryKb};
//! use akh_chainer::rule::parse::parse_rules;
//!
//! let kb = Arc::new(MemoryKb::new());
//! let source = load_facts(kb.as_ref(), "(Inheritance Concept:cat Concept:mammal)").unwrap()[0];
//! load_facts(kb.as_ref(), "(Inheritance Concept:mammal Concept:animal)").unwrap();
//!
//! let rules = parse_rules(
//!     "@rule deduction\n  match: (Inheritance $A $B), (Inheritance $B $C)\n  produce: (Inheritance $A $C)\n",
//! )
//! .unwrap();
//! let rule_base = RuleBase::new("inheritance", rules, ChainerConfig::default());
//!
//! let chainer = ForwardChainer::builder(kb, rule_base, source).build().unwrap();
//! chainer.run();
//! println!("derived {} facts", chainer.results_set().len());
//! ```

pub mod catalog;
pub mod config;
pub mod pool;
pub mod scheduler;
pub mod selector;
pub mod sources;
pub mod trace;

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use crate::error::{ChainerError, ChainerResult, KbResult};
use crate::fact::{Atom, FactId, CONCEPT, SET};
use crate::kb::{FocusSet, KnowledgeBase};
use crate::rule::Rule;

pub use catalog::RuleCatalog;
pub use config::{ChainerConfig, RuleBase};
pub use pool::{Token, TokenPool};
pub use scheduler::Scheduler;
pub use selector::RuleSelector;
pub use sources::{Source, SourceId, SourcePopulation, SourceSnapshot};
pub use trace::{InferenceRecord, InferenceTrace, JsonLinesSink, MemorySink, TraceSink};

/// Name of the synthetic source that apply-all-rules records are filed under.
pub const DUMMY_SOURCE: &str = "dummy-source";

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    SourcesExhausted,
    MaxIterations,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourcesExhausted => write!(f, "all sources have been exhausted"),
            Self::MaxIterations => write!(f, "reached maximum number of iterations"),
        }
    }
}

/// What a single step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// No source had positive weight.
    NoSource,
    /// The selected source had no untried valid rule and is now exhausted.
    NoRule,
    /// Another worker already claimed the selected (source, rule) pair.
    Contended,
    /// The rule was applied; these facts were produced.
    Applied { products: BTreeSet<FactId> },
}

/// Builder for [`ForwardChainer`].
pub struct ForwardChainerBuilder {
    kb: Arc<dyn KnowledgeBase>,
    rule_base: RuleBase,
    source: FactId,
    vardecl: Option<FactId>,
    sink: Option<Arc<dyn TraceSink>>,
    focus: Vec<FactId>,
}

impl ForwardChainerBuilder {
    /// Declare the open variables of the source.
    pub fn vardecl(mut self, vardecl: FactId) -> Self {
        self.vardecl = Some(vardecl);
        self
    }

    /// Forward every inference record to `sink` as it is made.
    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Restrict premise matching to these facts (plus the sources).
    /// An empty focus set means the whole knowledge base.
    pub fn focus_set(mut self, facts: impl IntoIterator<Item = FactId>) -> Self {
        self.focus.extend(facts);
        self
    }

    pub fn build(self) -> ChainerResult<ForwardChainer> {
        let config = self.rule_base.config.clone();
        config.validate()?;

        let Some(source_atom) = self.kb.atom(self.source) else {
            return Err(ChainerError::InvalidSource {
                message: format!("starting fact {} is not in the knowledge base", self.source),
            });
        };
        if let Some(vardecl) = self.vardecl {
            if !self.kb.contains(vardecl) {
                return Err(ChainerError::InvalidSource {
                    message: format!("variable declaration {vardecl} is not in the knowledge base"),
                });
            }
        }

        // A set of starting facts makes each member a source.
        let bodies: Vec<FactId> = if source_atom.kind() == SET {
            source_atom.outgoing().to_vec()
        } else {
            vec![self.source]
        };
        let mut sources = SourcePopulation::new(config.complexity_penalty);
        for body in &bodies {
            sources.push(*body, self.vardecl);
        }

        let focus = if self.focus.is_empty() {
            None
        } else {
            let focus = FocusSet::new(Arc::clone(&self.kb));
            for id in self.focus.iter().chain(&bodies).chain(&self.vardecl) {
                focus.include(*id).map_err(|e| ChainerError::InvalidSource {
                    message: format!("focus set: {e}"),
                })?;
            }
            Some(Arc::new(focus))
        };

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(ForwardChainer {
            kb: self.kb,
            focus,
            selector: RuleSelector::new(config.thompson_samples),
            config,
            rule_base: self.rule_base.name,
            catalog: Mutex::new(RuleCatalog::new(self.rule_base.rules)),
            sources: Mutex::new(sources),
            rng: Mutex::new(rng),
            trace: InferenceTrace::new(self.sink),
            iteration: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }
}

/// The forward-chaining engine for one run.
///
/// All state lives behind its own lock or atomic, so concurrent workers
/// share the chainer by reference. No two of the `sources`, `catalog`, and
/// `rng` locks are held across a rule execution.
pub struct ForwardChainer {
    kb: Arc<dyn KnowledgeBase>,
    focus: Option<Arc<FocusSet>>,
    config: ChainerConfig,
    rule_base: String,
    catalog: Mutex<RuleCatalog>,
    sources: Mutex<SourcePopulation>,
    selector: RuleSelector,
    rng: Mutex<StdRng>,
    trace: InferenceTrace,
    iteration: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ForwardChainer {
    /// Start building a chainer over `kb`, starting from `source`.
    pub fn builder(
        kb: Arc<dyn KnowledgeBase>,
        rule_base: RuleBase,
        source: FactId,
    ) -> ForwardChainerBuilder {
        ForwardChainerBuilder {
            kb,
            rule_base,
            source,
            vardecl: None,
            sink: None,
            focus: Vec::new(),
        }
    }

    pub fn config(&self) -> &ChainerConfig {
        &self.config
    }

    pub fn knowledge_base(&self) -> &Arc<dyn KnowledgeBase> {
        &self.kb
    }

    /// The facts premises are matched against: the focus set if there is
    /// one, otherwise the whole knowledge base.
    fn context(&self) -> &dyn KnowledgeBase {
        match &self.focus {
            Some(focus) => focus.as_ref(),
            None => self.kb.as_ref(),
        }
    }

    /// Run to termination.
    ///
    /// Returns why the run stopped, or `None` if there were no sources and
    /// every rule was applied once instead.
    pub fn run(&self) -> Option<TerminationReason> {
        let source_count = self.sources.lock().expect("sources lock poisoned").len();
        info!(
            rule_base = %self.rule_base,
            sources = source_count,
            jobs = self.config.jobs,
            max_iterations = %self.config.maximum_iterations_str(),
            "start forward chaining"
        );

        if source_count == 0 {
            self.apply_all_rules();
            info!(records = self.trace.len(), "applied all rules to an empty source set");
            return None;
        }

        Scheduler::for_jobs(self.config.jobs).drive(self);

        let reason = self.termination_reason();
        if let Some(reason) = reason {
            info!(
                %reason,
                iterations = self.iteration(),
                records = self.trace.len(),
                results = self.results_set().len(),
                "terminate"
            );
        }
        reason
    }

    /// Run one step, unless the run is over.
    pub fn step(&self) -> Option<StepOutcome> {
        if self.check_termination().is_some() {
            return None;
        }
        let iteration = self.claim_iteration()?;
        Some(self.do_step(iteration))
    }

    /// Run the step numbered `iteration`.
    pub fn do_step(&self, iteration: u64) -> StepOutcome {
        let lipo = iteration + 1;
        debug!(
            iteration = lipo,
            max = %self.config.maximum_iterations_str(),
            "start iteration"
        );

        self.expand_meta_rules();

        let Some(source) = self.select_source() else {
            debug!(iteration = lipo, "no source selected, abort iteration");
            return StepOutcome::NoSource;
        };
        debug!(iteration = lipo, source = %source.body, "selected source");

        let Some((rule, prob)) = self.select_rule(&source) else {
            debug!(iteration = lipo, source = %source.body, "no valid rule, source exhausted");
            return StepOutcome::NoRule;
        };
        debug!(iteration = lipo, rule = %rule.name, prob, "selected rule");

        let claimed = self
            .sources
            .lock()
            .expect("sources lock poisoned")
            .mark_rule_tried(source.id, &rule);
        if !claimed {
            debug!(
                iteration = lipo,
                rule = %rule.name,
                source = %source.body,
                "rule is being applied to this source by another worker, abort iteration"
            );
            return StepOutcome::Contended;
        }

        let products = self.apply_rule(&rule);
        let added = self
            .sources
            .lock()
            .expect("sources lock poisoned")
            .insert(&products, source.id, prob);
        debug!(
            iteration = lipo,
            products = products.len(),
            new_sources = added,
            "applied rule"
        );

        self.trace.add_record(InferenceRecord {
            iteration,
            source: source.body,
            rule,
            products: products.clone(),
        });
        StepOutcome::Applied { products }
    }

    fn expand_meta_rules(&self) {
        self.catalog
            .lock()
            .expect("catalog lock poisoned")
            .expand_meta_rules(self.kb.as_ref());
    }

    /// Draw a source in proportion to its weight.
    ///
    /// When every weight is zero and retrying is enabled, exhaustion is reset
    /// (if the population allows another retry) and the draw repeated. If the
    /// weights are still all zero the population is marked exhausted.
    fn select_source(&self) -> Option<SourceSnapshot> {
        let mut sources = self.sources.lock().expect("sources lock poisoned");

        let mut weights = sources.weights();
        trace!(
            positive = weights.iter().filter(|w| **w > 0.0).count(),
            total = weights.len(),
            "positively weighted sources"
        );

        if weights.iter().sum::<f64>() <= 0.0
            && self.config.retry_exhausted_sources
            && !sources.is_marked_exhausted()
            && sources.retry_exhausted()
        {
            debug!("all sources have been exhausted, reset exhausted flags to retry them");
            weights = sources.weights();
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            debug!("all sources have been exhausted");
            sources.set_exhausted();
            return None;
        }

        let dist = WeightedIndex::new(&weights).ok()?;
        let index = dist.sample(&mut *self.rng.lock().expect("rng lock poisoned"));
        sources.snapshot(SourceId(index))
    }

    /// Pick a rule for `source`, marking the source exhausted if none is valid.
    fn select_rule(&self, source: &SourceSnapshot) -> Option<(Rule, f64)> {
        let valid = self.valid_rules(source.body, source.vardecl, &source.tried);
        if valid.is_empty() {
            self.sources
                .lock()
                .expect("sources lock poisoned")
                .set_source_exhausted(source.id);
            return None;
        }
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        self.selector.select(valid, &mut *rng)
    }

    fn valid_rules(&self, body: FactId, vardecl: Option<FactId>, tried: &HashSet<Rule>) -> Vec<Rule> {
        self.catalog.lock().expect("catalog lock poisoned").valid_rules(
            body,
            vardecl,
            tried,
            self.context(),
            self.config.full_rule_application,
        )
    }

    /// Select a rule for an arbitrary fact without touching the population.
    pub fn select_rule_for(&self, fact: FactId) -> Option<(Rule, f64)> {
        let valid = self.valid_rules(fact, None, &HashSet::new());
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        self.selector.select(valid, &mut *rng)
    }

    /// Apply `rule` and return the facts it produced.
    ///
    /// Constant premises must already be present in the matching context.
    /// Produced `Set`/`List` containers are unpacked one level. Execution
    /// failures are logged and yield nothing.
    pub fn apply_rule(&self, rule: &Rule) -> BTreeSet<FactId> {
        let context = self.context();
        if let Some(missing) = rule.constant_clauses().find(|c| c.resolve(context).is_none()) {
            debug!(rule = %rule.name, clause = %missing, "constant clause not in knowledge base");
            return BTreeSet::new();
        }

        match self.kb.execute(rule, context) {
            Ok(result) => self.unpack(result),
            Err(e) => {
                warn!(rule = %rule.name, error = %e, "rule execution failed");
                BTreeSet::new()
            }
        }
    }

    fn unpack(&self, result: FactId) -> BTreeSet<FactId> {
        let members = match self.kb.atom(result) {
            Some(atom) if atom.is_container() => atom.outgoing().to_vec(),
            _ => return BTreeSet::from([result]),
        };

        let mut products = BTreeSet::new();
        for member in members {
            match self.kb.atom(member) {
                Some(atom) if atom.is_container() => products.extend(atom.outgoing()),
                _ => {
                    products.insert(member);
                }
            }
        }
        products
    }

    /// Apply every rule once, filing the records under a synthetic source.
    pub fn apply_all_rules(&self) {
        self.expand_meta_rules();
        let rules: Vec<Rule> = self
            .catalog
            .lock()
            .expect("catalog lock poisoned")
            .iter()
            .filter(|r| !r.is_meta())
            .cloned()
            .collect();

        let dummy = match self.kb.add(Atom::node(CONCEPT, DUMMY_SOURCE)) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "could not add the dummy source");
                return;
            }
        };

        let iteration = self.iteration();
        for rule in rules {
            debug!(rule = %rule.name, "apply rule");
            let products = self.apply_rule(&rule);
            self.trace.add_record(InferenceRecord {
                iteration,
                source: dummy,
                rule,
                products,
            });
        }
    }

    /// Every fact produced so far, as a `Set` in the knowledge base.
    pub fn results(&self) -> KbResult<FactId> {
        let results: Vec<FactId> = self.results_set().into_iter().collect();
        self.kb.add(Atom::link(SET, results))
    }

    pub fn results_set(&self) -> BTreeSet<FactId> {
        self.trace.all_products()
    }

    /// All inference records, in iteration order.
    pub fn trace(&self) -> Vec<InferenceRecord> {
        self.trace.records()
    }

    /// Number of iterations claimed so far.
    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::SeqCst)
    }

    /// Largest number of concurrently running steps observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn rule_count(&self) -> usize {
        self.catalog.lock().expect("catalog lock poisoned").len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().expect("sources lock poisoned").len()
    }

    /// Whether the run is over, and why. Has no side effects.
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        let sources = self.sources.lock().expect("sources lock poisoned");
        let exhausted = if self.config.retry_exhausted_sources {
            sources.is_marked_exhausted()
        } else {
            sources.is_exhausted()
        };
        if exhausted {
            return Some(TerminationReason::SourcesExhausted);
        }
        drop(sources);
        self.max_iterations_reached()
            .then_some(TerminationReason::MaxIterations)
    }

    fn max_iterations_reached(&self) -> bool {
        self.config
            .max_iterations()
            .is_some_and(|max| self.iteration() >= max)
    }

    /// The termination check run before every step. With retrying enabled,
    /// a population whose sources are all spent is reset here instead of
    /// ending the run, as long as the last reset led to new sources.
    pub(crate) fn check_termination(&self) -> Option<TerminationReason> {
        {
            let mut sources = self.sources.lock().expect("sources lock poisoned");
            if sources.is_exhausted() {
                let retried = self.config.retry_exhausted_sources
                    && !sources.is_marked_exhausted()
                    && sources.retry_exhausted();
                if !retried {
                    return Some(TerminationReason::SourcesExhausted);
                }
                debug!("all sources have been exhausted, reset exhausted flags to retry them");
            }
        }
        self.max_iterations_reached()
            .then_some(TerminationReason::MaxIterations)
    }

    /// Claim the next iteration number, unless the bound has been reached.
    fn claim_iteration(&self) -> Option<u64> {
        let max = self.config.max_iterations();
        self.iteration
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| match max {
                Some(max) if current >= max => None,
                _ => Some(current + 1),
            })
            .ok()
    }

    pub(crate) fn next_token(&self) -> Token {
        if self.check_termination().is_some() {
            return Token::Terminate;
        }
        match self.claim_iteration() {
            Some(iteration) => Token::Iteration(iteration),
            None => Token::Terminate,
        }
    }

    pub(crate) fn enter_worker(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn leave_worker(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ForwardChainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardChainer")
            .field("rule_base", &self.rule_base)
            .field("config", &self.config)
            .field("iteration", &self.iteration())
            .field("focus", &self.focus.is_some())
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}
