//! Data-driven inference rules.
//!
//! Rules are structs, not code: premises and conclusions are [`Term`] patterns
//! over knowledge-base facts. They can be loaded from JSON or from the `@rule`
//! text format ([`parse`]), or constructed programmatically. A meta-rule
//! produces new concrete rules instead of facts ([`meta`]).

pub mod meta;
pub mod parse;
pub mod truth;
pub mod unify;

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{KbError, KbResult};
use crate::fact::{Atom, FactId};
use crate::kb::KnowledgeBase;

pub use truth::{BetaDistribution, ThompsonSampling, TruthValue};

/// Variable bindings produced by unification, keyed by variable name.
pub type Substitution = BTreeMap<String, FactId>;

// ---------------------------------------------------------------------------
// Term
// ---------------------------------------------------------------------------

/// A pattern over facts: variable, node, already-resolved fact, or link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// A variable (`$X`), optionally restricted to atoms of one kind (`$X:Concept`).
    Var { name: String, kind: Option<String> },
    /// A node (`Concept:cat`).
    Node { kind: String, name: String },
    /// A fact that unification has already pinned down.
    Ground(FactId),
    /// A link (`(Inheritance $X Concept:animal)`).
    Link { kind: String, terms: Vec<Term> },
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var {
            name: name.into(),
            kind: None,
        }
    }

    pub fn typed_var(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::Var {
            name: name.into(),
            kind: Some(kind.into()),
        }
    }

    pub fn node(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Node {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn link(kind: impl Into<String>, terms: Vec<Term>) -> Self {
        Self::Link {
            kind: kind.into(),
            terms,
        }
    }

    /// Returns `true` if no variable occurs anywhere in this term.
    pub fn is_constant(&self) -> bool {
        match self {
            Self::Var { .. } => false,
            Self::Node { .. } | Self::Ground(_) => true,
            Self::Link { terms, .. } => terms.iter().all(Term::is_constant),
        }
    }

    /// Collect the names of all variables occurring in this term.
    pub fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Var { name, .. } => {
                out.insert(name.clone());
            }
            Self::Node { .. } | Self::Ground(_) => {}
            Self::Link { terms, .. } => {
                for term in terms {
                    term.collect_variables(out);
                }
            }
        }
    }

    /// Replace every bound variable with the fact it is bound to.
    pub fn substitute(&self, bindings: &Substitution) -> Term {
        match self {
            Self::Var { name, .. } => match bindings.get(name) {
                Some(&fact) => Self::Ground(fact),
                None => self.clone(),
            },
            Self::Node { .. } | Self::Ground(_) => self.clone(),
            Self::Link { kind, terms } => Self::Link {
                kind: kind.clone(),
                terms: terms.iter().map(|t| t.substitute(bindings)).collect(),
            },
        }
    }

    /// Find the fact a constant term denotes, without adding anything.
    ///
    /// Returns `None` for terms containing variables and for facts the
    /// knowledge base does not hold.
    pub fn resolve(&self, kb: &dyn KnowledgeBase) -> Option<FactId> {
        match self {
            Self::Var { .. } => None,
            Self::Ground(id) => kb.contains(*id).then_some(*id),
            Self::Node { kind, name } => kb.lookup(&Atom::node(kind.clone(), name.clone())),
            Self::Link { kind, terms } => {
                let outgoing = terms
                    .iter()
                    .map(|t| t.resolve(kb))
                    .collect::<Option<Vec<_>>>()?;
                kb.lookup(&Atom::link(kind.clone(), outgoing))
            }
        }
    }

    /// Build the fact this term denotes under `bindings`, adding it (and any
    /// missing sub-facts) to the knowledge base.
    pub fn instantiate(&self, bindings: &Substitution, kb: &dyn KnowledgeBase) -> KbResult<FactId> {
        match self {
            Self::Var { name, .. } => {
                bindings
                    .get(name)
                    .copied()
                    .ok_or_else(|| KbError::MalformedAtom {
                        message: format!("variable ${name} is unbound"),
                    })
            }
            Self::Ground(id) => {
                if kb.contains(*id) {
                    Ok(*id)
                } else {
                    Err(KbError::UnknownFact { fact_id: id.get() })
                }
            }
            Self::Node { kind, name } => kb.add(Atom::node(kind.clone(), name.clone())),
            Self::Link { kind, terms } => {
                let outgoing = terms
                    .iter()
                    .map(|t| t.instantiate(bindings, kb))
                    .collect::<KbResult<Vec<_>>>()?;
                kb.add(Atom::link(kind.clone(), outgoing))
            }
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Var { name, kind: None } => write!(f, "${name}"),
            Self::Var {
                name,
                kind: Some(kind),
            } => write!(f, "${name}:{kind}"),
            Self::Node { kind, name } => {
                if needs_quotes(name) {
                    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "{kind}:\"{escaped}\"")
                } else {
                    write!(f, "{kind}:{name}")
                }
            }
            Self::Ground(id) => write!(f, "{id}"),
            Self::Link { kind, terms } => {
                write!(f, "({kind}")?;
                for term in terms {
                    write!(f, " {term}")?;
                }
                write!(f, ")")
            }
        }
    }
}

pub(crate) fn needs_quotes(name: &str) -> bool {
    name.chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | ',' | ';' | '"' | '\\'))
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// What applying a rule yields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Production {
    /// A fact pattern, instantiated once per match of the premises.
    Fact(Term),
    /// A rule template, instantiated once per match (meta-rules only).
    Rule(Box<Rule>),
}

fn default_cost() -> f64 {
    1.0
}

/// A single inference rule: match premises, produce a conclusion.
///
/// Equality and hashing only look at the name, the premises, and the
/// production. A specialization therefore differs from its template, which
/// is what exhaustion tracking relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default = "default_cost")]
    pub cost: f64,
    #[serde(default)]
    pub tv: TruthValue,
    pub premises: Vec<Term>,
    pub production: Production,
}

impl Rule {
    /// Create a fact-producing rule with default cost and truth value.
    pub fn new(name: impl Into<String>, premises: Vec<Term>, conclusion: Term) -> Self {
        Self {
            name: name.into(),
            cost: default_cost(),
            tv: TruthValue::default(),
            premises,
            production: Production::Fact(conclusion),
        }
    }

    /// Create a meta-rule whose matches instantiate `template`.
    pub fn meta(name: impl Into<String>, premises: Vec<Term>, template: Rule) -> Self {
        Self {
            name: name.into(),
            cost: default_cost(),
            tv: TruthValue::default(),
            premises,
            production: Production::Rule(Box::new(template)),
        }
    }

    /// Set the truth value.
    pub fn with_tv(mut self, tv: TruthValue) -> Self {
        self.tv = tv;
        self
    }

    /// Set the cost.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Rename the rule, keeping everything else.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_meta(&self) -> bool {
        matches!(self.production, Production::Rule(_))
    }

    pub fn truth_value(&self) -> TruthValue {
        self.tv
    }

    /// The fact pattern this rule produces, if it is not a meta-rule.
    pub fn conclusion(&self) -> Option<&Term> {
        match &self.production {
            Production::Fact(term) => Some(term),
            Production::Rule(_) => None,
        }
    }

    /// The rule template of a meta-rule.
    pub fn template(&self) -> Option<&Rule> {
        match &self.production {
            Production::Fact(_) => None,
            Production::Rule(template) => Some(template),
        }
    }

    /// Premises without variables. These must already exist in the
    /// knowledge base before the rule may be applied.
    pub fn constant_clauses(&self) -> impl Iterator<Item = &Term> {
        self.premises.iter().filter(|p| p.is_constant())
    }

    /// All variables occurring in the premises and the conclusion.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        for premise in &self.premises {
            premise.collect_variables(&mut vars);
        }
        if let Some(conclusion) = self.conclusion() {
            conclusion.collect_variables(&mut vars);
        }
        vars
    }

    /// Apply `bindings` to every pattern, including a meta-rule's template.
    pub fn substitute(&self, bindings: &Substitution) -> Rule {
        let production = match &self.production {
            Production::Fact(term) => Production::Fact(term.substitute(bindings)),
            Production::Rule(template) => Production::Rule(Box::new(template.substitute(bindings))),
        };
        Rule {
            name: self.name.clone(),
            cost: self.cost,
            tv: self.tv,
            premises: self.premises.iter().map(|p| p.substitute(bindings)).collect(),
            production,
        }
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.premises == other.premises
            && self.production == other.production
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.premises.hash(state);
        self.production.hash(state);
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.name)?;
        for (i, premise) in self.premises.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{premise}")?;
        }
        match &self.production {
            Production::Fact(term) => write!(f, " => {term}"),
            Production::Rule(template) => write!(f, " => [{template}]"),
        }
    }
}
