//! Knowledge-base abstraction the chainer runs against.
//!
//! The chainer only needs a handful of capabilities: intern facts, look them
//! up, enumerate them, and execute a rule. [`MemoryKb`] is the concurrent
//! in-memory implementation; [`FocusSet`] restricts rule matching to a
//! subset of another knowledge base.

mod focus;
mod mem;

pub use focus::FocusSet;
pub use mem::MemoryKb;

use crate::error::{KbError, KbResult, RuleResult};
use crate::fact::{Atom, FactId, VARIABLE};
use crate::rule::{Rule, Term};
use crate::sexpr::parse_terms;

/// A store of interned facts.
///
/// Implementations must be safe to share between chainer workers: every
/// method takes `&self`, and `add` is idempotent (adding an atom that is
/// already present returns the existing id).
pub trait KnowledgeBase: Send + Sync {
    /// Intern `atom`, returning its id.
    fn add(&self, atom: Atom) -> KbResult<FactId>;

    /// Find the id of an atom without adding it.
    fn lookup(&self, atom: &Atom) -> Option<FactId>;

    /// The atom stored under `id`.
    fn atom(&self, id: FactId) -> Option<Atom>;

    fn contains(&self, id: FactId) -> bool {
        self.atom(id).is_some()
    }

    /// All fact ids, in ascending order.
    fn facts(&self) -> Vec<FactId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `rule` with `context` as the set of facts premises may match,
    /// adding produced facts to `self`. Returns a `Set` of the products.
    fn execute(&self, rule: &Rule, context: &dyn KnowledgeBase) -> KbResult<FactId>;
}

/// Rebuild the term a fact denotes. Unknown ids stay as `#id`.
pub fn to_term(kb: &dyn KnowledgeBase, id: FactId) -> Term {
    match kb.atom(id) {
        Some(Atom::Node { kind, name }) => Term::Node { kind, name },
        Some(Atom::Link { kind, outgoing }) => Term::Link {
            kind,
            terms: outgoing.into_iter().map(|child| to_term(kb, child)).collect(),
        },
        None => Term::Ground(id),
    }
}

/// Render a fact in term syntax, e.g. `(Done Concept:F0)`.
pub fn render(kb: &dyn KnowledgeBase, id: FactId) -> String {
    to_term(kb, id).to_string()
}

/// Add the fact a term denotes. Variables become `Variable` nodes, so a
/// pattern can be stored as an open source.
pub fn add_term(kb: &dyn KnowledgeBase, term: &Term) -> KbResult<FactId> {
    match term {
        Term::Var { name, .. } => kb.add(Atom::node(VARIABLE, format!("${name}"))),
        Term::Ground(id) => {
            if kb.contains(*id) {
                Ok(*id)
            } else {
                Err(KbError::UnknownFact { fact_id: id.get() })
            }
        }
        Term::Node { kind, name } => kb.add(Atom::node(kind.clone(), name.clone())),
        Term::Link { kind, terms } => {
            let outgoing = terms
                .iter()
                .map(|t| add_term(kb, t))
                .collect::<KbResult<Vec<_>>>()?;
            kb.add(Atom::link(kind.clone(), outgoing))
        }
    }
}

/// Parse and add every term in `text`, returning the ids in order.
pub fn load_facts(kb: &dyn KnowledgeBase, text: &str) -> RuleResult<Vec<FactId>> {
    let mut ids = Vec::new();
    for term in parse_terms(text)? {
        ids.push(add_term(kb, &term)?);
    }
    Ok(ids)
}
