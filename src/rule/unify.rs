//! Pattern matching of rule premises against facts.
//!
//! Two entry points: [`Rule::unify_source`] specializes a rule against one
//! source fact, and [`execute`] runs a rule over a whole knowledge base by
//! joining its premises and instantiating the conclusion once per match.

use std::collections::HashSet;

use crate::error::{KbError, KbResult};
use crate::fact::{Atom, FactId, SET};
use crate::kb::KnowledgeBase;

use super::{Rule, Substitution, Term};

impl Rule {
    /// Unify every premise of this rule against `body`.
    ///
    /// Each premise that matches yields one specialization: the rule with
    /// the premise's bindings substituted everywhere. Facts listed in
    /// `vardecl` are open variables of the source and match any sub-pattern.
    /// Meta-rules never unify.
    pub fn unify_source(
        &self,
        body: FactId,
        vardecl: Option<FactId>,
        context: &dyn KnowledgeBase,
    ) -> Vec<(Rule, Substitution)> {
        if self.is_meta() {
            return Vec::new();
        }

        let open = open_variables(vardecl, context);
        let mut unified: Vec<(Rule, Substitution)> = Vec::new();
        for premise in &self.premises {
            let mut bindings = Substitution::new();
            if !match_term(premise, body, context, &mut bindings, &open) {
                continue;
            }
            let specialized = self.substitute(&bindings);
            if !unified.iter().any(|(r, _)| *r == specialized) {
                unified.push((specialized, bindings));
            }
        }
        unified
    }
}

/// The open variables a variable declaration names.
///
/// A declaration is either a single `Variable` node or a link listing them.
pub fn open_variables(vardecl: Option<FactId>, kb: &dyn KnowledgeBase) -> HashSet<FactId> {
    let Some(decl) = vardecl else {
        return HashSet::new();
    };
    match kb.atom(decl) {
        Some(atom) if atom.is_variable() => HashSet::from([decl]),
        Some(atom) => atom
            .outgoing()
            .iter()
            .copied()
            .filter(|id| kb.atom(*id).is_some_and(|a| a.is_variable()))
            .collect(),
        None => HashSet::new(),
    }
}

/// Try to match `term` against the fact `fact`, extending `bindings`.
///
/// On failure `bindings` may hold partial bindings; callers match against a
/// clone and discard it.
pub fn match_term(
    term: &Term,
    fact: FactId,
    kb: &dyn KnowledgeBase,
    bindings: &mut Substitution,
    open: &HashSet<FactId>,
) -> bool {
    if open.contains(&fact) {
        return true;
    }
    match term {
        Term::Var { name, kind } => {
            if let Some(&bound) = bindings.get(name) {
                return bound == fact;
            }
            if let Some(kind) = kind {
                match kb.atom(fact) {
                    Some(atom) if atom.kind() == kind => {}
                    _ => return false,
                }
            }
            bindings.insert(name.clone(), fact);
            true
        }
        Term::Ground(id) => *id == fact,
        Term::Node { kind, name } => matches!(
            kb.atom(fact),
            Some(Atom::Node { kind: k, name: n }) if k == *kind && n == *name
        ),
        Term::Link { kind, terms } => match kb.atom(fact) {
            Some(Atom::Link { kind: k, outgoing }) if k == *kind && outgoing.len() == terms.len() => {
                terms
                    .iter()
                    .zip(outgoing)
                    .all(|(t, child)| match_term(t, child, kb, bindings, open))
            }
            _ => false,
        },
    }
}

/// Match all premises conjunctively against the knowledge base.
///
/// Returns one substitution per way of satisfying every premise. An empty
/// premise list is satisfied once, with no bindings.
pub fn match_premises(premises: &[Term], kb: &dyn KnowledgeBase) -> Vec<Substitution> {
    let mut results = vec![Substitution::new()];
    let mut facts: Option<Vec<FactId>> = None;
    let closed = HashSet::new();

    for premise in premises {
        let mut extended = Vec::new();
        for bindings in &results {
            let pattern = premise.substitute(bindings);

            // Fast path: a ground pattern is a single lookup.
            if pattern.is_constant() {
                if pattern.resolve(kb).is_some() {
                    extended.push(bindings.clone());
                }
                continue;
            }

            let candidates = facts.get_or_insert_with(|| kb.facts());
            for &fact in candidates.iter() {
                let mut attempt = bindings.clone();
                if match_term(&pattern, fact, kb, &mut attempt, &closed) {
                    extended.push(attempt);
                }
            }
        }
        results = extended;

        if results.is_empty() {
            break;
        }
    }

    results
}

/// Run `rule` over `context`, adding every produced fact to `target`.
///
/// Returns a `Set` link (in `target`) holding the produced facts.
pub fn execute(
    rule: &Rule,
    target: &dyn KnowledgeBase,
    context: &dyn KnowledgeBase,
) -> KbResult<FactId> {
    let Some(conclusion) = rule.conclusion() else {
        return Err(KbError::Execution {
            rule_name: rule.name.clone(),
            message: "meta-rules are expanded, not executed".into(),
        });
    };

    let mut produced = Vec::new();
    for bindings in match_premises(&rule.premises, context) {
        let fact = conclusion
            .instantiate(&bindings, target)
            .map_err(|e| KbError::Execution {
                rule_name: rule.name.clone(),
                message: e.to_string(),
            })?;
        produced.push(fact);
    }

    target.add(Atom::link(SET, produced))
}
