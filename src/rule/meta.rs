//! Meta-rule expansion.
//!
//! A meta-rule's premises are matched against the knowledge base like any
//! other rule, but each match instantiates the rule *template* instead of a
//! fact. Expanded rules are named after the template and the bindings, e.g.
//! `transitive[part-of]`.

use crate::fact::Atom;
use crate::kb::KnowledgeBase;

use super::unify::match_premises;
use super::{Rule, Substitution};

/// Expand a meta-rule into the concrete rules its current matches describe.
///
/// Returns an empty vector for ordinary rules. Expansions that still carry a
/// meta production (nested meta-rules) are returned as-is and expanded on a
/// later pass.
pub fn expand_meta(rule: &Rule, kb: &dyn KnowledgeBase) -> Vec<Rule> {
    let Some(template) = rule.template() else {
        return Vec::new();
    };

    let mut expanded: Vec<Rule> = Vec::new();
    for bindings in match_premises(&rule.premises, kb) {
        let name = format!("{}[{}]", template.name, binding_labels(&bindings, kb));
        let instance = template.substitute(&bindings).renamed(name);
        if !expanded.contains(&instance) {
            expanded.push(instance);
        }
    }
    expanded
}

fn binding_labels(bindings: &Substitution, kb: &dyn KnowledgeBase) -> String {
    bindings
        .values()
        .map(|id| match kb.atom(*id) {
            Some(Atom::Node { name, .. }) => name,
            _ => id.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::CONCEPT;
    use crate::kb::MemoryKb;
    use crate::rule::Term;

    fn transitivity_template() -> Rule {
        Rule::new(
            "transitive",
            vec![
                Term::link("Relation", vec![Term::var("R"), Term::var("A"), Term::var("B")]),
                Term::link("Relation", vec![Term::var("R"), Term::var("B"), Term::var("C")]),
            ],
            Term::link("Relation", vec![Term::var("R"), Term::var("A"), Term::var("C")]),
        )
    }

    fn meta() -> Rule {
        Rule::meta(
            "transitive-relations",
            vec![Term::link("Transitive", vec![Term::var("R")])],
            transitivity_template(),
        )
    }

    #[test]
    fn expands_once_per_match() {
        let kb = MemoryKb::new();
        for relation in ["part-of", "ancestor-of"] {
            Term::link("Transitive", vec![Term::node(CONCEPT, relation)])
                .instantiate(&Substitution::new(), &kb)
                .unwrap();
        }

        let mut names: Vec<String> = expand_meta(&meta(), &kb)
            .into_iter()
            .map(|r| r.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["transitive[ancestor-of]", "transitive[part-of]"]);
    }

    #[test]
    fn expanded_rules_are_grounded_in_bound_variables() {
        let kb = MemoryKb::new();
        Term::link("Transitive", vec![Term::node(CONCEPT, "part-of")])
            .instantiate(&Substitution::new(), &kb)
            .unwrap();

        let expanded = expand_meta(&meta(), &kb);
        assert_eq!(expanded.len(), 1);
        let vars = expanded[0].variables();
        assert!(!vars.contains("R"));
        assert!(vars.contains("A") && vars.contains("C"));
        assert!(!expanded[0].is_meta());
    }

    #[test]
    fn no_matches_no_expansions() {
        let kb = MemoryKb::new();
        assert!(expand_meta(&meta(), &kb).is_empty());
        assert!(expand_meta(&transitivity_template(), &kb).is_empty());
    }
}
