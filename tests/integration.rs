//! End-to-end tests for the forward chainer.
//!
//! These run whole chains over small knowledge bases and check the derived
//! facts, the inference trace, and how and when runs terminate.

use std::collections::BTreeSet;
use std::sync::Arc;

use akh_chainer::chainer::{
    ChainerConfig, ForwardChainer, JsonLinesSink, MemorySink, RuleBase, StepOutcome,
    TerminationReason, TraceSink,
};
use akh_chainer::fact::FactId;
use akh_chainer::kb::{add_term, load_facts, render, KnowledgeBase, MemoryKb};
use akh_chainer::rule::parse::parse_rules;
use akh_chainer::sexpr::parse_term;

const TAG: &str = "@rule tag\n  match: $X:Concept\n  produce: (Done $X)\n";

const DEDUCTION: &str = "\
@rule deduction
  match: (Inheritance $A $B), (Inheritance $B $C)
  produce: (Inheritance $A $C)
";

const TAXONOMY: &str = "\
(Inheritance Concept:cat Concept:mammal)
(Inheritance Concept:mammal Concept:animal)
(Inheritance Concept:animal Concept:being)
";

fn seeded(max: i64) -> ChainerConfig {
    ChainerConfig {
        maximum_iterations: max,
        seed: Some(42),
        ..Default::default()
    }
}

fn fact(kb: &MemoryKb, text: &str) -> FactId {
    add_term(kb, &parse_term(text).unwrap()).unwrap()
}

fn chainer(kb: &Arc<MemoryKb>, source: &str, rules: &str, config: ChainerConfig) -> ForwardChainer {
    let source = fact(kb, source);
    let rule_base = RuleBase::new("test", parse_rules(rules).unwrap(), config);
    ForwardChainer::builder(kb.clone(), rule_base, source)
        .build()
        .unwrap()
}

fn rendered(kb: &MemoryKb, facts: &BTreeSet<FactId>) -> BTreeSet<String> {
    facts.iter().map(|id| render(kb, *id)).collect()
}

#[test]
fn single_rule_derives_once_and_exhausts() {
    let kb = Arc::new(MemoryKb::new());
    let chainer = chainer(&kb, "Concept:F0", TAG, seeded(100));

    assert_eq!(chainer.run(), Some(TerminationReason::SourcesExhausted));

    let trace = chainer.trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].rule.name, "tag");
    assert_eq!(render(kb.as_ref(), trace[0].source), "Concept:F0");
    assert_eq!(
        rendered(&kb, &chainer.results_set()),
        BTreeSet::from(["(Done Concept:F0)".to_string()])
    );
    // F0 and (Done F0) each exhausted in one step, plus the application.
    assert_eq!(chainer.iteration(), 3);
}

#[test]
fn no_rules_stops_after_one_iteration() {
    let kb = Arc::new(MemoryKb::new());
    let chainer = chainer(&kb, "Concept:F0", "", seeded(100));

    assert_eq!(chainer.run(), Some(TerminationReason::SourcesExhausted));
    assert_eq!(chainer.iteration(), 1);
    assert!(chainer.results_set().is_empty());
    assert!(chainer.trace().is_empty());
}

#[test]
fn retrying_a_barren_population_stops_after_one_reset() {
    let kb = Arc::new(MemoryKb::new());
    let never = "@rule never\n  match: (Never $X)\n  produce: (Done $X)\n";
    let config = ChainerConfig {
        retry_exhausted_sources: true,
        ..seeded(5)
    };
    let chainer = chainer(&kb, "Concept:F0", never, config);

    assert_eq!(chainer.run(), Some(TerminationReason::SourcesExhausted));
    // One exhausting step, one reset, one more exhausting step.
    assert_eq!(chainer.iteration(), 2);
    assert!(chainer.trace().is_empty());
}

#[test]
fn unbounded_retry_terminates_when_nothing_unifies() {
    let kb = Arc::new(MemoryKb::new());
    let never = "@rule never\n  match: (Never $X)\n  produce: (Done $X)\n";
    let config = ChainerConfig {
        retry_exhausted_sources: true,
        ..seeded(-1)
    };
    let chainer = chainer(&kb, "Concept:F0", never, config);

    assert_eq!(chainer.run(), Some(TerminationReason::SourcesExhausted));
    assert_eq!(chainer.iteration(), 2);
    assert!(chainer.step().is_none());
}

#[test]
fn retry_reapplies_rules_until_no_new_sources_appear() {
    let kb = Arc::new(MemoryKb::new());
    let config = ChainerConfig {
        retry_exhausted_sources: true,
        ..seeded(-1)
    };
    let chainer = chainer(&kb, "Concept:F0", TAG, config);

    assert_eq!(chainer.run(), Some(TerminationReason::SourcesExhausted));
    // The first round adds (Done F0), so exhaustion is reset once and the
    // rule applied again. The second round adds nothing and ends the run.
    let trace = chainer.trace();
    assert_eq!(trace.len(), 2);
    assert!(trace.iter().all(|record| record.rule.name == "tag"));
    assert_eq!(chainer.iteration(), 6);
    assert_eq!(chainer.source_count(), 2);
}

#[test]
fn iteration_bound_is_respected() {
    let kb = Arc::new(MemoryKb::new());
    load_facts(kb.as_ref(), TAXONOMY).unwrap();
    let chainer = chainer(&kb, "(Inheritance Concept:cat Concept:mammal)", DEDUCTION, seeded(1));

    assert_eq!(chainer.run(), Some(TerminationReason::MaxIterations));
    assert_eq!(chainer.iteration(), 1);
    assert!(chainer.trace().len() <= 1);
    assert!(chainer.step().is_none());
}

#[test]
fn deduction_reaches_the_transitive_closure() {
    let kb = Arc::new(MemoryKb::new());
    load_facts(kb.as_ref(), TAXONOMY).unwrap();
    let chainer = chainer(&kb, "(Inheritance Concept:cat Concept:mammal)", DEDUCTION, seeded(100));

    assert_eq!(chainer.run(), Some(TerminationReason::SourcesExhausted));

    let results = rendered(&kb, &chainer.results_set());
    assert!(results.contains("(Inheritance Concept:cat Concept:animal)"), "{results:?}");
    assert!(results.contains("(Inheritance Concept:cat Concept:being)"), "{results:?}");
    // Only chains starting at cat are explored.
    assert!(!results.contains("(Inheritance Concept:mammal Concept:being)"));
}

#[test]
fn seeded_runs_are_reproducible() {
    let run = || {
        let kb = Arc::new(MemoryKb::new());
        load_facts(kb.as_ref(), TAXONOMY).unwrap();
        load_facts(kb.as_ref(), "(Inheritance Concept:dog Concept:mammal)").unwrap();
        let rules = format!("{DEDUCTION}\n{TAG}");
        let chainer = chainer(&kb, "(Inheritance Concept:cat Concept:mammal)", &rules, seeded(50));
        chainer.run();
        chainer
            .trace()
            .into_iter()
            .map(|r| {
                format!(
                    "{} {} {} {:?}",
                    r.iteration,
                    render(kb.as_ref(), r.source),
                    r.rule.name,
                    rendered(&kb, &r.products)
                )
            })
            .collect::<Vec<_>>()
    };

    let first = run();
    assert!(!first.is_empty());
    assert_eq!(first, run());
}

#[test]
fn knowledge_and_results_only_grow() {
    let kb = Arc::new(MemoryKb::new());
    load_facts(kb.as_ref(), TAXONOMY).unwrap();
    let rules = format!("{DEDUCTION}\n{TAG}");
    let chainer = chainer(&kb, "(Inheritance Concept:cat Concept:mammal)", &rules, seeded(100));

    let mut kb_size = kb.len();
    let mut results = chainer.results_set();
    let mut sources = chainer.source_count();
    let mut last_iteration = chainer.iteration();
    while let Some(outcome) = chainer.step() {
        assert!(kb.len() >= kb_size);
        assert!(chainer.results_set().is_superset(&results));
        assert!(chainer.source_count() >= sources);
        assert_eq!(chainer.iteration(), last_iteration + 1);
        if let StepOutcome::Applied { products } = &outcome {
            assert!(chainer.results_set().is_superset(products));
        }
        kb_size = kb.len();
        results = chainer.results_set();
        sources = chainer.source_count();
        last_iteration = chainer.iteration();
    }
    assert!(chainer.termination_reason().is_some());
}

#[test]
fn exhaustion_is_final_for_sequential_runs() {
    let kb = Arc::new(MemoryKb::new());
    load_facts(kb.as_ref(), TAXONOMY).unwrap();
    let chainer = chainer(&kb, "(Inheritance Concept:cat Concept:mammal)", DEDUCTION, seeded(100));

    let mut exhausted = false;
    loop {
        let reason = chainer.termination_reason();
        if exhausted {
            assert_eq!(reason, Some(TerminationReason::SourcesExhausted));
        }
        exhausted |= reason == Some(TerminationReason::SourcesExhausted);
        if chainer.step().is_none() {
            break;
        }
    }
    assert!(exhausted);

    let iteration = chainer.iteration();
    let sources = chainer.source_count();
    let results = chainer.results_set();
    let records = chainer.trace().len();
    for _ in 0..3 {
        assert!(chainer.step().is_none());
        assert_eq!(chainer.termination_reason(), Some(TerminationReason::SourcesExhausted));
    }
    assert_eq!(chainer.run(), Some(TerminationReason::SourcesExhausted));
    assert_eq!(chainer.iteration(), iteration);
    assert_eq!(chainer.source_count(), sources);
    assert_eq!(chainer.results_set(), results);
    assert_eq!(chainer.trace().len(), records);
}

#[test]
fn unbounded_runs_still_terminate_on_exhaustion() {
    let kb = Arc::new(MemoryKb::new());
    load_facts(kb.as_ref(), TAXONOMY).unwrap();
    let chainer = chainer(&kb, "(Inheritance Concept:cat Concept:mammal)", DEDUCTION, seeded(-1));

    assert_eq!(chainer.run(), Some(TerminationReason::SourcesExhausted));
    assert!(chainer.iteration() > 0);
}

#[test]
fn focus_set_limits_premise_matching() {
    let kb = Arc::new(MemoryKb::new());
    load_facts(kb.as_ref(), TAXONOMY).unwrap();
    let source = fact(&kb, "(Inheritance Concept:cat Concept:mammal)");
    let unrelated = fact(&kb, "Concept:unrelated");
    let bridge = fact(&kb, "(Inheritance Concept:mammal Concept:animal)");

    let run = |focus: Vec<FactId>| {
        let rule_base = RuleBase::new("focus", parse_rules(DEDUCTION).unwrap(), seeded(100));
        let chainer = ForwardChainer::builder(kb.clone(), rule_base, source)
            .focus_set(focus)
            .build()
            .unwrap();
        chainer.run();
        rendered(&kb, &chainer.results_set())
    };

    // Without mammal -> animal in focus, nothing follows from the source.
    let narrow = run(vec![unrelated]);
    assert!(!narrow.contains("(Inheritance Concept:cat Concept:animal)"), "{narrow:?}");

    let wide = run(vec![bridge]);
    assert!(wide.contains("(Inheritance Concept:cat Concept:animal)"), "{wide:?}");
}

#[test]
fn full_application_runs_rules_over_everything() {
    let kb = Arc::new(MemoryKb::new());
    load_facts(kb.as_ref(), TAXONOMY).unwrap();
    load_facts(kb.as_ref(), "(Inheritance Concept:dog Concept:mammal)").unwrap();
    let config = ChainerConfig {
        full_rule_application: true,
        ..seeded(100)
    };
    let chainer = chainer(&kb, "(Inheritance Concept:cat Concept:mammal)", DEDUCTION, config);

    chainer.run();

    let trace = chainer.trace();
    assert!(!trace.is_empty());
    // The unaltered rule is recorded, and the first application already
    // reaches facts unrelated to the source.
    assert_eq!(trace[0].rule, parse_rules(DEDUCTION).unwrap()[0]);
    let first = rendered(&kb, &trace[0].products);
    assert!(first.contains("(Inheritance Concept:dog Concept:animal)"), "{first:?}");
}

#[test]
fn meta_rules_expand_before_selection() {
    let kb = Arc::new(MemoryKb::new());
    load_facts(
        kb.as_ref(),
        "(Transitive Predicate:ancestor)
         (Evaluation Predicate:ancestor (List Concept:a Concept:b))
         (Evaluation Predicate:ancestor (List Concept:b Concept:c))",
    )
    .unwrap();
    let rules = "\
@meta transitive-relations
  match: (Transitive $R)
  template: transitive
  template-match: (Evaluation $R (List $A $B)), (Evaluation $R (List $B $C))
  template-produce: (Evaluation $R (List $A $C))
";
    let chainer = chainer(
        &kb,
        "(Evaluation Predicate:ancestor (List Concept:a Concept:b))",
        rules,
        seeded(100),
    );
    assert_eq!(chainer.rule_count(), 1);

    chainer.run();

    assert_eq!(chainer.rule_count(), 2);
    let results = rendered(&kb, &chainer.results_set());
    assert!(
        results.contains("(Evaluation Predicate:ancestor (List Concept:a Concept:c))"),
        "{results:?}"
    );
    assert!(chainer
        .trace()
        .iter()
        .all(|r| r.rule.name == "transitive[ancestor]"));
}

#[test]
fn set_source_makes_every_member_a_source() {
    let kb = Arc::new(MemoryKb::new());
    let chainer = chainer(&kb, "(Set Concept:a Concept:b)", TAG, seeded(100));
    assert_eq!(chainer.source_count(), 2);

    assert_eq!(chainer.run(), Some(TerminationReason::SourcesExhausted));
    assert_eq!(
        rendered(&kb, &chainer.results_set()),
        BTreeSet::from(["(Done Concept:a)".to_string(), "(Done Concept:b)".to_string()])
    );
}

#[test]
fn empty_source_set_applies_every_rule_once() {
    let kb = Arc::new(MemoryKb::new());
    load_facts(kb.as_ref(), "Concept:a").unwrap();
    let chainer = chainer(&kb, "(Set)", TAG, seeded(100));
    assert_eq!(chainer.source_count(), 0);

    assert_eq!(chainer.run(), None);

    let trace = chainer.trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(render(kb.as_ref(), trace[0].source), "Concept:dummy-source");
    let results = rendered(&kb, &chainer.results_set());
    assert!(results.contains("(Done Concept:a)"), "{results:?}");
    assert_eq!(chainer.iteration(), 0);
}

#[test]
fn results_are_stored_as_a_set() {
    let kb = Arc::new(MemoryKb::new());
    let chainer = chainer(&kb, "(Set Concept:a Concept:b)", TAG, seeded(100));
    chainer.run();

    let results = chainer.results().unwrap();
    let atom = kb.atom(results).unwrap();
    assert_eq!(atom.kind(), "Set");
    assert_eq!(atom.outgoing().len(), 2);
}

#[test]
fn rule_base_loads_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("taxonomy.toml");
    std::fs::write(
        &path,
        format!("rules = \"\"\"\n{DEDUCTION}\"\"\"\n\n[config]\nmaximum-iterations = 20\nseed = 3\n"),
    )
    .unwrap();

    let rule_base = RuleBase::load(&path).unwrap();
    assert_eq!(rule_base.name, "taxonomy");
    assert_eq!(rule_base.rules.len(), 1);
    assert_eq!(rule_base.config.maximum_iterations, 20);

    let kb = Arc::new(MemoryKb::new());
    load_facts(kb.as_ref(), TAXONOMY).unwrap();
    let source = fact(&kb, "(Inheritance Concept:cat Concept:mammal)");
    let chainer = ForwardChainer::builder(kb.clone(), rule_base, source)
        .build()
        .unwrap();
    chainer.run();
    assert!(rendered(&kb, &chainer.results_set()).contains("(Inheritance Concept:cat Concept:animal)"));

    assert!(RuleBase::load(&dir.path().join("missing.toml")).is_err());
}

#[test]
fn trace_sinks_receive_every_record() {
    let kb = Arc::new(MemoryKb::new());
    let source = fact(&kb, "(Set Concept:a Concept:b Concept:c)");
    let memory = Arc::new(MemorySink::new());
    let rule_base = RuleBase::new("sinks", parse_rules(TAG).unwrap(), seeded(100));
    let chainer = ForwardChainer::builder(kb.clone(), rule_base, source)
        .trace_sink(memory.clone())
        .build()
        .unwrap();
    chainer.run();

    let drained = memory.drain();
    assert_eq!(drained.len(), 3);
    assert_eq!(drained.len(), chainer.trace().len());

    let json = JsonLinesSink::new(Vec::new());
    for record in &drained {
        json.record(record);
    }
    let text = String::from_utf8(json.into_inner()).unwrap();
    assert_eq!(text.lines().count(), 3);
    for line in text.lines() {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["rule"]["name"], "tag");
    }
}
