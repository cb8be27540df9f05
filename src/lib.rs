// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # akh-chainer
//!
//! A forward-chaining inference engine. Starting from one or more source
//! facts, it repeatedly picks a source and a rule valid for it, applies the
//! rule, and folds the derived facts back into the pool of sources.
//!
//! ## Architecture
//!
//! - **Facts** (`fact`): interned nodes and links addressed by `FactId`
//! - **Knowledge base** (`kb`): the `KnowledgeBase` trait, a DashMap-backed
//!   in-memory store, and focus-set views
//! - **Rules** (`rule`): patterns, unification, meta-rules, truth values and
//!   Thompson sampling, and the `@rule` text format
//! - **Chainer** (`chainer`): source population, rule catalog, bandit rule
//!   selection, sequential and bounded-concurrent scheduling, inference trace
//! - **Term syntax** (`sexpr`): `Kind:name`, `$X`, and `(Kind ...)` terms
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use akh_chainer::chainer::{ChainerConfig, ForwardChainer, RuleBase};
//! use akh_chainer::kb::{load_facts, render, MemoryKb};
//! use akh_chainer::rule::parse::parse_rules;
//!
//! let kb = Arc::new(MemoryKb::new());
//! let source = load_facts(kb.as_ref(), "Concept:F0").unwrap()[0];
//! let rules = parse_rules("@rule tag\n  match: $X:Concept\n  produce: (Done $X)\n").unwrap();
//!
//! let chainer = ForwardChainer::builder(kb.clone(), RuleBase::new("tags", rules, ChainerConfig::default()), source)
//!     .build()
//!     .unwrap();
//! chainer.run();
//! for fact in chainer.results_set() {
//!     println!("{}", render(kb.as_ref(), fact));
//! }
//! ```

pub mod chainer;
pub mod error;
pub mod fact;
pub mod kb;
pub mod rule;
pub mod sexpr;
