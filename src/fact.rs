//! Core fact types for the forward chainer.
//!
//! Facts are the atomic units a knowledge base holds. Every fact is an
//! [`Atom`] (a named node or a link over other facts) and is identified by a
//! [`FactId`]. The chainer never copies atoms across the knowledge-base
//! boundary; it only passes ids around. The [`AtomicFactAllocator`] provides
//! thread-safe id generation.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{KbError, KbResult};

/// Link kind of an unordered container.
pub const SET: &str = "Set";
/// Link kind of an ordered container.
pub const LIST: &str = "List";
/// Node kind of an open variable.
pub const VARIABLE: &str = "Variable";
/// Node kind used for plain concepts.
pub const CONCEPT: &str = "Concept";

/// Unique, niche-optimized identifier for a fact.
///
/// Uses `NonZeroU64` so that `Option<FactId>` is the same size as `FactId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FactId(NonZeroU64);

impl FactId {
    /// Create a `FactId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(FactId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The content of a fact: a node or a link over other facts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Atom {
    /// An atomic fact such as `Concept:cat`.
    Node { kind: String, name: String },
    /// A structured fact such as `(Inheritance Concept:cat Concept:animal)`.
    Link { kind: String, outgoing: Vec<FactId> },
}

impl Atom {
    pub fn node(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Node {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn link(kind: impl Into<String>, outgoing: Vec<FactId>) -> Self {
        Self::Link {
            kind: kind.into(),
            outgoing,
        }
    }

    /// The type tag of this atom.
    pub fn kind(&self) -> &str {
        match self {
            Self::Node { kind, .. } | Self::Link { kind, .. } => kind,
        }
    }

    /// Outgoing set of a link; empty for nodes.
    pub fn outgoing(&self) -> &[FactId] {
        match self {
            Self::Node { .. } => &[],
            Self::Link { outgoing, .. } => outgoing,
        }
    }

    /// Returns `true` for `Set` and `List` links, whose members are produced
    /// individually when a rule emits them.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Link { kind, .. } if kind == SET || kind == LIST)
    }

    /// Returns `true` for `Variable` nodes.
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Node { kind, .. } if kind == VARIABLE)
    }

    /// Check structural well-formedness and bring the atom into canonical form.
    ///
    /// `Set` links are unordered, so their outgoing set is sorted and deduplicated.
    pub fn canonical(self) -> KbResult<Self> {
        match self {
            Self::Node { kind, name } => {
                if kind.is_empty() || name.is_empty() {
                    return Err(KbError::MalformedAtom {
                        message: format!("node '{kind}:{name}' has an empty kind or name"),
                    });
                }
                Ok(Self::Node { kind, name })
            }
            Self::Link { kind, mut outgoing } => {
                if kind.is_empty() {
                    return Err(KbError::MalformedAtom {
                        message: "link has an empty kind".into(),
                    });
                }
                if kind == SET {
                    outgoing.sort_unstable();
                    outgoing.dedup();
                }
                Ok(Self::Link { kind, outgoing })
            }
        }
    }
}

/// Thread-safe fact id allocator.
///
/// Produces monotonically increasing ids starting from 1.
#[derive(Debug)]
pub struct AtomicFactAllocator {
    next: AtomicU64,
}

impl AtomicFactAllocator {
    /// Create a new allocator that starts from id 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next fact id.
    pub fn next_id(&self) -> KbResult<FactId> {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        FactId::new(raw).ok_or(KbError::AllocatorExhausted)
    }

    /// Return the next id that *would* be allocated, without consuming it.
    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for AtomicFactAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> FactId {
        FactId::new(raw).unwrap()
    }

    #[test]
    fn fact_id_niche_optimization() {
        assert_eq!(
            std::mem::size_of::<Option<FactId>>(),
            std::mem::size_of::<FactId>()
        );
    }

    #[test]
    fn fact_id_zero_is_none() {
        assert!(FactId::new(0).is_none());
        assert_eq!(id(42).get(), 42);
        assert_eq!(id(42).to_string(), "#42");
    }

    #[test]
    fn allocator_produces_sequential_ids() {
        let alloc = AtomicFactAllocator::new();
        assert_eq!(alloc.next_id().unwrap().get(), 1);
        assert_eq!(alloc.next_id().unwrap().get(), 2);
        assert_eq!(alloc.peek_next(), 3);
    }

    #[test]
    fn set_links_are_canonicalized() {
        let set = Atom::link(SET, vec![id(3), id(1), id(3), id(2)])
            .canonical()
            .unwrap();
        assert_eq!(set.outgoing(), &[id(1), id(2), id(3)]);

        let list = Atom::link(LIST, vec![id(3), id(1), id(3)]).canonical().unwrap();
        assert_eq!(list.outgoing(), &[id(3), id(1), id(3)]);
    }

    #[test]
    fn malformed_atoms_are_rejected() {
        assert!(Atom::node("", "x").canonical().is_err());
        assert!(Atom::node(CONCEPT, "").canonical().is_err());
        assert!(Atom::link("", vec![]).canonical().is_err());
    }

    #[test]
    fn containers_and_variables() {
        assert!(Atom::link(SET, vec![]).is_container());
        assert!(Atom::link(LIST, vec![]).is_container());
        assert!(!Atom::link("Inheritance", vec![]).is_container());
        assert!(Atom::node(VARIABLE, "$X").is_variable());
        assert_eq!(Atom::node(CONCEPT, "cat").kind(), CONCEPT);
    }
}
