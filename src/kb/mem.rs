//! In-memory knowledge base backed by DashMap.
//!
//! Atoms are interned: a forward index maps ids to atoms and a reverse index
//! maps canonical atoms back to their ids, so adding the same fact twice
//! yields the same id. All data is lost on process exit.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{KbError, KbResult};
use crate::fact::{Atom, AtomicFactAllocator, FactId};
use crate::rule::{unify, Rule};

use super::KnowledgeBase;

/// Concurrent in-memory knowledge base using sharded hashmaps.
#[derive(Debug, Default)]
pub struct MemoryKb {
    atoms: DashMap<FactId, Atom>,
    index: DashMap<Atom, FactId>,
    allocator: AtomicFactAllocator,
}

impl MemoryKb {
    /// Create an empty knowledge base.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a knowledge base with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            atoms: DashMap::with_capacity(capacity),
            index: DashMap::with_capacity(capacity),
            allocator: AtomicFactAllocator::new(),
        }
    }
}

impl KnowledgeBase for MemoryKb {
    fn add(&self, atom: Atom) -> KbResult<FactId> {
        let atom = atom.canonical()?;
        if let Some(missing) = atom.outgoing().iter().find(|id| !self.atoms.contains_key(*id)) {
            return Err(KbError::UnknownFact {
                fact_id: missing.get(),
            });
        }

        match self.index.entry(atom) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let id = self.allocator.next_id()?;
                // Publish the atom before its id becomes discoverable.
                self.atoms.insert(id, entry.key().clone());
                entry.insert(id);
                Ok(id)
            }
        }
    }

    fn lookup(&self, atom: &Atom) -> Option<FactId> {
        let atom = atom.clone().canonical().ok()?;
        self.index.get(&atom).map(|id| *id.value())
    }

    fn atom(&self, id: FactId) -> Option<Atom> {
        self.atoms.get(&id).map(|a| a.value().clone())
    }

    fn contains(&self, id: FactId) -> bool {
        self.atoms.contains_key(&id)
    }

    fn facts(&self) -> Vec<FactId> {
        let mut ids: Vec<FactId> = self.atoms.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    fn len(&self) -> usize {
        self.atoms.len()
    }

    fn execute(&self, rule: &Rule, context: &dyn KnowledgeBase) -> KbResult<FactId> {
        unify::execute(rule, self, context)
    }
}
