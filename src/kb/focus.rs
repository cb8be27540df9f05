//! A restricted view over another knowledge base.
//!
//! When the chainer is given a focus set, premises are only matched against
//! facts in the set, while produced facts still land in the full knowledge
//! base.

use std::sync::Arc;

use dashmap::DashSet;

use crate::error::{KbError, KbResult};
use crate::fact::{Atom, FactId};
use crate::rule::{unify, Rule};

use super::KnowledgeBase;

/// The subset of an inner knowledge base that rule premises may see.
///
/// Membership is closed under outgoing sets: including a link includes
/// everything it points to.
pub struct FocusSet {
    inner: Arc<dyn KnowledgeBase>,
    members: DashSet<FactId>,
}

impl FocusSet {
    pub fn new(inner: Arc<dyn KnowledgeBase>) -> Self {
        Self {
            inner,
            members: DashSet::new(),
        }
    }

    /// Make `id` (and everything it references) visible.
    pub fn include(&self, id: FactId) -> KbResult<()> {
        let atom = self
            .inner
            .atom(id)
            .ok_or(KbError::UnknownFact { fact_id: id.get() })?;
        if self.members.insert(id) {
            for child in atom.outgoing() {
                self.include(*child)?;
            }
        }
        Ok(())
    }

    pub fn is_member(&self, id: FactId) -> bool {
        self.members.contains(&id)
    }
}

impl std::fmt::Debug for FocusSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusSet")
            .field("members", &self.members.len())
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase for FocusSet {
    fn add(&self, atom: Atom) -> KbResult<FactId> {
        let id = self.inner.add(atom)?;
        self.include(id)?;
        Ok(id)
    }

    fn lookup(&self, atom: &Atom) -> Option<FactId> {
        self.inner.lookup(atom).filter(|id| self.is_member(*id))
    }

    fn atom(&self, id: FactId) -> Option<Atom> {
        if self.is_member(id) {
            self.inner.atom(id)
        } else {
            None
        }
    }

    fn contains(&self, id: FactId) -> bool {
        self.is_member(id)
    }

    fn facts(&self) -> Vec<FactId> {
        let mut ids: Vec<FactId> = self.members.iter().map(|id| *id).collect();
        ids.sort_unstable();
        ids
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn execute(&self, rule: &Rule, context: &dyn KnowledgeBase) -> KbResult<FactId> {
        unify::execute(rule, self, context)
    }
}
