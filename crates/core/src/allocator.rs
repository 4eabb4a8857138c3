//! Global id allocation.
//!
//! Ids are handed out per category, strictly increasing from one past the
//! largest id the template already uses. A `(category, question, local)`
//! triple always maps to the same global id within a session.

use quire_types::{DefinitionCategory, GlobalId, LocalId, QuestionId};
use std::collections::{BTreeMap, HashMap};

/// The identity of a fragment-local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AllocationKey {
    pub category: DefinitionCategory,
    pub question: QuestionId,
    pub local: LocalId,
}

impl AllocationKey {
    pub fn new(category: DefinitionCategory, question: &QuestionId, local: &LocalId) -> Self {
        Self {
            category,
            question: question.clone(),
            local: local.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: HashMap<DefinitionCategory, u32>,
    assigned: HashMap<AllocationKey, GlobalId>,
    origins: HashMap<(DefinitionCategory, GlobalId), Vec<(QuestionId, LocalId)>>,
    issued: BTreeMap<DefinitionCategory, Vec<GlobalId>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks every id up to `max` as taken in `category`.
    pub fn reserve(&mut self, category: DefinitionCategory, max: u32) {
        let next = self.next.entry(category).or_insert(category.first_id());
        *next = (*next).max(max.saturating_add(1));
    }

    /// The id the next `fresh` call in `category` returns.
    pub fn peek(&self, category: DefinitionCategory) -> GlobalId {
        GlobalId::new(self.next.get(&category).copied().unwrap_or(category.first_id()))
    }

    /// Issues a new id without binding it to any local id.
    pub fn fresh(&mut self, category: DefinitionCategory) -> GlobalId {
        let next = self.next.entry(category).or_insert(category.first_id());
        let id = GlobalId::new(*next);
        if *next == u32::MAX {
            log::warn!("{category} ids exhausted, reissuing {id}");
        }
        *next = next.saturating_add(1);
        self.issued.entry(category).or_default().push(id);
        id
    }

    pub fn lookup(&self, key: &AllocationKey) -> Option<GlobalId> {
        self.assigned.get(key).copied()
    }

    /// Binds `key` to an existing global id. The first binding wins; the
    /// id actually bound is returned.
    pub fn bind(&mut self, key: AllocationKey, id: GlobalId) -> GlobalId {
        if let Some(existing) = self.assigned.get(&key) {
            return *existing;
        }
        self.origins
            .entry((key.category, id))
            .or_default()
            .push((key.question.clone(), key.local.clone()));
        self.assigned.insert(key, id);
        id
    }

    /// The id bound to `key`, issuing a fresh one on first use.
    pub fn resolve(&mut self, key: AllocationKey) -> GlobalId {
        if let Some(id) = self.lookup(&key) {
            return id;
        }
        let id = self.fresh(key.category);
        self.bind(key, id)
    }

    /// Ids issued in `category`, in allocation order.
    pub fn issued(&self, category: DefinitionCategory) -> &[GlobalId] {
        self.issued.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    /// Fragment-local ids bound to a global id.
    pub fn origins_of(&self, category: DefinitionCategory, id: GlobalId) -> &[(QuestionId, LocalId)] {
        self.origins
            .get(&(category, id))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn bound_count(&self) -> usize {
        self.assigned.len()
    }
}
