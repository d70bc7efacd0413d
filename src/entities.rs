use std::collections::VecDeque;
use std::rc::Rc;

use crate::entity::EntityRef;

pub(crate) enum EntityOperation {
    Add(EntityRef),
    Remove(EntityRef),
}

/// Owns the canonical ordered, duplicate-free list of live entities plus the
/// FIFO queue of add/remove requests submitted mid-update.
///
/// The engine decides when requests queue and when they apply, attaches its
/// operation handler at submission time (which doubles as the duplicate
/// detector) and drains the queue at the safe point after each tick, exactly
/// once per request.
pub(crate) struct EntityManager {
    entities: Vec<EntityRef>,
    pending: VecDeque<EntityOperation>,
}

impl EntityManager {
    pub(crate) fn new() -> Self {
        Self {
            entities: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn entities(&self) -> &[EntityRef] {
        &self.entities
    }

    pub(crate) fn snapshot(&self) -> Vec<EntityRef> {
        self.entities.clone()
    }

    pub(crate) fn push(&mut self, entity: EntityRef) {
        self.entities.push(entity);
    }

    pub(crate) fn remove(&mut self, entity: &EntityRef) -> bool {
        let Some(position) = self.entities.iter().position(|e| Rc::ptr_eq(e, entity)) else {
            return false;
        };

        self.entities.remove(position);
        true
    }

    pub(crate) fn queue(&mut self, operation: EntityOperation) {
        self.pending.push_back(operation);
    }

    pub(crate) fn pop_pending(&mut self) -> Option<EntityOperation> {
        self.pending.pop_front()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
