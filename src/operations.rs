use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;

use crate::component::{ComponentSlot, ComponentType};
use crate::entity::EntityRef;

enum ComponentOperation {
    Add { entity: EntityRef, slot: ComponentSlot },
    Remove { entity: EntityRef, kind: ComponentType },
    RemoveAll { entity: EntityRef },
}

/// Serializes component mutations requested while the owning engine is
/// mid-update.
///
/// Each call asks the injected updating flag which of two modes applies:
/// immediate, where the operation lands on the entity and fires its signals
/// synchronously, or deferred, where it is appended to a FIFO queue that the
/// engine drains at the safe point after the tick. Queued operations on the
/// same entity, including interleaved adds and removes of one kind, apply
/// strictly in submission order, with signals firing at application time.
pub(crate) struct ComponentOperationHandler {
    updating: Rc<Cell<bool>>,
    queue: RefCell<VecDeque<ComponentOperation>>,
}

impl ComponentOperationHandler {
    pub(crate) fn new(updating: Rc<Cell<bool>>) -> Rc<Self> {
        Rc::new(Self {
            updating,
            queue: RefCell::new(VecDeque::new()),
        })
    }

    pub(crate) fn add(&self, entity: EntityRef, slot: ComponentSlot) {
        if self.updating.get() {
            self.queue
                .borrow_mut()
                .push_back(ComponentOperation::Add { entity, slot });
        } else {
            entity.add_internal(slot);
        }
    }

    pub(crate) fn remove(&self, entity: EntityRef, kind: ComponentType) {
        if self.updating.get() {
            self.queue
                .borrow_mut()
                .push_back(ComponentOperation::Remove { entity, kind });
        } else {
            entity.remove_internal(kind.index());
        }
    }

    pub(crate) fn remove_all(&self, entity: EntityRef) {
        if self.updating.get() {
            self.queue
                .borrow_mut()
                .push_back(ComponentOperation::RemoveAll { entity });
        } else {
            entity.remove_all_internal();
        }
    }

    pub(crate) fn has_operations_to_process(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    /// Drains the queue in submission order, applying each operation with
    /// its immediate semantics. Returns whether anything was applied.
    pub(crate) fn process_operations(&self) -> bool {
        let mut applied = 0usize;
        loop {
            // the queue borrow is released before applying, listeners fired
            // by the application may submit follow-up operations
            let operation = self.queue.borrow_mut().pop_front();
            let Some(operation) = operation else {
                break;
            };

            applied += 1;
            match operation {
                ComponentOperation::Add { entity, slot } => entity.add_internal(slot),
                ComponentOperation::Remove { entity, kind } => {
                    entity.remove_internal(kind.index());
                }
                ComponentOperation::RemoveAll { entity } => entity.remove_all_internal(),
            }
        }

        if applied > 0 {
            trace!(applied, "processed component operations");
        }

        applied > 0
    }
}
