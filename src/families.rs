use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::trace;

use crate::entity::EntityRef;
use crate::family::Family;

/// Notified when entities enter or leave a family's result set.
///
/// Listeners registered without a family filter sit on [`Family::empty`],
/// which every entity enters on engine add and leaves on engine removal, so
/// one dispatch path serves both family-scoped and engine-wide listeners.
pub trait EntityListener: 'static {
    fn entity_added(&mut self, _entity: &EntityRef) {}
    fn entity_removed(&mut self, _entity: &EntityRef) {}
}

/// Shared handle to a registered entity listener. Identity is pointer
/// identity.
pub type EntityListenerRef = Rc<RefCell<dyn EntityListener>>;

/// A live, shared view over the entities currently matching one family.
///
/// All clones observe the same underlying list, which the engine keeps
/// incrementally in sync. Iteration walks a snapshot, so membership changes
/// caused while iterating do not disturb the pass in flight.
#[derive(Clone)]
pub struct EntityList {
    inner: Rc<RefCell<Vec<EntityRef>>>,
}

impl EntityList {
    fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<EntityRef> {
        self.inner.borrow().get(index).cloned()
    }

    pub fn first(&self) -> Option<EntityRef> {
        self.get(0)
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.inner.borrow().iter().any(|e| Rc::ptr_eq(e, entity))
    }

    /// Iterates a snapshot of the current members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = EntityRef> {
        self.inner.borrow().clone().into_iter()
    }

    pub fn to_vec(&self) -> Vec<EntityRef> {
        self.inner.borrow().clone()
    }
}

struct FamilyEntry {
    family: Family,
    entities: EntityList,
}

struct ListenerEntry {
    priority: i32,
    seq: u64,
    family_index: usize,
    listener: EntityListenerRef,
}

/// Keeps, per distinct queried family, a live result set in sync with every
/// entity's component bits, and dispatches membership transitions to the
/// registered listeners in priority order.
pub(crate) struct FamilyManager {
    inner: Rc<FamilyInner>,
}

pub(crate) struct FamilyInner {
    families: RefCell<HashMap<usize, FamilyEntry>>,
    listeners: RefCell<Vec<ListenerEntry>>,
    next_seq: Cell<u64>,
}

impl FamilyManager {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(FamilyInner {
                families: RefCell::new(HashMap::new()),
                listeners: RefCell::new(Vec::new()),
                next_seq: Cell::new(0),
            }),
        }
    }

    pub(crate) fn inner(&self) -> Rc<FamilyInner> {
        self.inner.clone()
    }

    /// Returns the live result set for `family`, scanning `current` once if
    /// the family has never been queried before.
    pub(crate) fn entities_for(&self, family: &Family, current: &[EntityRef]) -> EntityList {
        self.inner.register(family, current).clone()
    }

    /// Registers `listener` under `family` with the given priority; ties in
    /// priority are broken by registration order.
    pub(crate) fn add_listener(
        &self,
        family: Family,
        priority: i32,
        listener: EntityListenerRef,
        current: &[EntityRef],
    ) {
        self.inner.register(&family, current);

        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq + 1);

        let entry = ListenerEntry {
            priority,
            seq,
            family_index: family.index(),
            listener,
        };

        let mut listeners = self.inner.listeners.borrow_mut();
        let at = listeners.partition_point(|e| (e.priority, e.seq) <= (priority, seq));
        listeners.insert(at, entry);
    }

    pub(crate) fn remove_listener(&self, listener: &EntityListenerRef) {
        self.inner
            .listeners
            .borrow_mut()
            .retain(|e| !Rc::ptr_eq(&e.listener, listener));
    }
}

impl FamilyInner {
    fn register(&self, family: &Family, current: &[EntityRef]) -> EntityList {
        let mut families = self.families.borrow_mut();
        let entry = families.entry(family.index()).or_insert_with(|| {
            trace!(family = ?family, "caching new family");
            let entities = EntityList::new();
            for entity in current {
                if !entity.is_removing() && entity.matches(family) {
                    entity.set_family_bit(family.index(), true);
                    entities.inner.borrow_mut().push(entity.clone());
                }
            }

            FamilyEntry {
                family: family.clone(),
                entities,
            }
        });

        entry.entities.clone()
    }

    /// Recomputes `entity`'s membership in every cached family and notifies
    /// listeners of the transitions, all in one priority-ordered pass.
    ///
    /// While the entity's removing flag is set every match is forced false,
    /// so listeners observe removal-from-family while the entity is still on
    /// the master list.
    pub(crate) fn update_membership(&self, entity: &EntityRef) {
        let mut transitions: SmallVec<[(usize, bool); 8]> = SmallVec::new();

        {
            let families = self.families.borrow();
            let removing = entity.is_removing();
            for (&index, entry) in families.iter() {
                let belongs = entity.in_family(index);
                let matches = !removing && entity.matches(&entry.family);
                if matches == belongs {
                    continue;
                }

                entity.set_family_bit(index, matches);
                let mut members = entry.entities.inner.borrow_mut();
                if matches {
                    members.push(entity.clone());
                } else if let Some(position) =
                    members.iter().position(|e| Rc::ptr_eq(e, entity))
                {
                    members.remove(position);
                }

                transitions.push((index, matches));
            }
        }

        if !transitions.is_empty() {
            self.notify(entity, &transitions);
        }
    }

    fn notify(&self, entity: &EntityRef, transitions: &[(usize, bool)]) {
        // snapshot so listeners may register or deregister mid-dispatch
        let snapshot: Vec<(usize, EntityListenerRef)> = self
            .listeners
            .borrow()
            .iter()
            .map(|e| (e.family_index, e.listener.clone()))
            .collect();

        for (family_index, listener) in snapshot {
            for &(index, added) in transitions {
                if family_index != index {
                    continue;
                }

                if added {
                    listener.borrow_mut().entity_added(entity);
                } else {
                    listener.borrow_mut().entity_removed(entity);
                }
            }
        }
    }
}
