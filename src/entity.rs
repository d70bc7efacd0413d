use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use itertools::Itertools;

use crate::bits::Bits;
use crate::component::{kind_name, Component, ComponentSlot, ComponentType};
use crate::family::Family;
use crate::operations::ComponentOperationHandler;
use crate::pooled::ComponentPools;
use crate::signal::Signal;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct EntityFlags: u8 {
        /// A removal request has been submitted and not yet fully processed.
        const SCHEDULED_FOR_REMOVAL = 1 << 0;
        /// The engine is processing the removal right now. Family matches
        /// are forced to fail while this is set.
        const REMOVING = 1 << 1;
    }
}

/// Shared handle to an entity. Entity identity is pointer identity, compare
/// handles with [`Rc::ptr_eq`].
pub type EntityRef = Rc<Entity>;

#[derive(Default)]
struct ComponentBag {
    slots: Vec<Option<ComponentSlot>>,
    order: Vec<usize>,
}

impl ComponentBag {
    fn get(&self, index: usize) -> Option<&ComponentSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut ComponentSlot> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    fn insert(&mut self, slot: ComponentSlot) -> Option<ComponentSlot> {
        let index = slot.type_index();
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }

        let old = self.slots[index].replace(slot);
        if old.is_none() {
            self.order.push(index);
        }

        old
    }

    fn remove(&mut self, index: usize) -> Option<ComponentSlot> {
        let old = self.slots.get_mut(index).and_then(Option::take);
        if old.is_some() {
            self.order.retain(|&i| i != index);
        }

        old
    }

    fn first_kind(&self) -> Option<usize> {
        self.order.first().copied()
    }
}

/// An identity with a dynamic bag of components, at most one per kind.
///
/// Entities are created through [`Entity::new`] or obtained from a
/// [`PooledEngine`](crate::PooledEngine) and handed around as [`EntityRef`].
/// While an entity is resident in an engine that is mid-update, structural
/// changes (adding or removing components) are routed through the engine's
/// operation queue and applied at the next safe point; outside of an update
/// they apply immediately. Non-structural access through [`get`](Entity::get)
/// and [`get_mut`](Entity::get_mut) is always direct.
pub struct Entity {
    this: Weak<Entity>,
    bag: RefCell<ComponentBag>,
    component_bits: RefCell<Bits>,
    family_bits: RefCell<Bits>,
    flags: Cell<EntityFlags>,
    /// Dispatched after a component has landed on this entity.
    pub component_added: Signal<EntityRef>,
    /// Dispatched after a component has left this entity.
    pub component_removed: Signal<EntityRef>,
    handler: RefCell<Option<Rc<ComponentOperationHandler>>>,
    pools: RefCell<Option<Rc<RefCell<ComponentPools>>>>,
}

impl Entity {
    pub fn new() -> EntityRef {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            bag: RefCell::new(ComponentBag::default()),
            component_bits: RefCell::new(Bits::new()),
            family_bits: RefCell::new(Bits::new()),
            flags: Cell::new(EntityFlags::default()),
            component_added: Signal::new(),
            component_removed: Signal::new(),
            handler: RefCell::new(None),
            pools: RefCell::new(None),
        })
    }

    fn this(&self) -> EntityRef {
        self.this
            .upgrade()
            .expect("entity is only reachable through its Rc")
    }

    /// Attaches a component, replacing any existing component of the same
    /// kind.
    ///
    /// A replacement fires a removed notification for the displaced instance
    /// followed by an added notification for the new one, and recycles the
    /// displaced instance if this entity is pool-backed.
    pub fn add<T: Component>(&self, value: T) {
        self.apply_add(ComponentSlot::new(value));
    }

    /// [`add`](Entity::add) for an already boxed component, reusing its
    /// allocation. This is the insertion path for pooled components.
    pub fn add_boxed<T: Component>(&self, value: Box<T>) {
        self.apply_add(ComponentSlot::from_boxed(value));
    }

    fn apply_add(&self, slot: ComponentSlot) {
        let handler = self.handler.borrow().clone();
        match handler {
            Some(handler) => handler.add(self.this(), slot),
            None => self.add_internal(slot),
        }
    }

    /// Removes the component of kind `T`.
    ///
    /// Returns whether the component was present at call time; removing an
    /// absent kind is a no-op, not an error. Mid-update the actual removal
    /// is deferred to the engine's next safe point.
    pub fn remove<T: Component>(&self) -> bool {
        self.remove_type(ComponentType::of::<T>())
    }

    pub fn remove_type(&self, kind: ComponentType) -> bool {
        if !self.component_bits.borrow().get(kind.index()) {
            return false;
        }

        let handler = self.handler.borrow().clone();
        match handler {
            Some(handler) => handler.remove(self.this(), kind),
            None => {
                self.remove_internal(kind.index());
            }
        }

        true
    }

    /// Removes every component, firing one removed notification per
    /// component in insertion order.
    pub fn remove_all(&self) {
        let handler = self.handler.borrow().clone();
        match handler {
            Some(handler) => handler.remove_all(self.this()),
            None => self.remove_all_internal(),
        }
    }

    /// Borrows the component of kind `T`, if present.
    ///
    /// All components of one entity share a single cell: release any
    /// outstanding borrow before taking a mutable one on the same entity.
    pub fn get<T: Component>(&self) -> Option<Ref<'_, T>> {
        let index = ComponentType::index_of::<T>();
        Ref::filter_map(self.bag.borrow(), |bag| {
            bag.get(index).and_then(|slot| slot.downcast_ref::<T>())
        })
        .ok()
    }

    /// Mutably borrows the component of kind `T`, if present.
    pub fn get_mut<T: Component>(&self) -> Option<RefMut<'_, T>> {
        let index = ComponentType::index_of::<T>();
        RefMut::filter_map(self.bag.borrow_mut(), |bag| {
            bag.get_mut(index).and_then(|slot| slot.downcast_mut::<T>())
        })
        .ok()
    }

    pub fn has<T: Component>(&self) -> bool {
        self.has_type(ComponentType::of::<T>())
    }

    pub fn has_type(&self, kind: ComponentType) -> bool {
        self.component_bits.borrow().get(kind.index())
    }

    /// The bits of the component kinds currently present.
    pub fn component_bits(&self) -> Ref<'_, Bits> {
        self.component_bits.borrow()
    }

    /// The bits of the families this entity currently satisfies. Maintained
    /// by the owning engine, empty outside of one.
    pub fn family_bits(&self) -> Ref<'_, Bits> {
        self.family_bits.borrow()
    }

    pub fn matches(&self, family: &Family) -> bool {
        family.matches(&self.component_bits.borrow())
    }

    /// True from the moment a removal request is submitted until the engine
    /// has fully processed it.
    pub fn is_scheduled_for_removal(&self) -> bool {
        self.flags.get().contains(EntityFlags::SCHEDULED_FOR_REMOVAL)
    }

    /// True while the engine is processing this entity's removal.
    pub fn is_removing(&self) -> bool {
        self.flags.get().contains(EntityFlags::REMOVING)
    }

    pub(crate) fn insert_flags(&self, flags: EntityFlags) {
        self.flags.set(self.flags.get() | flags);
    }

    pub(crate) fn clear_flags(&self, flags: EntityFlags) {
        self.flags.set(self.flags.get() - flags);
    }

    pub(crate) fn in_family(&self, index: usize) -> bool {
        self.family_bits.borrow().get(index)
    }

    pub(crate) fn set_family_bit(&self, index: usize, member: bool) {
        let mut bits = self.family_bits.borrow_mut();
        if member {
            bits.set(index);
        } else {
            bits.clear(index);
        }
    }

    pub(crate) fn attach_handler(&self, handler: Rc<ComponentOperationHandler>) {
        *self.handler.borrow_mut() = Some(handler);
    }

    pub(crate) fn detach_handler(&self) {
        *self.handler.borrow_mut() = None;
    }

    pub(crate) fn handler_is(&self, handler: &Rc<ComponentOperationHandler>) -> bool {
        self.handler
            .borrow()
            .as_ref()
            .is_some_and(|h| Rc::ptr_eq(h, handler))
    }

    pub(crate) fn has_handler(&self) -> bool {
        self.handler.borrow().is_some()
    }

    pub(crate) fn attach_pools(&self, pools: Rc<RefCell<ComponentPools>>) {
        *self.pools.borrow_mut() = Some(pools);
    }

    pub(crate) fn is_pooled(&self) -> bool {
        self.pools.borrow().is_some()
    }

    /// Applies an addition now: displaces any same-kind component (recycled,
    /// removed notification), inserts the new one and fires the added
    /// notification.
    pub(crate) fn add_internal(&self, slot: ComponentSlot) {
        let index = slot.type_index();
        self.remove_internal(index);

        self.bag.borrow_mut().insert(slot);
        self.component_bits.borrow_mut().set(index);
        self.component_added.dispatch(&self.this());
    }

    /// Applies a removal now. Returns whether a component was removed.
    pub(crate) fn remove_internal(&self, index: usize) -> bool {
        let slot = self.bag.borrow_mut().remove(index);
        let Some(slot) = slot else {
            return false;
        };

        self.component_bits.borrow_mut().clear(index);
        self.recycle(slot);
        self.component_removed.dispatch(&self.this());
        true
    }

    pub(crate) fn remove_all_internal(&self) {
        loop {
            // the bag borrow must end before remove_internal re-borrows it
            let index = self.bag.borrow().first_kind();
            let Some(index) = index else {
                break;
            };

            self.remove_internal(index);
        }
    }

    fn recycle(&self, slot: ComponentSlot) {
        if let Some(pools) = self.pools.borrow().as_ref() {
            pools.borrow_mut().free(slot);
        }
    }

    /// Restores a pool-backed entity to its default state before it returns
    /// to the entity pool: components recycled, bits and flags cleared,
    /// subscribers dropped, handler detached. The pool handle survives so
    /// the instance keeps recycling across reuses.
    pub(crate) fn reset_state(&self) {
        self.remove_all_internal();
        self.component_bits.borrow_mut().clear_all();
        self.family_bits.borrow_mut().clear_all();
        self.flags.set(EntityFlags::default());
        self.component_added.remove_all();
        self.component_removed.remove_all();
        self.detach_handler();
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field(
                "components",
                &self.component_bits.borrow().ones().map(kind_name).collect_vec(),
            )
            .field("flags", &self.flags.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Position(i32, i32);
    #[derive(Default)]
    struct Tag;
    impl Component for Position {}
    impl Component for Tag {}

    #[test]
    fn add_then_remove_round_trip() {
        let entity = Entity::new();
        let added = Rc::new(Cell::new(0));
        let removed = Rc::new(Cell::new(0));

        {
            let added = added.clone();
            entity
                .component_added
                .connect(move |_: &EntityRef| added.set(added.get() + 1));
            let removed = removed.clone();
            entity
                .component_removed
                .connect(move |_: &EntityRef| removed.set(removed.get() + 1));
        }

        entity.add(Position(1, 2));
        assert!(entity.has::<Position>());
        assert_eq!(entity.get::<Position>().map(|p| p.0), Some(1));

        assert!(entity.remove::<Position>());
        assert!(!entity.has::<Position>());
        assert!(entity.component_bits().is_empty());
        assert_eq!((added.get(), removed.get()), (1, 1));

        // absent kind is a no-op
        assert!(!entity.remove::<Position>());
        assert_eq!(removed.get(), 1);
    }

    #[test]
    fn replace_fires_removed_then_added() {
        let entity = Entity::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let added_log = log.clone();
            entity
                .component_added
                .connect(move |_: &EntityRef| added_log.borrow_mut().push("added"));
            let removed_log = log.clone();
            entity
                .component_removed
                .connect(move |_: &EntityRef| removed_log.borrow_mut().push("removed"));
        }

        entity.add(Position(1, 1));
        entity.add(Position(9, 9));

        assert_eq!(*log.borrow(), vec!["added", "removed", "added"]);
        assert_eq!(entity.get::<Position>().map(|p| p.0), Some(9));
    }

    #[test]
    fn remove_all_in_insertion_order() {
        let entity = Entity::new();
        entity.add(Tag);
        entity.add(Position(0, 0));

        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let order = order.clone();
            entity.component_removed.connect(move |e: &EntityRef| {
                // the removed component is already gone, record what remains
                order.borrow_mut().push(e.component_bits().ones().count());
            });
        }

        entity.remove_all();
        assert_eq!(*order.borrow(), vec![1, 0]);
        assert!(!entity.has::<Tag>());
        assert!(!entity.has::<Position>());
    }

    #[test]
    fn mutation_through_get_mut() {
        let entity = Entity::new();
        entity.add(Position(0, 0));

        if let Some(mut position) = entity.get_mut::<Position>() {
            position.0 += 5;
        }

        assert_eq!(entity.get::<Position>().map(|p| p.0), Some(5));
    }
}
