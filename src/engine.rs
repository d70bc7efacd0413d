use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::entities::{EntityManager, EntityOperation};
use crate::entity::{Entity, EntityFlags, EntityRef};
use crate::error::{Error, Result};
use crate::families::{EntityList, EntityListener, EntityListenerRef, FamilyManager};
use crate::family::Family;
use crate::operations::ComponentOperationHandler;
use crate::pooled::EnginePools;
use crate::signal::ListenerRef;
use crate::systems::{EntitySystem, SystemManager, SystemRef};

/// Resets the updating flag on scope exit, so a panicking system leaves the
/// engine in the Idle state and usable.
struct IdleOnDrop(Rc<Cell<bool>>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// The façade wiring entity, family and system management together.
///
/// The engine owns the canonical entity list, one live result set per
/// queried [`Family`] and the priority-ordered system list, and drives the
/// per-tick [`update`](Engine::update) loop. Mutations requested while a
/// tick is in flight are queued and flushed at the safe point after the
/// tick; outside a tick they apply immediately. Nested ticks are a reported
/// error, never silently reentered.
///
/// All state is owned by one engine instance and none of the API is safe
/// for concurrent access from multiple threads; the core is deliberately a
/// single-threaded game loop.
pub struct Engine {
    entities: EntityManager,
    families: FamilyManager,
    systems: SystemManager,
    operations: Rc<ComponentOperationHandler>,
    updating: Rc<Cell<bool>>,
    membership_listener: ListenerRef<EntityRef>,
    pub(crate) pools: Option<EnginePools>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let updating = Rc::new(Cell::new(false));
        let families = FamilyManager::new();

        // every resident entity's component signals feed membership
        // recomputation through this one listener
        let inner = families.inner();
        let membership_listener: ListenerRef<EntityRef> =
            Rc::new(RefCell::new(move |entity: &EntityRef| {
                inner.update_membership(entity);
            }));

        Self {
            entities: EntityManager::new(),
            families,
            systems: SystemManager::new(),
            operations: ComponentOperationHandler::new(updating.clone()),
            updating,
            membership_listener,
            pools: None,
        }
    }

    /// Creates a fresh entity, or obtains a recycled one when this engine is
    /// pool-backed. The entity is not yet added to the engine.
    pub fn create_entity(&mut self) -> EntityRef {
        match &mut self.pools {
            Some(pools) => pools.obtain_entity(),
            None => Entity::new(),
        }
    }

    /// Adds `entity` to the engine.
    ///
    /// Mid-update the addition is queued and the entity stays invisible to
    /// [`entities`](Engine::entities) until the flush; otherwise it is
    /// appended immediately and exactly one added notification fires.
    /// Re-adding an entity that is resident, already queued, registered with
    /// another engine or still scheduled for removal is an error, detected
    /// at submission time.
    pub fn add_entity(&mut self, entity: EntityRef) -> Result<()> {
        if entity.is_scheduled_for_removal() {
            return Err(Error::ScheduledForRemoval);
        }

        if entity.has_handler() {
            return Err(Error::EntityAlreadyAdded);
        }

        entity.attach_handler(self.operations.clone());
        if self.updating.get() {
            trace!(entity = ?entity, "queueing entity addition");
            self.entities.queue(EntityOperation::Add(entity));
        } else {
            self.add_entity_internal(entity);
        }

        Ok(())
    }

    /// Requests removal of `entity`. Unknown entities and repeated requests
    /// are no-ops.
    pub fn remove_entity(&mut self, entity: &EntityRef) {
        if entity.is_scheduled_for_removal() || !entity.handler_is(&self.operations) {
            return;
        }

        entity.insert_flags(EntityFlags::SCHEDULED_FOR_REMOVAL);
        if self.updating.get() {
            trace!(entity = ?entity, "queueing entity removal");
            self.entities.queue(EntityOperation::Remove(entity.clone()));
        } else {
            self.remove_entity_internal(entity);
        }
    }

    /// Requests removal of every entity, iterating a snapshot of the live
    /// list.
    pub fn remove_all_entities(&mut self) {
        for entity in self.entities.snapshot() {
            self.remove_entity(&entity);
        }
    }

    /// Requests removal of every entity currently matching `family`.
    pub fn remove_all_entities_of(&mut self, family: &Family) {
        for entity in self.entities_for(family).iter() {
            self.remove_entity(&entity);
        }
    }

    /// The canonical ordered list of live entities.
    pub fn entities(&self) -> &[EntityRef] {
        self.entities.entities()
    }

    /// The live, auto-updating result set for `family`.
    ///
    /// The first call for a never-seen family scans the current entities
    /// once; all further calls share the cached view.
    pub fn entities_for(&self, family: &Family) -> EntityList {
        self.families.entities_for(family, self.entities.entities())
    }

    /// Registers an engine-wide listener, notified of every entity added to
    /// or removed from the engine, at priority 0.
    pub fn add_entity_listener(&mut self, listener: impl EntityListener) -> EntityListenerRef {
        let listener: EntityListenerRef = Rc::new(RefCell::new(listener));
        self.add_entity_listener_filtered(Family::empty(), 0, listener.clone());
        listener
    }

    /// Registers `listener` for membership transitions in `family`.
    ///
    /// Delivery order across all listeners of an event is non-decreasing by
    /// priority, ties broken by registration order. Pass
    /// [`Family::empty`] to observe every entity engine-wide.
    pub fn add_entity_listener_filtered(
        &mut self,
        family: Family,
        priority: i32,
        listener: EntityListenerRef,
    ) {
        self.families
            .add_listener(family, priority, listener, self.entities.entities());
    }

    pub fn remove_entity_listener(&mut self, listener: &EntityListenerRef) {
        self.families.remove_listener(listener);
    }

    /// Adds `system`, replacing any resident system of the same concrete
    /// kind (its removal hook fires first). Returns the shared handle.
    pub fn add_system<S: EntitySystem>(&mut self, system: S) -> Rc<RefCell<S>> {
        if let Some(old) = self.systems.take(TypeId::of::<S>()) {
            debug!("replacing resident system of same kind");
            old.borrow_mut().removed_from_engine(self);
        }

        let system = Rc::new(RefCell::new(system));
        self.systems.insert(system.clone());
        system.borrow_mut().added_to_engine(self);
        system
    }

    pub fn get_system<S: EntitySystem>(&self) -> Option<Rc<RefCell<S>>> {
        self.systems.get::<S>()
    }

    /// Removes the resident system of kind `S`, if any, firing its removal
    /// hook.
    pub fn remove_system<S: EntitySystem>(&mut self) -> Option<Rc<RefCell<S>>> {
        let system = self.systems.get::<S>()?;
        self.systems.take(TypeId::of::<S>());
        system.borrow_mut().removed_from_engine(self);
        Some(system)
    }

    pub fn remove_all_systems(&mut self) {
        for system in self.systems.drain() {
            system.borrow_mut().removed_from_engine(self);
        }
    }

    /// The resident systems in update order.
    pub fn systems(&self) -> Vec<SystemRef> {
        self.systems.ordered()
    }

    /// Runs one tick: every non-disabled system in priority order receives
    /// `delta`, then all entity and component operations queued during the
    /// tick are flushed.
    ///
    /// Calling `update` from within a tick is a [`Error::ReentrantUpdate`]
    /// and does not run a second pass of systems.
    pub fn update(&mut self, delta: f32) -> Result<()> {
        if self.updating.get() {
            return Err(Error::ReentrantUpdate);
        }

        trace!(delta, "tick");
        self.updating.set(true);
        {
            let _idle = IdleOnDrop(self.updating.clone());
            for system in self.systems.ordered() {
                let mut system = system.borrow_mut();
                if system.check_processing() {
                    system.update(self, delta);
                }
            }
        }

        self.flush_operations();
        Ok(())
    }

    /// True while a tick is in flight.
    pub fn is_updating(&self) -> bool {
        self.updating.get()
    }

    /// True if any entity or component operation is still queued.
    /// Diagnostics only; the engine flushes after every tick.
    pub fn has_pending_operations(&self) -> bool {
        self.entities.has_pending() || self.operations.has_operations_to_process()
    }

    /// Drains queued entity operations first, then component operations,
    /// looping until both queues are quiet. Entity adds land before the
    /// component operations queued for them, so family membership is always
    /// computed on complete entities.
    fn flush_operations(&mut self) {
        loop {
            let mut worked = false;
            while let Some(operation) = self.entities.pop_pending() {
                worked = true;
                match operation {
                    EntityOperation::Add(entity) => self.add_entity_internal(entity),
                    EntityOperation::Remove(entity) => self.remove_entity_internal(&entity),
                }
            }

            worked |= self.operations.process_operations();
            if !worked {
                break;
            }
        }
    }

    fn add_entity_internal(&mut self, entity: EntityRef) {
        entity.component_added.add(self.membership_listener.clone());
        entity
            .component_removed
            .add(self.membership_listener.clone());

        self.entities.push(entity.clone());
        debug!(entity = ?entity, "entity added");
        self.families.inner().update_membership(&entity);
    }

    fn remove_entity_internal(&mut self, entity: &EntityRef) {
        // membership is recomputed with matches forced false while the
        // entity is still on the master list, so removal listeners never
        // observe a half-gone entity
        entity.insert_flags(EntityFlags::REMOVING);
        self.families.inner().update_membership(entity);

        self.entities.remove(entity);
        entity.component_added.remove(&self.membership_listener);
        entity.component_removed.remove(&self.membership_listener);
        entity.detach_handler();
        entity.clear_flags(EntityFlags::REMOVING | EntityFlags::SCHEDULED_FOR_REMOVAL);
        debug!(entity = ?entity, "entity removed");

        if let Some(pools) = &mut self.pools {
            pools.recycle_entity(entity);
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("entities", &self.entities.entities().len())
            .field("systems", &self.systems.ordered().len())
            .field("updating", &self.updating.get())
            .finish()
    }
}
