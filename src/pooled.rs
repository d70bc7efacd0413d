use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use tracing::trace;

use crate::component::{Component, ComponentSlot, ComponentType};
use crate::engine::Engine;
use crate::entity::{Entity, EntityRef};
use crate::pool::{Pool, Poolable};

impl Poolable for EntityRef {
    fn reset(&mut self) {
        Entity::reset_state(self);
    }
}

/// Per-kind free-lists of recycled, reset component instances.
///
/// Slots keep their erased reset hook, so recycling never needs to know the
/// concrete component type.
pub(crate) struct ComponentPools {
    pools: HashMap<usize, Vec<ComponentSlot>>,
    max: usize,
}

impl ComponentPools {
    fn new(max: usize) -> Self {
        Self {
            pools: HashMap::new(),
            max,
        }
    }

    pub(crate) fn free(&mut self, mut slot: ComponentSlot) {
        slot.reset();
        let pool = self.pools.entry(slot.type_index()).or_default();
        if pool.len() < self.max {
            pool.push(slot);
        }
    }

    fn obtain(&mut self, index: usize) -> Option<ComponentSlot> {
        self.pools.get_mut(&index)?.pop()
    }

    fn clear(&mut self) {
        self.pools.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self, index: usize) -> usize {
        self.pools.get(&index).map_or(0, Vec::len)
    }
}

/// The entity and component pools carried by a pool-backed [`Engine`].
pub(crate) struct EnginePools {
    entities: Pool<EntityRef>,
    components: Rc<RefCell<ComponentPools>>,
}

impl EnginePools {
    fn new(entity_initial: usize, entity_max: usize, component_max: usize) -> Self {
        Self {
            entities: Pool::new(entity_initial, entity_max),
            components: Rc::new(RefCell::new(ComponentPools::new(component_max))),
        }
    }

    /// Obtains a reset entity carrying the component pool handle, so its
    /// removed and displaced components recycle for the rest of its life.
    pub(crate) fn obtain_entity(&mut self) -> EntityRef {
        let entity = self.entities.obtain(Entity::new);
        entity.attach_pools(self.components.clone());
        entity
    }

    /// Returns a pool-created entity to the entity pool; entities created
    /// outside the pools pass through untouched.
    pub(crate) fn recycle_entity(&mut self, entity: &EntityRef) {
        if entity.is_pooled() {
            trace!(entity = ?entity, "recycling entity");
            self.entities.free(entity.clone());
        }
    }
}

/// An [`Engine`] that obtains entities and components from bounded pools
/// and recycles them on removal, avoiding per-frame allocation.
///
/// Entities obtained from [`create_entity`](Engine::create_entity) are reset
/// to their default state (components recycled through their
/// [`reset`](Component::reset) hook, flags, bits and subscribers cleared)
/// when the engine has fully processed their removal, then returned to the
/// entity pool. Components displaced by a same-kind
/// [`add`](Entity::add) recycle exactly once through the same path.
///
/// Dereferences to [`Engine`] for the entire core API.
///
/// ```
/// use kindred::{Component, PooledEngine};
///
/// #[derive(Default)]
/// struct Health(u32);
/// impl Component for Health {}
///
/// let mut engine = PooledEngine::new();
/// let entity = engine.create_entity();
/// let mut health = engine.create_component::<Health>();
/// health.0 = 100;
/// entity.add_boxed(health);
/// engine.add_entity(entity).unwrap();
/// ```
pub struct PooledEngine {
    engine: Engine,
}

impl PooledEngine {
    /// Pools with the default capacities: 10 initial and 100 maximum free
    /// entities, 100 maximum free components per kind.
    pub fn new() -> Self {
        Self::with_capacities(10, 100, 100)
    }

    /// `entity_initial` reserves free-list space up front; `entity_max` and
    /// `component_max` bound how many free objects are retained, per pool.
    pub fn with_capacities(entity_initial: usize, entity_max: usize, component_max: usize) -> Self {
        let mut engine = Engine::new();
        engine.pools = Some(EnginePools::new(entity_initial, entity_max, component_max));
        Self { engine }
    }

    /// Obtains a component of kind `T` from its pool, falling back to
    /// `T::default()` when the pool is empty. Recycled instances have been
    /// reset on return.
    ///
    /// Attach the result with [`Entity::add_boxed`] to reuse the allocation.
    pub fn create_component<T: Component + Default>(&mut self) -> Box<T> {
        let slot = self
            .engine
            .pools
            .as_mut()
            .and_then(|pools| {
                pools
                    .components
                    .borrow_mut()
                    .obtain(ComponentType::index_of::<T>())
            });

        match slot.and_then(ComponentSlot::into_value) {
            Some(component) => component,
            None => Box::new(T::default()),
        }
    }

    /// Discards every free pooled entity and component.
    pub fn clear_pools(&mut self) {
        if let Some(pools) = &mut self.engine.pools {
            pools.entities.clear();
            pools.components.borrow_mut().clear();
        }
    }
}

impl Default for PooledEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for PooledEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl DerefMut for PooledEngine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.engine
    }
}
