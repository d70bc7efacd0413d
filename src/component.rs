use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::bits::Bits;

/// A plain data fragment attachable to an entity.
///
/// Components carry no required behaviour. The [`reset`](Component::reset)
/// hook is optional and only consumed by the pooling layer when an instance
/// is recycled; the default implementation leaves the value untouched.
pub trait Component: 'static {
    /// Restores this instance to its default state before it is pooled.
    fn reset(&mut self) {}
}

struct Registry {
    indices: HashMap<TypeId, usize>,
    names: Vec<String>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry {
        indices: HashMap::new(),
        names: Vec::new(),
    })
});

fn lock_registry() -> std::sync::MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(|e| e.into_inner())
}

/// The stable identity assigned to a component kind.
///
/// The first resolution of an unseen kind assigns the next free index from a
/// monotonic process-wide counter. Indices are never reused or reclaimed, so
/// the same kind always yields the same index for the lifetime of the
/// process. Component kinds are a closed, statically known set per program,
/// which is why the registry needs no teardown.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentType {
    index: usize,
}

impl ComponentType {
    /// Resolves the type for `T`, registering it on first sight.
    pub fn of<T: Component>() -> Self {
        let mut registry = lock_registry();
        let next = registry.indices.len();
        let index = *registry.indices.entry(TypeId::of::<T>()).or_insert(next);
        if index == next {
            registry.names.push(tynm::type_name::<T>());
        }

        Self { index }
    }

    /// Shorthand for `ComponentType::of::<T>().index()`.
    pub fn index_of<T: Component>() -> usize {
        Self::of::<T>().index
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Short name of the component kind, for diagnostics.
    pub fn name(&self) -> String {
        kind_name(self.index)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", kind_name(self.index), self.index)
    }
}

pub(crate) fn kind_name(index: usize) -> String {
    lock_registry()
        .names
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("#{index}"))
}

/// Builds a [`Bits`] value with the indices of the given component kinds set.
///
/// ```
/// use kindred::{component_bits, Component};
///
/// struct Position;
/// struct Velocity;
/// impl Component for Position {}
/// impl Component for Velocity {}
///
/// let bits = component_bits![Position, Velocity];
/// assert_eq!(bits.ones().count(), 2);
/// ```
#[macro_export]
macro_rules! component_bits {
    ($($kind:ty),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut bits = $crate::Bits::new();
        $(bits.set($crate::ComponentType::index_of::<$kind>());)*
        bits
    }};
}

fn reset_erased<T: Component>(value: &mut dyn Any) {
    if let Some(value) = value.downcast_mut::<T>() {
        value.reset();
    }
}

/// A type-erased component instance.
///
/// The reset hook is captured as a plain fn pointer when the concrete type is
/// still known, so the entity bag and the component pools can recycle a slot
/// without downcasting at the call site.
pub(crate) struct ComponentSlot {
    type_index: usize,
    value: Box<dyn Any>,
    reset: fn(&mut dyn Any),
}

impl ComponentSlot {
    pub(crate) fn new<T: Component>(value: T) -> Self {
        Self::from_boxed(Box::new(value))
    }

    pub(crate) fn from_boxed<T: Component>(value: Box<T>) -> Self {
        Self {
            type_index: ComponentType::index_of::<T>(),
            value,
            reset: reset_erased::<T>,
        }
    }

    pub(crate) fn type_index(&self) -> usize {
        self.type_index
    }

    pub(crate) fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub(crate) fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut()
    }

    pub(crate) fn into_value<T: Component>(self) -> Option<Box<T>> {
        self.value.downcast().ok()
    }

    pub(crate) fn reset(&mut self) {
        (self.reset)(self.value.as_mut());
    }
}

impl fmt::Debug for ComponentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentSlot({})", kind_name(self.type_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Health(u32);
    struct Stamina;

    impl Component for Health {
        fn reset(&mut self) {
            self.0 = 0;
        }
    }
    impl Component for Stamina {}

    #[test]
    fn indices_are_stable_and_distinct() {
        let health = ComponentType::of::<Health>();
        let stamina = ComponentType::of::<Stamina>();

        assert_ne!(health.index(), stamina.index());
        assert_eq!(health, ComponentType::of::<Health>());
        assert_eq!(stamina.index(), ComponentType::index_of::<Stamina>());
    }

    #[test]
    fn slot_resets_through_erased_hook() {
        let mut slot = ComponentSlot::new(Health(80));
        slot.reset();
        assert_eq!(slot.downcast_ref::<Health>().map(|h| h.0), Some(0));

        // Stamina has no override, the default hook is a no-op
        let mut slot = ComponentSlot::new(Stamina);
        slot.reset();
        assert!(slot.into_value::<Stamina>().is_some());
    }
}
