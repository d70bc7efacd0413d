use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use itertools::Itertools;
use once_cell::sync::Lazy;

use crate::bits::Bits;
use crate::component::{kind_name, Component, ComponentType};

#[derive(Clone, PartialEq, Eq, Hash)]
struct FamilyKey {
    all: Bits,
    one: Bits,
    exclude: Bits,
}

struct FamilyData {
    key: FamilyKey,
    index: usize,
}

static FAMILIES: Lazy<Mutex<HashMap<FamilyKey, Arc<FamilyData>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn lock_families() -> MutexGuard<'static, HashMap<FamilyKey, Arc<FamilyData>>> {
    FAMILIES.lock().unwrap_or_else(|e| e.into_inner())
}

/// An immutable query over required, optional and excluded component kinds.
///
/// Families are interned: two builder invocations producing structurally
/// equal (`all`, `one`, `exclude`) triples yield the same family and share
/// one cached index, regardless of call order. This makes families cheap to
/// clone and usable as cache keys, which is how the engine maps each family
/// to its live result set.
///
/// ```
/// use kindred::{Component, Family};
///
/// struct Position;
/// struct Velocity;
/// struct Frozen;
/// impl Component for Position {}
/// impl Component for Velocity {}
/// impl Component for Frozen {}
///
/// let moving = Family::builder()
///     .with::<Position>()
///     .with::<Velocity>()
///     .without::<Frozen>()
///     .build();
///
/// assert_eq!(moving, Family::builder()
///     .with::<Velocity>()
///     .with::<Position>()
///     .without::<Frozen>()
///     .build());
/// ```
#[derive(Clone)]
pub struct Family {
    data: Arc<FamilyData>,
}

impl Family {
    pub fn builder() -> FamilyBuilder {
        FamilyBuilder::default()
    }

    /// The family with no constraints at all. Matches every entity.
    ///
    /// Engine-wide entity listeners are registered under this family, since
    /// an entity enters it exactly when it is added to the engine and leaves
    /// it exactly when removed.
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// The cached index of this family, stable for the process lifetime.
    pub fn index(&self) -> usize {
        self.data.index
    }

    /// Evaluates the query against a set of component bits.
    ///
    /// In order: every bit of `all` must be set, at least one bit of a
    /// non-empty `one` must be set, and no bit of `exclude` may be set.
    pub fn matches(&self, bits: &Bits) -> bool {
        let key = &self.data.key;
        if !bits.contains_all(&key.all) {
            return false;
        }

        if !key.one.is_empty() && !bits.intersects(&key.one) {
            return false;
        }

        !bits.intersects(&key.exclude)
    }

    pub fn all(&self) -> &Bits {
        &self.data.key.all
    }

    pub fn one(&self) -> &Bits {
        &self.data.key.one
    }

    pub fn exclude(&self) -> &Bits {
        &self.data.key.exclude
    }
}

impl PartialEq for Family {
    fn eq(&self, other: &Self) -> bool {
        self.data.index == other.data.index
    }
}

impl Eq for Family {}

impl Hash for Family {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.index.hash(state);
    }
}

impl fmt::Debug for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |bits: &Bits| bits.ones().map(kind_name).collect_vec();
        f.debug_struct("Family")
            .field("index", &self.data.index)
            .field("all", &names(self.all()))
            .field("one", &names(self.one()))
            .field("exclude", &names(self.exclude()))
            .finish()
    }
}

/// Accumulates the three kind sets of a [`Family`], one kind per call.
#[derive(Default, Clone)]
pub struct FamilyBuilder {
    all: Bits,
    one: Bits,
    exclude: Bits,
}

impl FamilyBuilder {
    /// Requires entities to hold a component of kind `T`.
    pub fn with<T: Component>(mut self) -> Self {
        self.all.set(ComponentType::index_of::<T>());
        self
    }

    /// Requires entities to hold at least one of the kinds passed to
    /// `one_of`.
    pub fn one_of<T: Component>(mut self) -> Self {
        self.one.set(ComponentType::index_of::<T>());
        self
    }

    /// Rejects entities holding a component of kind `T`.
    pub fn without<T: Component>(mut self) -> Self {
        self.exclude.set(ComponentType::index_of::<T>());
        self
    }

    /// Interns and returns the family for the accumulated triple.
    pub fn build(self) -> Family {
        let key = FamilyKey {
            all: self.all,
            one: self.one,
            exclude: self.exclude,
        };

        let mut families = lock_families();
        let index = families.len();
        let data = families
            .entry(key.clone())
            .or_insert_with(|| Arc::new(FamilyData { key, index }));

        Family { data: data.clone() }
    }
}
