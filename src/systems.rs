use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::Engine;
use crate::entity::EntityRef;
use crate::families::EntityList;
use crate::family::Family;

/// Per-tick logic run by the engine's update loop.
///
/// Systems are updated in ascending [`priority`](EntitySystem::priority)
/// order, ties broken by insertion order. The priority is captured when the
/// system is added to an engine. Mutations requested through the `engine`
/// reference during [`update`](EntitySystem::update) are deferred to the
/// safe point after the tick.
pub trait EntitySystem: 'static {
    fn update(&mut self, engine: &mut Engine, delta: f32);

    /// Invoked when the system becomes resident in an engine.
    fn added_to_engine(&mut self, _engine: &mut Engine) {}

    /// Invoked when the system leaves its engine.
    fn removed_from_engine(&mut self, _engine: &mut Engine) {}

    fn priority(&self) -> i32 {
        0
    }

    /// Systems reporting false are skipped by the tick loop.
    fn check_processing(&self) -> bool {
        true
    }
}

/// Shared handle to a resident system.
pub type SystemRef = Rc<RefCell<dyn EntitySystem>>;

struct SystemEntry {
    priority: i32,
    seq: u64,
    kind: TypeId,
    system: SystemRef,
    any: Rc<dyn Any>,
}

/// Holds at most one resident system per concrete kind, ordered by
/// (priority, insertion sequence).
pub(crate) struct SystemManager {
    entries: Vec<SystemEntry>,
    next_seq: u64,
}

impl SystemManager {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn insert<S: EntitySystem>(&mut self, system: Rc<RefCell<S>>) {
        let priority = system.borrow().priority();
        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = SystemEntry {
            priority,
            seq,
            kind: TypeId::of::<S>(),
            system: system.clone(),
            any: system,
        };

        let at = self
            .entries
            .partition_point(|e| (e.priority, e.seq) <= (priority, seq));
        self.entries.insert(at, entry);
    }

    pub(crate) fn take(&mut self, kind: TypeId) -> Option<SystemRef> {
        let position = self.entries.iter().position(|e| e.kind == kind)?;
        Some(self.entries.remove(position).system)
    }

    pub(crate) fn get<S: EntitySystem>(&self) -> Option<Rc<RefCell<S>>> {
        self.entries
            .iter()
            .find(|e| e.kind == TypeId::of::<S>())
            .and_then(|e| e.any.clone().downcast::<RefCell<S>>().ok())
    }

    pub(crate) fn ordered(&self) -> Vec<SystemRef> {
        self.entries.iter().map(|e| e.system.clone()).collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<SystemRef> {
        self.next_seq = 0;
        self.entries.drain(..).map(|e| e.system).collect()
    }
}

/// Batch logic run by an [`IteratingSystem`] over one family.
pub trait EntityProcessor: 'static {
    /// The family whose live result set is iterated each tick.
    fn family(&self) -> Family;

    /// Invoked once per matching entity per tick.
    fn process(&mut self, entity: &EntityRef, engine: &mut Engine, delta: f32);

    /// Invoked before the batch of each tick.
    fn begin(&mut self, _engine: &mut Engine) {}

    /// Invoked after the batch of each tick.
    fn end(&mut self, _engine: &mut Engine) {}

    fn priority(&self) -> i32 {
        0
    }
}

/// Adapts an [`EntityProcessor`] into an [`EntitySystem`] that walks its
/// family's live result set every tick, bracketed by the begin/end hooks.
pub struct IteratingSystem<P> {
    processor: P,
    entities: Option<EntityList>,
}

impl<P: EntityProcessor> IteratingSystem<P> {
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            entities: None,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }
}

impl<P: EntityProcessor> EntitySystem for IteratingSystem<P> {
    fn update(&mut self, engine: &mut Engine, delta: f32) {
        let Some(entities) = self.entities.clone() else {
            return;
        };

        self.processor.begin(engine);
        for entity in entities.iter() {
            self.processor.process(&entity, engine, delta);
        }
        self.processor.end(engine);
    }

    fn added_to_engine(&mut self, engine: &mut Engine) {
        self.entities = Some(engine.entities_for(&self.processor.family()));
    }

    fn removed_from_engine(&mut self, _engine: &mut Engine) {
        self.entities = None;
    }

    fn priority(&self) -> i32 {
        self.processor.priority()
    }
}
