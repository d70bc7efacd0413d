use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kindred::{
    Component, Engine, EntityListener, EntityListenerRef, EntityRef, EntitySystem, Error, Family,
    Result,
};

#[derive(Default)]
struct Counter(u32);
#[derive(Default)]
struct Tag;

impl Component for Counter {}
impl Component for Tag {}

/// Records the events it receives, tagged so interleavings across several
/// listeners are visible in one log.
struct Recorder {
    tag: i32,
    log: Rc<RefCell<Vec<(i32, &'static str)>>>,
}

impl EntityListener for Recorder {
    fn entity_added(&mut self, _entity: &EntityRef) {
        self.log.borrow_mut().push((self.tag, "added"));
    }

    fn entity_removed(&mut self, _entity: &EntityRef) {
        self.log.borrow_mut().push((self.tag, "removed"));
    }
}

struct FnSystem<F> {
    f: F,
}

impl<F: FnMut(&mut Engine, f32) + 'static> EntitySystem for FnSystem<F> {
    fn update(&mut self, engine: &mut Engine, delta: f32) {
        (self.f)(engine, delta);
    }
}

fn recorder(tag: i32, log: &Rc<RefCell<Vec<(i32, &'static str)>>>) -> EntityListenerRef {
    Rc::new(RefCell::new(Recorder {
        tag,
        log: log.clone(),
    }))
}

#[test]
fn listeners_fire_in_priority_order() {
    let mut engine = Engine::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    for priority in [4, -3, 0] {
        engine.add_entity_listener_filtered(Family::empty(), priority, recorder(priority, &log));
    }

    let entity = engine.create_entity();
    engine.add_entity(entity.clone()).unwrap();
    assert_eq!(
        *log.borrow(),
        vec![(-3, "added"), (0, "added"), (4, "added")]
    );

    log.borrow_mut().clear();
    engine.remove_entity(&entity);
    assert_eq!(
        *log.borrow(),
        vec![(-3, "removed"), (0, "removed"), (4, "removed")]
    );
}

#[test]
fn adding_a_resident_entity_is_an_error() {
    let mut engine = Engine::new();
    let entity = engine.create_entity();
    engine.add_entity(entity.clone()).unwrap();

    assert_eq!(
        engine.add_entity(entity.clone()),
        Err(Error::EntityAlreadyAdded)
    );

    let mut other = Engine::new();
    assert_eq!(
        other.add_entity(entity.clone()),
        Err(Error::EntityAlreadyAdded),
        "an entity belongs to at most one engine"
    );

    engine.remove_entity(&entity);
    other.add_entity(entity).unwrap();
}

#[test]
fn readding_while_scheduled_for_removal_is_an_error() {
    let mut engine = Engine::new();
    let entity = engine.create_entity();
    engine.add_entity(entity.clone()).unwrap();

    let attempt: Rc<RefCell<Option<Result<()>>>> = Rc::new(RefCell::new(None));
    {
        let entity = entity.clone();
        let attempt = attempt.clone();
        engine.add_system(FnSystem {
            f: move |engine: &mut Engine, _| {
                engine.remove_entity(&entity);
                assert!(entity.is_scheduled_for_removal());
                *attempt.borrow_mut() = Some(engine.add_entity(entity.clone()));
            },
        });
    }

    engine.update(0.0).unwrap();
    assert_eq!(*attempt.borrow(), Some(Err(Error::ScheduledForRemoval)));
    assert!(engine.entities().is_empty());

    // once the removal has been processed the entity is free again
    engine.add_entity(entity.clone()).unwrap();
    assert!(!entity.is_scheduled_for_removal());
}

#[test]
fn nested_update_is_rejected_without_a_second_pass() {
    let mut engine = Engine::new();
    let runs = Rc::new(Cell::new(0u32));
    let nested: Rc<RefCell<Option<Result<()>>>> = Rc::new(RefCell::new(None));
    {
        let runs = runs.clone();
        let nested = nested.clone();
        engine.add_system(FnSystem {
            f: move |engine: &mut Engine, _| {
                runs.set(runs.get() + 1);
                assert!(engine.is_updating());
                *nested.borrow_mut() = Some(engine.update(1.0));
            },
        });
    }

    engine.update(0.0).unwrap();
    assert_eq!(*nested.borrow(), Some(Err(Error::ReentrantUpdate)));
    assert_eq!(runs.get(), 1);
    assert!(!engine.is_updating());

    // the engine stays usable afterwards
    engine.update(0.0).unwrap();
    assert_eq!(runs.get(), 2);
}

#[test]
fn additions_mid_update_land_at_the_flush() {
    let mut engine = Engine::new();
    {
        engine.add_system(FnSystem {
            f: move |engine: &mut Engine, _| {
                if !engine.entities().is_empty() {
                    return;
                }

                let entity = engine.create_entity();
                engine.add_entity(entity.clone()).unwrap();
                entity.add(Counter(7));

                assert!(engine.entities().is_empty());
                assert!(!entity.has::<Counter>());
                assert!(engine.has_pending_operations());
            },
        });
    }

    engine.update(0.0).unwrap();
    assert!(!engine.has_pending_operations());
    assert_eq!(engine.entities().len(), 1);

    let family = Family::builder().with::<Counter>().build();
    let entities = engine.entities_for(&family);
    assert_eq!(entities.len(), 1);
    assert_eq!(entities.first().unwrap().get::<Counter>().unwrap().0, 7);
}

#[test]
fn mutations_mid_update_apply_after_the_tick() {
    let mut engine = Engine::new();
    let family = Family::builder().with::<Counter>().build();
    for _ in 0..10 {
        let entity = engine.create_entity();
        entity.add(Counter(0));
        engine.add_entity(entity).unwrap();
    }

    {
        let family = family.clone();
        engine.add_system(FnSystem {
            f: move |engine: &mut Engine, _| {
                for (index, entity) in engine.entities_for(&family).iter().enumerate() {
                    if index % 2 == 0 {
                        entity.get_mut::<Counter>().unwrap().0 += 1;
                    } else {
                        engine.remove_entity(&entity);
                    }
                }
            },
        });
    }

    engine.update(1.0).unwrap();
    assert!(!engine.has_pending_operations());
    assert_eq!(engine.entities().len(), 5);

    let remaining = engine.entities_for(&family);
    assert_eq!(remaining.len(), 5);
    for entity in remaining.iter() {
        assert_eq!(entity.get::<Counter>().unwrap().0, 1);
    }
}

#[test]
fn filtered_listeners_track_membership_transitions() {
    let mut engine = Engine::new();
    let family = Family::builder().with::<Counter>().build();
    let log = Rc::new(RefCell::new(Vec::new()));
    let listener = recorder(1, &log);
    engine.add_entity_listener_filtered(family, 0, listener.clone());

    let entity = engine.create_entity();
    engine.add_entity(entity.clone()).unwrap();
    assert!(log.borrow().is_empty(), "the entity is not yet a member");

    entity.add(Counter(0));
    assert_eq!(*log.borrow(), vec![(1, "added")]);

    assert!(entity.remove::<Counter>());
    assert_eq!(*log.borrow(), vec![(1, "added"), (1, "removed")]);

    entity.add(Counter(0));
    log.borrow_mut().clear();
    engine.remove_entity(&entity);
    assert_eq!(*log.borrow(), vec![(1, "removed")]);

    engine.remove_entity_listener(&listener);
    let entity = engine.create_entity();
    entity.add(Counter(0));
    engine.add_entity(entity).unwrap();
    assert_eq!(*log.borrow(), vec![(1, "removed")]);
}

#[test]
fn engine_wide_listeners_ignore_component_changes() {
    let mut engine = Engine::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let entity = engine.create_entity();
    engine.add_entity(entity.clone()).unwrap();

    engine.add_entity_listener_filtered(Family::empty(), 0, recorder(0, &log));
    let late = engine.create_entity();
    engine.add_entity(late).unwrap();
    assert_eq!(log.borrow().len(), 1);

    entity.add(Counter(0));
    entity.remove::<Counter>();
    assert_eq!(log.borrow().len(), 1, "membership in the empty family never changes");
}

#[test]
fn removal_notifications_see_the_entity_on_its_way_out() {
    struct Probe {
        observed_removing: Rc<Cell<bool>>,
        observed_member: Rc<Cell<bool>>,
        list: kindred::EntityList,
    }

    impl EntityListener for Probe {
        fn entity_removed(&mut self, entity: &EntityRef) {
            self.observed_removing.set(entity.is_removing());
            self.observed_member.set(self.list.contains(entity));
        }
    }

    let mut engine = Engine::new();
    let family = Family::builder().with::<Tag>().build();
    let observed_removing = Rc::new(Cell::new(false));
    let observed_member = Rc::new(Cell::new(true));
    engine.add_entity_listener_filtered(
        family.clone(),
        0,
        Rc::new(RefCell::new(Probe {
            observed_removing: observed_removing.clone(),
            observed_member: observed_member.clone(),
            list: engine.entities_for(&family),
        })),
    );

    let entity = engine.create_entity();
    entity.add(Tag);
    engine.add_entity(entity.clone()).unwrap();

    engine.remove_entity(&entity);
    assert!(observed_removing.get());
    assert!(
        !observed_member.get(),
        "the result set excludes the entity by the time listeners run"
    );
    assert!(!entity.is_removing(), "transient state is cleared afterwards");
}

#[test]
fn panicking_listener_leaves_the_engine_usable() {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    struct Grumpy;

    impl EntityListener for Grumpy {
        fn entity_added(&mut self, _entity: &EntityRef) {
            panic!("listener failure");
        }
    }

    let mut engine = Engine::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let grumpy: EntityListenerRef = Rc::new(RefCell::new(Grumpy));
    engine.add_entity_listener_filtered(Family::empty(), -1, grumpy.clone());
    engine.add_entity_listener_filtered(Family::empty(), 0, recorder(0, &log));

    let entity = engine.create_entity();
    let outcome = catch_unwind(AssertUnwindSafe(|| engine.add_entity(entity.clone())));
    assert!(outcome.is_err(), "the listener panic propagates to the caller");
    assert!(!engine.is_updating());

    // dispatch still works once the failing listener is gone
    engine.remove_entity_listener(&grumpy);
    let second = engine.create_entity();
    engine.add_entity(second).unwrap();
    assert_eq!(*log.borrow(), vec![(0, "added")]);
    engine.update(0.0).unwrap();
}

#[test]
fn panicking_system_leaves_the_engine_idle() {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    struct Faulty;

    impl EntitySystem for Faulty {
        fn update(&mut self, _engine: &mut Engine, _delta: f32) {
            panic!("system failure");
        }
    }

    let mut engine = Engine::new();
    engine.add_system(Faulty);

    let outcome = catch_unwind(AssertUnwindSafe(|| engine.update(0.0)));
    assert!(outcome.is_err(), "the system panic propagates to the caller");
    assert!(!engine.is_updating());

    engine.remove_system::<Faulty>();
    engine.update(0.0).unwrap();

    // the engine still accepts and dispatches mutations afterwards
    let entity = engine.create_entity();
    entity.add(Counter(1));
    engine.add_entity(entity.clone()).unwrap();
    assert_eq!(engine.entities().len(), 1);
    assert_eq!(entity.get::<Counter>().unwrap().0, 1);
}

#[test]
fn remove_all_entities_clears_the_engine() {
    let mut engine = Engine::new();
    let family = Family::builder().with::<Counter>().build();
    for index in 0..4 {
        let entity = engine.create_entity();
        if index % 2 == 0 {
            entity.add(Counter(0));
        }
        engine.add_entity(entity).unwrap();
    }

    engine.remove_all_entities_of(&family);
    assert_eq!(engine.entities().len(), 2);
    assert!(engine.entities_for(&family).is_empty());

    engine.remove_all_entities();
    assert!(engine.entities().is_empty());
}
