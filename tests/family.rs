use kindred::{Component, Engine, Entity, Family};

#[derive(Default)]
struct Position;
#[derive(Default)]
struct Velocity;
#[derive(Default)]
struct Frozen;

impl Component for Position {}
impl Component for Velocity {}
impl Component for Frozen {}

#[test]
fn equal_descriptions_intern_to_the_same_family() {
    let a = Family::builder()
        .with::<Position>()
        .with::<Velocity>()
        .without::<Frozen>()
        .build();
    let b = Family::builder()
        .without::<Frozen>()
        .with::<Velocity>()
        .with::<Position>()
        .build();
    let c = Family::builder().with::<Position>().build();

    assert_eq!(a, b);
    assert_eq!(a.index(), b.index());
    assert_ne!(a, c);
}

#[test]
fn matching_honours_all_one_and_exclude() {
    let family = Family::builder()
        .with::<Position>()
        .one_of::<Velocity>()
        .one_of::<Frozen>()
        .build();

    let moving = Entity::new();
    moving.add(Position);
    moving.add(Velocity);
    assert!(moving.matches(&family));

    let bare = Entity::new();
    bare.add(Position);
    assert!(!bare.matches(&family), "no kind from the one set");

    let fast = Entity::new();
    fast.add(Velocity);
    assert!(!fast.matches(&family), "missing a required kind");

    let excluding = Family::builder()
        .with::<Position>()
        .without::<Frozen>()
        .build();
    let frozen = Entity::new();
    frozen.add(Position);
    frozen.add(Frozen);
    assert!(!frozen.matches(&excluding));
    assert!(frozen.remove::<Frozen>());
    assert!(frozen.matches(&excluding));
}

#[test]
fn empty_family_matches_every_entity() {
    let empty = Family::empty();

    let blank = Entity::new();
    assert!(blank.matches(&empty));

    let mut engine = Engine::new();
    let entity = engine.create_entity();
    entity.add(Position);
    engine.add_entity(entity).unwrap();
    let other = engine.create_entity();
    engine.add_entity(other).unwrap();

    assert_eq!(engine.entities_for(&empty).len(), 2);
}

#[test]
fn result_sets_follow_component_changes() {
    let mut engine = Engine::new();
    let movers = Family::builder()
        .with::<Position>()
        .with::<Velocity>()
        .build();
    let active = Family::builder()
        .with::<Position>()
        .without::<Frozen>()
        .build();

    let a = engine.create_entity();
    a.add(Position);
    engine.add_entity(a.clone()).unwrap();

    let b = engine.create_entity();
    b.add(Position);
    b.add(Velocity);
    engine.add_entity(b.clone()).unwrap();

    assert_eq!(engine.entities_for(&movers).len(), 1);
    assert!(engine.entities_for(&movers).contains(&b));
    assert_eq!(engine.entities_for(&active).len(), 2);

    a.add(Velocity);
    assert_eq!(engine.entities_for(&movers).len(), 2);

    b.add(Frozen);
    assert!(!engine.entities_for(&active).contains(&b));

    engine.remove_entity(&a);
    assert_eq!(engine.entities_for(&movers).len(), 1);
    assert!(!engine.entities_for(&movers).contains(&a));
}
