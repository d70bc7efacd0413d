use kindred::{component_bits, Component, ComponentType};

struct Position;
struct Velocity;
struct Health;

impl Component for Position {}
impl Component for Velocity {}
impl Component for Health {}

#[test]
fn distinct_kinds_get_distinct_indices() {
    let position = ComponentType::of::<Position>();
    let velocity = ComponentType::of::<Velocity>();
    let health = ComponentType::of::<Health>();

    assert_ne!(position.index(), velocity.index());
    assert_ne!(velocity.index(), health.index());
    assert_ne!(position.index(), health.index());
}

#[test]
fn resolution_is_idempotent() {
    let first = ComponentType::of::<Position>();
    let second = ComponentType::of::<Position>();

    assert_eq!(first, second);
    assert_eq!(first.index(), ComponentType::index_of::<Position>());
}

#[test]
fn bits_cover_exactly_the_given_kinds() {
    let bits = component_bits![Position, Health];

    assert!(bits.get(ComponentType::index_of::<Position>()));
    assert!(bits.get(ComponentType::index_of::<Health>()));
    assert!(!bits.get(ComponentType::index_of::<Velocity>()));
    assert_eq!(bits.ones().count(), 2);

    assert!(component_bits![].is_empty());
}
