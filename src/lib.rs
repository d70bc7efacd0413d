//! A family-based entity component system (ECS).
//!
//! Game objects are composed out of plain data [`Component`]s attached to
//! [`Entity`] identities. A [`Family`] describes a query over required,
//! optional and excluded component kinds; the [`Engine`] keeps one live
//! result set per queried family, incrementally in sync with every entity,
//! and runs [`EntitySystem`]s over those sets once per tick.
//!
//! # Features
//! - O(1) family matching through per-kind bit indices
//! - Safe mutation from inside listeners and systems: structural changes
//!   requested mid-tick are queued and applied at a defined safe point
//! - Priority-ordered system updates and entity listener notifications
//! - A pooling layer ([`PooledEngine`]) that recycles entities and
//!   components instead of allocating per frame
//!
//! # Example
//! ```
//! use kindred::{Component, Engine, EntitySystem, Family};
//!
//! #[derive(Default)]
//! struct Position(f32, f32);
//! #[derive(Default)]
//! struct Velocity(f32, f32);
//! impl Component for Position {}
//! impl Component for Velocity {}
//!
//! struct Movement {
//!     family: Family,
//! }
//!
//! impl EntitySystem for Movement {
//!     fn update(&mut self, engine: &mut Engine, delta: f32) {
//!         for entity in engine.entities_for(&self.family).iter() {
//!             let (dx, dy) = {
//!                 let velocity = entity.get::<Velocity>().unwrap();
//!                 (velocity.0 * delta, velocity.1 * delta)
//!             };
//!             let mut position = entity.get_mut::<Position>().unwrap();
//!             position.0 += dx;
//!             position.1 += dy;
//!         }
//!     }
//! }
//!
//! let mut engine = Engine::new();
//! let family = Family::builder().with::<Position>().with::<Velocity>().build();
//! engine.add_system(Movement { family });
//!
//! let entity = engine.create_entity();
//! entity.add(Position(0.0, 0.0));
//! entity.add(Velocity(1.0, 0.0));
//! engine.add_entity(entity.clone()).unwrap();
//!
//! engine.update(1.0).unwrap();
//! assert_eq!(entity.get::<Position>().unwrap().0, 1.0);
//! ```

mod bits;
mod component;
mod engine;
mod entities;
mod entity;
mod error;
mod families;
mod family;
mod operations;
mod pool;
mod pooled;
mod signal;
mod systems;

pub use bits::Bits;
pub use component::{Component, ComponentType};
pub use engine::Engine;
pub use entity::{Entity, EntityRef};
pub use error::{Error, Result};
pub use families::{EntityList, EntityListener, EntityListenerRef};
pub use family::{Family, FamilyBuilder};
pub use pool::{Pool, Poolable};
pub use pooled::PooledEngine;
pub use signal::{Listener, ListenerRef, Signal};
pub use systems::{EntityProcessor, EntitySystem, IteratingSystem, SystemRef};
