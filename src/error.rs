use thiserror::Error;

/// Invariant violations reported synchronously to the caller.
///
/// These are programmer errors, not recoverable conditions. The offending
/// call is aborted without corrupting any manager state. Not-found
/// conditions, such as removing a component an entity does not have, are
/// signalled through `Option`/`bool` results instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cannot call update on an engine that is already updating")]
    ReentrantUpdate,
    #[error("the entity is already registered with an engine")]
    EntityAlreadyAdded,
    #[error("the entity is still scheduled for removal")]
    ScheduledForRemoval,
}

pub type Result<T> = std::result::Result<T, Error>;
