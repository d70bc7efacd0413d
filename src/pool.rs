/// Reset-on-return contract for pooled objects.
pub trait Poolable {
    /// Restores the object to its default state before it is retained.
    fn reset(&mut self);
}

/// A bounded free-list of reusable objects.
///
/// Every freed object is reset; at most `max` are retained and the rest are
/// discarded, which keeps the pool from growing without bound after a load
/// spike.
pub struct Pool<T: Poolable> {
    free: Vec<T>,
    max: usize,
}

impl<T: Poolable> Pool<T> {
    /// A pool that pre-reserves space for `initial` free objects and retains
    /// at most `max`.
    pub fn new(initial: usize, max: usize) -> Self {
        Self {
            free: Vec::with_capacity(initial.min(max)),
            max,
        }
    }

    /// Pops a recycled object, or builds a fresh one with `create`.
    pub fn obtain(&mut self, create: impl FnOnce() -> T) -> T {
        self.free.pop().unwrap_or_else(create)
    }

    /// Resets `value` and returns it to the pool. Beyond `max` the object is
    /// still reset but dropped instead of retained.
    pub fn free(&mut self, mut value: T) {
        value.reset();
        if self.free.len() < self.max {
            self.free.push(value);
        }
    }

    /// Discards all free objects.
    pub fn clear(&mut self) {
        self.free.clear();
    }

    /// The number of free objects currently retained.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}
