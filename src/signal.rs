use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

/// Receives payloads dispatched through a [`Signal`].
///
/// Any `FnMut(&T)` closure is a listener.
pub trait Listener<T> {
    fn receive(&mut self, payload: &T);
}

impl<T, F> Listener<T> for F
where
    F: FnMut(&T),
{
    fn receive(&mut self, payload: &T) {
        (self)(payload)
    }
}

/// Shared handle to a registered listener. Identity is pointer identity.
pub type ListenerRef<T> = Rc<RefCell<dyn Listener<T>>>;

/// A minimal typed publish/subscribe primitive.
///
/// Dispatch is synchronous and iterates a snapshot of the subscriber list,
/// so a listener may remove itself, or add and remove other listeners,
/// mid-dispatch without disturbing the delivery in flight.
pub struct Signal<T> {
    listeners: RefCell<Vec<ListenerRef<T>>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: ListenerRef<T>) {
        self.listeners.borrow_mut().push(listener);
    }

    /// Wraps a closure into a listener, registers it and returns the handle
    /// used for later removal.
    pub fn connect(&self, f: impl FnMut(&T) + 'static) -> ListenerRef<T> {
        let listener: ListenerRef<T> = Rc::new(RefCell::new(f));
        self.add(listener.clone());
        listener
    }

    pub fn remove(&self, listener: &ListenerRef<T>) {
        self.listeners
            .borrow_mut()
            .retain(|l| !Rc::ptr_eq(l, listener));
    }

    pub fn remove_all(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Synchronously delivers `payload` to every listener registered at the
    /// start of the dispatch, in registration order.
    pub fn dispatch(&self, payload: &T) {
        let snapshot: SmallVec<[ListenerRef<T>; 4]> =
            self.listeners.borrow().iter().cloned().collect();

        for listener in snapshot {
            listener.borrow_mut().receive(payload);
        }
    }
}
