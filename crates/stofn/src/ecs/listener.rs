//! # Listener — Non-Owning Subscriber Lists
//!
//! Subsystems that keep per-entity state (physics bodies, meshes, the scene's
//! own reverse index) need to hear about an entity *before* it dies so they
//! can drop their rows. They subscribe by handing the registry a
//! [`Weak`] reference to themselves:
//!
//! ```text
//! subsystem:  Rc<RefCell<Physics>>  ──owns──▶  Physics
//!                    │
//!                    └─downgrade─▶ Weak ──stored in──▶ ListenerList
//! ```
//!
//! The registry never keeps a subsystem alive. If the subsystem is dropped
//! without unregistering, its entry simply stops upgrading and is skipped,
//! then pruned on the next `register` call.
//!
//! ## Reentrancy
//!
//! Notification is synchronous, in registration order. Each listener is
//! borrowed mutably for the duration of its callback, so a listener that
//! re-enters the same list (or calls back into something that notifies it
//! again) hits a `RefCell` double borrow and panics. Callers must not
//! register or unregister on a list while it is notifying.

use std::cell::RefCell;
use std::rc::Weak;

/// An ordered set of weak listener references.
///
/// `L` is usually a trait object, e.g. `ListenerList<dyn SceneListener>`.
pub struct ListenerList<L: ?Sized> {
    listeners: Vec<Weak<RefCell<L>>>,
}

impl<L: ?Sized> ListenerList<L> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Subscribe `listener`. Returns `false` if it is already registered.
    pub fn register(&mut self, listener: Weak<RefCell<L>>) -> bool {
        self.prune();
        if self.position(&listener).is_some() {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Unsubscribe by swapping the last entry into the hole. Does not keep
    /// notification order.
    pub fn unregister_swap(&mut self, listener: &Weak<RefCell<L>>) -> bool {
        match self.position(listener) {
            Some(index) => {
                self.listeners.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Unsubscribe by shifting later entries down. Keeps notification order.
    pub fn unregister_shift(&mut self, listener: &Weak<RefCell<L>>) -> bool {
        match self.position(listener) {
            Some(index) => {
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of entries, including ones whose subsystem has been dropped but
    /// not yet pruned.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Invoke `f` on every live listener, in registration order.
    ///
    /// # Panics
    ///
    /// Panics if a listener is already mutably borrowed (re-entrant
    /// notification).
    pub fn notify(&self, mut f: impl FnMut(&mut L)) {
        for weak in &self.listeners {
            let Some(listener) = weak.upgrade() else {
                continue;
            };
            f(&mut *listener.borrow_mut());
        }
    }

    fn position(&self, listener: &Weak<RefCell<L>>) -> Option<usize> {
        self.listeners
            .iter()
            .position(|l| Weak::ptr_eq(l, listener))
    }

    fn prune(&mut self) {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.strong_count() > 0);
        let pruned = before - self.listeners.len();
        if pruned > 0 {
            log::trace!("pruned {pruned} dropped listener(s)");
        }
    }
}

impl<L: ?Sized> Default for ListenerList<L> {
    fn default() -> Self {
        Self::new()
    }
}
