//! Registration bookkeeping shared by the reference dispatchers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::host::Subscription;

/// An ordered list of shared observers keyed by subscription id.
///
/// Iteration re-borrows the list for every element, so observers may add or
/// remove registrations (including their own) from inside a callback. Ids grow
/// monotonically, so the walk resumes after the last visited id.
pub(crate) struct ObserverList<T: ?Sized> {
    entries: RefCell<Vec<(u64, Rc<T>)>>,
    next_id: Cell<u64>,
}

impl<T: ?Sized> ObserverList<T> {
    pub(crate) const fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    pub(crate) fn add(&self, observer: Rc<T>) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, observer));
        Subscription::new(id)
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub(crate) fn remove(&self, subscription: &Subscription) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(id, _)| *id != subscription.id());
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn for_each(&self, mut f: impl FnMut(&T)) {
        let mut last_id = 0;
        loop {
            let next = self
                .entries
                .borrow()
                .iter()
                .find(|(id, _)| *id > last_id)
                .map(|(id, observer)| (*id, Rc::clone(observer)));
            let Some((id, observer)) = next else {
                break;
            };
            last_id = id;
            f(&observer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_track_length() {
        let list: ObserverList<str> = ObserverList::new();
        let a = list.add(Rc::from("a"));
        let b = list.add(Rc::from("b"));
        assert_ne!(a, b);
        assert_eq!(list.len(), 2);

        assert!(list.remove(&a));
        assert!(!list.remove(&a));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn for_each_visits_in_registration_order() {
        let list: ObserverList<str> = ObserverList::new();
        let _first = list.add(Rc::from("first"));
        let _second = list.add(Rc::from("second"));

        let mut seen = Vec::new();
        list.for_each(|name| seen.push(name.to_string()));
        assert_eq!(seen, ["first", "second"]);
    }
}
