#![forbid(unsafe_code)]

//! Observer lists and RAII subscription guards.
//!
//! A [`Subscribers<A>`] list stores callbacks weakly; the strong reference
//! lives inside the [`Subscription`] returned to the caller. Dropping the
//! guard detaches the callback, and dead entries are pruned lazily on the
//! next notification.
//!
//! # Invariants
//!
//! 1. Callbacks run in registration order.
//! 2. No borrow of the list is held while a callback runs, so callbacks may
//!    subscribe, unsubscribe or trigger further notifications on the same list.
//! 3. A callback registered during a notification cycle is first invoked on
//!    the next cycle.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<A> = dyn Fn(&A);

/// An ordered, weakly-held list of callbacks receiving `&A`.
///
/// Exposed for the collection cells; most callers use the `on_*` methods of
/// a cell instead.
pub struct Subscribers<A> {
    entries: RefCell<Vec<Weak<Callback<A>>>>,
}

impl<A> Default for Subscribers<A> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }
}

impl<A: 'static> Subscribers<A> {
    pub fn subscribe(&self, callback: impl Fn(&A) + 'static) -> Subscription {
        let strong: Rc<Callback<A>> = Rc::new(callback);
        self.entries.borrow_mut().push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Invoke every live callback with `args`.
    pub fn notify(&self, args: &A) {
        let live: Vec<Rc<Callback<A>>> = {
            let mut entries = self.entries.borrow_mut();
            entries.retain(|w| w.strong_count() > 0);
            entries.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in live {
            callback(args);
        }
    }

    /// Detach every callback. Outstanding guards become inert.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Number of callbacks whose guard is still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

/// RAII guard keeping a callback registered. Drop it to unsubscribe.
#[must_use = "dropping a Subscription unsubscribes the callback immediately"]
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// A set of subscriptions released together.
///
/// Useful for an owner that wires several observers and wants them all gone
/// when it is dropped or reset.
#[derive(Debug, Default)]
pub struct SubscriptionScope {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `subscription` for the lifetime of the scope.
    pub fn hold(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Drop every held subscription.
    pub fn release(&mut self) {
        self.subscriptions.clear();
    }
}

impl Extend<Subscription> for SubscriptionScope {
    fn extend<I: IntoIterator<Item = Subscription>>(&mut self, iter: I) {
        self.subscriptions.extend(iter);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
