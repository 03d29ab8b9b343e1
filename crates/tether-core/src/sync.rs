#![forbid(unsafe_code)]

//! Two-way synchronisation between cells of different types.
//!
//! [`Bindable::sync_with`] keeps a destination cell in step with a source
//! cell through a pair of conversions. A destination value that has no
//! source counterpart is rejected by writing the converted source value back
//! into the destination.
//!
//! # Invariants
//!
//! 1. While the [`Synchronization`] is alive, `dest == to_dest(source)` after
//!    every settled write on either side.
//! 2. Disabled flags are mirrored in both directions.
//! 3. A re-entrancy guard stops a mirrored write from echoing back.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::bindable::{Bindable, Node};
use crate::error::Result;
use crate::subscription::SubscriptionScope;
use crate::value::BindValue;

/// Guard for a live [`Bindable::sync_with`] link. Drop it to stop syncing.
#[must_use = "dropping a Synchronization stops syncing immediately"]
pub struct Synchronization {
    _subscriptions: SubscriptionScope,
    _guard: Rc<Cell<bool>>,
}

impl fmt::Debug for Synchronization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronization").finish_non_exhaustive()
    }
}

/// Run `f` unless a mirrored write is already in flight.
fn guarded(guard: &Cell<bool>, f: impl FnOnce()) {
    if guard.replace(true) {
        return;
    }
    f();
    guard.set(false);
}

fn mirror<V: BindValue>(node: &Weak<Node<V>>, value: V) {
    if let Some(node) = node.upgrade() {
        let value = node.constrain(value);
        trace!(message = "bindable.sync", cell = node.id());
        node.assign_value(value);
    }
}

impl<T: BindValue> Bindable<T> {
    /// Keep this cell synchronised with `source`.
    ///
    /// The destination (`self`) is immediately set to `to_dest(source)`.
    /// Afterwards source changes are converted with `to_dest`; destination
    /// changes are converted with `from_dest`, and a `None` result restores
    /// `to_dest(source)` in the destination.
    pub fn sync_with<S: BindValue>(
        &self,
        source: &Bindable<S>,
        to_dest: impl Fn(&S) -> T + 'static,
        from_dest: impl Fn(&T) -> Option<S> + 'static,
    ) -> Result<Synchronization> {
        self.set_value(source.with_value(&to_dest))?;
        self.node.assign_disabled(source.is_disabled());

        let guard = Rc::new(Cell::new(false));
        let to_dest = Rc::new(to_dest);
        let dest_node = Rc::downgrade(&self.node);
        let source_node = Rc::downgrade(&source.node);
        let mut scope = SubscriptionScope::new();

        {
            let (guard, to_dest, dest) = (Rc::clone(&guard), Rc::clone(&to_dest), dest_node.clone());
            scope.hold(source.on_value_changed(move |e| {
                guarded(&guard, || mirror(&dest, to_dest(&e.new)));
            }));
        }
        {
            let (guard, dest, source) = (Rc::clone(&guard), dest_node.clone(), source_node.clone());
            scope.hold(self.on_value_changed(move |e| {
                guarded(&guard, || match from_dest(&e.new) {
                    Some(value) => mirror(&source, value),
                    None => {
                        if let Some(current) = source.upgrade().map(|n| n.value()) {
                            mirror(&dest, to_dest(&current));
                        }
                    }
                });
            }));
        }
        {
            let (guard, dest) = (Rc::clone(&guard), dest_node);
            scope.hold(source.on_disabled_changed(move |d| {
                guarded(&guard, || {
                    if let Some(node) = dest.upgrade() {
                        node.assign_disabled(*d);
                    }
                });
            }));
        }
        {
            let (guard, source) = (Rc::clone(&guard), source_node);
            scope.hold(self.on_disabled_changed(move |d| {
                guarded(&guard, || {
                    if let Some(node) = source.upgrade() {
                        node.assign_disabled(*d);
                    }
                });
            }));
        }

        debug!(message = "bindable.sync_with", cell = self.id(), source = source.id());
        Ok(Synchronization {
            _subscriptions: scope,
            _guard: guard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn text_for_number(source: &Bindable<i32>) -> (Bindable<String>, Synchronization) {
        let dest = Bindable::new(String::new());
        let sync = dest
            .sync_with(source, |v| v.to_string(), |s: &String| s.parse().ok())
            .unwrap();
        (dest, sync)
    }

    #[test]
    fn initial_value_is_converted() {
        let source = Bindable::new(7);
        let (dest, _sync) = text_for_number(&source);
        assert_eq!(dest.value(), "7");
    }

    #[test]
    fn changes_flow_both_ways() {
        let source = Bindable::new(1);
        let (dest, _sync) = text_for_number(&source);
        source.set_value(2).unwrap();
        assert_eq!(dest.value(), "2");
        dest.set_value("40".to_owned()).unwrap();
        assert_eq!(source.value(), 40);
    }

    #[test]
    fn invalid_destination_value_is_reverted() {
        let source = Bindable::new(3);
        let (dest, _sync) = text_for_number(&source);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = dest.on_value_changed(move |e| s.borrow_mut().push(e.new.clone()));

        dest.set_value("abc".to_owned()).unwrap();
        assert_eq!(dest.value(), "3");
        assert_eq!(source.value(), 3);
        assert!(seen.borrow().contains(&"3".to_owned()));
    }

    #[test]
    fn disabled_is_mirrored() {
        let source = Bindable::new(0);
        let (dest, _sync) = text_for_number(&source);
        source.set_disabled(true).unwrap();
        assert!(dest.is_disabled());
        source.set_disabled(false).unwrap();
        dest.set_disabled(true).unwrap();
        assert!(source.is_disabled());
    }

    #[test]
    fn dropping_guard_stops_sync() {
        let source = Bindable::new(0);
        let (dest, sync) = text_for_number(&source);
        drop(sync);
        source.set_value(9).unwrap();
        assert_eq!(dest.value(), "0");
    }
}
