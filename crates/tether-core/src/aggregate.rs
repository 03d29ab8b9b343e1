#![forbid(unsafe_code)]

//! Cells folded from a dynamic set of sources.
//!
//! # Design
//!
//! [`Aggregate<T>`] owns a result cell created from the bias cell (so it
//! carries the bias's range settings) and a list of source cells in
//! insertion order. Every source value change, source addition or removal,
//! and bias value change triggers one synchronous recompute:
//!
//! ```text
//! acc = bias.value
//! for source in sources: acc = combine(acc, source.value)
//! result.value = constrain(acc)
//! ```
//!
//! The constraint applied is the bias cell's current one, so range changes
//! on the bias take effect on the next recompute.
//!
//! # Invariants
//!
//! 1. After any recompute, `result == constrain(fold(combine, bias, sources))`.
//! 2. A source appears at most once; adding it again is a no-op.
//! 3. One source change produces at most one result notification.
//!
//! # Failure Modes
//!
//! - **Source dropped**: the aggregate holds sources weakly. A dropped
//!   source stops contributing at the next recompute.
//! - **Aggregate dropped**: source subscriptions die with it; the result
//!   handle keeps the aggregate alive.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::bindable::{Bindable, Node};
use crate::read_only::ReadOnlyBindable;
use crate::subscription::Subscription;
use crate::value::BindValue;

struct SourceEntry<T: BindValue> {
    id: u64,
    node: Weak<Node<T>>,
    _subscription: Subscription,
}

struct AggregateInner<T: BindValue> {
    bias: Bindable<T>,
    result: Bindable<T>,
    combine: Box<dyn Fn(&T, &T) -> T>,
    sources: RefCell<Vec<SourceEntry<T>>>,
    bias_subscription: RefCell<Option<Subscription>>,
}

impl<T: BindValue> AggregateInner<T> {
    fn recompute(&self) {
        let values: Vec<T> = {
            let mut sources = self.sources.borrow_mut();
            sources.retain(|s| s.node.strong_count() > 0);
            sources
                .iter()
                .filter_map(|s| s.node.upgrade())
                .map(|node| node.value())
                .collect()
        };
        let folded = values
            .iter()
            .fold(self.bias.value(), |acc, value| (self.combine)(&acc, value));
        let constrained = self.bias.node.constrain(folded);
        self.result.node.assign_value(constrained);
    }

    fn subscribe_to(weak: &Weak<Self>, cell: &Bindable<T>) -> Subscription {
        let weak = Weak::clone(weak);
        cell.on_value_changed(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.recompute();
            }
        })
    }
}

/// A read-only value folded from a bias and a dynamic list of sources.
///
/// Cloning an `Aggregate` creates a new handle to the **same** aggregate.
pub struct Aggregate<T: BindValue> {
    inner: Rc<AggregateInner<T>>,
}

impl<T: BindValue> Clone for Aggregate<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: BindValue> fmt::Debug for Aggregate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("value", &self.value())
            .field("sources", &self.source_count())
            .finish()
    }
}

impl<T: BindValue> Aggregate<T> {
    /// Create an aggregate seeded with `bias`, whose value is the identity
    /// element of `combine`.
    pub fn new(bias: &Bindable<T>, combine: impl Fn(&T, &T) -> T + 'static) -> Self {
        let inner = Rc::new(AggregateInner {
            bias: bias.clone(),
            result: bias.create_instance(),
            combine: Box::new(combine),
            sources: RefCell::new(Vec::new()),
            bias_subscription: RefCell::new(None),
        });
        let subscription = AggregateInner::subscribe_to(&Rc::downgrade(&inner), bias);
        *inner.bias_subscription.borrow_mut() = Some(subscription);
        inner.recompute();
        Self { inner }
    }

    /// The cell holding the folded value.
    #[must_use]
    pub fn result(&self) -> ReadOnlyBindable<T> {
        let keep: Rc<dyn Any> = self.inner.clone();
        ReadOnlyBindable::with_keepalive(self.inner.result.clone(), keep)
    }

    #[must_use]
    pub fn value(&self) -> T {
        self.inner.result.value()
    }

    #[must_use]
    pub fn bias(&self) -> &Bindable<T> {
        &self.inner.bias
    }

    /// Append `source` and recompute. Returns `false` if it was already a
    /// source.
    pub fn add_source(&self, source: &Bindable<T>) -> bool {
        let id = source.id();
        if self.inner.sources.borrow().iter().any(|s| s.id == id) {
            return false;
        }
        let subscription = AggregateInner::subscribe_to(&Rc::downgrade(&self.inner), source);
        self.inner.sources.borrow_mut().push(SourceEntry {
            id,
            node: Rc::downgrade(&source.node),
            _subscription: subscription,
        });
        debug!(message = "aggregate.add_source", result = self.inner.result.id(), source = id);
        self.inner.recompute();
        true
    }

    /// Remove `source` and recompute. Returns `false` if it was not a source.
    pub fn remove_source(&self, source: &Bindable<T>) -> bool {
        let id = source.id();
        let removed = {
            let mut sources = self.inner.sources.borrow_mut();
            let before = sources.len();
            sources.retain(|s| s.id != id);
            sources.len() != before
        };
        if removed {
            debug!(message = "aggregate.remove_source", result = self.inner.result.id(), source = id);
            self.inner.recompute();
        }
        removed
    }

    pub fn remove_all_sources(&self) {
        let drained = std::mem::take(&mut *self.inner.sources.borrow_mut());
        if !drained.is_empty() {
            debug!(
                message = "aggregate.clear_sources",
                result = self.inner.result.id(),
                count = drained.len()
            );
            drop(drained);
            self.inner.recompute();
        }
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.inner
            .sources
            .borrow()
            .iter()
            .filter(|s| s.node.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::BindableDouble;
    use std::cell::Cell;
    use tracing_test::traced_test;

    fn product(bias: &Bindable<f64>) -> Aggregate<f64> {
        Aggregate::new(bias, |a, b| a * b)
    }

    #[test]
    fn folds_in_insertion_order() {
        let bias = Bindable::new(String::new());
        let agg = Aggregate::new(&bias, |a: &String, b: &String| format!("{a}{b}"));
        let (x, y) = (Bindable::new("x".to_owned()), Bindable::new("y".to_owned()));
        agg.add_source(&y);
        agg.add_source(&x);
        assert_eq!(agg.value(), "yx");
    }

    #[test]
    fn source_change_recomputes_once() {
        let bias = Bindable::new(1.0);
        let agg = product(&bias);
        let a = Bindable::new(2.0);
        let b = Bindable::new(3.0);
        agg.add_source(&a);
        agg.add_source(&b);
        let result = agg.result();
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        let _s = result.on_value_changed(move |_| f.set(f.get() + 1));

        a.set_value(4.0).unwrap();
        assert_eq!(result.value(), 12.0);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn bias_change_recomputes() {
        let bias = Bindable::new(1.0);
        let agg = product(&bias);
        let a = Bindable::new(2.0);
        agg.add_source(&a);
        bias.set_value(5.0).unwrap();
        assert_eq!(agg.value(), 10.0);
    }

    #[test]
    fn duplicates_and_unknown_sources_are_ignored() {
        let bias = Bindable::new(1.0);
        let agg = product(&bias);
        let a = Bindable::new(2.0);
        assert!(agg.add_source(&a));
        assert!(!agg.add_source(&a));
        assert_eq!(agg.value(), 2.0);
        assert!(!agg.remove_source(&Bindable::new(2.0)));
        assert_eq!(agg.source_count(), 1);
    }

    #[test]
    fn removed_source_no_longer_drives_result() {
        let bias = Bindable::new(1.0);
        let agg = product(&bias);
        let a = Bindable::new(2.0);
        agg.add_source(&a);
        agg.remove_source(&a);
        a.set_value(8.0).unwrap();
        assert_eq!(agg.value(), 1.0);
    }

    #[test]
    fn dropped_source_stops_contributing() {
        let bias = Bindable::new(1.0);
        let agg = product(&bias);
        let keep = Bindable::new(3.0);
        agg.add_source(&keep);
        {
            let temp = Bindable::new(2.0);
            agg.add_source(&temp);
            assert_eq!(agg.value(), 6.0);
        }
        assert_eq!(agg.source_count(), 1);
        keep.set_value(4.0).unwrap();
        assert_eq!(agg.value(), 4.0);
    }

    #[test]
    fn result_inherits_bias_range() {
        let bias = BindableDouble::new(1.0).with_range(0.0, 2.0);
        let agg = product(&bias);
        let a = Bindable::new(-1.0);
        agg.add_source(&a);
        assert_eq!(agg.value(), 0.0);
        let b = Bindable::new(-4.0);
        agg.add_source(&b);
        assert_eq!(agg.value(), 2.0);
        agg.remove_all_sources();
        assert_eq!(agg.value(), 1.0);
    }

    #[test]
    fn result_handle_outlives_aggregate_handle() {
        let bias = Bindable::new(1.0);
        let a = Bindable::new(2.0);
        let result = {
            let agg = product(&bias);
            agg.add_source(&a);
            agg.result()
        };
        a.set_value(7.0).unwrap();
        assert_eq!(result.value(), 7.0);
    }

    #[test]
    #[traced_test]
    fn logs_source_changes() {
        let bias = Bindable::new(1.0);
        let agg = product(&bias);
        let a = Bindable::new(2.0);
        agg.add_source(&a);
        agg.remove_source(&a);
        assert!(logs_contain("aggregate.add_source"));
        assert!(logs_contain("aggregate.remove_source"));
    }
}
