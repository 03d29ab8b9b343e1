#![forbid(unsafe_code)]

//! Read-only projections of cells.
//!
//! A [`ReadOnlyBindable<T>`] exposes the observable surface of a cell without
//! any write operation. Derived cells ([`Bindable::map`], aggregate results)
//! are handed out this way; the projection keeps whatever drives the cell
//! alive for as long as any handle to it exists.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Serialize, Serializer};

use crate::bindable::{Bindable, Node, ValueChanged};
use crate::format::NumberFormat;
use crate::subscription::Subscription;
use crate::value::BindValue;

/// Observable, non-writable view of a cell.
pub struct ReadOnlyBindable<T: BindValue> {
    cell: Bindable<T>,
    _keep: Option<Rc<dyn Any>>,
}

impl<T: BindValue> Clone for ReadOnlyBindable<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            _keep: self._keep.clone(),
        }
    }
}

impl<T: BindValue> fmt::Debug for ReadOnlyBindable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyBindable")
            .field("value", &self.value())
            .field("disabled", &self.is_disabled())
            .finish()
    }
}

impl<T: BindValue> fmt::Display for ReadOnlyBindable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cell, f)
    }
}

impl<T: BindValue> From<Bindable<T>> for ReadOnlyBindable<T> {
    fn from(cell: Bindable<T>) -> Self {
        Self { cell, _keep: None }
    }
}

impl<T: BindValue> ReadOnlyBindable<T> {
    pub(crate) fn with_keepalive(cell: Bindable<T>, keep: Rc<dyn Any>) -> Self {
        Self {
            cell,
            _keep: Some(keep),
        }
    }

    #[must_use]
    pub fn value(&self) -> T {
        self.cell.value()
    }

    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with_value(f)
    }

    #[must_use]
    pub fn default_value(&self) -> T {
        self.cell.default_value()
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.cell.is_default()
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.cell.is_disabled()
    }

    #[must_use]
    pub fn description(&self) -> Option<String> {
        self.cell.description()
    }

    #[must_use]
    pub fn to_text(&self, format: &NumberFormat) -> String {
        self.cell.to_text(format)
    }

    pub fn on_value_changed(&self, f: impl Fn(&ValueChanged<T>) + 'static) -> Subscription {
        self.cell.on_value_changed(f)
    }

    pub fn on_default_changed(&self, f: impl Fn(&ValueChanged<T>) + 'static) -> Subscription {
        self.cell.on_default_changed(f)
    }

    pub fn on_disabled_changed(&self, f: impl Fn(&bool) + 'static) -> Subscription {
        self.cell.on_disabled_changed(f)
    }

    pub fn bind_value_changed(
        &self,
        f: impl Fn(&ValueChanged<T>) + 'static,
        run_once_immediately: bool,
    ) -> Subscription {
        self.cell.bind_value_changed(f, run_once_immediately)
    }

    pub fn bind_disabled_changed(
        &self,
        f: impl Fn(&bool) + 'static,
        run_once_immediately: bool,
    ) -> Subscription {
        self.cell.bind_disabled_changed(f, run_once_immediately)
    }

    /// A writable cell bound to this view, following every change.
    ///
    /// Writes to the copy propagate back into the projection's cell, so this
    /// is meant for consumers that need a `Bindable` handle to read from.
    #[must_use]
    pub fn get_bound_copy(&self) -> Bindable<T> {
        self.cell.get_bound_copy()
    }
}

impl<T: BindValue + Serialize> Serialize for ReadOnlyBindable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.cell.serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Bindable::map
// ---------------------------------------------------------------------------

struct MapGuards {
    _value: Subscription,
    _disabled: Subscription,
}

impl<T: BindValue> Bindable<T> {
    /// A read-only cell holding `f(value)`, updated on every value change
    /// and mirroring the disabled flag.
    pub fn map<U: BindValue>(&self, f: impl Fn(&T) -> U + 'static) -> ReadOnlyBindable<U> {
        let target = Bindable::new(self.with_value(&f));
        target.node.assign_disabled(self.is_disabled());

        let weak: Weak<Node<U>> = Rc::downgrade(&target.node);
        let value = self.on_value_changed(move |e| {
            if let Some(node) = weak.upgrade() {
                node.assign_value(f(&e.new));
            }
        });
        let weak: Weak<Node<U>> = Rc::downgrade(&target.node);
        let disabled = self.on_disabled_changed(move |d| {
            if let Some(node) = weak.upgrade() {
                node.assign_disabled(*d);
            }
        });

        let guards: Rc<dyn Any> = Rc::new(MapGuards {
            _value: value,
            _disabled: disabled,
        });
        ReadOnlyBindable::with_keepalive(target, guards)
    }

    /// View this cell through a read-only handle.
    #[must_use]
    pub fn as_read_only(&self) -> ReadOnlyBindable<T> {
        ReadOnlyBindable::from(self.clone())
    }
}
