#![forbid(unsafe_code)]

//! Range-constrained numeric cells.
//!
//! A [`BindableNumber<T>`] is a [`Bindable<T>`] whose writes are clamped to
//! `[min_value, max_value]` and, when `precision` is coarser than the type's
//! smallest step, snapped to the nearest multiple of `precision`. Snapping is
//! measured from `min_value` when the lower bound has been set, otherwise
//! from zero.
//!
//! Range changes propagate through the binding graph before the value is
//! re-clamped, so a bound copy's observers see events in the order
//! copy-bound, owner-bound, copy-value, owner-value.
//!
//! # Invariants
//!
//! 1. After any write, `min_value <= value <= max_value` (when the range is
//!    valid).
//! 2. `precision > 0`.
//! 3. `is_default()` compares with a tolerance of one precision step.
//!
//! # Failure Modes
//!
//! - **Out-of-range input**: clamped silently, never an error.
//! - **Invalid range on bind**: binding to a number whose `min > max` fails
//!   with [`BindError::InvalidRange`] before anything changes.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::trace;

use crate::bindable::{Bindable, Constraint, Node};
use crate::error::{BindError, Result};
use crate::numeric::Numeric;
use crate::subscription::{Subscribers, Subscription};

// ---------------------------------------------------------------------------
// RangeState
// ---------------------------------------------------------------------------

pub(crate) struct RangeState<T: Numeric> {
    min: Cell<T>,
    max: Cell<T>,
    precision: Cell<T>,
    min_changed: Subscribers<T>,
    max_changed: Subscribers<T>,
    precision_changed: Subscribers<T>,
}

#[derive(Clone, Copy)]
enum Bound {
    Min,
    Max,
    Precision,
}

impl<T: Numeric> RangeState<T> {
    fn new(min: T, max: T, precision: T) -> Self {
        Self {
            min: Cell::new(min),
            max: Cell::new(max),
            precision: Cell::new(precision),
            min_changed: Subscribers::default(),
            max_changed: Subscribers::default(),
            precision_changed: Subscribers::default(),
        }
    }

    fn of(node: &Node<T>) -> Option<Rc<Self>> {
        node.constraint()
            .and_then(|c| c.into_any_rc().downcast::<Self>().ok())
    }

    fn slot(&self, bound: Bound) -> &Cell<T> {
        match bound {
            Bound::Min => &self.min,
            Bound::Max => &self.max,
            Bound::Precision => &self.precision,
        }
    }

    fn subscribers(&self, bound: Bound) -> &Subscribers<T> {
        match bound {
            Bound::Min => &self.min_changed,
            Bound::Max => &self.max_changed,
            Bound::Precision => &self.precision_changed,
        }
    }

    fn has_defined_range(&self) -> bool {
        self.min.get() != T::MIN || self.max.get() != T::MAX
    }

    fn clamp(&self, value: T) -> T {
        value.clamp_to(self.min.get(), self.max.get())
    }

    /// Assign one bound, propagate it to ranged partners without touching
    /// their values, notify, then optionally re-clamp this cell's value.
    fn write(&self, node: &Rc<Node<T>>, bound: Bound, value: T, update_value: bool, source: Option<u64>) {
        self.slot(bound).set(value);
        let latched = value;
        for partner in node.partners() {
            if Some(partner.id()) == source {
                continue;
            }
            if let Some(range) = Self::of(&partner) {
                trace!(message = "number.propagate_bound", from = node.id(), to = partner.id());
                range.write(&partner, bound, self.slot(bound).get(), false, Some(node.id()));
            }
        }
        let current = self.slot(bound).get();
        if current == latched {
            self.subscribers(bound).notify(&current);
        }
        if update_value {
            self.reapply(node);
        }
    }

    fn reapply(&self, node: &Rc<Node<T>>) {
        let value = node.value();
        node.assign_value(self.constrain(value));
    }

    fn set_bound(&self, node: &Rc<Node<T>>, bound: Bound, value: T) {
        if self.slot(bound).get() != value {
            self.write(node, bound, value, true, None);
        }
    }
}

impl<T: Numeric> Constraint<T> for RangeState<T> {
    fn constrain(&self, value: T) -> T {
        let clamped = self.clamp(value);
        let precision = self.precision.get();
        if precision <= T::DEFAULT_PRECISION {
            return clamped;
        }
        let origin = if self.min.get() != T::MIN {
            self.min.get().to_f64()
        } else {
            0.0
        };
        let step = precision.to_f64();
        let snapped = origin + ((clamped.to_f64() - origin) / step).round() * step;
        self.clamp(T::from_f64(snapped))
    }

    fn is_default(&self, value: &T, default: &T) -> bool {
        if value == default {
            return true;
        }
        let precision = self.precision.get();
        if T::IS_INTEGER && precision <= T::DEFAULT_PRECISION {
            return false;
        }
        (value.to_f64() - default.to_f64()).abs() < precision.to_f64()
    }

    fn fork(&self) -> Rc<dyn Constraint<T>> {
        Rc::new(Self::new(self.min.get(), self.max.get(), self.precision.get()))
    }

    fn adopt(&self, node: &Rc<Node<T>>, other: &dyn Constraint<T>) -> Result<()> {
        let Some(other) = other.as_any().downcast_ref::<Self>() else {
            return Ok(());
        };
        let (min, max) = (other.min.get(), other.max.get());
        if min > max {
            return Err(BindError::InvalidRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        self.set_bound(node, Bound::Precision, other.precision.get());
        self.set_bound(node, Bound::Min, min);
        self.set_bound(node, Bound::Max, max);
        Ok(())
    }

    fn unbind_events(&self) {
        self.min_changed.clear();
        self.max_changed.clear();
        self.precision_changed.clear();
    }

    fn trigger_change(&self) {
        self.min_changed.notify(&self.min.get());
        self.max_changed.notify(&self.max.get());
        self.precision_changed.notify(&self.precision.get());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

// ---------------------------------------------------------------------------
// BindableNumber<T>
// ---------------------------------------------------------------------------

/// A numeric cell with a range and a precision step.
///
/// Dereferences to [`Bindable<T>`] for value, default, disabled, binding and
/// leasing operations.
pub struct BindableNumber<T: Numeric> {
    cell: Bindable<T>,
    range: Rc<RangeState<T>>,
}

pub type BindableInt = BindableNumber<i32>;
pub type BindableLong = BindableNumber<i64>;
pub type BindableFloat = BindableNumber<f32>;
pub type BindableDouble = BindableNumber<f64>;

impl<T: Numeric> Clone for BindableNumber<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            range: Rc::clone(&self.range),
        }
    }
}

impl<T: Numeric> Deref for BindableNumber<T> {
    type Target = Bindable<T>;

    fn deref(&self) -> &Self::Target {
        &self.cell
    }
}

impl<T: Numeric> fmt::Debug for BindableNumber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindableNumber")
            .field("value", &self.value())
            .field("min_value", &self.min_value())
            .field("max_value", &self.max_value())
            .field("precision", &self.precision())
            .field("disabled", &self.is_disabled())
            .finish()
    }
}

impl<T: Numeric> fmt::Display for BindableNumber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cell, f)
    }
}

impl<T: Numeric> Default for BindableNumber<T> {
    fn default() -> Self {
        Self::new(T::ZERO)
    }
}

impl<T: Numeric> BindableNumber<T> {
    /// Full type range, default precision.
    pub fn new(default: T) -> Self {
        let range = Rc::new(RangeState::new(T::MIN, T::MAX, T::DEFAULT_PRECISION));
        let constraint: Rc<dyn Constraint<T>> = range.clone();
        Self {
            cell: Bindable::from_node(Node::new(default, Some(constraint))),
            range,
        }
    }

    /// Builder form of [`set_min_value`](Self::set_min_value) and
    /// [`set_max_value`](Self::set_max_value).
    #[must_use]
    pub fn with_range(self, min: T, max: T) -> Self {
        self.set_min_value(min);
        self.set_max_value(max);
        self
    }

    /// Builder form of [`set_precision`](Self::set_precision).
    pub fn with_precision(self, precision: T) -> Result<Self> {
        self.set_precision(precision)?;
        Ok(self)
    }

    /// View an existing cell as a number if it carries a numeric range.
    #[must_use]
    pub fn from_bindable(cell: &Bindable<T>) -> Option<Self> {
        let range = RangeState::of(&cell.node)?;
        Some(Self {
            cell: cell.clone(),
            range,
        })
    }

    fn wrap(cell: Bindable<T>) -> Self {
        // Copies fork the range, so the fallback is never taken.
        Self::from_bindable(&cell).unwrap_or_else(|| Self::new(cell.value()))
    }

    #[must_use]
    pub fn as_bindable(&self) -> &Bindable<T> {
        &self.cell
    }

    // -- range ---------------------------------------------------------------

    #[must_use]
    pub fn min_value(&self) -> T {
        self.range.min.get()
    }

    #[must_use]
    pub fn max_value(&self) -> T {
        self.range.max.get()
    }

    #[must_use]
    pub fn precision(&self) -> T {
        self.range.precision.get()
    }

    /// Set the lower bound, propagate it, then re-clamp the value.
    ///
    /// Never fails: re-clamping is not a user write and ignores the
    /// disabled flag.
    pub fn set_min_value(&self, min: T) {
        self.range.set_bound(&self.cell.node, Bound::Min, min);
    }

    pub fn set_max_value(&self, max: T) {
        self.range.set_bound(&self.cell.node, Bound::Max, max);
    }

    /// Set the quantisation step. Must be greater than zero.
    pub fn set_precision(&self, precision: T) -> Result<()> {
        if precision <= T::ZERO {
            return Err(BindError::InvalidPrecision {
                precision: precision.to_string(),
            });
        }
        self.range.set_bound(&self.cell.node, Bound::Precision, precision);
        Ok(())
    }

    /// Whether the bounds differ from the type's full range.
    #[must_use]
    pub fn has_defined_range(&self) -> bool {
        self.range.has_defined_range()
    }

    #[must_use]
    pub fn is_integer(&self) -> bool {
        T::IS_INTEGER
    }

    pub fn on_min_value_changed(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.range.min_changed.subscribe(f)
    }

    pub fn on_max_value_changed(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.range.max_changed.subscribe(f)
    }

    pub fn on_precision_changed(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.range.precision_changed.subscribe(f)
    }

    // -- arithmetic ----------------------------------------------------------

    /// Write `value + delta`, saturating for integers.
    pub fn add(&self, delta: T) -> Result<()> {
        self.set_value(self.value().saturating_add(delta))
    }

    /// Write a value of another numeric type, converting through `f64`.
    pub fn set_from<U: Numeric>(&self, value: U) -> Result<()> {
        self.set_value(T::from_f64(value.to_f64()))
    }

    /// Write `min + (max - min) * amount`, snapped to a multiple of `snap`
    /// when `snap > 0`.
    pub fn set_proportional(&self, amount: f64, snap: f64) -> Result<()> {
        let (min, max) = (self.min_value().to_f64(), self.max_value().to_f64());
        let mut value = min + (max - min) * amount;
        if snap > 0.0 {
            value = (value / snap).round() * snap;
        }
        self.set_value(T::from_f64(value))
    }

    // -- copies --------------------------------------------------------------

    #[must_use]
    pub fn get_bound_copy(&self) -> Self {
        Self::wrap(self.cell.get_bound_copy())
    }

    #[must_use]
    pub fn get_unbound_copy(&self) -> Self {
        Self::wrap(self.cell.get_unbound_copy())
    }

    #[must_use]
    pub fn create_instance(&self) -> Self {
        Self::wrap(self.cell.create_instance())
    }

    // -- parsing -------------------------------------------------------------

    /// Like [`Bindable::parse`], additionally accepting other numeric cells
    /// and any primitive number (converted, then clamped and quantised).
    pub fn parse(&self, input: &dyn Any) -> Result<()> {
        if let Some(result) = self.cell.parse_common(input) {
            return result;
        }
        if let Some(other) = input.downcast_ref::<BindableNumber<T>>() {
            return self.set_value(other.value());
        }
        match primitive_as_f64(input) {
            Some(value) => self.set_value(T::from_f64(value)),
            None => Err(BindError::type_mismatch::<T>()),
        }
    }

    // -- serialization -------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> NumberSnapshot<T> {
        NumberSnapshot {
            value: self.value(),
            min_value: self.min_value(),
            max_value: self.max_value(),
            precision: self.precision(),
        }
    }

    /// Apply bounds and precision first, then the value, so a value at the
    /// edge of the range survives.
    pub fn restore(&self, snapshot: &NumberSnapshot<T>) -> Result<()> {
        if snapshot.min_value > snapshot.max_value {
            return Err(BindError::InvalidRange {
                min: snapshot.min_value.to_string(),
                max: snapshot.max_value.to_string(),
            });
        }
        self.set_precision(snapshot.precision)?;
        self.set_min_value(snapshot.min_value);
        self.set_max_value(snapshot.max_value);
        self.set_value(snapshot.value)
    }

    /// Re-populate from serialized data, notifying observers of any change.
    pub fn deserialize_from<'de, D>(&self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        let snapshot = NumberRepr::<T>::deserialize(deserializer)?.into_snapshot(self);
        self.restore(&snapshot).map_err(D::Error::custom)
    }
}

fn primitive_as_f64(input: &dyn Any) -> Option<f64> {
    macro_rules! try_types {
        ($($t:ty),*) => {$(
            if let Some(v) = input.downcast_ref::<$t>() {
                return Some(Numeric::to_f64(*v));
            }
        )*};
    }
    try_types!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
    None
}

/// Serialized form of a numeric cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumberSnapshot<T> {
    pub value: T,
    pub min_value: T,
    pub max_value: T,
    pub precision: T,
}

/// A bare value, or a snapshot whose range fields may be omitted.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberRepr<T> {
    Plain(T),
    Structured {
        value: T,
        min_value: Option<T>,
        max_value: Option<T>,
        precision: Option<T>,
    },
}

impl<T: Numeric> NumberRepr<T> {
    fn into_snapshot(self, current: &BindableNumber<T>) -> NumberSnapshot<T> {
        let base = current.snapshot();
        match self {
            Self::Plain(value) => NumberSnapshot { value, ..base },
            Self::Structured {
                value,
                min_value,
                max_value,
                precision,
            } => NumberSnapshot {
                value,
                min_value: min_value.unwrap_or(base.min_value),
                max_value: max_value.unwrap_or(base.max_value),
                precision: precision.unwrap_or(base.precision),
            },
        }
    }
}

impl<T: Numeric + Serialize> Serialize for BindableNumber<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de, T: Numeric + Deserialize<'de>> Deserialize<'de> for BindableNumber<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let number = Self::default();
        let snapshot = NumberRepr::<T>::deserialize(deserializer)?.into_snapshot(&number);
        number.restore(&snapshot).map_err(D::Error::custom)?;
        number.set_default_value(snapshot.value).map_err(D::Error::custom)?;
        Ok(number)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn clamps_silently() {
        let n = BindableDouble::new(1.0).with_range(0.0, 2.0);
        n.set_value(-1.0).unwrap();
        assert_eq!(n.value(), 0.0);
        n.set_value(5.0).unwrap();
        assert_eq!(n.value(), 2.0);
    }

    #[test]
    fn initial_value_is_clamped_by_range_change() {
        let n = BindableInt::new(50).with_range(0, 10);
        assert_eq!(n.value(), 10);
        assert!(n.has_defined_range());
        assert!(!BindableInt::new(0).has_defined_range());
    }

    #[test]
    fn precision_snaps_from_min() {
        let n = BindableInt::new(0).with_range(1, 100).with_precision(5).unwrap();
        n.set_value(9).unwrap();
        assert_eq!(n.value(), 11);
        n.set_value(13).unwrap();
        assert_eq!(n.value(), 11);
        n.set_value(14).unwrap();
        assert_eq!(n.value(), 16);
    }

    #[test]
    fn precision_snaps_from_zero_without_lower_bound() {
        let n = BindableDouble::new(0.0).with_precision(0.5).unwrap();
        n.set_value(1.3).unwrap();
        assert_eq!(n.value(), 1.5);
        n.set_value(-0.2).unwrap();
        assert_eq!(n.value(), 0.0);
    }

    #[test]
    fn precision_must_be_positive() {
        let n = BindableDouble::new(0.0);
        assert!(matches!(
            n.set_precision(0.0),
            Err(BindError::InvalidPrecision { .. })
        ));
        assert!(matches!(
            n.set_precision(-1.0),
            Err(BindError::InvalidPrecision { .. })
        ));
    }

    #[test]
    fn is_default_uses_precision() {
        let n = BindableDouble::new(1.0).with_precision(0.1).unwrap();
        assert!(n.is_default());
        n.set_value(1.5).unwrap();
        assert!(!n.is_default());

        let i = BindableInt::new(3);
        i.set_value(4).unwrap();
        assert!(!i.is_default());
        i.set_value(3).unwrap();
        assert!(i.is_default());
    }

    #[test]
    fn bound_min_change_orders_events() {
        let owner = BindableInt::new(5);
        let copy = owner.get_bound_copy();
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut subs = Vec::new();
        for (name, cell) in [("copy", &copy), ("owner", &owner)] {
            let l = Rc::clone(&log);
            subs.push(cell.on_min_value_changed(move |_| l.borrow_mut().push(format!("{name}.min"))));
            let l = Rc::clone(&log);
            subs.push(cell.on_value_changed(move |_| l.borrow_mut().push(format!("{name}.value"))));
        }

        owner.set_min_value(10);
        assert_eq!(
            *log.borrow(),
            vec!["copy.min", "owner.min", "copy.value", "owner.value"]
        );
        assert_eq!(copy.value(), 10);
        assert_eq!(copy.min_value(), 10);
    }

    #[test]
    fn bind_adopts_range_and_precision() {
        let target = BindableDouble::new(1.0).with_range(0.0, 2.0).with_precision(0.5).unwrap();
        let n = BindableDouble::new(7.0);
        n.bind_to(&target).unwrap();
        assert_eq!(n.min_value(), 0.0);
        assert_eq!(n.max_value(), 2.0);
        assert_eq!(n.precision(), 0.5);
        assert_eq!(n.value(), 1.0);
    }

    #[test]
    fn bind_rejects_invalid_range() {
        let target = BindableInt::new(0);
        target.set_min_value(5);
        target.set_max_value(1);
        let n = BindableInt::new(0);
        assert!(matches!(n.bind_to(&target), Err(BindError::InvalidRange { .. })));
        assert_eq!(n.partner_count(), 0);
    }

    #[test]
    fn range_changes_ignore_disabled() {
        let n = BindableInt::new(8);
        n.set_disabled(true).unwrap();
        n.set_max_value(4);
        assert_eq!(n.value(), 4);
    }

    #[test]
    fn add_and_set_proportional() {
        let n = BindableInt::new(0).with_range(0, 10);
        n.add(4).unwrap();
        assert_eq!(n.value(), 4);
        n.add(100).unwrap();
        assert_eq!(n.value(), 10);
        n.set_proportional(0.5, 0.0).unwrap();
        assert_eq!(n.value(), 5);
        n.set_proportional(0.33, 2.0).unwrap();
        assert_eq!(n.value(), 4);
        n.set_from(2.6f64).unwrap();
        assert_eq!(n.value(), 3);
        assert!(n.is_integer());
    }

    #[test]
    fn parse_accepts_numbers_and_cells() {
        let n = BindableInt::new(0).with_range(0, 100);
        n.parse(&250i64).unwrap();
        assert_eq!(n.value(), 100);
        n.parse(&"42").unwrap();
        assert_eq!(n.value(), 42);
        n.parse(&BindableInt::new(7)).unwrap();
        assert_eq!(n.value(), 7);
        n.parse(&12.4f32).unwrap();
        assert_eq!(n.value(), 12);
        assert_eq!(n.parse(&true), Err(BindError::type_mismatch::<i32>()));
    }

    #[test]
    fn plain_partner_inherits_range() {
        let n = BindableInt::new(0).with_range(0, 10);
        let plain = Bindable::new(3);
        plain.bind_to(&n).unwrap();
        plain.set_value(50).unwrap();
        assert_eq!(plain.value(), 10);
        assert_eq!(n.value(), 10);
        assert!(BindableNumber::from_bindable(&plain).is_some());
    }

    #[test]
    fn binding_number_to_plain_clamps_both_sides() {
        let n = BindableInt::new(0).with_range(0, 10);
        let plain = Bindable::new(50);
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let _sub = plain.on_value_changed(move |e| s.set(e.new));
        n.bind_to(&plain).unwrap();
        assert_eq!(n.value(), 10);
        assert_eq!(plain.value(), 10);
        assert_eq!(seen.get(), 10);
    }

    #[test]
    fn range_reaches_existing_plain_partners() {
        let n = BindableInt::new(0).with_range(0, 10);
        let a = Bindable::new(0);
        let b = a.get_bound_copy();
        a.bind_to(&n).unwrap();

        b.set_value(50).unwrap();
        assert_eq!(n.value(), 10);
        assert_eq!(a.value(), 10);
        assert_eq!(b.value(), 10);

        n.set_max_value(4);
        assert_eq!(b.value(), 4);
        b.set_value(-3).unwrap();
        assert_eq!(n.value(), 0);
    }

    #[test]
    fn trigger_change_fires_range_events() {
        let n = BindableInt::new(0);
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let _s = n.on_precision_changed(move |_| c.set(c.get() + 1));
        n.trigger_change();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn serde_keeps_value_at_max() {
        let n = BindableInt::new(0).with_range(0, 10);
        n.set_value(10).unwrap();
        let json = serde_json::to_string(&n).unwrap();
        let back: BindableInt = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), 10);
        assert_eq!(back.max_value(), 10);
        assert_eq!(back.value(), back.max_value());

        let plain: Bindable<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(plain.value(), 10);
    }

    #[test]
    fn deserialize_into_existing_notifies() {
        let n = BindableDouble::new(0.0);
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let _s = n.on_value_changed(move |_| c.set(c.get() + 1));
        let mut de = serde_json::Deserializer::from_str("2.5");
        n.deserialize_from(&mut de).unwrap();
        assert_eq!(n.value(), 2.5);
        assert_eq!(count.get(), 1);
    }
}
