#![forbid(unsafe_code)]

//! Single-value cells and the binding graph.
//!
//! A [`Bindable<T>`] is a handle to a shared cell node holding a value, a
//! default, a disabled flag and an optional description. Cells are linked
//! with [`Bindable::bind_to`]; the link is symmetric and held weakly on both
//! sides, so dropping every handle to a cell detaches it from its partners.
//!
//! # Propagation
//!
//! A write assigns the local value, then visits each live partner (except
//! the partner that forwarded the write) depth-first, assigning and letting
//! it propagate further, and only then notifies the cell's own observers.
//! For a chain `A - B - C` a write at `A` notifies `C`, then `B`, then `A`.
//!
//! Before propagating, the cell latches its value. If an observer somewhere
//! in the component wrote a different value back while propagation was in
//! flight, the latch no longer matches and the stale notification is
//! skipped: the later write already reported the settled value.
//!
//! # Invariants
//!
//! 1. After a write returns, every cell reachable through partners holds the
//!    same value, default and disabled flag.
//! 2. A disabled cell rejects direct value and default writes with
//!    [`BindError::Disabled`], except writes through an active lease handle.
//! 3. The partner relation never contains a cycle: binding two cells that
//!    are already connected fails with [`BindError::AlreadyBound`].
//! 4. No `RefCell` borrow is held while observers run.
//!
//! # Failure Modes
//!
//! - **Observer panics**: propagation stops at that observer; partners that
//!   were already visited keep the new value.
//! - **Partner dropped**: its weak entry is pruned on the next traversal.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::{BindError, Result};
use crate::format::NumberFormat;
use crate::lease::{self, Lease, LeaseRole, LeaseState};
use crate::subscription::{Subscribers, Subscription};
use crate::value::BindValue;

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_cell_id() -> u64 {
    NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Payload of value and default change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChanged<T> {
    pub old: T,
    pub new: T,
}

// ---------------------------------------------------------------------------
// Constraint hook
// ---------------------------------------------------------------------------

/// Per-cell value policy installed by specialised cell kinds.
pub(crate) trait Constraint<T: BindValue> {
    /// Map an incoming value onto the permitted set.
    fn constrain(&self, value: T) -> T;

    fn is_default(&self, value: &T, default: &T) -> bool;

    /// Same settings, no observers.
    fn fork(&self) -> Rc<dyn Constraint<T>>;

    /// Validate `other` and copy its settings onto `node`, propagating to
    /// the partners `node` already has.
    fn adopt(&self, node: &Rc<Node<T>>, other: &dyn Constraint<T>) -> Result<()>;

    fn unbind_events(&self);

    /// Re-raise the constraint's own change notifications locally.
    fn trigger_change(&self);

    fn as_any(&self) -> &dyn Any;

    fn into_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

pub(crate) struct Node<T: BindValue> {
    id: u64,
    state: RefCell<State<T>>,
    pub(crate) value_changed: Subscribers<ValueChanged<T>>,
    pub(crate) default_changed: Subscribers<ValueChanged<T>>,
    pub(crate) disabled_changed: Subscribers<bool>,
}

struct State<T: BindValue> {
    value: T,
    default: T,
    disabled: bool,
    description: Option<String>,
    partners: SmallVec<[Weak<Node<T>>; 4]>,
    constraint: Option<Rc<dyn Constraint<T>>>,
    /// Set on lease handles and their bound copies.
    lease_role: Option<LeaseRole<T>>,
    /// Set on the cell a lease was taken from.
    active_lease: Option<Rc<LeaseState<T>>>,
}

impl<T: BindValue> Node<T> {
    pub(crate) fn new(value: T, constraint: Option<Rc<dyn Constraint<T>>>) -> Rc<Self> {
        let value = match &constraint {
            Some(c) => c.constrain(value),
            None => value,
        };
        Self::from_state(State {
            default: value.clone(),
            value,
            disabled: false,
            description: None,
            partners: SmallVec::new(),
            constraint,
            lease_role: None,
            active_lease: None,
        })
    }

    fn from_state(state: State<T>) -> Rc<Self> {
        Rc::new(Self {
            id: next_cell_id(),
            state: RefCell::new(state),
            value_changed: Subscribers::default(),
            default_changed: Subscribers::default(),
            disabled_changed: Subscribers::default(),
        })
    }

    /// An unbound node with this node's state and a forked constraint.
    pub(crate) fn detached_copy(&self, keep_disabled: bool, keep_lease_role: bool) -> Rc<Self> {
        let state = {
            let st = self.state.borrow();
            State {
                value: st.value.clone(),
                default: st.default.clone(),
                disabled: keep_disabled && st.disabled,
                description: None,
                partners: SmallVec::new(),
                constraint: st.constraint.as_ref().map(|c| c.fork()),
                lease_role: if keep_lease_role {
                    st.lease_role.as_ref().map(LeaseRole::copy)
                } else {
                    None
                },
                active_lease: None,
            }
        };
        Self::from_state(state)
    }

    pub(crate) fn bound_copy(self: &Rc<Self>) -> Rc<Self> {
        let copy = self.detached_copy(true, true);
        Self::link(&copy, self);
        copy
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn value(&self) -> T {
        self.state.borrow().value.clone()
    }

    pub(crate) fn default_value(&self) -> T {
        self.state.borrow().default.clone()
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.state.borrow().disabled
    }

    pub(crate) fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.borrow().value)
    }

    pub(crate) fn constraint(&self) -> Option<Rc<dyn Constraint<T>>> {
        self.state.borrow().constraint.clone()
    }

    pub(crate) fn constrain(&self, value: T) -> T {
        match self.constraint() {
            Some(c) => c.constrain(value),
            None => value,
        }
    }

    // -- lease bookkeeping ---------------------------------------------------

    pub(crate) fn lease_role(&self) -> Option<LeaseRole<T>> {
        self.state.borrow().lease_role.clone()
    }

    pub(crate) fn set_lease_role(&self, role: Option<LeaseRole<T>>) {
        self.state.borrow_mut().lease_role = role;
    }

    pub(crate) fn active_lease(&self) -> Option<Rc<LeaseState<T>>> {
        self.state.borrow().active_lease.clone()
    }

    pub(crate) fn set_active_lease(&self, lease: Option<Rc<LeaseState<T>>>) {
        self.state.borrow_mut().active_lease = lease;
    }

    /// Whether writes through this node bypass disabled and lease locks.
    pub(crate) fn has_lease_authority(&self) -> bool {
        self.state
            .borrow()
            .lease_role
            .as_ref()
            .is_some_and(|role| role.lease.grants_authority())
    }

    pub(crate) fn ensure_not_returned(&self) -> Result<()> {
        match &self.state.borrow().lease_role {
            Some(role) if role.lease.is_returned() => Err(BindError::LeaseReturned),
            _ => Ok(()),
        }
    }

    pub(crate) fn component_leased(self: &Rc<Self>) -> bool {
        self.component()
            .iter()
            .any(|n| n.state.borrow().active_lease.is_some())
    }

    // -- graph ---------------------------------------------------------------

    /// Live partners, pruning dead entries.
    pub(crate) fn partners(&self) -> Vec<Rc<Self>> {
        let mut st = self.state.borrow_mut();
        st.partners.retain(|w| w.strong_count() > 0);
        st.partners.iter().filter_map(Weak::upgrade).collect()
    }

    /// Every node reachable from `self`, including `self`, in BFS order.
    pub(crate) fn component(self: &Rc<Self>) -> Vec<Rc<Self>> {
        let mut seen = AHashSet::new();
        seen.insert(self.id);
        let mut nodes = vec![Rc::clone(self)];
        let mut cursor = 0;
        while cursor < nodes.len() {
            for partner in nodes[cursor].partners() {
                if seen.insert(partner.id) {
                    nodes.push(partner);
                }
            }
            cursor += 1;
        }
        nodes
    }

    pub(crate) fn reaches(self: &Rc<Self>, id: u64) -> bool {
        self.component().iter().any(|n| n.id == id)
    }

    /// Link `a` and `b`. A constraint on either side is forked onto every
    /// unconstrained node of the merged component, which then settles on
    /// `a`'s constrained value.
    pub(crate) fn link(a: &Rc<Self>, b: &Rc<Self>) {
        a.state.borrow_mut().partners.push(Rc::downgrade(b));
        b.state.borrow_mut().partners.push(Rc::downgrade(a));

        let Some(template) = a.constraint().or_else(|| b.constraint()) else {
            return;
        };
        let mut forked = false;
        for node in a.component() {
            if node.constraint().is_none() {
                node.state.borrow_mut().constraint = Some(template.fork());
                forked = true;
            }
        }
        if forked {
            a.settle();
        }
    }

    /// Bring every node of the component to this node's constrained value,
    /// notifying each changed node locally.
    fn settle(self: &Rc<Self>) {
        let settled = self.constrain(self.value());
        for node in self.component() {
            let previous = node.value();
            if previous != settled {
                node.state.borrow_mut().value = settled.clone();
                node.trigger_value_change(previous, None, false);
            }
        }
    }

    pub(crate) fn unlink(a: &Rc<Self>, b: &Rc<Self>) -> bool {
        let removed_a = Self::remove_partner(a, b);
        let removed_b = Self::remove_partner(b, a);
        removed_a || removed_b
    }

    fn remove_partner(from: &Rc<Self>, partner: &Rc<Self>) -> bool {
        let mut st = from.state.borrow_mut();
        let before = st.partners.len();
        st.partners
            .retain(|w| w.strong_count() > 0 && !std::ptr::eq(w.as_ptr(), Rc::as_ptr(partner)));
        st.partners.len() != before
    }

    pub(crate) fn unbind_bindings(self: &Rc<Self>) {
        for partner in self.partners() {
            Self::unlink(self, &partner);
        }
    }

    pub(crate) fn clear_observers(&self) {
        self.value_changed.clear();
        self.default_changed.clear();
        self.disabled_changed.clear();
        if let Some(c) = self.constraint() {
            c.unbind_events();
        }
    }

    // -- writes --------------------------------------------------------------

    /// Assign without checks and propagate.
    pub(crate) fn write_value(self: &Rc<Self>, previous: T, value: T, source: Option<u64>) {
        self.state.borrow_mut().value = value;
        self.trigger_value_change(previous, source, true);
    }

    pub(crate) fn trigger_value_change(self: &Rc<Self>, previous: T, source: Option<u64>, propagate: bool) {
        let latched = self.value();
        if propagate {
            for partner in self.partners() {
                if Some(partner.id) == source {
                    continue;
                }
                trace!(message = "bindable.propagate", from = self.id, to = partner.id);
                partner.write_value(previous.clone(), self.value(), Some(self.id));
            }
        }
        let current = self.value();
        if current == latched {
            self.value_changed.notify(&ValueChanged {
                old: previous,
                new: current,
            });
        }
    }

    pub(crate) fn write_default(self: &Rc<Self>, previous: T, value: T, source: Option<u64>) {
        self.state.borrow_mut().default = value;
        self.trigger_default_change(previous, source);
    }

    fn trigger_default_change(self: &Rc<Self>, previous: T, source: Option<u64>) {
        let latched = self.default_value();
        for partner in self.partners() {
            if Some(partner.id) == source {
                continue;
            }
            partner.write_default(previous.clone(), self.default_value(), Some(self.id));
        }
        let current = self.default_value();
        if current == latched {
            self.default_changed.notify(&ValueChanged {
                old: previous,
                new: current,
            });
        }
    }

    pub(crate) fn write_disabled(self: &Rc<Self>, disabled: bool, source: Option<u64>) {
        self.state.borrow_mut().disabled = disabled;
        self.trigger_disabled_change(source, true);
    }

    pub(crate) fn trigger_disabled_change(self: &Rc<Self>, source: Option<u64>, propagate: bool) {
        let latched = self.is_disabled();
        if propagate {
            for partner in self.partners() {
                if Some(partner.id) == source {
                    continue;
                }
                partner.write_disabled(self.is_disabled(), Some(self.id));
            }
        }
        let current = self.is_disabled();
        if current == latched {
            self.disabled_changed.notify(&current);
        }
    }

    /// Unchecked write that only propagates when the value differs.
    pub(crate) fn assign_value(self: &Rc<Self>, value: T) {
        let previous = self.value();
        if previous != value {
            self.write_value(previous, value, None);
        }
    }

    pub(crate) fn assign_disabled(self: &Rc<Self>, disabled: bool) {
        if self.is_disabled() != disabled {
            self.write_disabled(disabled, None);
        }
    }
}

impl<T: BindValue> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("value", &st.value)
            .field("default", &st.default)
            .field("disabled", &st.disabled)
            .field("partners", &st.partners.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Bindable<T>
// ---------------------------------------------------------------------------

/// A reactive value cell that can be bound to other cells of the same type.
///
/// Cloning a `Bindable` creates another handle to the **same** cell. Use
/// [`get_bound_copy`](Bindable::get_bound_copy) for an independent cell that
/// stays synchronised through the binding graph.
pub struct Bindable<T: BindValue> {
    pub(crate) node: Rc<Node<T>>,
}

impl<T: BindValue> Clone for Bindable<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: BindValue> fmt::Debug for Bindable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindable")
            .field("value", &self.value())
            .field("default", &self.default_value())
            .field("disabled", &self.is_disabled())
            .finish()
    }
}

impl<T: BindValue> fmt::Display for Bindable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(&NumberFormat::INVARIANT))
    }
}

impl<T: BindValue + Default> Default for Bindable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: BindValue> Bindable<T> {
    /// Create a cell whose value and default are both `default`.
    pub fn new(default: T) -> Self {
        Self::from_node(Node::new(default, None))
    }

    pub(crate) fn from_node(node: Rc<Node<T>>) -> Self {
        Self { node }
    }

    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.set_description(Some(description.into()));
        self
    }

    pub(crate) fn id(&self) -> u64 {
        self.node.id()
    }

    // -- value ---------------------------------------------------------------

    #[must_use]
    pub fn value(&self) -> T {
        self.node.value()
    }

    /// Access the value by reference.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this cell (re-entrant borrow).
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.node.with_value(f)
    }

    /// Write a new value and propagate it through the binding graph.
    ///
    /// Writing a value equal to the current one is a no-op. Numeric cells
    /// clamp and quantise before the comparison.
    pub fn set_value(&self, value: T) -> Result<()> {
        let node = &self.node;
        node.ensure_not_returned()?;
        if node.is_disabled() && !node.has_lease_authority() {
            return Err(BindError::Disabled { what: "value" });
        }
        let value = node.constrain(value);
        let previous = node.value();
        if previous == value {
            return Ok(());
        }
        node.write_value(previous, value, None);
        Ok(())
    }

    #[must_use]
    pub fn default_value(&self) -> T {
        self.node.default_value()
    }

    pub fn set_default_value(&self, default: T) -> Result<()> {
        let node = &self.node;
        node.ensure_not_returned()?;
        if node.is_disabled() && !node.has_lease_authority() {
            return Err(BindError::Disabled { what: "default" });
        }
        let previous = node.default_value();
        if previous == default {
            return Ok(());
        }
        node.write_default(previous, default, None);
        Ok(())
    }

    /// Write the default back into the value.
    pub fn revert_to_default(&self) -> Result<()> {
        self.set_value(self.default_value())
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        let (value, default) = (self.value(), self.default_value());
        match self.node.constraint() {
            Some(c) => c.is_default(&value, &default),
            None => value == default,
        }
    }

    // -- disabled ------------------------------------------------------------

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.node.is_disabled()
    }

    /// Change the disabled flag for the whole bound component.
    ///
    /// While any cell of the component is leased, only the lease handle (or
    /// its bound copies) may do this; everyone else gets
    /// [`BindError::LeaseLocked`] before anything changes.
    pub fn set_disabled(&self, disabled: bool) -> Result<()> {
        let node = &self.node;
        node.ensure_not_returned()?;
        if !node.has_lease_authority() && node.component_leased() {
            return Err(BindError::LeaseLocked);
        }
        if node.is_disabled() == disabled {
            return Ok(());
        }
        node.write_disabled(disabled, None);
        Ok(())
    }

    // -- description ---------------------------------------------------------

    #[must_use]
    pub fn description(&self) -> Option<String> {
        self.node.state.borrow().description.clone()
    }

    pub fn set_description(&self, description: Option<String>) {
        self.node.state.borrow_mut().description = description;
    }

    // -- observers -----------------------------------------------------------

    pub fn on_value_changed(&self, f: impl Fn(&ValueChanged<T>) + 'static) -> Subscription {
        self.node.value_changed.subscribe(f)
    }

    pub fn on_default_changed(&self, f: impl Fn(&ValueChanged<T>) + 'static) -> Subscription {
        self.node.default_changed.subscribe(f)
    }

    pub fn on_disabled_changed(&self, f: impl Fn(&bool) + 'static) -> Subscription {
        self.node.disabled_changed.subscribe(f)
    }

    /// Subscribe to value changes, optionally invoking `f` once right away
    /// with `old == new == value`.
    pub fn bind_value_changed(
        &self,
        f: impl Fn(&ValueChanged<T>) + 'static,
        run_once_immediately: bool,
    ) -> Subscription {
        let f = Rc::new(f);
        let inner = Rc::clone(&f);
        let subscription = self.node.value_changed.subscribe(move |e| inner(e));
        if run_once_immediately {
            let value = self.value();
            f(&ValueChanged {
                old: value.clone(),
                new: value,
            });
        }
        subscription
    }

    pub fn bind_disabled_changed(
        &self,
        f: impl Fn(&bool) + 'static,
        run_once_immediately: bool,
    ) -> Subscription {
        let f = Rc::new(f);
        let inner = Rc::clone(&f);
        let subscription = self.node.disabled_changed.subscribe(move |d| inner(d));
        if run_once_immediately {
            f(&self.is_disabled());
        }
        subscription
    }

    /// Raise value and disabled notifications (and any range notifications)
    /// locally without changing anything or propagating.
    pub fn trigger_change(&self) {
        let value = self.value();
        self.node.trigger_value_change(value, None, false);
        self.node.trigger_disabled_change(None, false);
        if let Some(c) = self.node.constraint() {
            c.trigger_change();
        }
    }

    // -- binding -------------------------------------------------------------

    /// Bind this cell to `other`, adopting its constraint settings, value,
    /// default and disabled flag (in that order) before linking.
    ///
    /// `other` should be the longer-lived end of the bind.
    pub fn bind_to(&self, other: &Bindable<T>) -> Result<()> {
        if Rc::ptr_eq(&self.node, &other.node) {
            return Err(BindError::BindToSelf);
        }
        if self.node.reaches(other.id()) {
            return Err(BindError::AlreadyBound);
        }
        if let (Some(mine), Some(theirs)) = (self.node.constraint(), other.node.constraint()) {
            mine.adopt(&self.node, &*theirs)?;
        }
        self.set_value(other.value())?;
        self.set_default_value(other.default_value())?;
        self.set_disabled(other.is_disabled())?;
        Node::link(&self.node, &other.node);
        debug!(message = "bindable.bind", cell = self.id(), other = other.id());
        Ok(())
    }

    /// Remove the link to `other`. Unlinked cells are left untouched.
    pub fn unbind_from(&self, other: &Bindable<T>) {
        if Node::unlink(&self.node, &other.node) {
            debug!(message = "bindable.unbind", cell = self.id(), other = other.id());
        }
    }

    /// Remove every link this cell has.
    pub fn unbind_bindings(&self) {
        self.node.unbind_bindings();
    }

    /// Drop every observer registered on this cell.
    pub fn unbind_events(&self) {
        self.node.clear_observers();
    }

    /// Return any lease held on or through this cell, then drop observers and
    /// links.
    pub fn unbind_all(&self) {
        if let Some(active) = self.node.active_lease() {
            lease::release(&active);
        }
        if let Some(role) = self.node.lease_role().filter(|role| role.primary) {
            lease::release(&role.lease);
        }
        self.unbind_events();
        self.unbind_bindings();
    }

    /// Whether `other` is a direct partner of this cell.
    #[must_use]
    pub fn is_bound_to(&self, other: &Bindable<T>) -> bool {
        self.node.partners().iter().any(|p| Rc::ptr_eq(p, &other.node))
    }

    #[must_use]
    pub fn partner_count(&self) -> usize {
        self.node.partners().len()
    }

    /// A new cell of the same kind, bound to this one.
    #[must_use]
    pub fn get_bound_copy(&self) -> Self {
        Self::from_node(self.node.bound_copy())
    }

    /// A new cell of the same kind holding this cell's current state, with
    /// no links or observers.
    #[must_use]
    pub fn get_unbound_copy(&self) -> Self {
        Self::from_node(self.node.detached_copy(true, false))
    }

    /// A fresh cell of the same kind: same value, default and constraint
    /// settings, enabled and unbound.
    #[must_use]
    pub fn create_instance(&self) -> Self {
        Self::from_node(self.node.detached_copy(false, false))
    }

    // -- leasing -------------------------------------------------------------

    /// Take the exclusive lease on this cell.
    ///
    /// The cell and its partners become disabled until the lease is returned;
    /// the returned handle can still write.
    pub fn begin_lease(&self, revert_value_on_return: bool) -> Result<Lease<T>> {
        lease::begin(&self.node, revert_value_on_return)
    }

    /// End the active lease through the handle that began it.
    pub fn end_lease(&self, handle: &Lease<T>) -> Result<()> {
        lease::end(&self.node, handle)
    }

    /// Whether a lease was taken from this cell and is not yet returned.
    #[must_use]
    pub fn is_leased(&self) -> bool {
        self.node.active_lease().is_some()
    }

    // -- text & parsing ------------------------------------------------------

    #[must_use]
    pub fn to_text(&self, format: &NumberFormat) -> String {
        self.with_value(|v| v.to_text(format))
    }

    /// Parse text in the given number format and write the result.
    pub fn parse_with(&self, text: &str, format: &NumberFormat) -> Result<()> {
        let value = T::parse_text(text, format)
            .ok_or_else(|| BindError::parse(text, std::any::type_name::<T>()))?;
        self.set_value(value)
    }

    /// Write a dynamically typed input.
    ///
    /// Accepts a `T`, a `String`/`&str` in invariant format, or another
    /// `Bindable<T>` (whose value is copied). Anything else fails with
    /// [`BindError::TypeMismatch`].
    pub fn parse(&self, input: &dyn Any) -> Result<()> {
        match self.parse_common(input) {
            Some(result) => result,
            None => Err(BindError::type_mismatch::<T>()),
        }
    }

    pub(crate) fn parse_common(&self, input: &dyn Any) -> Option<Result<()>> {
        if let Some(value) = input.downcast_ref::<T>() {
            return Some(self.set_value(value.clone()));
        }
        if let Some(other) = input.downcast_ref::<Bindable<T>>() {
            return Some(self.set_value(other.value()));
        }
        if let Some(text) = input.downcast_ref::<String>() {
            return Some(self.parse_with(text, &NumberFormat::INVARIANT));
        }
        if let Some(text) = input.downcast_ref::<&str>() {
            return Some(self.parse_with(text, &NumberFormat::INVARIANT));
        }
        None
    }

    /// Re-populate this cell from serialized data, notifying observers if the
    /// value differs.
    pub fn deserialize_from<'de, D>(&self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        let value = ValueRepr::<T>::deserialize(deserializer)?.into_value();
        self.set_value(value).map_err(D::Error::custom)
    }
}

impl Bindable<bool> {
    /// Flip the value.
    pub fn toggle(&self) -> Result<()> {
        self.set_value(!self.value())
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Accepts a bare value or the structured form written by numeric cells.
#[derive(Deserialize)]
#[serde(untagged)]
enum ValueRepr<T> {
    Plain(T),
    Structured { value: T },
}

impl<T> ValueRepr<T> {
    fn into_value(self) -> T {
        match self {
            Self::Plain(value) | Self::Structured { value } => value,
        }
    }
}

impl<T: BindValue + Serialize> Serialize for Bindable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.with_value(|v| v.serialize(serializer))
    }
}

impl<'de, T: BindValue + Deserialize<'de>> Deserialize<'de> for Bindable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = ValueRepr::<T>::deserialize(deserializer)?.into_value();
        Ok(Self::new(value))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, move || c.set(c.get() + 1))
    }

    #[test]
    fn new_seeds_value_and_default() {
        let b = Bindable::new(5);
        assert_eq!(b.value(), 5);
        assert_eq!(b.default_value(), 5);
        assert!(b.is_default());
        assert!(!b.is_disabled());
    }

    #[test]
    fn equal_write_is_silent() {
        let b = Bindable::new(1);
        let (count, bump) = counter();
        let _s = b.on_value_changed(move |_| bump());
        b.set_value(1).unwrap();
        assert_eq!(count.get(), 0);
        b.set_value(2).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn disabled_rejects_value_and_default() {
        let b = Bindable::new(1);
        b.set_disabled(true).unwrap();
        assert_eq!(b.set_value(2), Err(BindError::Disabled { what: "value" }));
        assert_eq!(
            b.set_default_value(2),
            Err(BindError::Disabled { what: "default" })
        );
        assert_eq!(b.value(), 1);
    }

    #[test]
    fn bind_adopts_state_of_target() {
        let target = Bindable::new(10);
        target.set_value(3).unwrap();
        target.set_disabled(true).unwrap();
        let b = Bindable::new(0);
        b.bind_to(&target).unwrap();
        assert_eq!(b.value(), 3);
        assert_eq!(b.default_value(), 10);
        assert!(b.is_disabled());
        assert!(b.is_bound_to(&target));
        assert!(target.is_bound_to(&b));
    }

    #[test]
    fn bind_rejects_self_and_repeats() {
        let a = Bindable::new(0);
        assert_eq!(a.bind_to(&a.clone()), Err(BindError::BindToSelf));
        let b = a.get_bound_copy();
        assert_eq!(b.bind_to(&a), Err(BindError::AlreadyBound));
        assert_eq!(a.bind_to(&b), Err(BindError::AlreadyBound));
        let c = b.get_bound_copy();
        assert_eq!(a.bind_to(&c), Err(BindError::AlreadyBound));
    }

    #[test]
    fn chain_notifies_furthest_first() {
        let a = Bindable::new(0);
        let b = a.get_bound_copy();
        let c = b.get_bound_copy();
        let order = Rc::new(RefCell::new(Vec::new()));
        let subs: Vec<_> = [("a", &a), ("b", &b), ("c", &c)]
            .into_iter()
            .map(|(name, cell)| {
                let order = Rc::clone(&order);
                cell.on_value_changed(move |_| order.borrow_mut().push(name))
            })
            .collect();

        a.set_value(1).unwrap();
        assert_eq!(*order.borrow(), vec!["c", "b", "a"]);
        drop(subs);
    }

    #[test]
    fn upstream_rejection_reports_settled_value_once() {
        let a = Bindable::new("won't change".to_owned());
        let b = a.get_bound_copy();
        let (count_a, bump_a) = counter();
        let (count_b, bump_b) = counter();
        let seen_by_a = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&seen_by_a);
        let _sa = a.on_value_changed(move |e| {
            seen.borrow_mut().push(e.new.clone());
            bump_a();
        });
        let b_inner = b.clone();
        let _sb = b.on_value_changed(move |_| {
            b_inner.set_value("won't change".to_owned()).unwrap();
            bump_b();
        });

        a.set_value("new value".to_owned()).unwrap();
        assert_eq!(a.value(), "won't change");
        assert_eq!(b.value(), "won't change");
        assert_eq!(count_a.get(), 1);
        assert_eq!(count_b.get(), 2);
        assert_eq!(*seen_by_a.borrow(), vec!["won't change".to_owned()]);
    }

    #[test]
    fn disabled_propagates_to_every_member() {
        let a = Bindable::new(0);
        let b = a.get_bound_copy();
        let c = b.get_bound_copy();
        let (count, bump) = counter();
        let bump = Rc::new(bump);
        let subs: Vec<_> = [&a, &b, &c]
            .into_iter()
            .map(|cell| {
                let bump = Rc::clone(&bump);
                cell.on_disabled_changed(move |d| {
                    assert!(*d);
                    bump();
                })
            })
            .collect();

        c.set_disabled(true).unwrap();
        assert!(a.is_disabled() && b.is_disabled() && c.is_disabled());
        assert_eq!(count.get(), 3);
        drop(subs);
    }

    #[test]
    fn default_propagates() {
        let a = Bindable::new(1);
        let b = a.get_bound_copy();
        a.set_default_value(9).unwrap();
        assert_eq!(b.default_value(), 9);
        b.revert_to_default().unwrap();
        assert_eq!(a.value(), 9);
    }

    #[test]
    fn unbind_is_symmetric_and_idempotent() {
        let a = Bindable::new(0);
        let b = a.get_bound_copy();
        a.unbind_from(&b);
        a.unbind_from(&b);
        assert!(!b.is_bound_to(&a));
        a.set_value(4).unwrap();
        assert_eq!(b.value(), 0);
        b.bind_to(&a).unwrap();
        assert_eq!(b.value(), 4);
    }

    #[test]
    fn dropped_partner_is_pruned() {
        let a = Bindable::new(0);
        {
            let _b = a.get_bound_copy();
            assert_eq!(a.partner_count(), 1);
        }
        assert_eq!(a.partner_count(), 0);
        a.set_value(1).unwrap();
    }

    #[test]
    fn unbind_all_clears_observers() {
        let a = Bindable::new(0);
        let b = a.get_bound_copy();
        let (count, bump) = counter();
        let _s = a.on_value_changed(move |_| bump());
        a.unbind_all();
        a.set_value(1).unwrap();
        assert_eq!(count.get(), 0);
        assert_eq!(b.value(), 0);
    }

    #[test]
    fn bind_value_changed_runs_once() {
        let a = Bindable::new(7);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = a.bind_value_changed(move |e| s.borrow_mut().push((e.old, e.new)), true);
        a.set_value(8).unwrap();
        assert_eq!(*seen.borrow(), vec![(7, 7), (7, 8)]);
    }

    #[test]
    fn trigger_change_does_not_propagate() {
        let a = Bindable::new(0);
        let b = a.get_bound_copy();
        let (count_a, bump_a) = counter();
        let (count_b, bump_b) = counter();
        let _sa = a.on_value_changed(move |_| bump_a());
        let _sb = b.on_value_changed(move |_| bump_b());
        a.trigger_change();
        assert_eq!((count_a.get(), count_b.get()), (1, 0));
    }

    #[test]
    fn copies_preserve_state() {
        let a = Bindable::new(1).with_description("volume");
        a.set_value(2).unwrap();
        a.set_disabled(true).unwrap();

        let unbound = a.get_unbound_copy();
        assert_eq!(unbound.value(), 2);
        assert!(unbound.is_disabled());
        assert_eq!(unbound.partner_count(), 0);

        let fresh = a.create_instance();
        assert_eq!(fresh.value(), 2);
        assert!(!fresh.is_disabled());
        assert_eq!(a.description().as_deref(), Some("volume"));
    }

    #[test]
    fn parse_accepts_supported_inputs() {
        let b = Bindable::new(0i32);
        b.parse(&5i32).unwrap();
        assert_eq!(b.value(), 5);
        b.parse(&"12".to_owned()).unwrap();
        assert_eq!(b.value(), 12);
        b.parse(&"-3").unwrap();
        assert_eq!(b.value(), -3);
        b.parse(&Bindable::new(40)).unwrap();
        assert_eq!(b.value(), 40);
        assert_eq!(b.parse(&1.5f64), Err(BindError::type_mismatch::<i32>()));
        assert!(matches!(b.parse(&"1.5"), Err(BindError::Parse { .. })));
    }

    #[test]
    fn toggle_flips_bool() {
        let b = Bindable::new(false);
        b.toggle().unwrap();
        assert!(b.value());
    }

    #[test]
    fn serde_round_trip_and_repopulate() {
        let b = Bindable::new(3u8);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "3");
        let back: Bindable<u8> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), 3);

        let (count, bump) = counter();
        let _s = back.on_value_changed(move |_| bump());
        let mut de = serde_json::Deserializer::from_str("9");
        back.deserialize_from(&mut de).unwrap();
        assert_eq!(back.value(), 9);
        assert_eq!(count.get(), 1);

        let structured: Bindable<u8> = serde_json::from_str(r#"{"value":4,"min_value":0}"#).unwrap();
        assert_eq!(structured.value(), 4);
    }
}
