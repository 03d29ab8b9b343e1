#![forbid(unsafe_code)]

//! Shared graph node behind list and map cells.
//!
//! A collection node owns a backing [`Store`] plus the disabled flag and the
//! weak partner links. Mutations are described by the store's `Op` type and
//! replayed on every partner, so bound collections receive the same
//! structural diff instead of a resync.
//!
//! # Invariants
//!
//! 1. After [`Node::apply`] returns, every node in the component holds equal
//!    contents.
//! 2. An op that changes nothing produces no diff and is not propagated.
//! 3. No `RefCell` borrow is held while observers run.
//! 4. Observers run only after every store of the component has taken the
//!    op, so an observer may mutate any bound collection.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;
use tether_core::{BindError, Result, Subscribers};
use tracing::trace;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Backing storage of a collection cell.
pub(crate) trait Store: Clone + Default + 'static {
    /// A replayable mutation, valid on any store with equal contents.
    type Op;
    /// The diff reported to observers.
    type Change: 'static;

    /// Apply `op`, returning the diff or `None` when nothing changed.
    fn apply(&mut self, op: &Self::Op) -> Option<Self::Change>;
}

pub(crate) struct Node<S: Store> {
    id: u64,
    state: RefCell<NodeState<S>>,
    iterating: Cell<usize>,
    pub(crate) changed: Subscribers<S::Change>,
    pub(crate) disabled_changed: Subscribers<bool>,
}

struct NodeState<S: Store> {
    store: S,
    disabled: bool,
    description: Option<String>,
    partners: Vec<Weak<Node<S>>>,
}

/// Decrements the iteration counter when dropped.
pub(crate) struct IterationGuard<'a>(&'a Cell<usize>);

impl Drop for IterationGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl<S: Store> Node<S> {
    pub(crate) fn new(store: S) -> Rc<Self> {
        Rc::new(Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            state: RefCell::new(NodeState {
                store,
                disabled: false,
                description: None,
                partners: Vec::new(),
            }),
            iterating: Cell::new(0),
            changed: Subscribers::default(),
            disabled_changed: Subscribers::default(),
        })
    }

    /// Unbound node with a copy of this node's contents.
    pub(crate) fn detached_copy(&self, keep_disabled: bool) -> Rc<Self> {
        let copy = Self::new(self.with_store(S::clone));
        copy.state.borrow_mut().disabled = keep_disabled && self.is_disabled();
        copy
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.borrow().store)
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.state.borrow().disabled
    }

    pub(crate) fn description(&self) -> Option<String> {
        self.state.borrow().description.clone()
    }

    pub(crate) fn set_description(&self, description: Option<String>) {
        self.state.borrow_mut().description = description;
    }

    /// Mark an iteration in progress until the guard drops.
    pub(crate) fn iterate(&self) -> IterationGuard<'_> {
        self.iterating.set(self.iterating.get() + 1);
        IterationGuard(&self.iterating)
    }

    // -- graph ---------------------------------------------------------------

    pub(crate) fn partners(&self) -> Vec<Rc<Self>> {
        let mut st = self.state.borrow_mut();
        st.partners.retain(|w| w.strong_count() > 0);
        st.partners.iter().filter_map(Weak::upgrade).collect()
    }

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

    pub(crate) fn link(a: &Rc<Self>, b: &Rc<Self>) {
        a.state.borrow_mut().partners.push(Rc::downgrade(b));
        b.state.borrow_mut().partners.push(Rc::downgrade(a));
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
        self.changed.clear();
        self.disabled_changed.clear();
    }

    // -- mutation ------------------------------------------------------------

    /// Reject mutations while disabled or while any node of the component is
    /// being iterated.
    pub(crate) fn ensure_mutable(self: &Rc<Self>) -> Result<()> {
        if self.is_disabled() {
            return Err(BindError::Disabled { what: "collection" });
        }
        if self.component().iter().any(|n| n.iterating.get() > 0) {
            return Err(BindError::MutatedDuringIteration);
        }
        Ok(())
    }

    /// Apply `op` to every store of the component, then notify each node
    /// furthest-first. Observers only run once all stores agree.
    pub(crate) fn apply(self: &Rc<Self>, op: &S::Op) {
        let Some(change) = self.state.borrow_mut().store.apply(op) else {
            return;
        };
        let mut applied = Vec::new();
        self.replay(op, change, None, &mut applied);
        for (node, change) in applied {
            node.changed.notify(&change);
        }
    }

    fn replay(
        self: &Rc<Self>,
        op: &S::Op,
        change: S::Change,
        source: Option<u64>,
        applied: &mut Vec<(Rc<Self>, S::Change)>,
    ) {
        for partner in self.partners() {
            if Some(partner.id) == source {
                continue;
            }
            trace!(message = "collection.propagate", from = self.id, to = partner.id);
            let replayed = partner.state.borrow_mut().store.apply(op);
            if let Some(partner_change) = replayed {
                partner.replay(op, partner_change, Some(self.id), applied);
            }
        }
        applied.push((Rc::clone(self), change));
    }

    pub(crate) fn set_disabled(self: &Rc<Self>, disabled: bool) {
        if self.is_disabled() != disabled {
            self.write_disabled(disabled, None);
        }
    }

    fn write_disabled(self: &Rc<Self>, disabled: bool, source: Option<u64>) {
        self.state.borrow_mut().disabled = disabled;
        for partner in self.partners() {
            if Some(partner.id) == source {
                continue;
            }
            partner.write_disabled(self.is_disabled(), Some(self.id));
        }
        let current = self.is_disabled();
        if current == disabled {
            self.disabled_changed.notify(&current);
        }
    }
}
