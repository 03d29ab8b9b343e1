#![forbid(unsafe_code)]

//! Ordered list cells.
//!
//! Every mutation of a [`BindableList<T>`] is checked (disabled flag,
//! iteration in progress, index bounds), applied locally, replayed on every
//! bound partner, and finally reported to this list's observers as one
//! [`ListChange`]. A chain `A - B - C` mutated at `A` notifies `C`, then `B`,
//! then `A`.
//!
//! # Invariants
//!
//! 1. Bound lists hold equal contents after every mutation returns.
//! 2. Each mutation produces exactly one diff per list, or none when it
//!    changes nothing.
//! 3. Replacing contents with an equal sequence fires no diff at all.
//!
//! # Failure Modes
//!
//! - **Disabled**: mutations fail with [`BindError::Disabled`].
//! - **Mutation from inside [`BindableList::for_each`]** on any list of the
//!   component fails with [`BindError::MutatedDuringIteration`].

use std::any::{Any, type_name};
use std::fmt;
use std::rc::Rc;

use tether_core::{AnyBindable, BindError, Result, Subscription, downcast_peer};
use tracing::debug;

use crate::node::{Node, Store};

/// Element bound for collection cells.
pub trait Item: Clone + PartialEq + fmt::Debug + 'static {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> Item for T {}

/// Structured description of one list mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ListChange<T> {
    /// `items` were inserted starting at `index`.
    Add { index: usize, items: Vec<T> },
    /// `items` were removed. `index` is `None` when they were not contiguous.
    Remove { index: Option<usize>, items: Vec<T> },
    Replace { index: usize, old: T, new: T },
    Move { from: usize, to: usize, item: T },
}

#[derive(Debug)]
pub(crate) enum ListOp<T> {
    Insert { index: usize, items: Vec<T> },
    Set { index: usize, item: T },
    RemoveRange { index: usize, count: usize },
    /// Ascending indices.
    RemoveIndices(Vec<usize>),
    Move { from: usize, to: usize },
    Clear,
}

#[derive(Clone)]
pub(crate) struct ListStore<T>(Vec<T>);

impl<T> Default for ListStore<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T: Item> Store for ListStore<T> {
    type Op = ListOp<T>;
    type Change = ListChange<T>;

    fn apply(&mut self, op: &ListOp<T>) -> Option<ListChange<T>> {
        let items = &mut self.0;
        match op {
            ListOp::Insert { index, items: new } => {
                if new.is_empty() {
                    return None;
                }
                items.splice(*index..*index, new.iter().cloned());
                Some(ListChange::Add {
                    index: *index,
                    items: new.clone(),
                })
            }
            ListOp::Set { index, item } => {
                let old = std::mem::replace(&mut items[*index], item.clone());
                Some(ListChange::Replace {
                    index: *index,
                    old,
                    new: item.clone(),
                })
            }
            ListOp::RemoveRange { index, count } => {
                if *count == 0 {
                    return None;
                }
                let removed: Vec<T> = items.drain(*index..*index + *count).collect();
                Some(ListChange::Remove {
                    index: Some(*index),
                    items: removed,
                })
            }
            ListOp::RemoveIndices(indices) => {
                if indices.is_empty() {
                    return None;
                }
                let mut removed: Vec<T> = indices.iter().rev().map(|&i| items.remove(i)).collect();
                removed.reverse();
                Some(ListChange::Remove {
                    index: None,
                    items: removed,
                })
            }
            ListOp::Move { from, to } => {
                let item = items.remove(*from);
                items.insert(*to, item.clone());
                Some(ListChange::Move {
                    from: *from,
                    to: *to,
                    item,
                })
            }
            ListOp::Clear => {
                if items.is_empty() {
                    return None;
                }
                Some(ListChange::Remove {
                    index: Some(0),
                    items: std::mem::take(items),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// BindableList<T>
// ---------------------------------------------------------------------------

/// A reactive ordered list that can be bound to other lists.
///
/// Cloning creates another handle to the **same** list.
pub struct BindableList<T: Item> {
    node: Rc<Node<ListStore<T>>>,
}

impl<T: Item> Clone for BindableList<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: Item> fmt::Debug for BindableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.with_store(|s| {
            f.debug_struct("BindableList")
                .field("items", &s.0)
                .field("disabled", &self.node.is_disabled())
                .finish()
        })
    }
}

impl<T: Item> Default for BindableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> FromIterator<T> for BindableList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_node(Node::new(ListStore(iter.into_iter().collect())))
    }
}

impl<T: Item> BindableList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::from_node(Node::new(ListStore::default()))
    }

    fn from_node(node: Rc<Node<ListStore<T>>>) -> Self {
        Self { node }
    }

    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.set_description(Some(description.into()));
        self
    }

    fn mutate(&self, op: ListOp<T>) {
        self.node.apply(&op);
    }

    fn check_index(&self, index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(BindError::out_of_range(index, len))
        }
    }

    // -- reads ---------------------------------------------------------------

    #[must_use]
    pub fn len(&self) -> usize {
        self.node.with_store(|s| s.0.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.node.with_store(|s| s.0.get(index).cloned())
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.node.with_store(|s| s.0.clone())
    }

    /// Borrow the items.
    ///
    /// # Panics
    ///
    /// Panics if `f` mutates this list (re-entrant borrow). Use
    /// [`for_each`](Self::for_each) when the callback may touch the graph.
    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.node.with_store(|s| f(&s.0))
    }

    /// Visit every item. Mutating any list of this component from inside `f`
    /// fails with [`BindError::MutatedDuringIteration`].
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        let _guard = self.node.iterate();
        for item in self.to_vec() {
            f(&item);
        }
    }

    #[must_use]
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.node.with_store(|s| s.0.iter().position(|x| x == item))
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// Clone the items into `dest[start..]`.
    pub fn copy_to(&self, dest: &mut [T], start: usize) -> Result<()> {
        self.node.with_store(|s| {
            let required = start + s.0.len();
            if required > dest.len() {
                return Err(BindError::DestinationTooSmall {
                    required,
                    capacity: dest.len(),
                });
            }
            dest[start..required].clone_from_slice(&s.0);
            Ok(())
        })
    }

    /// Lists are at their default when empty.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.is_empty()
    }

    // -- mutations -----------------------------------------------------------

    pub fn add(&self, item: T) -> Result<()> {
        self.add_range([item])
    }

    pub fn add_range(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        self.node.ensure_mutable()?;
        let items: Vec<T> = items.into_iter().collect();
        let index = self.len();
        self.mutate(ListOp::Insert { index, items });
        Ok(())
    }

    /// Insert at `index`, which may equal the length.
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.node.ensure_mutable()?;
        let len = self.len();
        if index > len {
            return Err(BindError::out_of_range(index, len));
        }
        self.mutate(ListOp::Insert {
            index,
            items: vec![item],
        });
        Ok(())
    }

    /// Replace the item at `index`, reporting one [`ListChange::Replace`].
    pub fn set(&self, index: usize, item: T) -> Result<()> {
        self.node.ensure_mutable()?;
        self.check_index(index, self.len())?;
        self.mutate(ListOp::Set { index, item });
        Ok(())
    }

    /// Remove the first occurrence of `item`.
    pub fn remove(&self, item: &T) -> Result<bool> {
        self.node.ensure_mutable()?;
        match self.index_of(item) {
            Some(index) => {
                self.mutate(ListOp::RemoveRange { index, count: 1 });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_at(&self, index: usize) -> Result<()> {
        self.node.ensure_mutable()?;
        self.check_index(index, self.len())?;
        self.mutate(ListOp::RemoveRange { index, count: 1 });
        Ok(())
    }

    pub fn remove_range(&self, index: usize, count: usize) -> Result<()> {
        self.node.ensure_mutable()?;
        let len = self.len();
        if index.saturating_add(count) > len {
            return Err(BindError::out_of_range(index.saturating_add(count), len));
        }
        self.mutate(ListOp::RemoveRange { index, count });
        Ok(())
    }

    /// Remove every item matching `predicate`; returns how many were removed.
    pub fn remove_all(&self, predicate: impl Fn(&T) -> bool) -> Result<usize> {
        self.node.ensure_mutable()?;
        let indices: Vec<usize> = self.node.with_store(|s| {
            s.0.iter()
                .enumerate()
                .filter(|(_, item)| predicate(item))
                .map(|(i, _)| i)
                .collect()
        });
        let removed = indices.len();
        self.mutate(ListOp::RemoveIndices(indices));
        Ok(removed)
    }

    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.node.ensure_mutable()?;
        let len = self.len();
        self.check_index(from, len)?;
        self.check_index(to, len)?;
        self.mutate(ListOp::Move { from, to });
        Ok(())
    }

    /// Remove everything. An empty list stays silent.
    pub fn clear(&self) -> Result<()> {
        self.node.ensure_mutable()?;
        self.mutate(ListOp::Clear);
        Ok(())
    }

    // -- disabled & description ----------------------------------------------

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.node.is_disabled()
    }

    /// Change the disabled flag for every bound list.
    pub fn set_disabled(&self, disabled: bool) {
        self.node.set_disabled(disabled);
    }

    #[must_use]
    pub fn description(&self) -> Option<String> {
        self.node.description()
    }

    pub fn set_description(&self, description: Option<String>) {
        self.node.set_description(description);
    }

    // -- observers -----------------------------------------------------------

    pub fn on_collection_changed(&self, f: impl Fn(&ListChange<T>) + 'static) -> Subscription {
        self.node.changed.subscribe(f)
    }

    /// Subscribe to diffs, optionally invoking `f` right away with an
    /// [`ListChange::Add`] of the whole content.
    pub fn bind_collection_changed(
        &self,
        f: impl Fn(&ListChange<T>) + 'static,
        run_once_immediately: bool,
    ) -> Subscription {
        let f = Rc::new(f);
        let inner = Rc::clone(&f);
        let subscription = self.node.changed.subscribe(move |c| inner(c));
        if run_once_immediately {
            f(&ListChange::Add {
                index: 0,
                items: self.to_vec(),
            });
        }
        subscription
    }

    pub fn on_disabled_changed(&self, f: impl Fn(&bool) + 'static) -> Subscription {
        self.node.disabled_changed.subscribe(f)
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

    // -- parsing -------------------------------------------------------------

    /// Replace the contents: `None` clears, `Some(items)` clears then adds
    /// unless the list already equals `items`.
    pub fn parse_items(&self, items: Option<&[T]>) -> Result<()> {
        self.node.ensure_mutable()?;
        match items {
            None => self.clear(),
            Some(items) if self.with_items(|mine| mine == items) => Ok(()),
            Some(items) => {
                self.clear()?;
                self.add_range(items.iter().cloned())
            }
        }
    }

    /// Write a dynamically typed input.
    ///
    /// Accepts `Vec<T>`, `Option<Vec<T>>` (`None` clears), or another
    /// `BindableList<T>`. Anything else fails with
    /// [`BindError::TypeMismatch`].
    pub fn parse(&self, input: &dyn Any) -> Result<()> {
        if let Some(items) = input.downcast_ref::<Vec<T>>() {
            return self.parse_items(Some(items));
        }
        if let Some(items) = input.downcast_ref::<Option<Vec<T>>>() {
            return self.parse_items(items.as_deref());
        }
        if let Some(other) = input.downcast_ref::<BindableList<T>>() {
            return self.parse_items(Some(&other.to_vec()));
        }
        Err(BindError::type_mismatch::<Vec<T>>())
    }

    // -- binding -------------------------------------------------------------

    /// Adopt `other`'s contents and disabled flag, then link.
    ///
    /// Contents are replaced by one remove diff then one add diff, or left
    /// alone if they already match.
    pub fn bind_to(&self, other: &BindableList<T>) -> Result<()> {
        if Rc::ptr_eq(&self.node, &other.node) {
            return Err(BindError::BindToSelf);
        }
        if self.node.reaches(other.node.id()) {
            return Err(BindError::AlreadyBound);
        }
        self.parse_items(Some(&other.to_vec()))?;
        self.set_disabled(other.is_disabled());
        Node::link(&self.node, &other.node);
        debug!(message = "list.bind", list = self.node.id(), other = other.node.id());
        Ok(())
    }

    pub fn unbind_from(&self, other: &BindableList<T>) {
        if Node::unlink(&self.node, &other.node) {
            debug!(message = "list.unbind", list = self.node.id(), other = other.node.id());
        }
    }

    pub fn unbind_bindings(&self) {
        self.node.unbind_bindings();
    }

    pub fn unbind_events(&self) {
        self.node.clear_observers();
    }

    pub fn unbind_all(&self) {
        self.unbind_events();
        self.unbind_bindings();
    }

    #[must_use]
    pub fn is_bound_to(&self, other: &BindableList<T>) -> bool {
        self.node
            .partners()
            .iter()
            .any(|p| Rc::ptr_eq(p, &other.node))
    }

    #[must_use]
    pub fn partner_count(&self) -> usize {
        self.node.partners().len()
    }

    /// A new list bound to this one.
    #[must_use]
    pub fn get_bound_copy(&self) -> Self {
        let copy = Self::from_node(self.node.detached_copy(true));
        Node::link(&copy.node, &self.node);
        copy
    }

    /// A new list with the same contents and disabled flag, unbound.
    #[must_use]
    pub fn get_unbound_copy(&self) -> Self {
        Self::from_node(self.node.detached_copy(true))
    }

    /// A new, empty, enabled list.
    #[must_use]
    pub fn create_instance(&self) -> Self {
        Self::new()
    }

    /// A read-only handle following this list.
    #[must_use]
    pub fn as_read_only(&self) -> ReadOnlyList<T> {
        ReadOnlyList { list: self.clone() }
    }
}

// ---------------------------------------------------------------------------
// ReadOnlyList<T>
// ---------------------------------------------------------------------------

/// Read access and change notification over a live [`BindableList`].
pub struct ReadOnlyList<T: Item> {
    list: BindableList<T>,
}

impl<T: Item> Clone for ReadOnlyList<T> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
        }
    }
}

impl<T: Item> fmt::Debug for ReadOnlyList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnlyList").field(&self.list.to_vec()).finish()
    }
}

impl<T: Item> ReadOnlyList<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.list.get(index)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.list.to_vec()
    }

    pub fn for_each(&self, f: impl FnMut(&T)) {
        self.list.for_each(f);
    }

    #[must_use]
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.list.index_of(item)
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.list.contains(item)
    }

    pub fn copy_to(&self, dest: &mut [T], start: usize) -> Result<()> {
        self.list.copy_to(dest, start)
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.list.is_disabled()
    }

    pub fn on_collection_changed(&self, f: impl Fn(&ListChange<T>) + 'static) -> Subscription {
        self.list.on_collection_changed(f)
    }

    pub fn bind_collection_changed(
        &self,
        f: impl Fn(&ListChange<T>) + 'static,
        run_once_immediately: bool,
    ) -> Subscription {
        self.list.bind_collection_changed(f, run_once_immediately)
    }

    pub fn on_disabled_changed(&self, f: impl Fn(&bool) + 'static) -> Subscription {
        self.list.on_disabled_changed(f)
    }

    /// A writable list bound to the underlying one.
    #[must_use]
    pub fn get_bound_copy(&self) -> BindableList<T> {
        self.list.get_bound_copy()
    }
}

// ---------------------------------------------------------------------------
// AnyBindable
// ---------------------------------------------------------------------------

impl<T: Item> AnyBindable for BindableList<T> {
    fn kind(&self) -> &'static str {
        type_name::<Self>()
    }

    fn description(&self) -> Option<String> {
        BindableList::description(self)
    }

    fn is_disabled(&self) -> bool {
        BindableList::is_disabled(self)
    }

    fn is_default(&self) -> bool {
        BindableList::is_default(self)
    }

    fn parse(&self, input: &dyn Any) -> Result<()> {
        BindableList::parse(self, input)
    }

    fn create_instance(&self) -> Box<dyn AnyBindable> {
        Box::new(BindableList::create_instance(self))
    }

    fn bound_copy(&self) -> Box<dyn AnyBindable> {
        Box::new(self.get_bound_copy())
    }

    fn bind_to_any(&self, other: &dyn AnyBindable) -> Result<()> {
        self.bind_to(downcast_peer::<Self>(other)?)
    }

    fn unbind_from_any(&self, other: &dyn AnyBindable) -> Result<()> {
        self.unbind_from(downcast_peer::<Self>(other)?);
        Ok(())
    }

    fn unbind_events(&self) {
        BindableList::unbind_events(self);
    }

    fn unbind_bindings(&self) {
        BindableList::unbind_bindings(self);
    }

    fn unbind_all(&self) {
        BindableList::unbind_all(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tracing_test::traced_test;

    fn recorder<T: Item>(list: &BindableList<T>) -> (Rc<RefCell<Vec<ListChange<T>>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let sub = list.on_collection_changed(move |c| l.borrow_mut().push(c.clone()));
        (log, sub)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn add_reports_one_diff_to_each_partner() {
        let list = BindableList::<String>::new();
        let copy = list.get_bound_copy();
        let (mine, _a) = recorder(&list);
        let (theirs, _b) = recorder(&copy);

        list.add("x".to_owned()).unwrap();
        let expected = vec![ListChange::Add {
            index: 0,
            items: strings(&["x"]),
        }];
        assert_eq!(*mine.borrow(), expected);
        assert_eq!(*theirs.borrow(), expected);
        assert_eq!(copy.to_vec(), strings(&["x"]));
    }

    #[test]
    fn chain_notifies_furthest_first() {
        let a = BindableList::<i32>::new();
        let b = a.get_bound_copy();
        let c = b.get_bound_copy();
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut subs = Vec::new();
        for (name, list) in [("a", &a), ("b", &b), ("c", &c)] {
            let o = Rc::clone(&order);
            subs.push(list.on_collection_changed(move |_| o.borrow_mut().push(name)));
        }
        a.add(1).unwrap();
        assert_eq!(*order.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn replace_carries_old_and_new() {
        let list: BindableList<i32> = [1, 2, 3].into_iter().collect();
        let (log, _s) = recorder(&list);
        list.set(1, 20).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![ListChange::Replace {
                index: 1,
                old: 2,
                new: 20
            }]
        );
        assert!(list.set(3, 0).is_err());
    }

    #[test]
    fn remove_all_reports_non_contiguous_remove() {
        let list: BindableList<i32> = (1..=6).collect();
        let copy = list.get_bound_copy();
        let (log, _s) = recorder(&copy);
        assert_eq!(list.remove_all(|v| v % 2 == 0).unwrap(), 3);
        assert_eq!(copy.to_vec(), vec![1, 3, 5]);
        assert_eq!(
            *log.borrow(),
            vec![ListChange::Remove {
                index: None,
                items: vec![2, 4, 6]
            }]
        );
        assert_eq!(list.remove_all(|v| *v > 100).unwrap(), 0);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn clear_is_silent_when_empty() {
        let list = BindableList::<i32>::new();
        let (log, _s) = recorder(&list);
        list.clear().unwrap();
        assert!(log.borrow().is_empty());
        list.add_range([1, 2]).unwrap();
        list.clear().unwrap();
        assert_eq!(
            log.borrow().last(),
            Some(&ListChange::Remove {
                index: Some(0),
                items: vec![1, 2]
            })
        );
    }

    #[test]
    fn move_and_range_removal() {
        let list: BindableList<char> = "abcde".chars().collect();
        let copy = list.get_bound_copy();
        list.move_item(0, 4).unwrap();
        assert_eq!(copy.to_vec(), vec!['b', 'c', 'd', 'e', 'a']);
        list.remove_range(1, 2).unwrap();
        assert_eq!(copy.to_vec(), vec!['b', 'e', 'a']);
        assert!(list.remove_range(2, 5).is_err());
        assert!(list.remove(&'e').unwrap());
        assert!(!list.remove(&'z').unwrap());
        list.insert(0, 'q').unwrap();
        assert_eq!(copy.to_vec(), vec!['q', 'b', 'a']);
        assert!(list.insert(9, 'r').is_err());
    }

    #[test]
    fn sibling_observer_may_mutate_during_propagation() {
        let a: BindableList<i32> = [1, 2].into_iter().collect();
        let b = a.get_bound_copy();
        let c = a.get_bound_copy();
        let b2 = b.clone();
        let _clear = b.on_collection_changed(move |_| {
            if !b2.is_empty() {
                b2.clear().unwrap();
            }
        });
        let (c_log, _s) = recorder(&c);

        a.remove_at(1).unwrap();
        assert!(a.is_empty());
        assert!(b.is_empty());
        assert!(c.is_empty());
        assert_eq!(
            *c_log.borrow(),
            vec![
                ListChange::Remove {
                    index: Some(0),
                    items: vec![1]
                },
                ListChange::Remove {
                    index: Some(1),
                    items: vec![2]
                },
            ]
        );
    }

    #[test]
    fn disabled_rejects_mutation() {
        let list = BindableList::<i32>::new();
        let copy = list.get_bound_copy();
        copy.set_disabled(true);
        assert!(list.is_disabled());
        assert_eq!(list.add(1), Err(BindError::Disabled { what: "collection" }));
        assert!(list.clear().is_err());
        list.set_disabled(false);
        list.add(1).unwrap();
    }

    #[test]
    fn mutation_during_iteration_fails() {
        let list: BindableList<i32> = [1, 2].into_iter().collect();
        let copy = list.get_bound_copy();
        let mut errors = Vec::new();
        list.for_each(|v| errors.push(copy.add(*v)));
        assert!(errors.iter().all(|e| *e == Err(BindError::MutatedDuringIteration)));
        copy.add(3).unwrap();
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn bind_to_equal_contents_is_silent() {
        let source: BindableList<i32> = [1, 2].into_iter().collect();
        let target: BindableList<i32> = [1, 2].into_iter().collect();
        let (log, _s) = recorder(&target);
        target.bind_to(&source).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn bind_to_different_contents_removes_then_adds() {
        let source: BindableList<i32> = [7, 8].into_iter().collect();
        let target: BindableList<i32> = [1].into_iter().collect();
        let (log, _s) = recorder(&target);
        target.bind_to(&source).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                ListChange::Remove {
                    index: Some(0),
                    items: vec![1]
                },
                ListChange::Add {
                    index: 0,
                    items: vec![7, 8]
                },
            ]
        );
        assert_eq!(target.bind_to(&source), Err(BindError::AlreadyBound));
        assert_eq!(target.bind_to(&target), Err(BindError::BindToSelf));
    }

    #[test]
    fn parse_accepts_sequences_and_none() {
        let list = BindableList::<i32>::new();
        list.parse(&vec![1, 2, 3]).unwrap();
        assert_eq!(list.to_vec(), vec![1, 2, 3]);
        list.parse(&None::<Vec<i32>>).unwrap();
        assert!(list.is_default());
        let other: BindableList<i32> = [4].into_iter().collect();
        list.parse(&other).unwrap();
        assert_eq!(list.to_vec(), vec![4]);
        let err = list.parse(&"4").unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { .. }));
    }

    #[test]
    fn run_once_sends_whole_content() {
        let list: BindableList<i32> = [1, 2].into_iter().collect();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = list.bind_collection_changed(move |c| s.borrow_mut().push(c.clone()), true);
        assert_eq!(
            *seen.borrow(),
            vec![ListChange::Add {
                index: 0,
                items: vec![1, 2]
            }]
        );
    }

    #[test]
    fn read_only_follows_mutations() {
        let list = BindableList::<i32>::new();
        let view = list.as_read_only();
        list.add_range([3, 1, 2]).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.index_of(&1), Some(1));
        let mut dest = [0; 5];
        view.copy_to(&mut dest, 1).unwrap();
        assert_eq!(dest, [0, 3, 1, 2, 0]);
        let mut small = [0; 2];
        assert_eq!(
            view.copy_to(&mut small, 0),
            Err(BindError::DestinationTooSmall {
                required: 3,
                capacity: 2
            })
        );
    }

    #[test]
    fn dropped_partner_is_pruned() {
        let list = BindableList::<i32>::new();
        {
            let _copy = list.get_bound_copy();
            assert_eq!(list.partner_count(), 1);
        }
        assert_eq!(list.partner_count(), 0);
        list.add(1).unwrap();
    }

    #[test]
    fn unbind_stops_propagation() {
        let list = BindableList::<i32>::new();
        let copy = list.get_bound_copy();
        copy.unbind_from(&list);
        list.add(1).unwrap();
        assert!(copy.is_empty());
        assert!(!list.is_bound_to(&copy));
    }

    #[test]
    #[traced_test]
    fn logs_bind() {
        let a = BindableList::<i32>::new();
        let b = BindableList::<i32>::new();
        b.bind_to(&a).unwrap();
        assert!(logs_contain("list.bind"));
    }
}
