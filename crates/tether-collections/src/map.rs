#![forbid(unsafe_code)]

//! Insertion-ordered dictionary cells.
//!
//! [`BindableMap<K, V>`] shares the list machinery: each mutation is checked,
//! applied, replayed on bound partners and reported once as a [`MapChange`].
//! Iteration order is insertion order on every partner because partners
//! replay the same ops.

use std::any::{Any, type_name};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::{AHashSet, RandomState};
use indexmap::IndexMap;
use tether_core::{AnyBindable, BindError, Result, Subscription, downcast_peer};
use tracing::debug;

use crate::list::Item;
use crate::node::{Node, Store};

/// Key bound for dictionary cells.
pub trait Key: Item + Eq + Hash {}

impl<K: Item + Eq + Hash> Key for K {}

/// Structured description of one dictionary mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MapChange<K, V> {
    Add { items: Vec<(K, V)> },
    Remove { items: Vec<(K, V)> },
    Replace { key: K, old: V, new: V },
}

#[derive(Debug)]
pub(crate) enum MapOp<K, V> {
    /// Keys are known to be absent.
    Insert(Vec<(K, V)>),
    Set { key: K, value: V },
    Remove(K),
    Clear,
}

pub(crate) struct MapStore<K, V>(IndexMap<K, V, RandomState>);

impl<K: Clone, V: Clone> Clone for MapStore<K, V> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<K, V> Default for MapStore<K, V> {
    fn default() -> Self {
        Self(IndexMap::with_hasher(RandomState::new()))
    }
}

impl<K: Key, V: Item> Store for MapStore<K, V> {
    type Op = MapOp<K, V>;
    type Change = MapChange<K, V>;

    fn apply(&mut self, op: &MapOp<K, V>) -> Option<MapChange<K, V>> {
        let map = &mut self.0;
        match op {
            MapOp::Insert(items) => {
                if items.is_empty() {
                    return None;
                }
                map.extend(items.iter().cloned());
                Some(MapChange::Add {
                    items: items.clone(),
                })
            }
            MapOp::Set { key, value } => match map.insert(key.clone(), value.clone()) {
                Some(old) => Some(MapChange::Replace {
                    key: key.clone(),
                    old,
                    new: value.clone(),
                }),
                None => Some(MapChange::Add {
                    items: vec![(key.clone(), value.clone())],
                }),
            },
            MapOp::Remove(key) => map.shift_remove(key).map(|value| MapChange::Remove {
                items: vec![(key.clone(), value)],
            }),
            MapOp::Clear => {
                if map.is_empty() {
                    return None;
                }
                Some(MapChange::Remove {
                    items: map.drain(..).collect(),
                })
            }
        }
    }
}

fn duplicate_key<K: fmt::Debug>(key: &K) -> BindError {
    BindError::DuplicateKey {
        key: format!("{key:?}"),
    }
}

/// Fail on the first key that repeats within `pairs` or is already taken.
fn check_unique<K: Key, V>(pairs: &[(K, V)], taken: impl Fn(&K) -> bool) -> Result<()> {
    let mut seen = AHashSet::with_capacity(pairs.len());
    for (key, _) in pairs {
        if taken(key) || !seen.insert(key) {
            return Err(duplicate_key(key));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// BindableMap<K, V>
// ---------------------------------------------------------------------------

/// A reactive dictionary that can be bound to other dictionaries.
///
/// Cloning creates another handle to the **same** dictionary.
pub struct BindableMap<K: Key, V: Item> {
    node: Rc<Node<MapStore<K, V>>>,
}

impl<K: Key, V: Item> Clone for BindableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<K: Key, V: Item> fmt::Debug for BindableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node
            .with_store(|s| f.debug_map().entries(s.0.iter()).finish())
    }
}

impl<K: Key, V: Item> Default for BindableMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V: Item> BindableMap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            node: Node::new(MapStore::default()),
        }
    }

    /// Build from pairs, failing on a repeated key.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self> {
        let map = Self::new();
        map.add_range(pairs)?;
        Ok(map)
    }

    fn from_node(node: Rc<Node<MapStore<K, V>>>) -> Self {
        Self { node }
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
    pub fn get(&self, key: &K) -> Option<V> {
        self.node.with_store(|s| s.0.get(key).cloned())
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.node.with_store(|s| s.0.contains_key(key))
    }

    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.node.with_store(|s| s.0.keys().cloned().collect())
    }

    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.node.with_store(|s| s.0.values().cloned().collect())
    }

    /// Pairs in insertion order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<(K, V)> {
        self.node
            .with_store(|s| s.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        let _guard = self.node.iterate();
        for (k, v) in self.to_vec() {
            f(&k, &v);
        }
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.is_empty()
    }

    /// Same pairs in the same order.
    fn matches(&self, pairs: &[(K, V)]) -> bool {
        self.node
            .with_store(|s| s.0.iter().eq(pairs.iter().map(|(k, v)| (k, v))))
    }

    // -- mutations -----------------------------------------------------------

    /// Add a new entry; an existing key fails with [`BindError::DuplicateKey`].
    pub fn insert(&self, key: K, value: V) -> Result<()> {
        self.add_range([(key, value)])
    }

    /// Add several new entries at once, reported as one diff.
    pub fn add_range(&self, pairs: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        self.node.ensure_mutable()?;
        let pairs: Vec<(K, V)> = pairs.into_iter().collect();
        check_unique(&pairs, |key| self.contains_key(key))?;
        self.node.apply(&MapOp::Insert(pairs));
        Ok(())
    }

    /// Insert or overwrite. Overwriting reports [`MapChange::Replace`].
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.node.ensure_mutable()?;
        self.node.apply(&MapOp::Set { key, value });
        Ok(())
    }

    pub fn remove(&self, key: &K) -> Result<bool> {
        self.node.ensure_mutable()?;
        if !self.contains_key(key) {
            return Ok(false);
        }
        self.node.apply(&MapOp::Remove(key.clone()));
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        self.node.ensure_mutable()?;
        self.node.apply(&MapOp::Clear);
        Ok(())
    }

    // -- disabled & description ----------------------------------------------

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.node.is_disabled()
    }

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

    pub fn on_collection_changed(&self, f: impl Fn(&MapChange<K, V>) + 'static) -> Subscription {
        self.node.changed.subscribe(f)
    }

    pub fn bind_collection_changed(
        &self,
        f: impl Fn(&MapChange<K, V>) + 'static,
        run_once_immediately: bool,
    ) -> Subscription {
        let f = Rc::new(f);
        let inner = Rc::clone(&f);
        let subscription = self.node.changed.subscribe(move |c| inner(c));
        if run_once_immediately {
            f(&MapChange::Add {
                items: self.to_vec(),
            });
        }
        subscription
    }

    pub fn on_disabled_changed(&self, f: impl Fn(&bool) + 'static) -> Subscription {
        self.node.disabled_changed.subscribe(f)
    }

    // -- parsing -------------------------------------------------------------

    /// Replace the contents, skipping the write when the pairs already match
    /// in order.
    pub fn parse_pairs(&self, pairs: Option<&[(K, V)]>) -> Result<()> {
        self.node.ensure_mutable()?;
        match pairs {
            None => self.clear(),
            Some(pairs) if self.matches(pairs) => Ok(()),
            Some(pairs) => {
                check_unique(pairs, |_| false)?;
                self.clear()?;
                self.add_range(pairs.iter().cloned())
            }
        }
    }

    /// Write a dynamically typed input: `Vec<(K, V)>`, `Option<Vec<(K, V)>>`
    /// or another `BindableMap<K, V>`.
    pub fn parse(&self, input: &dyn Any) -> Result<()> {
        if let Some(pairs) = input.downcast_ref::<Vec<(K, V)>>() {
            return self.parse_pairs(Some(pairs));
        }
        if let Some(pairs) = input.downcast_ref::<Option<Vec<(K, V)>>>() {
            return self.parse_pairs(pairs.as_deref());
        }
        if let Some(other) = input.downcast_ref::<BindableMap<K, V>>() {
            return self.parse_pairs(Some(&other.to_vec()));
        }
        Err(BindError::type_mismatch::<Vec<(K, V)>>())
    }

    // -- binding -------------------------------------------------------------

    pub fn bind_to(&self, other: &BindableMap<K, V>) -> Result<()> {
        if Rc::ptr_eq(&self.node, &other.node) {
            return Err(BindError::BindToSelf);
        }
        if self.node.reaches(other.node.id()) {
            return Err(BindError::AlreadyBound);
        }
        self.parse_pairs(Some(&other.to_vec()))?;
        self.set_disabled(other.is_disabled());
        Node::link(&self.node, &other.node);
        debug!(message = "map.bind", map = self.node.id(), other = other.node.id());
        Ok(())
    }

    pub fn unbind_from(&self, other: &BindableMap<K, V>) {
        if Node::unlink(&self.node, &other.node) {
            debug!(message = "map.unbind", map = self.node.id(), other = other.node.id());
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
    pub fn is_bound_to(&self, other: &BindableMap<K, V>) -> bool {
        self.node
            .partners()
            .iter()
            .any(|p| Rc::ptr_eq(p, &other.node))
    }

    #[must_use]
    pub fn get_bound_copy(&self) -> Self {
        let copy = Self::from_node(self.node.detached_copy(true));
        Node::link(&copy.node, &self.node);
        copy
    }

    #[must_use]
    pub fn get_unbound_copy(&self) -> Self {
        Self::from_node(self.node.detached_copy(true))
    }

    #[must_use]
    pub fn create_instance(&self) -> Self {
        Self::new()
    }
}

impl<K: Key, V: Item> AnyBindable for BindableMap<K, V> {
    fn kind(&self) -> &'static str {
        type_name::<Self>()
    }

    fn description(&self) -> Option<String> {
        BindableMap::description(self)
    }

    fn is_disabled(&self) -> bool {
        BindableMap::is_disabled(self)
    }

    fn is_default(&self) -> bool {
        BindableMap::is_default(self)
    }

    fn parse(&self, input: &dyn Any) -> Result<()> {
        BindableMap::parse(self, input)
    }

    fn create_instance(&self) -> Box<dyn AnyBindable> {
        Box::new(BindableMap::create_instance(self))
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
        BindableMap::unbind_events(self);
    }

    fn unbind_bindings(&self) {
        BindableMap::unbind_bindings(self);
    }

    fn unbind_all(&self) {
        BindableMap::unbind_all(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
