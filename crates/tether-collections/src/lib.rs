#![forbid(unsafe_code)]

//! Bindable collection cells.
//!
//! [`BindableList`] and [`BindableMap`] bind the same way scalar cells do,
//! but instead of a value-changed event they report a structured diff
//! ([`ListChange`], [`MapChange`]) for every mutation, on every bound
//! partner.

mod node;

pub mod list;
pub mod map;

pub use list::{BindableList, Item, ListChange, ReadOnlyList};
pub use map::{BindableMap, Key, MapChange};
