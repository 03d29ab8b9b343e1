#![forbid(unsafe_code)]

//! Tether public facade crate.
//!
//! Re-exports the core cells and, with the `collections` feature, the list
//! and map cells.

pub use tether_core::*;

#[cfg(feature = "collections")]
pub use tether_collections as collections;

pub mod prelude {
    pub use tether_core::{
        Aggregate, AnyBindable, BindError, BindValue, Bindable, BindableDouble, BindableFloat,
        BindableInt, BindableLong, BindableNumber, Lease, NumberFormat, ReadOnlyBindable, Result,
        Subscription, SubscriptionScope, Synchronization,
    };

    #[cfg(feature = "collections")]
    pub use tether_collections::{BindableList, BindableMap, ListChange, MapChange, ReadOnlyList};
}
