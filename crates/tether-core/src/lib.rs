#![forbid(unsafe_code)]

//! Core: bindable cells, the binding graph, numeric ranges, leasing and
//! aggregates.
//!
//! # Architecture
//!
//! Every cell is an `Rc` node holding its state in a `RefCell`. Partners are
//! stored as `Weak` references on both sides, and observers are stored as
//! `Weak` callbacks kept alive by RAII [`Subscription`] guards. All
//! propagation is synchronous on the calling thread; observers may write back
//! into the graph from inside a callback.

pub mod aggregate;
pub mod any;
pub mod bindable;
pub mod error;
pub mod format;
pub mod insets;
pub mod lease;
pub mod number;
pub mod numeric;
pub mod read_only;
pub mod rgba;
pub mod subscription;
pub mod sync;
pub mod value;

pub use aggregate::Aggregate;
pub use any::{AnyBindable, downcast_peer};
pub use bindable::{Bindable, ValueChanged};
pub use error::{BindError, ErrorKind, Result};
pub use format::NumberFormat;
pub use insets::Insets;
pub use lease::Lease;
pub use number::{
    BindableDouble, BindableFloat, BindableInt, BindableLong, BindableNumber, NumberSnapshot,
};
pub use numeric::Numeric;
pub use read_only::ReadOnlyBindable;
pub use rgba::Rgba;
pub use subscription::{Subscribers, Subscription, SubscriptionScope};
pub use sync::Synchronization;
pub use value::BindValue;
