#![forbid(unsafe_code)]

//! Exclusive, revocable write access to a cell.
//!
//! [`Bindable::begin_lease`] binds a new handle to the source cell, records
//! the pre-lease disabled flag (and value, when reverting), then disables the
//! whole component. Writes through the [`Lease`] handle, or through bound
//! copies of it, bypass the disabled flag and are the only writes allowed to
//! change it.
//!
//! # State machine
//!
//! ```text
//! Unleased --begin_lease--> Active --return/end_lease/unbind_all/drop--> Returned
//! ```
//!
//! # Invariants
//!
//! 1. A component holds at most one active lease.
//! 2. Returning restores the pre-lease disabled flag and, when requested, the
//!    pre-lease value, then detaches the handle.
//! 3. Returning twice is a no-op reported as `Ok(false)`.
//! 4. Every write through a returned handle fails with
//!    [`BindError::LeaseReturned`].

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::bindable::{Bindable, Node};
use crate::error::{BindError, Result};
use crate::value::BindValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Active,
    /// Restoring pre-lease state; the handle keeps its authority.
    Releasing,
    Returned,
}

pub(crate) struct LeaseState<T: BindValue> {
    id: u64,
    source: Weak<Node<T>>,
    handle: Weak<Node<T>>,
    revert_to: Option<T>,
    disabled_before: bool,
    stage: Cell<Stage>,
}

impl<T: BindValue> LeaseState<T> {
    pub(crate) fn grants_authority(&self) -> bool {
        self.stage.get() != Stage::Returned
    }

    pub(crate) fn is_returned(&self) -> bool {
        self.stage.get() == Stage::Returned
    }
}

/// Marks a node as a lease handle or a bound copy of one.
pub(crate) struct LeaseRole<T: BindValue> {
    pub(crate) lease: Rc<LeaseState<T>>,
    pub(crate) primary: bool,
}

impl<T: BindValue> Clone for LeaseRole<T> {
    fn clone(&self) -> Self {
        Self {
            lease: Rc::clone(&self.lease),
            primary: self.primary,
        }
    }
}

impl<T: BindValue> LeaseRole<T> {
    pub(crate) fn copy(&self) -> Self {
        Self {
            lease: Rc::clone(&self.lease),
            primary: false,
        }
    }
}

pub(crate) fn begin<T: BindValue>(source: &Rc<Node<T>>, revert_value_on_return: bool) -> Result<Lease<T>> {
    if source.lease_role().is_some() {
        return Err(BindError::NestedLease);
    }
    if source.component_leased() {
        return Err(BindError::AlreadyLeased);
    }

    let handle = source.bound_copy();
    let lease = Rc::new(LeaseState {
        id: handle.id(),
        source: Rc::downgrade(source),
        handle: Rc::downgrade(&handle),
        revert_to: revert_value_on_return.then(|| handle.value()),
        disabled_before: handle.is_disabled(),
        stage: Cell::new(Stage::Active),
    });
    handle.set_lease_role(Some(LeaseRole {
        lease: Rc::clone(&lease),
        primary: true,
    }));
    source.set_active_lease(Some(Rc::clone(&lease)));
    handle.assign_disabled(true);

    debug!(
        message = "lease.begin",
        cell = source.id(),
        lease = lease.id,
        revert = revert_value_on_return
    );
    Ok(Lease {
        cell: Bindable::from_node(handle),
        lease,
        primary: true,
    })
}

/// Restore pre-lease state and detach the handle. Returns `false` when the
/// lease was already returned.
pub(crate) fn release<T: BindValue>(lease: &Rc<LeaseState<T>>) -> bool {
    if lease.stage.get() != Stage::Active {
        return false;
    }
    lease.stage.set(Stage::Releasing);

    let handle = lease.handle.upgrade();
    let source = lease.source.upgrade();
    if let Some(end) = handle.as_ref().or(source.as_ref()) {
        if let Some(value) = &lease.revert_to {
            end.assign_value(end.constrain(value.clone()));
        }
        end.assign_disabled(lease.disabled_before);
    }
    if let Some(source) = &source {
        source.set_active_lease(None);
    }
    lease.stage.set(Stage::Returned);
    if let Some(handle) = &handle {
        handle.clear_observers();
        handle.unbind_bindings();
    }

    debug!(
        message = "lease.return",
        lease = lease.id,
        reverted = lease.revert_to.is_some()
    );
    true
}

pub(crate) fn end<T: BindValue>(source: &Rc<Node<T>>, handle: &Lease<T>) -> Result<()> {
    let active = source.active_lease().ok_or(BindError::NoActiveLease)?;
    if !Rc::ptr_eq(&active, &handle.lease) {
        return Err(BindError::LeaseMismatch);
    }
    release(&active);
    Ok(())
}

// ---------------------------------------------------------------------------
// Lease<T>
// ---------------------------------------------------------------------------

/// The writable handle of an active lease.
///
/// Dereferences to the handle's [`Bindable`]. Dropping the primary handle
/// returns the lease.
#[must_use = "dropping the primary Lease returns it immediately"]
pub struct Lease<T: BindValue> {
    cell: Bindable<T>,
    lease: Rc<LeaseState<T>>,
    primary: bool,
}

impl<T: BindValue> Lease<T> {
    /// End the lease. Returns `Ok(false)` if it was already returned.
    ///
    /// Only the handle produced by `begin_lease` may return the lease; bound
    /// copies get [`BindError::ReturnFromCopy`].
    pub fn return_lease(&self) -> Result<bool> {
        if !self.primary {
            return Err(BindError::ReturnFromCopy);
        }
        Ok(release(&self.lease))
    }

    #[must_use]
    pub fn is_returned(&self) -> bool {
        self.lease.is_returned()
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    #[must_use]
    pub fn reverts_on_return(&self) -> bool {
        self.lease.revert_to.is_some()
    }

    /// A new lease-role cell bound to this handle. It shares the handle's
    /// write authority but cannot return the lease.
    pub fn get_bound_copy(&self) -> Lease<T> {
        Lease {
            cell: self.cell.get_bound_copy(),
            lease: Rc::clone(&self.lease),
            primary: false,
        }
    }

    #[must_use]
    pub fn as_bindable(&self) -> &Bindable<T> {
        &self.cell
    }
}

impl<T: BindValue> Deref for Lease<T> {
    type Target = Bindable<T>;

    fn deref(&self) -> &Self::Target {
        &self.cell
    }
}

impl<T: BindValue> Drop for Lease<T> {
    fn drop(&mut self) {
        if self.primary {
            release(&self.lease);
        }
    }
}

impl<T: BindValue> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("value", &self.cell.value())
            .field("primary", &self.primary)
            .field("returned", &self.is_returned())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
