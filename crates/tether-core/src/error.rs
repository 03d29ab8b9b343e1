#![forbid(unsafe_code)]

//! Error taxonomy for bindable cells.
//!
//! Every failure is immediate and local: nothing is retried and no partial
//! mutation is left behind by an operation that returns `Err`. Range
//! violations are not errors; numeric cells clamp silently.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BindError>;

/// Coarse category of a [`BindError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A write was attempted while the cell was disabled or lease-locked.
    Disabled,
    /// The requested operation is illegal for the current graph or lease state.
    InvalidOperation,
    /// An argument had the wrong shape, type or range.
    Argument,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("cannot set {what} while the bindable is disabled")]
    Disabled { what: &'static str },

    #[error("disabled state is locked by an active lease")]
    LeaseLocked,

    #[error("bindables are already bound")]
    AlreadyBound,

    #[error("a bindable cannot be bound to itself")]
    BindToSelf,

    #[error("cannot bind a {found} to a {expected}")]
    IncompatibleBinding {
        expected: &'static str,
        found: &'static str,
    },

    #[error("attempted to lease a bindable that is already in a leased state")]
    AlreadyLeased,

    #[error("a leased bindable cannot itself be leased")]
    NestedLease,

    #[error("attempted to end a lease without beginning one")]
    NoActiveLease,

    #[error("attempted to end a lease with a different handle than the one that began it")]
    LeaseMismatch,

    #[error("the lease has already been returned")]
    LeaseReturned,

    #[error("a lease can only be returned through the handle that began it")]
    ReturnFromCopy,

    #[error("collection was mutated while it was being iterated")]
    MutatedDuringIteration,

    #[error("could not parse {input:?} as {expected}")]
    Parse {
        input: String,
        expected: &'static str,
    },

    #[error("could not parse a value of an unsupported type into {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("invalid range [{min} - {max}]")]
    InvalidRange { min: String, max: String },

    #[error("precision must be greater than 0, got {precision}")]
    InvalidPrecision { precision: String },

    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("key {key} is already present")]
    DuplicateKey { key: String },

    #[error("destination holds {capacity} slots but {required} are required")]
    DestinationTooSmall { required: usize, capacity: usize },
}

impl BindError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Disabled { .. } | Self::LeaseLocked => ErrorKind::Disabled,
            Self::AlreadyBound
            | Self::BindToSelf
            | Self::IncompatibleBinding { .. }
            | Self::AlreadyLeased
            | Self::NestedLease
            | Self::NoActiveLease
            | Self::LeaseMismatch
            | Self::LeaseReturned
            | Self::ReturnFromCopy
            | Self::MutatedDuringIteration => ErrorKind::InvalidOperation,
            Self::Parse { .. }
            | Self::TypeMismatch { .. }
            | Self::InvalidRange { .. }
            | Self::InvalidPrecision { .. }
            | Self::IndexOutOfRange { .. }
            | Self::DuplicateKey { .. }
            | Self::DestinationTooSmall { .. } => ErrorKind::Argument,
        }
    }

    #[must_use]
    pub fn parse(input: impl Into<String>, expected: &'static str) -> Self {
        Self::Parse {
            input: input.into(),
            expected,
        }
    }

    #[must_use]
    pub fn type_mismatch<T>() -> Self {
        Self::TypeMismatch {
            expected: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            BindError::Disabled { what: "value" }.kind(),
            ErrorKind::Disabled
        );
        assert_eq!(BindError::LeaseLocked.kind(), ErrorKind::Disabled);
        assert_eq!(BindError::AlreadyLeased.kind(), ErrorKind::InvalidOperation);
        assert_eq!(
            BindError::MutatedDuringIteration.kind(),
            ErrorKind::InvalidOperation
        );
        assert_eq!(
            BindError::parse("abc", "i32").kind(),
            ErrorKind::Argument
        );
    }

    #[test]
    fn parse_error_names_input_and_target() {
        let err = BindError::parse("1.5", "i32");
        assert_eq!(err.to_string(), "could not parse \"1.5\" as i32");
    }
}
