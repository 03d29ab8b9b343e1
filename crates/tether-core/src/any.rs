#![forbid(unsafe_code)]

//! Type-erased access to cells.
//!
//! [`AnyBindable`] is the object-safe surface shared by every cell kind, so
//! heterogeneous stores (settings tables, inspector panels) can hold
//! `Box<dyn AnyBindable>` and still create same-kind copies and bind two
//! erased cells together.

use std::any::{Any, type_name};

use crate::bindable::Bindable;
use crate::error::{BindError, Result};
use crate::number::BindableNumber;
use crate::numeric::Numeric;
use crate::value::BindValue;

/// Object-safe operations available on every cell kind.
pub trait AnyBindable: Any {
    /// Concrete type name, used in error reports.
    fn kind(&self) -> &'static str;

    fn description(&self) -> Option<String>;

    fn is_disabled(&self) -> bool;

    fn is_default(&self) -> bool;

    /// Write a dynamically typed input, as the concrete `parse` does.
    fn parse(&self, input: &dyn Any) -> Result<()>;

    /// A fresh, unbound cell of the same concrete kind.
    fn create_instance(&self) -> Box<dyn AnyBindable>;

    /// A new cell of the same concrete kind, bound to this one.
    fn bound_copy(&self) -> Box<dyn AnyBindable>;

    /// Bind to another erased cell of the same concrete kind.
    fn bind_to_any(&self, other: &dyn AnyBindable) -> Result<()>;

    fn unbind_from_any(&self, other: &dyn AnyBindable) -> Result<()>;

    fn unbind_events(&self);

    fn unbind_bindings(&self);

    fn unbind_all(&self);

    fn as_any(&self) -> &dyn Any;
}

/// Downcast `other` to `C`, or report which kind was expected.
pub fn downcast_peer<C: 'static>(other: &dyn AnyBindable) -> Result<&C> {
    other
        .as_any()
        .downcast_ref::<C>()
        .ok_or_else(|| BindError::IncompatibleBinding {
            expected: type_name::<C>(),
            found: other.kind(),
        })
}

impl<T: BindValue> AnyBindable for Bindable<T> {
    fn kind(&self) -> &'static str {
        type_name::<Self>()
    }

    fn description(&self) -> Option<String> {
        Bindable::description(self)
    }

    fn is_disabled(&self) -> bool {
        Bindable::is_disabled(self)
    }

    fn is_default(&self) -> bool {
        Bindable::is_default(self)
    }

    fn parse(&self, input: &dyn Any) -> Result<()> {
        Bindable::parse(self, input)
    }

    fn create_instance(&self) -> Box<dyn AnyBindable> {
        Box::new(Bindable::create_instance(self))
    }

    fn bound_copy(&self) -> Box<dyn AnyBindable> {
        Box::new(self.get_bound_copy())
    }

    fn bind_to_any(&self, other: &dyn AnyBindable) -> Result<()> {
        let other = downcast_peer::<Self>(other)?;
        self.bind_to(other)
    }

    fn unbind_from_any(&self, other: &dyn AnyBindable) -> Result<()> {
        let other = downcast_peer::<Self>(other)?;
        self.unbind_from(other);
        Ok(())
    }

    fn unbind_events(&self) {
        Bindable::unbind_events(self);
    }

    fn unbind_bindings(&self) {
        Bindable::unbind_bindings(self);
    }

    fn unbind_all(&self) {
        Bindable::unbind_all(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: Numeric> AnyBindable for BindableNumber<T> {
    fn kind(&self) -> &'static str {
        type_name::<Self>()
    }

    fn description(&self) -> Option<String> {
        self.as_bindable().description()
    }

    fn is_disabled(&self) -> bool {
        self.as_bindable().is_disabled()
    }

    fn is_default(&self) -> bool {
        self.as_bindable().is_default()
    }

    fn parse(&self, input: &dyn Any) -> Result<()> {
        BindableNumber::parse(self, input)
    }

    fn create_instance(&self) -> Box<dyn AnyBindable> {
        Box::new(BindableNumber::create_instance(self))
    }

    fn bound_copy(&self) -> Box<dyn AnyBindable> {
        Box::new(self.get_bound_copy())
    }

    fn bind_to_any(&self, other: &dyn AnyBindable) -> Result<()> {
        let other = downcast_peer::<Self>(other)?;
        self.bind_to(other)
    }

    fn unbind_from_any(&self, other: &dyn AnyBindable) -> Result<()> {
        let other = downcast_peer::<Self>(other)?;
        self.unbind_from(other);
        Ok(())
    }

    fn unbind_events(&self) {
        self.as_bindable().unbind_events();
    }

    fn unbind_bindings(&self) {
        self.as_bindable().unbind_bindings();
    }

    fn unbind_all(&self) {
        self.as_bindable().unbind_all();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::BindableInt;

    #[test]
    fn copies_keep_concrete_kind() {
        let cells: Vec<Box<dyn AnyBindable>> = vec![
            Box::new(Bindable::new(true)),
            Box::new(BindableInt::new(3).with_range(0, 5)),
        ];
        let copies: Vec<_> = cells.iter().map(|c| c.create_instance()).collect();
        assert!(copies[0].as_any().is::<Bindable<bool>>());
        let number = copies[1].as_any().downcast_ref::<BindableInt>().unwrap();
        assert_eq!(number.max_value(), 5);
    }

    #[test]
    fn erased_bind_links_same_kind() {
        let a: Box<dyn AnyBindable> = Box::new(Bindable::new(1));
        let b: Box<dyn AnyBindable> = Box::new(Bindable::new(2));
        a.bind_to_any(b.as_ref()).unwrap();
        let (a, b) = (
            a.as_any().downcast_ref::<Bindable<i32>>().unwrap(),
            b.as_any().downcast_ref::<Bindable<i32>>().unwrap(),
        );
        assert_eq!(a.value(), 2);
        b.set_value(5).unwrap();
        assert_eq!(a.value(), 5);
    }

    #[test]
    fn erased_bind_rejects_other_kinds() {
        let a: Box<dyn AnyBindable> = Box::new(Bindable::new(1));
        let b: Box<dyn AnyBindable> = Box::new(Bindable::new("x".to_owned()));
        let err = a.bind_to_any(b.as_ref()).unwrap_err();
        assert!(matches!(err, BindError::IncompatibleBinding { .. }));
        assert!(a.unbind_from_any(b.as_ref()).is_err());
    }

    #[test]
    fn bound_copy_follows_source() {
        let source = BindableInt::new(1);
        let copy = AnyBindable::bound_copy(&source);
        copy.parse(&"8").unwrap();
        assert_eq!(source.value(), 8);
    }
}
