#![forbid(unsafe_code)]

//! The [`BindValue`] trait: what a cell can hold and how it converts to text.

use std::fmt::Debug;

use crate::format::NumberFormat;

/// A value that can live inside a bindable cell.
///
/// The textual hooks back `parse_with` and `to_text` on cells. Types without
/// a textual form keep the defaults: parsing always fails and rendering uses
/// `Debug`.
pub trait BindValue: Clone + PartialEq + Debug + 'static {
    /// Parse `text` in the given number format. `None` means the text does not
    /// describe a value of this type.
    fn parse_text(text: &str, format: &NumberFormat) -> Option<Self> {
        let _ = (text, format);
        None
    }

    /// Render the canonical textual form.
    fn to_text(&self, format: &NumberFormat) -> String {
        let _ = format;
        format!("{self:?}")
    }
}

impl BindValue for bool {
    fn parse_text(text: &str, _format: &NumberFormat) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("true") {
            Some(true)
        } else if text.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    fn to_text(&self, _format: &NumberFormat) -> String {
        if *self { "True" } else { "False" }.to_owned()
    }
}

impl BindValue for String {
    fn parse_text(text: &str, _format: &NumberFormat) -> Option<Self> {
        Some(text.to_owned())
    }

    fn to_text(&self, _format: &NumberFormat) -> String {
        self.clone()
    }
}

impl BindValue for char {
    fn parse_text(text: &str, _format: &NumberFormat) -> Option<Self> {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }

    fn to_text(&self, _format: &NumberFormat) -> String {
        self.to_string()
    }
}

/// `None` renders as the empty string and an empty (or all-whitespace) input
/// parses to `None`.
impl<T: BindValue> BindValue for Option<T> {
    fn parse_text(text: &str, format: &NumberFormat) -> Option<Self> {
        if text.trim().is_empty() {
            return Some(None);
        }
        T::parse_text(text, format).map(Some)
    }

    fn to_text(&self, format: &NumberFormat) -> String {
        self.as_ref()
            .map(|v| v.to_text(format))
            .unwrap_or_default()
    }
}

impl<T: BindValue> BindValue for Vec<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_is_case_insensitive() {
        let f = NumberFormat::INVARIANT;
        assert_eq!(bool::parse_text("TRUE", &f), Some(true));
        assert_eq!(bool::parse_text(" false ", &f), Some(false));
        assert_eq!(bool::parse_text("yes", &f), None);
        assert_eq!(true.to_text(&f), "True");
    }

    #[test]
    fn option_treats_blank_as_none() {
        let f = NumberFormat::INVARIANT;
        assert_eq!(Option::<String>::parse_text("  ", &f), Some(None));
        assert_eq!(
            Option::<char>::parse_text("x", &f),
            Some(Some('x'))
        );
        assert_eq!(Option::<char>::parse_text("xy", &f), None);
        assert_eq!(Option::<char>::None.to_text(&f), "");
    }

    #[test]
    fn vec_has_no_text_form() {
        let f = NumberFormat::INVARIANT;
        assert_eq!(Vec::<bool>::parse_text("[]", &f), None);
    }
}
