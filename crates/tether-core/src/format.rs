#![forbid(unsafe_code)]

//! Culture-aware number formatting configuration.
//!
//! A [`NumberFormat`] names the decimal and group separators used when a
//! numeric cell is rendered to or parsed from text. Parsing first removes
//! group separators and whitespace, then maps the decimal separator to `.`.

use serde::{Deserialize, Serialize};

/// Separators for textual numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberFormat {
    pub decimal_separator: char,
    /// `None` disables group separators entirely.
    pub group_separator: Option<char>,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::INVARIANT
    }
}

/// Language subtags whose conventional decimal separator is a comma.
const DECIMAL_COMMA_LANGUAGES: &[&str] = &[
    "de", "fr", "es", "it", "pt", "nl", "ru", "pl", "cs", "sv", "da", "nb", "fi", "tr", "uk",
];

impl NumberFormat {
    /// `.` decimal, `,` grouping. Used by every context that does not name a
    /// locale.
    pub const INVARIANT: Self = Self {
        decimal_separator: '.',
        group_separator: Some(','),
    };

    /// `,` decimal, `.` grouping.
    pub const DECIMAL_COMMA: Self = Self {
        decimal_separator: ',',
        group_separator: Some('.'),
    };

    /// Resolve a BCP-47 style tag (`"de-DE"`, `"fr"`, `"en_US"`) to a format.
    ///
    /// Unknown tags fall back to [`NumberFormat::INVARIANT`]. French-style
    /// locales group with a narrow no-break space.
    #[must_use]
    pub fn for_locale(tag: &str) -> Self {
        let language = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match language.as_str() {
            "fr" => Self::DECIMAL_COMMA.with_group_separator(Some('\u{202f}')),
            lang if DECIMAL_COMMA_LANGUAGES.contains(&lang) => Self::DECIMAL_COMMA,
            _ => Self::INVARIANT,
        }
    }

    #[must_use]
    pub const fn with_decimal_separator(mut self, separator: char) -> Self {
        self.decimal_separator = separator;
        self
    }

    #[must_use]
    pub const fn with_group_separator(mut self, separator: Option<char>) -> Self {
        self.group_separator = separator;
        self
    }

    /// Rewrite `text` into the invariant lexical form accepted by Rust's
    /// numeric `FromStr` impls.
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        text.trim()
            .chars()
            .filter(|c| !c.is_whitespace() && Some(*c) != self.group_separator)
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect()
    }

    /// Render an invariant numeric string (as produced by `Display`) in this
    /// format. No grouping is applied on output.
    #[must_use]
    pub fn localize(&self, invariant: &str) -> String {
        if self.decimal_separator == '.' {
            return invariant.to_owned();
        }
        invariant.replace('.', &self.decimal_separator.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_presets() {
        assert_eq!(NumberFormat::for_locale("en-US"), NumberFormat::INVARIANT);
        assert_eq!(NumberFormat::for_locale("de-DE"), NumberFormat::DECIMAL_COMMA);
        assert_eq!(NumberFormat::for_locale("pt_BR"), NumberFormat::DECIMAL_COMMA);
        assert_eq!(
            NumberFormat::for_locale("fr").group_separator,
            Some('\u{202f}')
        );
        assert_eq!(NumberFormat::for_locale(""), NumberFormat::INVARIANT);
    }

    #[test]
    fn normalize_strips_grouping() {
        assert_eq!(NumberFormat::INVARIANT.normalize(" 1,234.5 "), "1234.5");
        assert_eq!(NumberFormat::DECIMAL_COMMA.normalize("1.234,5"), "1234.5");
    }

    #[test]
    fn localize_swaps_decimal() {
        assert_eq!(NumberFormat::DECIMAL_COMMA.localize("-0.25"), "-0,25");
        assert_eq!(NumberFormat::INVARIANT.localize("-0.25"), "-0.25");
    }
}
