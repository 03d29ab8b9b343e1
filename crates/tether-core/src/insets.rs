#![forbid(unsafe_code)]

//! Four-sided spacing value with the `(top, left, bottom, right)` text form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BindError;
use crate::format::NumberFormat;
use crate::value::BindValue;

/// Spacing around the four edges of a box.
///
/// The text form always uses invariant numbers so the `", "` separator stays
/// unambiguous: `"(1, 2.5, 0, 4)"`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Insets {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

impl Insets {
    pub const ZERO: Self = Self::uniform(0.0);

    #[must_use]
    pub const fn new(top: f32, left: f32, bottom: f32, right: f32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    #[must_use]
    pub const fn uniform(all: f32) -> Self {
        Self::new(all, all, all, all)
    }

    #[must_use]
    pub fn total_horizontal(&self) -> f32 {
        self.left + self.right
    }

    #[must_use]
    pub fn total_vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

impl fmt::Display for Insets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.top, self.left, self.bottom, self.right
        )
    }
}

impl FromStr for Insets {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || BindError::parse(s, "insets");
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(err)?;
        let mut sides = [0.0f32; 4];
        let mut parts = inner.split(',');
        for side in &mut sides {
            *side = parts
                .next()
                .and_then(|p| p.trim().parse().ok())
                .ok_or_else(err)?;
        }
        if parts.next().is_some() {
            return Err(err());
        }
        let [top, left, bottom, right] = sides;
        Ok(Self::new(top, left, bottom, right))
    }
}

impl BindValue for Insets {
    fn parse_text(text: &str, _format: &NumberFormat) -> Option<Self> {
        text.parse().ok()
    }

    fn to_text(&self, _format: &NumberFormat) -> String {
        self.to_string()
    }
}
