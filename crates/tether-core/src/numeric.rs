#![forbid(unsafe_code)]

//! Closed set of primitive number types usable in numeric cells.
//!
//! [`Numeric`] is sealed: it is implemented for `i8..=i64`, `u8..=u64`, `f32`
//! and `f64`, and the implementations are generated by a single macro per
//! family so the integer and float rules stay uniform.

use std::fmt::Display;

use crate::format::NumberFormat;
use crate::value::BindValue;

mod sealed {
    pub trait Sealed {}
}

/// Arithmetic and conversion surface shared by numeric cells.
pub trait Numeric: BindValue + Copy + PartialOrd + Display + sealed::Sealed {
    /// Smallest representable value; the default lower bound of a range.
    const MIN: Self;
    /// Largest representable value; the default upper bound of a range.
    const MAX: Self;
    const ZERO: Self;
    /// Precision below which no quantization happens: `1` for integers, the
    /// smallest positive subnormal for floats.
    const DEFAULT_PRECISION: Self;
    const IS_INTEGER: bool;

    fn to_f64(self) -> f64;

    /// Convert with rounding to nearest and saturation at the type bounds.
    fn from_f64(value: f64) -> Self;

    fn saturating_add(self, rhs: Self) -> Self;

    /// Culture-aware lexical conversion. Integers reject fractional input and
    /// saturate on overflow.
    fn parse_number(text: &str, format: &NumberFormat) -> Option<Self>;

    /// Upper bound first, then lower, so an inverted range yields `min`.
    fn clamp_to(self, min: Self, max: Self) -> Self {
        let upper = if self > max { max } else { self };
        if upper < min { min } else { upper }
    }
}

macro_rules! impl_integer {
    ($($t:ty),* $(,)?) => {$(
        impl sealed::Sealed for $t {}

        impl Numeric for $t {
            const MIN: Self = <$t>::MIN;
            const MAX: Self = <$t>::MAX;
            const ZERO: Self = 0;
            const DEFAULT_PRECISION: Self = 1;
            const IS_INTEGER: bool = true;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value.round() as $t
            }

            fn saturating_add(self, rhs: Self) -> Self {
                <$t>::saturating_add(self, rhs)
            }

            fn parse_number(text: &str, format: &NumberFormat) -> Option<Self> {
                let wide: i128 = format.normalize(text).parse().ok()?;
                let clamped = wide.clamp(<$t>::MIN as i128, <$t>::MAX as i128);
                <$t>::try_from(clamped).ok()
            }
        }

        impl BindValue for $t {
            fn parse_text(text: &str, format: &NumberFormat) -> Option<Self> {
                Self::parse_number(text, format)
            }

            fn to_text(&self, format: &NumberFormat) -> String {
                format.localize(&self.to_string())
            }
        }
    )*};
}

macro_rules! impl_float {
    ($($t:ty),* $(,)?) => {$(
        impl sealed::Sealed for $t {}

        impl Numeric for $t {
            const MIN: Self = <$t>::MIN;
            const MAX: Self = <$t>::MAX;
            const ZERO: Self = 0.0;
            const DEFAULT_PRECISION: Self = <$t>::from_bits(1);
            const IS_INTEGER: bool = false;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn saturating_add(self, rhs: Self) -> Self {
                self + rhs
            }

            fn parse_number(text: &str, format: &NumberFormat) -> Option<Self> {
                format.normalize(text).parse::<f64>().ok().map(|v| v as $t)
            }
        }

        impl BindValue for $t {
            fn parse_text(text: &str, format: &NumberFormat) -> Option<Self> {
                Self::parse_number(text, format)
            }

            fn to_text(&self, format: &NumberFormat) -> String {
                format.localize(&self.to_string())
            }
        }
    )*};
}

impl_integer!(i8, i16, i32, i64, u8, u16, u32, u64);
impl_float!(f32, f64);
