#![forbid(unsafe_code)]

//! Packed RGBA colour with a stable hex text form.
//!
//! Accepted input: `RGB`, `RGBA`, `RRGGBB`, `RRGGBBAA`, each optionally
//! prefixed by `#`, case-insensitive. Short forms expand each digit `d` to
//! `d * 17`. Output is upper-case `#RRGGBB`, with `AA` appended only for
//! translucent colours or when explicitly requested.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BindError;
use crate::format::NumberFormat;
use crate::value::BindValue;

/// A colour stored as `0xRRGGBBAA` with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(transparent)]
pub struct Rgba(pub u32);

impl Rgba {
    pub const TRANSPARENT: Self = Self(0);
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    #[inline]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | (a as u32))
    }

    #[inline]
    pub const fn r(self) -> u8 {
        (self.0 >> 24) as u8
    }

    #[inline]
    pub const fn g(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub const fn b(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub const fn a(self) -> u8 {
        self.0 as u8
    }

    /// Parse a hex colour string. Returns `None` for any other length or a
    /// non-hex digit.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let short = |i: usize| u8::from_str_radix(&digits[i..=i], 16).ok().map(|d| d * 17);
        let long = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        match digits.len() {
            3 => Some(Self::rgb(short(0)?, short(1)?, short(2)?)),
            4 => Some(Self::rgba(short(0)?, short(1)?, short(2)?, short(3)?)),
            6 => Some(Self::rgb(long(0)?, long(2)?, long(4)?)),
            8 => Some(Self::rgba(long(0)?, long(2)?, long(4)?, long(6)?)),
            _ => None,
        }
    }

    /// Upper-case `#RRGGBB`, plus `AA` when the colour is not opaque or
    /// `always_alpha` is set.
    #[must_use]
    pub fn to_hex(self, always_alpha: bool) -> String {
        if always_alpha || self.a() != 255 {
            format!("#{:08X}", self.0)
        } else {
            format!("#{:06X}", self.0 >> 8)
        }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex(false))
    }
}

impl FromStr for Rgba {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| BindError::parse(s, "hex colour"))
    }
}

impl BindValue for Rgba {
    fn parse_text(text: &str, _format: &NumberFormat) -> Option<Self> {
        Self::from_hex(text.trim())
    }

    fn to_text(&self, _format: &NumberFormat) -> String {
        self.to_hex(false)
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex(false))
    }
}

impl<'de> Deserialize<'de> for Rgba {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_forms_expand_by_seventeen() {
        assert_eq!(Rgba::from_hex("#f0a"), Some(Rgba::rgb(255, 0, 170)));
        assert_eq!(Rgba::from_hex("f0a8"), Some(Rgba::rgba(255, 0, 170, 136)));
    }

    #[test]
    fn long_forms() {
        assert_eq!(Rgba::from_hex("#12aBcD"), Some(Rgba::rgb(0x12, 0xab, 0xcd)));
        assert_eq!(
            Rgba::from_hex("12abcd80"),
            Some(Rgba::rgba(0x12, 0xab, 0xcd, 0x80))
        );
    }

    #[test]
    fn rejects_bad_input() {
        for bad in ["", "#", "#12", "#12345", "#1234567", "#ggg", "#+12", "ä12"] {
            assert_eq!(Rgba::from_hex(bad), None, "{bad}");
        }
    }

    #[test]
    fn hex_output_omits_opaque_alpha() {
        assert_eq!(Rgba::rgb(1, 2, 3).to_hex(false), "#010203");
        assert_eq!(Rgba::rgb(1, 2, 3).to_hex(true), "#010203FF");
        assert_eq!(Rgba::rgba(0xab, 0xcd, 0xef, 0x10).to_string(), "#ABCDEF10");
    }

    #[test]
    fn serde_uses_hex_string() {
        let json = serde_json::to_string(&Rgba::rgba(255, 0, 0, 128)).unwrap();
        assert_eq!(json, "\"#FF000080\"");
        let back: Rgba = serde_json::from_str("\"#f00\"").unwrap();
        assert_eq!(back, Rgba::rgb(255, 0, 0));
    }
}
