// src/color.rs
//
// sRGB colour values, hex parsing and WCAG luminance/contrast helpers.

use crate::error::{RasterKitError, Result};

/// An sRGB colour with straight (non-premultiplied) alpha, components in 0..=1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const CLEAR: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const GRAY: Color = Color::rgba(0.5, 0.5, 0.5, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    pub fn rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::rgba(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub fn with_alpha(&self, alpha: f32) -> Self {
        Self { a: alpha, ..*self }
    }

    /// Parses `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa` (the `#` is optional).
    ///
    /// Short forms double each digit (`e` -> `ee`); forms without alpha are
    /// opaque.
    pub fn from_hex(value: &str) -> Option<Color> {
        let digits = value.trim().strip_prefix('#').unwrap_or(value.trim());
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let expanded: String = match digits.len() {
            3 | 4 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => digits.to_string(),
            _ => return None,
        };
        let expanded = if expanded.len() == 6 {
            expanded + "ff"
        } else {
            expanded
        };

        let byte = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        Some(Color::rgba8(byte(0)?, byte(2)?, byte(4)?, byte(6)?))
    }

    /// Like [`Color::from_hex`] but reports malformed input.
    pub fn hex(value: &str) -> Result<Color> {
        Self::from_hex(value).ok_or_else(|| RasterKitError::invalid_hex_color(value.to_string()))
    }

    pub fn to_hex_string(&self, include_alpha: bool) -> String {
        let [r, g, b, a] = self.to_rgba8();
        if include_alpha {
            format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
        } else {
            format!("#{r:02x}{g:02x}{b:02x}")
        }
    }

    /// WCAG 2.x relative luminance.
    pub fn luminance(&self) -> f64 {
        fn linear(c: f32) -> f64 {
            let c = c.clamp(0.0, 1.0) as f64;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * linear(self.r) + 0.7152 * linear(self.g) + 0.0722 * linear(self.b)
    }

    /// WCAG contrast ratio, always >= 1.
    pub fn contrast_ratio(&self, other: &Color) -> f64 {
        let l1 = self.luminance();
        let l2 = other.luminance();
        let (hi, lo) = if l1 >= l2 { (l1, l2) } else { (l2, l1) };
        (hi + 0.05) / (lo + 0.05)
    }

    /// Black or white, whichever reads better on top of this colour.
    pub fn contrasting_text_color(&self) -> Color {
        if self.contrast_ratio(&Color::BLACK) > self.contrast_ratio(&Color::WHITE) {
            Color::BLACK
        } else {
            Color::WHITE
        }
    }

    pub(crate) fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
        .unwrap_or(tiny_skia::Color::TRANSPARENT)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::CLEAR
    }
}
