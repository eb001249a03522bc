//! RGB565 pixel format and conversion to and from generic truecolor.
//!
//! The panel stores every pixel as a 16-bit value packing red (5 bits),
//! green (6 bits) and blue (5 bits), most significant bits first. Generic
//! colors use 16 bits per channel, the same convention as the `image` crate's
//! `Rgba<u16>` buffers. Converting a generic color to RGB565 is lossy.

use crate::{Error, Result};

/// A native 5-6-5 packed panel color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb565(pub u16);

/// A generic 16-bit-per-channel color with alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba64 {
    pub r: u16,
    pub g: u16,
    pub b: u16,
    pub a: u16,
}

/// A color handed to the framebuffer: either already native or in need of
/// quantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Native(Rgb565),
    Generic(Rgba64),
}

impl Rgb565 {
    pub const BLACK: Rgb565 = Rgb565(0x0000);
    pub const WHITE: Rgb565 = Rgb565(0xFFFF);

    /// Packs 8-bit channels, keeping the top 5/6/5 bits.
    #[inline]
    pub fn from_rgb888(r: u8, g: u8, b: u8) -> Self {
        let r5 = (r >> 3) as u16;
        let g6 = (g >> 2) as u16;
        let b5 = (b >> 3) as u16;
        Rgb565((r5 << 11) | (g6 << 5) | b5)
    }

    /// Expands to 8-bit channels by bit replication.
    #[inline]
    pub fn to_rgb888(self) -> (u8, u8, u8) {
        let r = ((self.0 >> 11) & 0x1F) as u8;
        let g = ((self.0 >> 5) & 0x3F) as u8;
        let b = (self.0 & 0x1F) as u8;
        let r8 = (r << 3) | (r >> 2);
        let g8 = (g << 2) | (g >> 4);
        let b8 = (b << 3) | (b >> 2);
        (r8, g8, b8)
    }

    /// Widens to the generic model. Alpha is always opaque.
    pub fn to_generic(self) -> Rgba64 {
        let (r, g, b) = self.to_rgb888();
        Rgba64 {
            r: widen(r),
            g: widen(g),
            b: widen(b),
            a: u16::MAX,
        }
    }

    /// Converts any color to RGB565. Native colors pass through untouched so
    /// they are never quantized twice.
    pub fn from_generic(color: impl Into<Color>) -> Self {
        match color.into() {
            Color::Native(c) => c,
            Color::Generic(c) => {
                Self::from_rgb888((c.r >> 8) as u8, (c.g >> 8) as u8, (c.b >> 8) as u8)
            }
        }
    }

    /// Big-endian wire encoding.
    #[inline]
    pub fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    #[inline]
    pub fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Rgb565(u16::from_be_bytes(bytes))
    }
}

#[inline]
fn widen(v: u8) -> u16 {
    let v = v as u16;
    v | (v << 8)
}

impl Rgba64 {
    /// Builds an opaque generic color from 8-bit channels.
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: widen(r),
            g: widen(g),
            b: widen(b),
            a: u16::MAX,
        }
    }
}

impl From<Rgb565> for Color {
    fn from(c: Rgb565) -> Self {
        Color::Native(c)
    }
}

impl From<Rgba64> for Color {
    fn from(c: Rgba64) -> Self {
        Color::Generic(c)
    }
}

impl From<image::Rgba<u8>> for Color {
    fn from(p: image::Rgba<u8>) -> Self {
        let [r, g, b, a] = p.0;
        Color::Generic(Rgba64 {
            r: widen(r),
            g: widen(g),
            b: widen(b),
            a: widen(a),
        })
    }
}

impl From<image::Rgba<u16>> for Color {
    fn from(p: image::Rgba<u16>) -> Self {
        let [r, g, b, a] = p.0;
        Color::Generic(Rgba64 { r, g, b, a })
    }
}

impl From<Rgb565> for image::Rgba<u8> {
    fn from(c: Rgb565) -> Self {
        let (r, g, b) = c.to_rgb888();
        image::Rgba([r, g, b, 0xFF])
    }
}

/// Parses a `#rrggbb` hex color string to RGB565.
pub fn parse_hex_color(hex: &str) -> Result<Rgb565> {
    let digits = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
    };
    if digits.len() != 6 {
        return Err(Error::InvalidColor(hex.to_string()));
    }
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Some(r), Some(g), Some(b)) => Ok(Rgb565::from_rgb888(r, g, b)),
        _ => Err(Error::InvalidColor(hex.to_string())),
    }
}
