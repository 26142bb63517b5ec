//! # Raster Frames
//!
//! A [`RasterFrame`] is one finished 16×16 image ready for transmission. Frames are
//! immutable once built: decoders and drawing code produce them through a
//! [`FrameCanvas`], which is then frozen with [`FrameCanvas::into_frame`].
//!
//! ## Storage
//! Pixels are stored row-major in a shared `Arc<[Rgba]>`, so cloning a frame (which
//! happens every time an animation hands one out) never copies pixel data.
//!
//! ## Drawing
//! [`FrameCanvas`] implements the `embedded-graphics` [`DrawTarget`] for
//! [`Rgb888`], which gives the pairing view text and primitive rendering for free.

use crate::{MATRIX_HEIGHT, MATRIX_PIXELS, MATRIX_WIDTH};
use embedded_graphics::{
    pixelcolor::{Rgb888, RgbColor},
    prelude::*,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Raised when a colour string is not a recognised hex encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid colour encoding: {0:?}")]
pub struct ColorParseError(pub String);

/// A single RGBA pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);
    pub const WHITE: Rgba = Rgba::opaque(0xFF, 0xFF, 0xFF);
    pub const RED: Rgba = Rgba::opaque(0xFF, 0, 0);
    pub const GREEN: Rgba = Rgba::opaque(0, 0xFF, 0);
    pub const BLUE: Rgba = Rgba::opaque(0, 0, 0xFF);
    pub const YELLOW: Rgba = Rgba::opaque(0xFF, 0xFF, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xFF)
    }

    /// Parse `#RRGGBB`, `RRGGBB`, `#RGB` or `RGB` (case-insensitive).
    ///
    /// # Example
    /// ```
    /// use led_matrix_lib::frame::Rgba;
    ///
    /// assert_eq!(Rgba::from_hex("#00FF00").unwrap(), Rgba::GREEN);
    /// assert_eq!(Rgba::from_hex("f00").unwrap(), Rgba::RED);
    /// assert!(Rgba::from_hex("green").is_err());
    /// ```
    pub fn from_hex(input: &str) -> Result<Self, ColorParseError> {
        let err = || ColorParseError(input.to_string());
        let digits = input.trim().strip_prefix('#').unwrap_or(input.trim());

        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| err());

        match digits.len() {
            6 => Ok(Rgba::opaque(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => {
                // Each nibble expands to a full byte: "f" -> 0xff
                let expand = |s: &str| channel(s).map(|v| v * 0x11);
                Ok(Rgba::opaque(
                    expand(&digits[0..1])?,
                    expand(&digits[1..2])?,
                    expand(&digits[2..3])?,
                ))
            }
            _ => Err(err()),
        }
    }

    /// Multiply the colour channels by `factor` (clamped to 0..=1), keeping alpha.
    pub fn scaled(self, factor: f64) -> Self {
        let factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
        let scale = |c: u8| (c as f64 * factor).round() as u8;
        Rgba::new(scale(self.r), scale(self.g), scale(self.b), self.a)
    }

    /// Colour channels premultiplied by alpha, as sent on the wire.
    pub fn premultiplied(self) -> [u8; 3] {
        let mul = |c: u8| ((c as u16 * self.a as u16 + 127) / 255) as u8;
        [mul(self.r), mul(self.g), mul(self.b)]
    }
}

impl From<Rgb888> for Rgba {
    fn from(color: Rgb888) -> Self {
        Rgba::opaque(color.r(), color.g(), color.b())
    }
}

impl From<Rgba> for Rgb888 {
    fn from(color: Rgba) -> Self {
        let [r, g, b] = color.premultiplied();
        Rgb888::new(r, g, b)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Immutable 16×16 grid of RGBA pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterFrame {
    pixels: Arc<[Rgba]>,
}

impl RasterFrame {
    /// All-zero frame, used to clear the display.
    pub fn blank() -> Self {
        Self::filled(Rgba::TRANSPARENT)
    }

    /// Frame with every pixel set to `color`.
    pub fn filled(color: Rgba) -> Self {
        Self {
            pixels: vec![color; MATRIX_PIXELS].into(),
        }
    }

    /// Build a frame from exactly `MATRIX_PIXELS` row-major pixels.
    ///
    /// Returns `None` when the pixel count does not match the matrix.
    pub fn from_pixels(pixels: Vec<Rgba>) -> Option<Self> {
        (pixels.len() == MATRIX_PIXELS).then(|| Self {
            pixels: pixels.into(),
        })
    }

    pub fn width(&self) -> usize {
        MATRIX_WIDTH
    }

    pub fn height(&self) -> usize {
        MATRIX_HEIGHT
    }

    /// Pixel at (`x`, `y`), or `None` outside the matrix.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgba> {
        if x < MATRIX_WIDTH && y < MATRIX_HEIGHT {
            Some(self.pixels[y * MATRIX_WIDTH + x])
        } else {
            None
        }
    }

    /// Row-major pixel slice.
    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    /// True when every colour sample (after alpha) is zero.
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|p| p.premultiplied() == [0, 0, 0])
    }

    /// New frame with the RGB channels of every pixel multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            pixels: self.pixels.iter().map(|p| p.scaled(factor)).collect(),
        }
    }
}

impl Default for RasterFrame {
    fn default() -> Self {
        Self::blank()
    }
}

impl fmt::Debug for RasterFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lit = self.pixels.iter().filter(|p| p.premultiplied() != [0, 0, 0]).count();
        f.debug_struct("RasterFrame")
            .field("size", &(MATRIX_WIDTH, MATRIX_HEIGHT))
            .field("lit_pixels", &lit)
            .finish()
    }
}

/// Mutable drawing surface that freezes into a [`RasterFrame`].
#[derive(Clone, Debug)]
pub struct FrameCanvas {
    pixels: Vec<Rgba>,
}

impl FrameCanvas {
    pub fn new() -> Self {
        Self {
            pixels: vec![Rgba::TRANSPARENT; MATRIX_PIXELS],
        }
    }

    /// Set one pixel; coordinates outside the matrix are ignored.
    pub fn set(&mut self, x: i32, y: i32, color: Rgba) {
        if (0..MATRIX_WIDTH as i32).contains(&x) && (0..MATRIX_HEIGHT as i32).contains(&y) {
            self.pixels[y as usize * MATRIX_WIDTH + x as usize] = color;
        }
    }

    pub fn fill(&mut self, color: Rgba) {
        self.pixels.iter_mut().for_each(|p| *p = color);
    }

    pub fn into_frame(self) -> RasterFrame {
        RasterFrame {
            pixels: self.pixels.into(),
        }
    }
}

impl Default for FrameCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginDimensions for FrameCanvas {
    fn size(&self) -> Size {
        Size::new(MATRIX_WIDTH as u32, MATRIX_HEIGHT as u32)
    }
}

impl DrawTarget for FrameCanvas {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set(point.x, point.y, color.into());
        }
        Ok(())
    }
}
