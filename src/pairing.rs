//! # Pairing Layout
//!
//! The non-interactive view shown whenever interactive control is disabled:
//! pairing codes, solid status colours, icons, and the fading, shrinking colour
//! used while the controller reboots or resets.
//!
//! There is exactly one current state. Every `show_*` call replaces it outright;
//! nothing is queued and nothing times out except the fade, which settles to
//! [`PairingState::Idle`] once its duration has passed.

use crate::frame::{FrameCanvas, RasterFrame, Rgba};
use crate::image_asset::AnimatedImage;
use crate::{MATRIX_HEIGHT, MATRIX_WIDTH};
use embedded_graphics::{
    mono_font::{ascii::FONT_4X6, MonoTextStyle},
    pixelcolor::{Rgb888, RgbColor},
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

const GLYPH_WIDTH: i32 = 4;
const GLYPH_HEIGHT: i32 = 6;
/// Codes up to this many characters fit on the matrix without scrolling.
const STATIC_CODE_CHARS: usize = MATRIX_WIDTH / GLYPH_WIDTH as usize;
const SCROLL_STEP: Duration = Duration::from_millis(100);
const SCROLL_GAP: i32 = 4;

/// What the pairing view is currently showing.
#[derive(Clone, Debug)]
pub enum PairingState {
    Idle,
    Code {
        code: String,
        since: Instant,
    },
    Color(Rgba),
    Icon {
        name: String,
        image: AnimatedImage,
    },
    FadingShrinking {
        color: Rgba,
        started: Instant,
        duration: Duration,
    },
}

/// Last-write-wins status view.
#[derive(Debug)]
pub struct PairingLayout {
    state: PairingState,
}

impl Default for PairingLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl PairingLayout {
    pub fn new() -> Self {
        Self {
            state: PairingState::Idle,
        }
    }

    pub fn state(&self) -> &PairingState {
        &self.state
    }

    pub fn clear(&mut self) {
        self.state = PairingState::Idle;
    }

    pub fn show_code(&mut self, code: &str) {
        info!("Showing pairing code {}", code);
        self.state = PairingState::Code {
            code: code.to_string(),
            since: Instant::now(),
        };
    }

    pub fn show_color(&mut self, color: Rgba) {
        info!("Showing colour {}", color);
        self.state = PairingState::Color(color);
    }

    pub fn show_icon(&mut self, name: &str, image: AnimatedImage) {
        info!("Showing icon {}", name);
        self.state = PairingState::Icon {
            name: name.to_string(),
            image,
        };
    }

    /// Fade `color` towards black while shrinking it to the centre over
    /// `duration`. A zero duration shows the colour steady instead.
    pub fn show_fading_shrinking_color(&mut self, color: Rgba, duration: Duration) {
        if duration.is_zero() {
            self.show_color(color);
            return;
        }
        info!("Fading {} over {:?}", color, duration);
        self.state = PairingState::FadingShrinking {
            color,
            started: Instant::now(),
            duration,
        };
    }

    pub fn render(&mut self) -> RasterFrame {
        self.render_at(Instant::now())
    }

    pub(crate) fn render_at(&mut self, now: Instant) -> RasterFrame {
        if let PairingState::FadingShrinking {
            started, duration, ..
        } = self.state
        {
            if now.saturating_duration_since(started) >= duration {
                self.state = PairingState::Idle;
            }
        }

        match &mut self.state {
            PairingState::Idle => RasterFrame::blank(),
            PairingState::Color(color) => RasterFrame::filled(*color),
            PairingState::Icon { image, .. } => image.next(),
            PairingState::Code { code, since } => {
                code_frame(code, now.saturating_duration_since(*since))
            }
            PairingState::FadingShrinking {
                color,
                started,
                duration,
            } => {
                let progress =
                    now.saturating_duration_since(*started).as_secs_f64() / duration.as_secs_f64();
                fade_frame(*color, progress)
            }
        }
    }
}

fn code_frame(code: &str, elapsed: Duration) -> RasterFrame {
    let mut canvas = FrameCanvas::new();
    let style = MonoTextStyle::new(&FONT_4X6, Rgb888::WHITE);
    let top = (MATRIX_HEIGHT as i32 - GLYPH_HEIGHT) / 2;
    let width = code.chars().count() as i32 * GLYPH_WIDTH;

    if code.chars().count() <= STATIC_CODE_CHARS {
        let left = (MATRIX_WIDTH as i32 - width) / 2;
        draw_text(&mut canvas, code, Point::new(left, top), style);
    } else {
        // Marquee: the code followed by a gap, repeated
        let period = width + SCROLL_GAP;
        let steps = (elapsed.as_millis() / SCROLL_STEP.as_millis()) as i64;
        let offset = (steps % period as i64) as i32;
        draw_text(&mut canvas, code, Point::new(-offset, top), style);
        draw_text(&mut canvas, code, Point::new(period - offset, top), style);
    }

    canvas.into_frame()
}

fn draw_text(canvas: &mut FrameCanvas, text: &str, at: Point, style: MonoTextStyle<'_, Rgb888>) {
    // Drawing onto the canvas cannot fail
    let _ = Text::with_baseline(text, at, style, Baseline::Top).draw(canvas);
}

fn fade_frame(color: Rgba, progress: f64) -> RasterFrame {
    let remaining = 1.0 - progress.clamp(0.0, 1.0);
    let side = (MATRIX_WIDTH as f64 * remaining).round() as u32;
    let inset = (MATRIX_WIDTH as i32 - side as i32) / 2;

    let mut canvas = FrameCanvas::new();
    let _ = Rectangle::new(Point::new(inset, inset), Size::new(side, side))
        .into_styled(PrimitiveStyle::with_fill(Rgb888::from(color.scaled(remaining))))
        .draw(&mut canvas);
    canvas.into_frame()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_asset::tests::tagged_image;

    fn lit(frame: &RasterFrame) -> usize {
        frame
            .pixels()
            .iter()
            .filter(|p| p.premultiplied() != [0, 0, 0])
            .count()
    }

    #[test]
    fn test_starts_idle_and_blank() {
        let mut layout = PairingLayout::new();
        assert!(matches!(layout.state(), PairingState::Idle));
        assert!(layout.render().is_blank());
    }

    #[test]
    fn test_steady_color() {
        let mut layout = PairingLayout::new();
        layout.show_color(Rgba::GREEN);
        let frame = layout.render();
        assert_eq!(lit(&frame), MATRIX_WIDTH * MATRIX_HEIGHT);
        assert_eq!(frame.pixel(0, 15), Some(Rgba::GREEN));
    }

    #[test]
    fn test_zero_duration_fade_is_steady() {
        let mut layout = PairingLayout::new();
        layout.show_fading_shrinking_color(Rgba::RED, Duration::ZERO);
        assert!(matches!(layout.state(), PairingState::Color(Rgba::RED)));
    }

    #[test]
    fn test_fade_shrinks_dims_then_settles_blank() {
        let mut layout = PairingLayout::new();
        layout.show_fading_shrinking_color(Rgba::GREEN, Duration::from_millis(2000));
        let PairingState::FadingShrinking { started, .. } = *layout.state() else {
            panic!("expected a fade");
        };

        let full = layout.render_at(started);
        assert_eq!(lit(&full), 256);
        assert_eq!(full.pixel(0, 0), Some(Rgba::GREEN));

        let half = layout.render_at(started + Duration::from_millis(1000));
        assert_eq!(lit(&half), 64, "8x8 square at the halfway point");
        assert_eq!(half.pixel(0, 0), Some(Rgba::TRANSPARENT));
        assert_eq!(half.pixel(8, 8), Some(Rgba::opaque(0, 128, 0)));

        let done = layout.render_at(started + Duration::from_millis(2000));
        assert!(done.is_blank());
        assert!(matches!(layout.state(), PairingState::Idle));
    }

    #[test]
    fn test_icon_loops() {
        let mut layout = PairingLayout::new();
        layout.show_icon("loading.gif", tagged_image(3));
        let tags: Vec<u8> = (0..4).map(|_| layout.render().pixel(0, 0).unwrap().r).collect();
        assert_eq!(tags, vec![1, 2, 0, 1]);
    }

    #[test]
    fn test_last_command_wins() {
        let mut layout = PairingLayout::new();
        layout.show_code("1234");
        layout.show_fading_shrinking_color(Rgba::YELLOW, Duration::from_secs(5));
        layout.show_color(Rgba::BLUE);
        assert_eq!(layout.render().pixel(3, 3), Some(Rgba::BLUE));
    }

    #[test]
    fn test_short_code_is_drawn_centred() {
        let mut layout = PairingLayout::new();
        layout.show_code("88");
        let frame = layout.render();
        assert!(lit(&frame) > 0);
        // Two 4px glyphs centred: columns 4..12 only
        for y in 0..MATRIX_HEIGHT {
            for x in (0..4).chain(12..16) {
                assert_eq!(frame.pixel(x, y), Some(Rgba::TRANSPARENT));
            }
        }
    }

    #[test]
    fn test_long_code_scrolls() {
        let mut layout = PairingLayout::new();
        layout.show_code("123456");
        let PairingState::Code { since, .. } = layout.state().clone() else {
            panic!("expected a code");
        };
        let first = layout.render_at(since);
        let later = layout.render_at(since + Duration::from_millis(300));
        assert_ne!(first, later);
    }
}
