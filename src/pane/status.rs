use super::Pane;
use crate::frame::{FrameCanvas, RasterFrame, Rgba};
use crate::image_asset::AnimatedImage;
use crate::{MATRIX_HEIGHT, MATRIX_WIDTH};
use std::time::Duration;
use tokio::time::Instant;

const STEP: Duration = Duration::from_secs(1);

/// Read-only diagnostic pane for certification runs.
///
/// Steps through solid red, green, blue and white frames and a diagonal gradient,
/// one per second, so every LED and channel can be checked by eye.
pub struct StatusPane {
    pattern: AnimatedImage,
    started: Instant,
}

impl StatusPane {
    pub fn new() -> Self {
        Self {
            pattern: test_pattern(),
            started: Instant::now(),
        }
    }

    fn render_at(&self, now: Instant) -> RasterFrame {
        let steps = now.saturating_duration_since(self.started).as_secs() / STEP.as_secs();
        let index = steps as usize % self.pattern.frame_count();
        self.pattern.frame(index).unwrap_or_default()
    }
}

impl Default for StatusPane {
    fn default() -> Self {
        Self::new()
    }
}

impl Pane for StatusPane {
    fn name(&self) -> &str {
        "status"
    }

    fn render(&mut self) -> RasterFrame {
        self.render_at(Instant::now())
    }
}

fn test_pattern() -> AnimatedImage {
    let mut gradient = FrameCanvas::new();
    let span = (MATRIX_WIDTH + MATRIX_HEIGHT - 2) as u32;
    for y in 0..MATRIX_HEIGHT {
        for x in 0..MATRIX_WIDTH {
            let level = ((x + y) as u32 * 255 / span) as u8;
            gradient.set(x as i32, y as i32, Rgba::opaque(level, 255 - level, level / 2));
        }
    }

    AnimatedImage::from_frames(vec![
        RasterFrame::filled(Rgba::RED),
        RasterFrame::filled(Rgba::GREEN),
        RasterFrame::filled(Rgba::BLUE),
        RasterFrame::filled(Rgba::WHITE),
        gradient.into_frame(),
    ])
    .unwrap_or_else(|_| AnimatedImage::still(RasterFrame::filled(Rgba::WHITE)))
}
