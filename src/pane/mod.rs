//! # Panes
//!
//! A pane is one self-contained screen of the interactive layout. Every pane can
//! [`render`](Pane::render) a full frame and report whether it is dirty; panes that
//! react to the sensor additionally expose a [`GesturePane`] through
//! [`Pane::as_gesture_target`].
//!
//! ## Variants
//! - [`OnOffPane`]: toggle for heaters, fans and similar switchable things
//! - [`LightPane`]: toggle plus a continuous brightness channel
//! - [`MediaPane`]: transport controls driven by reported playback state
//! - [`StatusPane`]: read-only diagnostic test pattern
//!
//! [`StandardPanes`] assembles the shipped set for each layout build.
//!
//! Panes never own the devices they control. They hold a [`DeviceWatch`] from
//! the directory and read a fresh snapshot every time they dispatch.
//!
//! [`DeviceWatch`]: crate::devices::DeviceWatch

mod factory;
mod light;
mod media;
mod on_off;
mod status;

pub use factory::{PaneFactory, StandardPanes};
pub use light::LightPane;
pub use media::{MediaPane, MediaState, PlaybackState};
pub use on_off::OnOffPane;
pub use status::StatusPane;

use crate::frame::RasterFrame;
use crate::gesture::Gesture;
use std::time::Duration;
use tokio::time::Instant;

/// Render capability shared by every pane.
pub trait Pane: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Produce the next frame. May advance animation cursors.
    fn render(&mut self) -> RasterFrame;

    /// Whether the layout should redraw. Every pane currently redraws each tick.
    fn is_dirty(&self) -> bool {
        true
    }

    /// Gesture capability, if this pane has one.
    fn as_gesture_target(&mut self) -> Option<&mut dyn GesturePane> {
        None
    }
}

/// Optional gesture capability.
pub trait GesturePane {
    fn gesture(&mut self, gesture: &Gesture, now: Instant);
}

/// Callback invoked synchronously when a toggle changes state.
pub type StateCallback = Box<dyn FnMut(bool) + Send>;

/// Callback invoked synchronously when a continuous value changes.
pub type LevelCallback = Box<dyn FnMut(f64) + Send>;

/// Per-pane gesture lockout after an accepted gesture.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Debounce {
    window: Duration,
    ignore_until: Option<Instant>,
}

impl Debounce {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            ignore_until: None,
        }
    }

    /// True if a gesture at `now` falls inside the lockout window.
    pub(crate) fn is_ignoring(&self, now: Instant) -> bool {
        self.ignore_until.is_some_and(|until| now < until)
    }

    /// Start the lockout window at `now`.
    pub(crate) fn arm(&mut self, now: Instant) {
        self.ignore_until = Some(now + self.window);
    }
}
