use super::{GesturePane, LevelCallback, OnOffPane, Pane, StateCallback};
use crate::devices::{self, DeviceWatch};
use crate::frame::RasterFrame;
use crate::gesture::Gesture;
use crate::image_asset::ToggleImages;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Dimmer: on/off toggle plus an independent brightness channel in `0.0..=1.0`.
///
/// Taps toggle through the inner [`OnOffPane`]. Air-wheel rotation changes
/// brightness by one unit per full turn and is not debounced.
pub struct LightPane {
    toggle: OnOffPane,
    brightness: f64,
    brightness_devices: DeviceWatch,
    on_brightness_change: LevelCallback,
}

impl LightPane {
    pub fn new(
        images: ToggleImages,
        on_off_devices: DeviceWatch,
        brightness_devices: DeviceWatch,
        debounce: Duration,
        on_state_change: StateCallback,
        on_brightness_change: LevelCallback,
    ) -> Self {
        Self {
            toggle: OnOffPane::new("light", images, on_off_devices, debounce, on_state_change),
            brightness: 1.0,
            brightness_devices,
            on_brightness_change,
        }
    }

    pub fn state(&self) -> bool {
        self.toggle.state()
    }

    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    /// Set brightness (clamped), command the dimmers and notify the callback.
    pub fn set_brightness(&mut self, brightness: f64) {
        let brightness = brightness.clamp(0.0, 1.0);
        if brightness == self.brightness {
            return;
        }
        self.brightness = brightness;

        let devices = self.brightness_devices.snapshot();
        debug!("light: brightness {:.2} on {} devices", brightness, devices.len());
        devices::dispatch(&devices, "setBrightness", json!(brightness));
        (self.on_brightness_change)(brightness);
    }
}

impl Pane for LightPane {
    fn name(&self) -> &str {
        "light"
    }

    fn render(&mut self) -> RasterFrame {
        let frame = self.toggle.render();
        if self.toggle.state() {
            frame.scaled(self.brightness)
        } else {
            frame
        }
    }

    fn as_gesture_target(&mut self) -> Option<&mut dyn GesturePane> {
        Some(self)
    }
}

impl GesturePane for LightPane {
    fn gesture(&mut self, gesture: &Gesture, now: Instant) {
        match gesture {
            Gesture::AirWheel { rotation } => self.set_brightness(self.brightness + rotation),
            g if g.is_tap() => {
                self.toggle.tap(now);
            }
            _ => {}
        }
    }
}
