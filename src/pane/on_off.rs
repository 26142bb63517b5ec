use super::{Debounce, GesturePane, Pane, StateCallback};
use crate::devices::{self, DeviceWatch};
use crate::frame::RasterFrame;
use crate::gesture::Gesture;
use crate::image_asset::ToggleImages;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Two-state toggle pane. A tap flips the state and switches every device.
pub struct OnOffPane {
    name: String,
    images: ToggleImages,
    devices: DeviceWatch,
    state: bool,
    on_state_change: StateCallback,
    debounce: Debounce,
}

impl OnOffPane {
    pub fn new(
        name: impl Into<String>,
        images: ToggleImages,
        devices: DeviceWatch,
        debounce: Duration,
        on_state_change: StateCallback,
    ) -> Self {
        Self {
            name: name.into(),
            images,
            devices,
            state: false,
            on_state_change,
            debounce: Debounce::new(debounce),
        }
    }

    pub fn state(&self) -> bool {
        self.state
    }

    /// Set the state, command every known device, then notify the callback.
    ///
    /// Device calls are fire-and-forget; their failures only show up in the log.
    pub fn set_state(&mut self, state: bool) {
        self.state = state;
        let method = if state { "turnOn" } else { "turnOff" };
        let devices = self.devices.snapshot();
        debug!("{}: {} on {} devices", self.name, method, devices.len());
        devices::dispatch(&devices, method, Value::Null);
        (self.on_state_change)(state);
    }

    /// Handle a tap at `now`. Returns true if it toggled the state.
    pub(crate) fn tap(&mut self, now: Instant) -> bool {
        if self.debounce.is_ignoring(now) {
            return false;
        }
        info!("{}: Tap!", self.name);
        self.debounce.arm(now);
        self.set_state(!self.state);
        true
    }
}

impl Pane for OnOffPane {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&mut self) -> RasterFrame {
        if self.state {
            self.images.on.next()
        } else {
            self.images.off.next()
        }
    }

    fn as_gesture_target(&mut self) -> Option<&mut dyn GesturePane> {
        Some(self)
    }
}

impl GesturePane for OnOffPane {
    fn gesture(&mut self, gesture: &Gesture, now: Instant) {
        if gesture.is_tap() {
            self.tap(now);
        }
    }
}
