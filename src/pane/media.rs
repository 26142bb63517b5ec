use super::{Debounce, GesturePane, Pane};
use crate::devices::{self, DeviceWatch};
use crate::frame::RasterFrame;
use crate::gesture::Gesture;
use crate::image_asset::MediaImages;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// How long the volume or "next" indicator stays up after an adjustment.
const INDICATOR_HOLD: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

/// Playback state as reported by the media player.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaState {
    pub playback: PlaybackState,
    /// 0.0 ..= 1.0
    pub volume: f64,
    pub muted: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            playback: PlaybackState::Stopped,
            volume: 0.5,
            muted: false,
        }
    }
}

/// Transport controls. Holds no toggle of its own: what it shows comes from the
/// player's reported [`MediaState`], and gestures become remote commands.
pub struct MediaPane {
    images: MediaImages,
    control_devices: DeviceWatch,
    volume_devices: DeviceWatch,
    reported: watch::Receiver<MediaState>,
    /// Optimistic volume set by local air-wheel input
    local_volume: Option<f64>,
    volume_shown_until: Option<Instant>,
    next_shown_until: Option<Instant>,
    debounce: Debounce,
}

impl MediaPane {
    pub fn new(
        images: MediaImages,
        control_devices: DeviceWatch,
        volume_devices: DeviceWatch,
        reported: watch::Receiver<MediaState>,
        debounce: Duration,
    ) -> Self {
        Self {
            images,
            control_devices,
            volume_devices,
            reported,
            local_volume: None,
            volume_shown_until: None,
            next_shown_until: None,
            debounce: Debounce::new(debounce),
        }
    }

    fn send(&self, devices: &DeviceWatch, method: &str, params: Value) {
        let devices = devices.snapshot();
        debug!("media: {} on {} devices", method, devices.len());
        devices::dispatch(&devices, method, params);
    }

    fn current_volume(&self) -> f64 {
        self.local_volume
            .unwrap_or_else(|| self.reported.borrow().volume)
    }

    fn render_at(&mut self, now: Instant) -> RasterFrame {
        let state = *self.reported.borrow();

        if self.volume_shown_until.is_some_and(|until| now < until) {
            let volume = self.current_volume();
            return if state.muted || volume <= 0.0 {
                self.images.mute.next()
            } else {
                self.images.volume.frame_at(volume)
            };
        }
        // Once the indicator times out the player's report is authoritative again
        self.local_volume = None;

        if self.next_shown_until.is_some_and(|until| now < until) {
            return self.images.next.next();
        }

        match state.playback {
            PlaybackState::Playing => self.images.play.next(),
            PlaybackState::Paused => self.images.pause.next(),
            PlaybackState::Stopped => self.images.stop.next(),
        }
    }
}

impl Pane for MediaPane {
    fn name(&self) -> &str {
        "media"
    }

    fn render(&mut self) -> RasterFrame {
        self.render_at(Instant::now())
    }

    fn as_gesture_target(&mut self) -> Option<&mut dyn GesturePane> {
        Some(self)
    }
}

impl GesturePane for MediaPane {
    fn gesture(&mut self, gesture: &Gesture, now: Instant) {
        match gesture {
            Gesture::Tap { .. } => {
                if self.debounce.is_ignoring(now) {
                    return;
                }
                self.debounce.arm(now);
                let method = if self.reported.borrow().playback == PlaybackState::Playing {
                    "pause"
                } else {
                    "play"
                };
                info!("media: {}", method);
                self.send(&self.control_devices, method, Value::Null);
            }
            Gesture::DoubleTap { .. } => {
                self.next_shown_until = Some(now + INDICATOR_HOLD);
                self.send(&self.control_devices, "next", Value::Null);
            }
            Gesture::AirWheel { rotation } => {
                let volume = (self.current_volume() + rotation).clamp(0.0, 1.0);
                self.local_volume = Some(volume);
                self.volume_shown_until = Some(now + INDICATOR_HOLD);
                self.send(&self.volume_devices, "setVolume", json!(volume));
            }
            Gesture::Swipe { .. } => {}
        }
    }
}
