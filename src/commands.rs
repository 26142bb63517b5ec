//! Typed command surface for the render loop.
//!
//! [`ControllerHandle`] validates each request on the caller's side and only then
//! queues a [`Command`]. A rejected request (bad colour, unknown icon) never
//! reaches the loop, so the control mode is left exactly as it was.

use crate::frame::{ColorParseError, Rgba};
use crate::gesture::Gesture;
use crate::image_asset::IconSet;
use crate::layout::LayoutWaker;
use crate::scheduler::Command;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Icon shown for reset modes without a colour of their own.
pub const LOADING_ICON: &str = "loading.gif";

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    InvalidColor(#[from] ColorParseError),

    #[error("unknown icon '{0}'")]
    UnknownIcon(String),

    #[error("render loop is no longer running")]
    LoopStopped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodeRequest {
    pub code: String,
    /// Accepted and ignored
    #[serde(default)]
    pub display_time: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorRequest {
    pub color: String,
    #[serde(default)]
    pub display_time: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconRequest {
    pub icon: String,
    #[serde(default)]
    pub display_time: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetModeRequest {
    pub mode: String,
    /// Milliseconds
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub hold: bool,
}

/// What a reset mode request resolves to on the pairing view.
#[derive(Clone, Debug, PartialEq)]
pub enum ResetDisplay {
    Fade { color: Rgba, duration: Duration },
    Steady(Rgba),
    Loading,
}

impl ResetModeRequest {
    pub fn display(&self) -> ResetDisplay {
        let color = match self.mode.as_str() {
            "reboot" => Rgba::GREEN,
            "reset-userdata" => Rgba::YELLOW,
            "reset-root" => Rgba::RED,
            _ => return ResetDisplay::Loading,
        };

        if self.duration > 0 && !self.hold {
            ResetDisplay::Fade {
                color,
                duration: Duration::from_millis(self.duration),
            }
        } else {
            ResetDisplay::Steady(color)
        }
    }
}

/// Cloneable front door to the render loop.
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    icons: Arc<IconSet>,
    waker: LayoutWaker,
}

impl ControllerHandle {
    pub fn new(commands: mpsc::UnboundedSender<Command>, icons: Arc<IconSet>, waker: LayoutWaker) -> Self {
        Self {
            commands,
            icons,
            waker,
        }
    }

    fn send(&self, command: Command) -> Result<(), CommandError> {
        debug!("Queueing {:?}", command);
        self.commands
            .send(command)
            .map_err(|_| CommandError::LoopStopped)
    }

    pub fn enable_control(&self) -> Result<(), CommandError> {
        self.send(Command::EnableControl)
    }

    pub fn disable_control(&self) -> Result<(), CommandError> {
        self.send(Command::DisableControl)
    }

    pub fn display_pairing_code(&self, req: &PairingCodeRequest) -> Result<(), CommandError> {
        self.send(Command::ShowCode(req.code.clone()))
    }

    pub fn display_color(&self, req: &ColorRequest) -> Result<(), CommandError> {
        let color = Rgba::from_hex(&req.color)?;
        self.send(Command::ShowColor(color))
    }

    pub fn display_icon(&self, req: &IconRequest) -> Result<(), CommandError> {
        let image = self
            .icons
            .get(&req.icon)
            .ok_or_else(|| CommandError::UnknownIcon(req.icon.clone()))?;
        self.send(Command::ShowIcon {
            name: req.icon.clone(),
            image,
        })
    }

    pub fn display_reset_mode(&self, req: &ResetModeRequest) -> Result<(), CommandError> {
        match req.display() {
            ResetDisplay::Fade { color, duration } => {
                self.send(Command::ShowFadingColor { color, duration })
            }
            ResetDisplay::Steady(color) => self.send(Command::ShowColor(color)),
            ResetDisplay::Loading => match self.icons.get(LOADING_ICON) {
                Some(image) => self.send(Command::ShowIcon {
                    name: LOADING_ICON.to_string(),
                    image,
                }),
                // Still leave control, just without the animation
                None => self.send(Command::DisableControl),
            },
        }
    }

    /// Feed a sensor gesture to the interactive layout.
    pub fn gesture(&self, gesture: Gesture) {
        self.waker.gesture(gesture);
    }

    /// Wake the interactive layout without a gesture.
    pub fn wake(&self) {
        self.waker.wake();
    }

    /// Ask the render loop to stop after the current tick.
    pub fn shutdown(&self) -> Result<(), CommandError> {
        self.send(Command::Shutdown)
    }
}
