use super::{LightPane, MediaPane, MediaState, OnOffPane, Pane, StatusPane};
use crate::devices::DeviceDirectory;
use crate::image_asset::PaneAssets;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Builds a fresh pane set each time the interactive layout is created.
pub trait PaneFactory: Send {
    fn build(&mut self) -> Vec<Box<dyn Pane>>;
}

/// The standard layout: media, heater (or diagnostics), light, fan.
pub struct StandardPanes {
    assets: PaneAssets,
    directory: Arc<DeviceDirectory>,
    media_state: watch::Receiver<MediaState>,
    debounce: Duration,
    diagnostic: bool,
}

impl StandardPanes {
    pub fn new(
        assets: PaneAssets,
        directory: Arc<DeviceDirectory>,
        media_state: watch::Receiver<MediaState>,
        debounce: Duration,
    ) -> Self {
        Self {
            assets,
            directory,
            media_state,
            debounce,
            diagnostic: false,
        }
    }

    /// Show the status pane in the heater slot.
    pub fn with_diagnostic_pane(mut self, diagnostic: bool) -> Self {
        self.diagnostic = diagnostic;
        self
    }
}

impl PaneFactory for StandardPanes {
    fn build(&mut self) -> Vec<Box<dyn Pane>> {
        let dir = &self.directory;
        let mut panes: Vec<Box<dyn Pane>> = Vec::with_capacity(4);

        panes.push(Box::new(MediaPane::new(
            self.assets.media.clone(),
            dir.subscribe("mediaplayer", "media-control"),
            dir.subscribe("mediaplayer", "volume"),
            self.media_state.clone(),
            self.debounce,
        )));

        if self.diagnostic {
            panes.push(Box::new(StatusPane::new()));
        } else {
            panes.push(Box::new(OnOffPane::new(
                "heater",
                self.assets.heater.clone(),
                dir.subscribe("heater", "on-off"),
                self.debounce,
                Box::new(|state: bool| debug!("Heater state: {}", state)),
            )));
        }

        panes.push(Box::new(LightPane::new(
            self.assets.light.clone(),
            dir.subscribe("light", "on-off"),
            dir.subscribe("light", "brightness"),
            self.debounce,
            Box::new(|state: bool| debug!("Light on-off state: {}", state)),
            Box::new(|level: f64| debug!("Light brightness: {:.2}", level)),
        )));

        panes.push(Box::new(OnOffPane::new(
            "fan",
            self.assets.fan.clone(),
            dir.subscribe("fan", "on-off"),
            self.debounce,
            Box::new(|state: bool| debug!("Fan state: {}", state)),
        )));

        panes
    }
}
