//! # Render Loop
//!
//! The single task that owns both layouts and the frame sink. It alternates
//! between the interactive [`PaneLayout`] and the [`PairingLayout`] depending on
//! the current [`ControlMode`], which only changes when a queued [`Command`] is
//! applied at the start of a tick.
//!
//! ## Tick
//! 1. Drain every queued command, in order.
//! 2. **Interactive**: build the layout if there is none (clearing the matrix
//!    first), render it, and write the frame. When the layout falls asleep a
//!    single blank frame is written, then the loop parks until either the wake
//!    signal fires or another command arrives.
//! 3. **Pairing**: render the pairing view and write it. Pairing never sleeps.
//!
//! There is no fixed frame interval. The loop runs as fast as the sink accepts
//! frames, and a frame write always finishes (or fails) before the next tick.
//!
//! ## Termination
//! A [`Command::Shutdown`] stops the loop cleanly. Any sink error stops it with
//! that error; the caller decides what a failed transport means for the process.

use crate::frame::{RasterFrame, Rgba};
use crate::image_asset::AnimatedImage;
use crate::layout::{LayoutFrame, LayoutInputs, PaneLayout};
use crate::pairing::PairingLayout;
use crate::pane::PaneFactory;
use crate::transport::{FrameSink, TransportError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlMode {
    Interactive,
    Pairing,
}

/// A message for the render loop.
#[derive(Debug)]
pub enum Command {
    EnableControl,
    DisableControl,
    ShowCode(String),
    ShowColor(Rgba),
    ShowIcon { name: String, image: AnimatedImage },
    ShowFadingColor { color: Rgba, duration: Duration },
    Shutdown,
}

/// Outcome of one [`RenderLoop::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stopped,
}

/// Frames-per-second counter, reset by its reporter every second.
#[derive(Clone, Debug, Default)]
pub struct Throughput {
    count: Arc<AtomicU64>,
}

impl Throughput {
    pub fn tick(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset the counter.
    pub fn take(&self) -> u64 {
        self.count.swap(0, Ordering::Relaxed)
    }

    /// Log and reset the count once a second until aborted.
    pub fn spawn_reporter(&self, name: &'static str) -> JoinHandle<()> {
        let counter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await;
            loop {
                interval.tick().await;
                debug!("{} - {}", name, counter.take());
            }
        })
    }
}

/// Owner of both layouts and the sink.
pub struct RenderLoop<S> {
    sink: S,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    factory: Box<dyn PaneFactory>,
    mode: ControlMode,
    // Exactly one of these is set: the live layout owns the input queue
    layout: Option<PaneLayout>,
    parked_inputs: Option<LayoutInputs>,
    idle_timeout: Duration,
    asleep: bool,
    pairing: PairingLayout,
    throughput: Throughput,
    stopping: bool,
}

impl<S: FrameSink> RenderLoop<S> {
    pub fn new(
        sink: S,
        commands: mpsc::UnboundedReceiver<Command>,
        factory: Box<dyn PaneFactory>,
        inputs: LayoutInputs,
        idle_timeout: Duration,
        mode: ControlMode,
    ) -> Self {
        Self {
            sink,
            commands,
            commands_open: true,
            factory,
            mode,
            layout: None,
            parked_inputs: Some(inputs),
            idle_timeout,
            asleep: false,
            pairing: PairingLayout::new(),
            throughput: Throughput::default(),
            stopping: false,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn layout(&self) -> Option<&PaneLayout> {
        self.layout.as_ref()
    }

    pub fn pairing(&self) -> &PairingLayout {
        &self.pairing
    }

    pub fn throughput(&self) -> &Throughput {
        &self.throughput
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Tick until shut down or the sink fails.
    pub async fn run(mut self) -> Result<(), TransportError> {
        info!("Render loop started in {:?} mode", self.mode);
        let reporter = self.throughput.spawn_reporter("Pane FPS");

        let result = loop {
            match self.tick().await {
                Ok(Tick::Continue) => {}
                Ok(Tick::Stopped) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        reporter.abort();
        info!("Render loop stopped");
        result
    }

    /// Apply queued commands, then render and write one frame.
    pub async fn tick(&mut self) -> Result<Tick, TransportError> {
        self.throughput.tick();
        self.drain_commands();
        if self.stopping {
            return Ok(Tick::Stopped);
        }

        match self.mode {
            ControlMode::Interactive => self.tick_interactive().await?,
            ControlMode::Pairing => {
                let frame = self.pairing.render();
                self.sink.write_frame(&frame).await?;
            }
        }

        Ok(if self.stopping {
            Tick::Stopped
        } else {
            Tick::Continue
        })
    }

    async fn tick_interactive(&mut self) -> Result<(), TransportError> {
        if self.layout.is_none() {
            if let Some(inputs) = self.parked_inputs.take() {
                info!("Enabling layout... clearing LED");
                self.sink.write_frame(&RasterFrame::blank()).await?;
                let layout = PaneLayout::new(self.factory.build(), inputs, self.idle_timeout);
                self.layout = Some(layout);
                self.asleep = false;
                info!("Finished control layout");
            }
        }

        let Some(layout) = self.layout.as_mut() else {
            return Ok(());
        };

        match layout.render() {
            LayoutFrame::Frame(frame) => {
                self.asleep = false;
                self.sink.write_frame(&frame).await
            }
            LayoutFrame::Asleep(wake) => {
                if !self.asleep {
                    self.asleep = true;
                    self.sink.write_frame(&RasterFrame::blank()).await?;
                }

                info!("Waiting as the UI is asleep");
                let open = self.commands_open;
                let received = tokio::select! {
                    _ = wake.wait() => {
                        info!("UI woke up");
                        None
                    }
                    command = self.commands.recv(), if open => Some(command),
                };

                match received {
                    Some(Some(command)) => {
                        info!("Got a command while asleep");
                        self.apply(command);
                    }
                    Some(None) => self.commands_open = false,
                    None => {}
                }
                Ok(())
            }
        }
    }

    fn drain_commands(&mut self) {
        while self.commands_open {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("All command handles dropped");
                    self.commands_open = false;
                }
            }
        }
    }

    fn apply(&mut self, command: Command) {
        debug!("Applying {:?}", command);
        match command {
            Command::EnableControl => self.set_mode(ControlMode::Interactive),
            Command::DisableControl => self.set_mode(ControlMode::Pairing),
            Command::ShowCode(code) => {
                self.set_mode(ControlMode::Pairing);
                self.pairing.show_code(&code);
            }
            Command::ShowColor(color) => {
                self.set_mode(ControlMode::Pairing);
                self.pairing.show_color(color);
            }
            Command::ShowIcon { name, image } => {
                self.set_mode(ControlMode::Pairing);
                self.pairing.show_icon(&name, image);
            }
            Command::ShowFadingColor { color, duration } => {
                self.set_mode(ControlMode::Pairing);
                self.pairing.show_fading_shrinking_color(color, duration);
            }
            Command::Shutdown => self.stopping = true,
        }
    }

    fn set_mode(&mut self, mode: ControlMode) {
        if mode == self.mode {
            return;
        }
        info!("Control mode: {:?} -> {:?}", self.mode, mode);
        self.mode = mode;

        if mode == ControlMode::Pairing {
            if let Some(layout) = self.layout.take() {
                self.parked_inputs = Some(layout.into_inputs());
            }
            self.asleep = false;
        }
    }
}
