//! # Pane Layout
//!
//! The interactive view: an ordered list of panes with exactly one active at a
//! time, plus power-saving sleep.
//!
//! ## Inputs
//! Gestures and external wake requests never touch the layout directly. They are
//! queued through a [`LayoutWaker`] and drained at the start of every
//! [`PaneLayout::render`], so the layout is only ever mutated from the render
//! loop. The queue ([`LayoutInputs`]) outlives any single layout: when control is
//! disabled the layout is dropped and its queue handed back with
//! [`PaneLayout::into_inputs`], ready for the next build.
//!
//! ## Sleep State Machine
//! ```text
//!   Awake ──(idle timeout elapsed)──▶ Asleep
//!   Asleep ──(gesture or wake)──────▶ Awake
//! ```
//! While asleep, render returns a [`WakeSignal`] instead of a frame. The signal
//! resolves as soon as anything is queued on the waker.
//!
//! ## Navigation
//! Swipes east/north select the next pane, west/south the previous one, wrapping at
//! both ends. Every other gesture goes to the active pane's gesture capability.

use crate::frame::RasterFrame;
use crate::gesture::Gesture;
use crate::pane::Pane;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

/// Something for the layout to process on its next render.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LayoutInput {
    Gesture(Gesture),
    Wake,
}

/// Create the persistent input queue shared by every layout build.
pub fn layout_inputs() -> (LayoutWaker, LayoutInputs) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let notify = Arc::new(Notify::new());
    (
        LayoutWaker {
            sender,
            notify: Arc::clone(&notify),
        },
        LayoutInputs { receiver, notify },
    )
}

/// Sending half: feed gestures or request a wake from any task.
#[derive(Clone, Debug)]
pub struct LayoutWaker {
    sender: mpsc::UnboundedSender<LayoutInput>,
    notify: Arc<Notify>,
}

impl LayoutWaker {
    pub fn gesture(&self, gesture: Gesture) {
        self.push(LayoutInput::Gesture(gesture));
    }

    pub fn wake(&self) {
        self.push(LayoutInput::Wake);
    }

    fn push(&self, input: LayoutInput) {
        if self.sender.send(input).is_err() {
            debug!("Layout input dropped, render loop has stopped");
            return;
        }
        self.notify.notify_one();
    }
}

/// Receiving half, owned by whichever layout is current.
#[derive(Debug)]
pub struct LayoutInputs {
    receiver: mpsc::UnboundedReceiver<LayoutInput>,
    notify: Arc<Notify>,
}

impl LayoutInputs {
    fn drain(&mut self) -> Vec<LayoutInput> {
        let mut inputs = Vec::new();
        while let Ok(input) = self.receiver.try_recv() {
            inputs.push(input);
        }
        inputs
    }
}

/// Resolves when the sleeping layout should render again.
#[derive(Clone, Debug)]
pub struct WakeSignal {
    notify: Arc<Notify>,
}

impl WakeSignal {
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Result of one layout render.
#[derive(Debug)]
pub enum LayoutFrame {
    Frame(RasterFrame),
    Asleep(WakeSignal),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutState {
    Awake,
    Asleep,
}

/// Ordered panes, one active, with idle sleep.
pub struct PaneLayout {
    panes: Vec<Box<dyn Pane>>,
    active: usize,
    state: LayoutState,
    last_interaction: Instant,
    idle_timeout: Duration,
    inputs: LayoutInputs,
    last_frame: Option<RasterFrame>,
}

impl PaneLayout {
    /// Build an awake layout showing the first pane.
    ///
    /// Input queued while no layout existed is stale and discarded.
    pub fn new(panes: Vec<Box<dyn Pane>>, mut inputs: LayoutInputs, idle_timeout: Duration) -> Self {
        let stale = inputs.drain().len();
        if stale > 0 {
            debug!("Discarded {} stale layout inputs", stale);
        }
        info!(
            "Built layout with panes: {}",
            panes.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        );

        Self {
            panes,
            active: 0,
            state: LayoutState::Awake,
            last_interaction: Instant::now(),
            idle_timeout,
            inputs,
            last_frame: None,
        }
    }

    pub fn render(&mut self) -> LayoutFrame {
        self.render_at(Instant::now())
    }

    pub(crate) fn render_at(&mut self, now: Instant) -> LayoutFrame {
        for input in self.inputs.drain() {
            self.apply(input, now);
        }

        if self.state == LayoutState::Awake
            && now.saturating_duration_since(self.last_interaction) >= self.idle_timeout
        {
            info!("No interaction for {:?}, going to sleep", self.idle_timeout);
            self.state = LayoutState::Asleep;
        }

        match self.state {
            LayoutState::Asleep => LayoutFrame::Asleep(WakeSignal {
                notify: Arc::clone(&self.inputs.notify),
            }),
            LayoutState::Awake => LayoutFrame::Frame(self.render_active()),
        }
    }

    fn render_active(&mut self) -> RasterFrame {
        let Some(pane) = self.panes.get_mut(self.active) else {
            return RasterFrame::blank();
        };

        if !pane.is_dirty() {
            if let Some(frame) = &self.last_frame {
                return frame.clone();
            }
        }

        let frame = pane.render();
        self.last_frame = Some(frame.clone());
        frame
    }

    fn apply(&mut self, input: LayoutInput, now: Instant) {
        if self.state == LayoutState::Asleep {
            info!("Layout woke up");
        }
        self.state = LayoutState::Awake;
        self.last_interaction = now;

        let LayoutInput::Gesture(gesture) = input else {
            return;
        };

        if let Some(step) = gesture.navigation_step() {
            self.select(step);
        } else if let Some(target) = self
            .panes
            .get_mut(self.active)
            .and_then(|pane| pane.as_gesture_target())
        {
            target.gesture(&gesture, now);
        }
    }

    fn select(&mut self, step: isize) {
        if self.panes.is_empty() {
            return;
        }
        let len = self.panes.len() as isize;
        self.active = (self.active as isize + step).rem_euclid(len) as usize;
        self.last_frame = None;
        debug!("Active pane: {}", self.panes[self.active].name());
    }

    pub fn state(&self) -> LayoutState {
        self.state
    }

    /// Index of the active pane, or `None` while asleep or empty.
    pub fn active_index(&self) -> Option<usize> {
        (self.state == LayoutState::Awake && self.active < self.panes.len()).then_some(self.active)
    }

    pub fn pane_count(&self) -> usize {
        self.panes.len()
    }

    /// Tear the layout down, keeping its input queue for the next build.
    pub fn into_inputs(self) -> LayoutInputs {
        self.inputs
    }
}
