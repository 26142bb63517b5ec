//! # LED Matrix Controller Core Library
//!
//! This library drives a 16×16 RGB LED matrix attached over a serial line. It
//! composes an animated, gesture-driven user interface out of panes and pushes every
//! finished frame to the device under a write watchdog.
//!
//! ## Design Philosophy
//!
//! ### One Owner Per Frame
//! - **Single render task**: the [`scheduler::RenderLoop`] owns both layouts and the
//!   serial link. Nothing else ever touches them.
//! - **Messages in, frames out**: remote commands, gestures and wake requests are
//!   queued as messages and applied at the start of a tick.
//! - **Immutable frames**: a [`frame::RasterFrame`] never changes after it is built,
//!   so animations share frame storage freely.
//!
//! ### Two Views
//! - **Interactive**: the [`layout::PaneLayout`], one pane active at a time, with
//!   swipe navigation and idle sleep
//! - **Pairing**: the [`pairing::PairingLayout`], showing codes, status colours,
//!   icons and the reboot fade
//!
//! ### Failure Model
//! Asset and handshake failures surface at startup. A frame write that stalls past the
//! watchdog fails the link permanently; the binary exits and leaves recovery to its
//! supervisor, which restarts it into a fresh handshake.
//!
//! ## Data Flow
//! 1. **Startup**: load config → decode images → reset device → handshake
//! 2. **Steady state**: drain commands → render active view → encode → watchdog write
//! 3. **Sleep**: one blank frame, then park until a gesture, wake or command

// Module declarations
pub mod commands;
pub mod config;
pub mod devices;
pub mod frame;
pub mod gesture;
pub mod image_asset;
pub mod layout;
pub mod pairing;
pub mod pane;
pub mod rpc;
pub mod scheduler;
pub mod transport;

/// Matrix width in pixels.
pub const MATRIX_WIDTH: usize = 16;

/// Matrix height in pixels.
pub const MATRIX_HEIGHT: usize = 16;

/// Pixels per frame.
///
/// # Example
/// ```
/// use led_matrix_lib::{MATRIX_HEIGHT, MATRIX_PIXELS, MATRIX_WIDTH};
///
/// assert_eq!(MATRIX_PIXELS, MATRIX_WIDTH * MATRIX_HEIGHT);
/// ```
pub const MATRIX_PIXELS: usize = MATRIX_WIDTH * MATRIX_HEIGHT;
