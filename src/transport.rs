//! # Serial Transport
//!
//! Everything between a finished [`RasterFrame`] and the LED matrix's serial line.
//!
//! ## Link State Machine
//! ```text
//!   Disconnected ──connect()──▶ Handshaking ──"LED" magic──▶ Connected
//!                                   │                            │
//!                          both baud rates fail        write timeout / I/O error
//!                                   ▼                            ▼
//!                                 Failed ◀───────────────────────┘
//! ```
//! `Failed` is terminal. Nothing here reconnects: the controller exits and its
//! supervisor restarts it, which re-runs the handshake from a freshly reset device.
//!
//! ## Handshake
//! Each attempt resets the matrix through the external reset command, opens the
//! port at the candidate baud rate, writes a blank frame, then blocks reading a
//! 16-byte init string. The first three bytes must be `LED`. The first attempt
//! runs at twice the nominal rate and a single retry at the nominal rate.
//!
//! ## Wire Format
//! One frame is 16×16 pixels, row-major, three bytes (R, G, B) per pixel with
//! alpha premultiplied: 768 bytes in one contiguous write.
//!
//! ## Watchdog
//! Each write runs on the blocking pool and races a timer (10 s by default). A
//! write that loses the race means the device is wedged; the link fails and
//! reports [`TransportError::WatchdogTimeout`]. The stuck write is never cancelled.

use crate::frame::RasterFrame;
use crate::MATRIX_PIXELS;
use async_trait::async_trait;
use nix::sys::termios::{self, BaudRate, ControlFlags, SetArg, SpecialCharacterIndices};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Length of the device's init string.
pub const HANDSHAKE_LEN: usize = 16;

/// Leading bytes every valid init string starts with.
pub const HANDSHAKE_MAGIC: &[u8; 3] = b"LED";

/// Bytes per encoded frame.
pub const FRAME_BYTES: usize = MATRIX_PIXELS * 3;

/// Serial transport failures.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The port could not be opened or configured
    #[error("could not open serial port at {baud} baud")]
    Open {
        baud: u32,
        #[source]
        source: io::Error,
    },

    /// Baud rate has no termios equivalent
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),

    /// Reading the init string failed
    #[error("failed to read initialisation string from led matrix")]
    HandshakeRead(#[source] io::Error),

    /// The init string did not start with the magic bytes
    #[error("expected init string 'LED', got {received:?}")]
    InitMismatch { received: String },

    /// Every baud rate was tried and failed
    #[error("failed to connect to LED display")]
    ConnectFailed(#[source] Box<TransportError>),

    /// Writing a frame failed
    #[error("failed writing to LED matrix")]
    Write(#[source] io::Error),

    /// A frame write did not finish before the watchdog fired
    #[error("timeout writing to LED matrix after {0:?}")]
    WatchdogTimeout(Duration),

    /// The link already failed; no further frames are written
    #[error("serial link has failed")]
    LinkFailed,

    /// Frame written before a successful handshake
    #[error("serial link is not connected")]
    NotConnected,
}

/// Encode a frame to wire format.
///
/// # Example
/// ```
/// use led_matrix_lib::frame::RasterFrame;
/// use led_matrix_lib::transport::{encode_frame, FRAME_BYTES};
///
/// let bytes = encode_frame(&RasterFrame::blank());
/// assert_eq!(bytes.len(), FRAME_BYTES);
/// assert!(bytes.iter().all(|&b| b == 0));
/// ```
pub fn encode_frame(frame: &RasterFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(FRAME_BYTES);
    for pixel in frame.pixels() {
        bytes.extend_from_slice(&pixel.premultiplied());
    }
    bytes
}

/// Check a raw init string.
pub fn check_handshake(buf: &[u8]) -> Result<(), TransportError> {
    if buf.len() >= HANDSHAKE_MAGIC.len() && &buf[..HANDSHAKE_MAGIC.len()] == HANDSHAKE_MAGIC {
        Ok(())
    } else {
        Err(TransportError::InitMismatch {
            received: String::from_utf8_lossy(buf).into_owned(),
        })
    }
}

/// Hardware reset collaborator, run before every open attempt.
pub trait MatrixReset: Send + Sync {
    fn reset(&self);
}

/// Runs an external reset program and logs its output.
pub struct CommandReset {
    program: PathBuf,
}

impl CommandReset {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }
}

impl MatrixReset for CommandReset {
    fn reset(&self) {
        debug!("Resetting LED Matrix");
        match Command::new(&self.program).output() {
            Ok(output) => debug!(
                "Output from reset ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stdout).trim()
            ),
            // The port open below decides whether the device is usable
            Err(e) => warn!("Reset command {} failed: {}", self.program.display(), e),
        }
    }
}

/// Opens the serial port at a given rate.
pub trait PortOpener {
    type Port: Read + Write + Send + 'static;

    fn open(&self, baud: u32) -> Result<Self::Port, TransportError>;
}

/// Opens a tty device in raw 8N1 mode with blocking reads.
pub struct TtyOpener {
    path: PathBuf,
}

impl TtyOpener {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

fn baud_rate(baud: u32) -> Result<BaudRate, TransportError> {
    Ok(match baud {
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        460800 => BaudRate::B460800,
        921600 => BaudRate::B921600,
        other => return Err(TransportError::UnsupportedBaud(other)),
    })
}

impl PortOpener for TtyOpener {
    type Port = File;

    fn open(&self, baud: u32) -> Result<File, TransportError> {
        let speed = baud_rate(baud)?;
        let open_err = |source: io::Error| TransportError::Open { baud, source };

        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(open_err)?;

        let mut tio = termios::tcgetattr(&port).map_err(|e| open_err(e.into()))?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, speed).map_err(|e| open_err(e.into()))?;
        tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
        // Reads block until at least one byte arrives
        tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(&port, SetArg::TCSANOW, &tio).map_err(|e| open_err(e.into()))?;

        info!("Opened {} at {} baud", self.path.display(), baud);
        Ok(port)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Handshaking,
    Connected,
    Failed,
}

/// Negotiation and watchdog parameters.
#[derive(Clone, Copy, Debug)]
pub struct LinkSettings {
    pub nominal_baud: u32,
    pub watchdog: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            nominal_baud: 115_200,
            watchdog: Duration::from_secs(10),
        }
    }
}

/// Anything the render loop can hand finished frames to.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &RasterFrame) -> Result<(), TransportError>;
}

/// Connection to the matrix over a serial port.
pub struct SerialLink<P> {
    port: Option<P>,
    state: LinkState,
    baud: Option<u32>,
    settings: LinkSettings,
}

impl<P: Read + Write + Send + 'static> SerialLink<P> {
    pub fn new(settings: LinkSettings) -> Self {
        Self {
            port: None,
            state: LinkState::Disconnected,
            baud: None,
            settings,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Baud rate of the established connection.
    pub fn baud(&self) -> Option<u32> {
        self.baud
    }

    /// Handshake at twice the nominal rate, falling back once to the nominal rate.
    pub fn connect<O>(&mut self, opener: &O, reset: &dyn MatrixReset) -> Result<(), TransportError>
    where
        O: PortOpener<Port = P>,
    {
        let nominal = self.settings.nominal_baud;
        let Some(fast) = nominal.checked_mul(2) else {
            self.state = LinkState::Failed;
            return Err(TransportError::UnsupportedBaud(nominal));
        };

        let first = match self.attempt(opener, reset, fast) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!(
            "Failed to connect to LED using baud rate: {} ({:?}), trying {}",
            fast, first, nominal
        );

        match self.attempt(opener, reset, nominal) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Failed to connect to LED display: {:?}", e);
                self.state = LinkState::Failed;
                Err(TransportError::ConnectFailed(Box::new(e)))
            }
        }
    }

    fn attempt<O>(&mut self, opener: &O, reset: &dyn MatrixReset, baud: u32) -> Result<(), TransportError>
    where
        O: PortOpener<Port = P>,
    {
        self.state = LinkState::Handshaking;
        reset.reset();

        let result = opener.open(baud).and_then(|mut port| {
            port.write_all(&encode_frame(&RasterFrame::blank()))
                .and_then(|_| port.flush())
                .map_err(TransportError::Write)?;

            let mut buf = [0u8; HANDSHAKE_LEN];
            port.read_exact(&mut buf)
                .map_err(TransportError::HandshakeRead)?;

            if let Err(e) = check_handshake(&buf) {
                info!("{}", e);
                // Dropping the port closes it
                return Err(e);
            }
            debug!(
                "Read init string from LED Matrix: {}",
                String::from_utf8_lossy(&buf)
            );
            Ok(port)
        });

        match result {
            Ok(port) => {
                info!("Connected to LED matrix at {} baud", baud);
                self.port = Some(port);
                self.baud = Some(baud);
                self.state = LinkState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = LinkState::Disconnected;
                Err(e)
            }
        }
    }

    fn fail(&mut self, err: TransportError) -> TransportError {
        error!("{}", err);
        self.state = LinkState::Failed;
        self.port = None;
        err
    }
}

#[async_trait]
impl<P: Read + Write + Send + 'static> FrameSink for SerialLink<P> {
    /// Write one frame, racing the watchdog.
    async fn write_frame(&mut self, frame: &RasterFrame) -> Result<(), TransportError> {
        match self.state {
            LinkState::Connected => {}
            LinkState::Failed => return Err(TransportError::LinkFailed),
            LinkState::Disconnected | LinkState::Handshaking => {
                return Err(TransportError::NotConnected)
            }
        }

        let Some(mut port) = self.port.take() else {
            return Err(self.fail(TransportError::LinkFailed));
        };
        let bytes = encode_frame(frame);

        let write = tokio::task::spawn_blocking(move || {
            let result = port.write_all(&bytes).and_then(|_| port.flush());
            (port, result)
        });

        match tokio::time::timeout(self.settings.watchdog, write).await {
            Ok(Ok((port, Ok(())))) => {
                self.port = Some(port);
                Ok(())
            }
            Ok(Ok((_, Err(e)))) => Err(self.fail(TransportError::Write(e))),
            Ok(Err(join)) => Err(self.fail(TransportError::Write(io::Error::other(join)))),
            Err(_) => Err(self.fail(TransportError::WatchdogTimeout(self.settings.watchdog))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// In-memory port: scripted init string in, recorded writes out
    struct MockPort {
        input: Cursor<Vec<u8>>,
        written: Arc<Mutex<Vec<u8>>>,
        /// Writes after the handshake block this long
        stall: Option<Duration>,
        handshake_done: bool,
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.input.read(buf)?;
            if self.input.position() as usize >= self.input.get_ref().len() {
                self.handshake_done = true;
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.handshake_done {
                if let Some(stall) = self.stall {
                    std::thread::sleep(stall);
                }
            }
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct MockOpener {
        /// Init string returned per attempt, in order
        replies: Mutex<VecDeque<Vec<u8>>>,
        bauds: Mutex<Vec<u32>>,
        written: Arc<Mutex<Vec<u8>>>,
        stall: Option<Duration>,
    }

    impl MockOpener {
        fn new(replies: &[&[u8]]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_vec()).collect()),
                bauds: Mutex::new(Vec::new()),
                written: Arc::new(Mutex::new(Vec::new())),
                stall: None,
            }
        }
    }

    impl PortOpener for MockOpener {
        type Port = MockPort;

        fn open(&self, baud: u32) -> Result<MockPort, TransportError> {
            self.bauds.lock().unwrap().push(baud);
            let reply = self.replies.lock().unwrap().pop_front().ok_or(TransportError::Open {
                baud,
                source: io::Error::new(io::ErrorKind::NotFound, "no device"),
            })?;
            Ok(MockPort {
                input: Cursor::new(reply),
                written: Arc::clone(&self.written),
                stall: self.stall,
                handshake_done: false,
            })
        }
    }

    struct CountingReset(Mutex<usize>);

    impl MatrixReset for CountingReset {
        fn reset(&self) {
            *self.0.lock().unwrap() += 1;
        }
    }

    const GOOD: &[u8] = b"LED-v1.0........";
    const BAD: &[u8] = b"ERR-no-matrix...";

    fn settings(watchdog: Duration) -> LinkSettings {
        LinkSettings {
            nominal_baud: 115_200,
            watchdog,
        }
    }

    #[test]
    fn test_handshake_magic() {
        assert!(check_handshake(GOOD).is_ok());
        assert!(matches!(
            check_handshake(BAD),
            Err(TransportError::InitMismatch { .. })
        ));
        assert!(check_handshake(b"LE").is_err());
    }

    #[test]
    fn test_connects_at_double_rate_first() {
        let opener = MockOpener::new(&[GOOD]);
        let reset = CountingReset(Mutex::new(0));
        let mut link = SerialLink::new(settings(Duration::from_secs(10)));

        link.connect(&opener, &reset).unwrap();

        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(link.baud(), Some(230_400));
        assert_eq!(*opener.bauds.lock().unwrap(), vec![230_400]);
        assert_eq!(*reset.0.lock().unwrap(), 1);
        // A blank frame goes out before the init read
        assert_eq!(*opener.written.lock().unwrap(), vec![0u8; FRAME_BYTES]);
    }

    #[test]
    fn test_bad_magic_falls_back_to_nominal_rate() {
        let opener = MockOpener::new(&[BAD, GOOD]);
        let reset = CountingReset(Mutex::new(0));
        let mut link = SerialLink::new(settings(Duration::from_secs(10)));

        link.connect(&opener, &reset).unwrap();

        assert_eq!(link.baud(), Some(115_200));
        assert_eq!(*opener.bauds.lock().unwrap(), vec![230_400, 115_200]);
        assert_eq!(*reset.0.lock().unwrap(), 2);
    }

    #[test]
    fn test_two_failures_are_terminal() {
        let opener = MockOpener::new(&[BAD, b"short"]);
        let reset = CountingReset(Mutex::new(0));
        let mut link = SerialLink::new(settings(Duration::from_secs(10)));

        let err = link.connect(&opener, &reset).unwrap_err();

        assert!(matches!(err, TransportError::ConnectFailed(inner)
            if matches!(*inner, TransportError::HandshakeRead(_))));
        assert_eq!(link.state(), LinkState::Failed);
        assert_eq!(opener.bauds.lock().unwrap().len(), 2, "exactly one retry");
    }

    #[tokio::test]
    async fn test_write_before_connect_is_rejected() {
        let mut link: SerialLink<MockPort> = SerialLink::new(LinkSettings::default());
        assert!(matches!(
            link.write_frame(&RasterFrame::blank()).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_frame_write_sends_encoded_frame() {
        let opener = MockOpener::new(&[GOOD]);
        let mut link = SerialLink::new(settings(Duration::from_secs(10)));
        link.connect(&opener, &CountingReset(Mutex::new(0))).unwrap();
        opener.written.lock().unwrap().clear();

        let frame = RasterFrame::filled(crate::frame::Rgba::opaque(1, 2, 3));
        link.write_frame(&frame).await.unwrap();

        let written = opener.written.lock().unwrap().clone();
        assert_eq!(written.len(), FRAME_BYTES);
        assert_eq!(&written[..6], &[1, 2, 3, 1, 2, 3]);
        assert_eq!(link.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_stalled_write_trips_watchdog_and_fails_link() {
        let mut opener = MockOpener::new(&[GOOD]);
        opener.stall = Some(Duration::from_millis(400));
        let mut link = SerialLink::new(settings(Duration::from_millis(50)));
        link.connect(&opener, &CountingReset(Mutex::new(0))).unwrap();

        let err = link.write_frame(&RasterFrame::blank()).await.unwrap_err();
        assert!(matches!(err, TransportError::WatchdogTimeout(d) if d == Duration::from_millis(50)));
        assert_eq!(link.state(), LinkState::Failed);

        // No further frame is attempted after the failure
        let again = link.write_frame(&RasterFrame::blank()).await.unwrap_err();
        assert!(matches!(again, TransportError::LinkFailed));
    }

    #[test]
    fn test_oversized_nominal_baud_is_rejected() {
        let opener = MockOpener::new(&[GOOD]);
        let reset = CountingReset(Mutex::new(0));
        let mut link = SerialLink::new(LinkSettings {
            nominal_baud: u32::MAX,
            watchdog: Duration::from_secs(10),
        });

        let err = link.connect(&opener, &reset).unwrap_err();

        assert!(matches!(err, TransportError::UnsupportedBaud(u32::MAX)));
        assert_eq!(link.state(), LinkState::Failed);
        assert!(opener.bauds.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cause_is_reported_once() {
        use std::error::Error;

        let opener = MockOpener::new(&[]);
        let reset = CountingReset(Mutex::new(0));
        let mut link = SerialLink::new(settings(Duration::from_secs(10)));
        let err = link.connect(&opener, &reset).unwrap_err();

        // Each layer names itself; the cause is only reachable through source()
        assert_eq!(err.to_string(), "failed to connect to LED display");
        let open = err.source().unwrap();
        assert_eq!(open.to_string(), "could not open serial port at 115200 baud");
        assert_eq!(open.source().unwrap().to_string(), "no device");
    }

    #[test]
    fn test_unsupported_baud() {
        assert!(matches!(baud_rate(12345), Err(TransportError::UnsupportedBaud(12345))));
        assert!(baud_rate(230_400).is_ok());
    }
}
