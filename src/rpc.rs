//! JSON request decoding for the command surface.
//!
//! Requests arrive one per line as `{"method": "...", "params": {...}}`. Each is
//! answered with one line: `{"result": null}` on success or `{"error": "..."}`.
//! A bad line only fails that request; the reader keeps going.

use crate::commands::{
    ColorRequest, CommandError, ControllerHandle, IconRequest, PairingCodeRequest, ResetModeRequest,
};
use crate::gesture::Gesture;
use crate::pane::MediaState;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("malformed request: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("bad params for {method}: {source}")]
    Params {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// A decoded request.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    EnableControl,
    DisableControl,
    DisplayPairingCode(PairingCodeRequest),
    DisplayColor(ColorRequest),
    DisplayIcon(IconRequest),
    DisplayResetMode(ResetModeRequest),
    Gesture(Gesture),
    MediaState(MediaState),
}

#[derive(Deserialize)]
struct Envelope {
    method: String,
    #[serde(default)]
    params: Value,
}

fn params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|source| RpcError::Params {
        method: method.to_string(),
        source,
    })
}

impl Request {
    pub fn decode(line: &str) -> Result<Self, RpcError> {
        let Envelope { method, params: p } = serde_json::from_str(line)?;
        Ok(match method.as_str() {
            "enableControl" => Request::EnableControl,
            "disableControl" => Request::DisableControl,
            "displayPairingCode" => Request::DisplayPairingCode(params(&method, p)?),
            "displayColor" => Request::DisplayColor(params(&method, p)?),
            "displayIcon" => Request::DisplayIcon(params(&method, p)?),
            "displayResetMode" => Request::DisplayResetMode(params(&method, p)?),
            "gesture" => Request::Gesture(params(&method, p)?),
            "mediaState" => Request::MediaState(params(&method, p)?),
            _ => return Err(RpcError::UnknownMethod(method)),
        })
    }
}

/// Routes decoded requests to the controller and the media state channel.
pub struct RpcServer {
    handle: ControllerHandle,
    media_state: watch::Sender<MediaState>,
}

impl RpcServer {
    pub fn new(handle: ControllerHandle, media_state: watch::Sender<MediaState>) -> Self {
        Self {
            handle,
            media_state,
        }
    }

    pub fn dispatch(&self, request: Request) -> Result<(), RpcError> {
        debug!("RPC {:?}", request);
        match request {
            Request::EnableControl => self.handle.enable_control()?,
            Request::DisableControl => self.handle.disable_control()?,
            Request::DisplayPairingCode(req) => self.handle.display_pairing_code(&req)?,
            Request::DisplayColor(req) => self.handle.display_color(&req)?,
            Request::DisplayIcon(req) => self.handle.display_icon(&req)?,
            Request::DisplayResetMode(req) => self.handle.display_reset_mode(&req)?,
            Request::Gesture(gesture) => self.handle.gesture(gesture),
            Request::MediaState(state) => {
                self.media_state.send_replace(state);
            }
        }
        Ok(())
    }

    pub fn handle_line(&self, line: &str) -> Result<(), RpcError> {
        self.dispatch(Request::decode(line)?)
    }

    /// Answer requests from `reader` on `writer` until end of input.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let reply = match self.handle_line(line) {
                Ok(()) => json!({ "result": null }),
                Err(e) => {
                    warn!("Rejected request: {}", e);
                    json!({ "error": e.to_string() })
                }
            };
            writer.write_all(format!("{}\n", reply).as_bytes()).await?;
            writer.flush().await?;
        }
        info!("Request stream closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rgba;
    use crate::gesture::Direction;
    use crate::image_asset::IconSet;
    use crate::layout::layout_inputs;
    use crate::pane::PlaybackState;
    use crate::scheduler::Command;
    use std::sync::Arc;
    use tokio::io::BufReader;
    use tokio::sync::mpsc;

    #[test]
    fn test_decode_methods() {
        assert_eq!(
            Request::decode(r#"{"method": "enableControl"}"#).unwrap(),
            Request::EnableControl
        );
        assert_eq!(
            Request::decode(r#"{"method": "disableControl", "params": {}}"#).unwrap(),
            Request::DisableControl
        );
        assert_eq!(
            Request::decode(r##"{"method": "displayColor", "params": {"color": "#00FF00"}}"##)
                .unwrap(),
            Request::DisplayColor(ColorRequest {
                color: "#00FF00".to_string(),
                display_time: 0
            })
        );
        assert_eq!(
            Request::decode(
                r#"{"method": "gesture", "params": {"type": "swipe", "towards": "east"}}"#
            )
            .unwrap(),
            Request::Gesture(Gesture::Swipe {
                towards: Direction::East
            })
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(Request::decode("not json"), Err(RpcError::Json(_))));
        assert!(matches!(
            Request::decode(r#"{"method": "reboot"}"#),
            Err(RpcError::UnknownMethod(m)) if m == "reboot"
        ));
        assert!(matches!(
            Request::decode(r#"{"method": "displayIcon", "params": {}}"#),
            Err(RpcError::Params { .. })
        ));
    }

    fn server() -> (
        RpcServer,
        mpsc::UnboundedReceiver<Command>,
        watch::Receiver<MediaState>,
    ) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (waker, _inputs) = layout_inputs();
        let handle = ControllerHandle::new(sender, Arc::new(IconSet::default()), waker);
        let (media, media_rx) = watch::channel(MediaState::default());
        (RpcServer::new(handle, media), receiver, media_rx)
    }

    #[test]
    fn test_media_state_is_published() {
        let (server, _commands, media) = server();
        server
            .handle_line(
                r#"{"method": "mediaState", "params": {"playback": "playing", "volume": 0.2, "muted": false}}"#,
            )
            .unwrap();
        assert_eq!(media.borrow().playback, PlaybackState::Playing);
        assert_eq!(media.borrow().volume, 0.2);
    }

    #[tokio::test]
    async fn test_serve_answers_each_line() {
        let (server, mut commands, _media) = server();
        let input = concat!(
            r##"{"method": "displayColor", "params": {"color": "#0000FF"}}"##,
            "\n\n",
            r##"{"method": "displayColor", "params": {"color": "blue"}}"##,
            "\n",
            r#"{"method": "enableControl"}"#,
            "\n",
        );
        let mut output = Vec::new();
        server
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], json!({ "result": null }));
        assert!(replies[1]["error"].as_str().unwrap().contains("invalid colour"));
        assert_eq!(replies[2], json!({ "result": null }));

        assert!(matches!(commands.try_recv(), Ok(Command::ShowColor(Rgba::BLUE))));
        assert!(matches!(commands.try_recv(), Ok(Command::EnableControl)));
        assert!(commands.try_recv().is_err());
    }
}
