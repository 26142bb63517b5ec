//! # Device Directory
//!
//! Panes that control real devices (heater, fan, lights, media players) need the
//! current list of remote device handles for their thing type. The bus that
//! discovers those devices is an external collaborator, hidden behind
//! [`DeviceSource`]; this module owns how its answers reach the panes.
//!
//! ## Ownership Model
//! - One [`DeviceDirectory`] is built at the composition root and shared by `Arc`
//! - [`DeviceDirectory::subscribe`] registers a `(thing type, protocol)` query and
//!   returns a [`DeviceWatch`]
//! - [`DeviceDirectory::refresh`] re-runs every live query; each answer replaces the
//!   subscriber's list wholesale through a `tokio::sync::watch` channel
//! - A subscription whose last [`DeviceWatch`] was dropped is pruned on the next
//!   subscribe or refresh, so a torn-down layout stops costing bus queries
//!
//! Lists are immutable `Arc<[_]>` snapshots. Readers never lock elements, and a
//! dispatch that started on an old snapshot simply finishes against it.
//!
//! ## Dispatch
//! [`dispatch`] fires a command at every device in a snapshot without waiting.
//! Failures are logged and never reach the pane or the render loop.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Failures reported by the device bus or an individual device.
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    /// The device rejected or failed the command
    #[error("device {device} failed '{method}': {reason}")]
    Call {
        device: String,
        method: String,
        reason: String,
    },

    /// The directory query itself failed
    #[error("device lookup failed: {0}")]
    Lookup(String),
}

/// A callable remote device channel.
#[async_trait]
pub trait DeviceHandle: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Invoke `method` on the device with JSON `params`.
    async fn call(&self, method: &str, params: Value) -> Result<(), DeviceError>;
}

/// Immutable snapshot of the devices matching one query.
pub type DeviceList = Arc<[Arc<dyn DeviceHandle>]>;

/// The external discovery service.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn fetch_by_type(
        &self,
        thing_type: &str,
        protocol: &str,
    ) -> Result<Vec<Arc<dyn DeviceHandle>>, DeviceError>;
}

struct Subscription {
    thing_type: String,
    protocol: String,
    sender: Arc<watch::Sender<DeviceList>>,
}

/// Registry of device-list subscriptions backed by a [`DeviceSource`].
pub struct DeviceDirectory {
    source: Arc<dyn DeviceSource>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl DeviceDirectory {
    pub fn new(source: Arc<dyn DeviceSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Register a query and return its live device list.
    ///
    /// The list starts empty. When called inside a tokio runtime the first fetch
    /// is spawned immediately; otherwise it waits for the next [`refresh`](Self::refresh).
    pub fn subscribe(self: &Arc<Self>, thing_type: &str, protocol: &str) -> DeviceWatch {
        let (sender, receiver) = watch::channel(empty_list());
        let sender = Arc::new(sender);

        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|s| !s.sender.is_closed());
        subscriptions.push(Subscription {
            thing_type: thing_type.to_string(),
            protocol: protocol.to_string(),
            sender: Arc::clone(&sender),
        });
        drop(subscriptions);

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let directory = Arc::clone(self);
            let (thing_type, protocol) = (thing_type.to_string(), protocol.to_string());
            runtime.spawn(async move {
                directory.update(&thing_type, &protocol, &sender).await;
            });
        }

        DeviceWatch { receiver }
    }

    /// Re-run every live query. Call this when the bus reports membership changes.
    pub async fn refresh(&self) {
        let live: Vec<_> = {
            let mut subscriptions = self.subscriptions.lock();
            subscriptions.retain(|s| !s.sender.is_closed());
            subscriptions
                .iter()
                .map(|s| (s.thing_type.clone(), s.protocol.clone(), Arc::clone(&s.sender)))
                .collect()
        };

        debug!("Refreshing {} device subscriptions", live.len());
        for (thing_type, protocol, sender) in live {
            self.update(&thing_type, &protocol, &sender).await;
        }
    }

    /// Number of subscriptions that still have a listener.
    pub fn live_subscriptions(&self) -> usize {
        self.subscriptions
            .lock()
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }

    #[cfg(test)]
    pub(crate) fn stored_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    async fn update(&self, thing_type: &str, protocol: &str, sender: &watch::Sender<DeviceList>) {
        match self.source.fetch_by_type(thing_type, protocol).await {
            Ok(devices) => {
                info!(
                    "Pane got {} {} devices for {}",
                    devices.len(),
                    protocol,
                    thing_type
                );
                sender.send_replace(devices.into());
            }
            Err(e) => warn!("Failed to update {} devices: {}", thing_type, e),
        }
    }
}

/// Receiving side of one device-list subscription.
#[derive(Clone, Debug)]
pub struct DeviceWatch {
    receiver: watch::Receiver<DeviceList>,
}

impl DeviceWatch {
    /// A watch over a list that never changes. Handy for tests and fixed setups.
    pub fn fixed(devices: Vec<Arc<dyn DeviceHandle>>) -> Self {
        let (_sender, receiver) = watch::channel(devices.into());
        Self { receiver }
    }

    /// Current list; cheap to clone and safe to hold across a swap.
    pub fn snapshot(&self) -> DeviceList {
        self.receiver.borrow().clone()
    }
}

fn empty_list() -> DeviceList {
    Arc::from(Vec::<Arc<dyn DeviceHandle>>::new())
}

/// Fire `method` at every device in `devices` without waiting for replies.
///
/// Needs a tokio runtime; outside one the command is dropped with a warning.
pub fn dispatch(devices: &DeviceList, method: &str, params: Value) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("No runtime available, dropping '{}' for {} devices", method, devices.len());
        return;
    };

    for device in devices.iter() {
        let device = Arc::clone(device);
        let method = method.to_string();
        let params = params.clone();
        runtime.spawn(async move {
            if let Err(e) = device.call(&method, params).await {
                warn!("Device call failed: {}", e);
            }
        });
    }
}

/// One configured device: which thing type it is and which protocols it answers.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DeviceEntry {
    pub id: String,
    pub thing_type: String,
    #[serde(default)]
    pub protocols: Vec<String>,
}

/// Device that records calls in the log instead of sending them anywhere.
#[derive(Debug)]
pub struct LoggedDevice {
    id: String,
}

impl LoggedDevice {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl DeviceHandle for LoggedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, method: &str, params: Value) -> Result<(), DeviceError> {
        info!("Device {} <- {} {}", self.id, method, params);
        Ok(())
    }
}

/// [`DeviceSource`] answering from a fixed list of configured devices.
pub struct StaticDeviceSource {
    entries: Vec<DeviceEntry>,
}

impl StaticDeviceSource {
    pub fn new(entries: Vec<DeviceEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl DeviceSource for StaticDeviceSource {
    async fn fetch_by_type(
        &self,
        thing_type: &str,
        protocol: &str,
    ) -> Result<Vec<Arc<dyn DeviceHandle>>, DeviceError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.thing_type == thing_type && e.protocols.iter().any(|p| p == protocol))
            .map(|e| Arc::new(LoggedDevice::new(format!("{}/{}", e.id, protocol))) as Arc<dyn DeviceHandle>)
            .collect())
    }
}
