/*!
 * BlueZ Radio
 * Radio capability provider over the BlueZ D-Bus API
 */

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dbus::arg::{prop_cast, PropMap};
use dbus::message::MatchRule;
use dbus::nonblock::stdintf::org_freedesktop_dbus::{ObjectManager, Properties};
use dbus::nonblock::{MsgMatch, Proxy, SyncConnection};
use dbus::channel::Token;
use dbus::{Message, Path};
use futures_util::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::BluetoothConfig;
use crate::device::{BondState, DeviceRecord};
use crate::error::RadioError;
use crate::provider::{RadioProvider, ScanEvent, ScanEvents};

const BLUEZ_SERVICE: &str = "org.bluez";
const ADAPTER_IFACE: &str = "org.bluez.Adapter1";
const DEVICE_IFACE: &str = "org.bluez.Device1";
const OBJECT_MANAGER_IFACE: &str = "org.freedesktop.DBus.ObjectManager";
const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

type ManagedObjects = HashMap<Path<'static>, HashMap<String, PropMap>>;

pub struct BluezRadio {
    conn: Arc<SyncConnection>,
    adapter_path: Path<'static>,
    event_buffer: usize,
    // Stops the signal forwarder of the scan we started, if any
    discovery: Mutex<Option<CancellationToken>>,
}

impl BluezRadio {
    pub async fn connect(config: &BluetoothConfig) -> Result<Self> {
        let (resource, conn) = dbus_tokio::connection::new_system_sync()?;
        tokio::spawn(async move {
            let err = resource.await;
            tracing::error!("Lost connection to D-Bus: {}", err);
        });

        let adapter_path = Path::new(format!("/org/bluez/{}", config.adapter)).map_err(|e| anyhow!(e))?;
        tracing::info!("Using BlueZ adapter {}", adapter_path);

        Ok(Self {
            conn,
            adapter_path,
            event_buffer: config.scan_event_buffer.max(1),
            discovery: Mutex::new(None),
        })
    }

    fn adapter(&self) -> Proxy<'static, Arc<SyncConnection>> {
        Proxy::new(BLUEZ_SERVICE, self.adapter_path.clone(), CALL_TIMEOUT, self.conn.clone())
    }

    async fn managed_objects(&self) -> Result<ManagedObjects, RadioError> {
        let root = Proxy::new(BLUEZ_SERVICE, "/", CALL_TIMEOUT, self.conn.clone());
        root.get_managed_objects().await.map_err(radio_error)
    }

    async fn remove_matches(&self, matches: Vec<MsgMatch>) {
        for m in matches {
            if let Err(e) = self.conn.remove_match(m.token()).await {
                tracing::debug!("Failed to remove signal match: {}", e);
            }
        }
    }
}

#[async_trait]
impl RadioProvider for BluezRadio {
    async fn is_available(&self) -> Result<bool, RadioError> {
        match self.managed_objects().await {
            Ok(objects) => Ok(objects
                .get(&self.adapter_path)
                .map_or(false, |ifaces| ifaces.contains_key(ADAPTER_IFACE))),
            Err(RadioError::HardwareUnavailable) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn is_enabled(&self) -> Result<bool, RadioError> {
        self.adapter().get::<bool>(ADAPTER_IFACE, "Powered").await.map_err(radio_error)
    }

    async fn bonded_devices(&self) -> Result<Vec<DeviceRecord>, RadioError> {
        let objects = self.managed_objects().await?;
        let prefix = format!("{}/", self.adapter_path);

        let devices = objects
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(_, ifaces)| ifaces.get(DEVICE_IFACE))
            .filter(|props| prop_cast::<bool>(props, "Paired").copied().unwrap_or(false))
            .filter_map(record_from_props)
            .collect();

        Ok(devices)
    }

    async fn start_discovery(&self) -> Result<ScanEvents, RadioError> {
        let mut slot = self.discovery.lock().await;
        if let Some(previous) = slot.take() {
            previous.cancel();
        }

        let added_rule = MatchRule::new_signal(OBJECT_MANAGER_IFACE, "InterfacesAdded");
        let changed_rule = MatchRule::new_signal(PROPERTIES_IFACE, "PropertiesChanged");
        let (added_match, added) = self.conn.add_match(added_rule).await.map_err(radio_error)?.msg_stream();
        let (changed_match, changed) = match self.conn.add_match(changed_rule).await {
            Ok(m) => m.msg_stream(),
            Err(e) => {
                self.remove_matches(vec![added_match]).await;
                return Err(radio_error(e));
            }
        };

        let started: Result<(), dbus::Error> = self.adapter().method_call(ADAPTER_IFACE, "StartDiscovery", ()).await;
        if let Err(e) = started {
            tracing::error!("StartDiscovery failed: {}", e);
            self.remove_matches(vec![added_match, changed_match]).await;
            return Err(radio_error(e));
        }
        tracing::info!("BlueZ discovery started");

        let (tx, rx) = mpsc::channel(self.event_buffer);
        let cancel = CancellationToken::new();
        *slot = Some(cancel.clone());

        let forwarder = SignalForwarder {
            conn: self.conn.clone(),
            adapter_path: self.adapter_path.to_string(),
            tx,
            cancel,
        };
        tokio::spawn(forwarder.run(added, changed, vec![added_match.token(), changed_match.token()]));

        Ok(rx)
    }

    async fn cancel_discovery(&self) -> Result<(), RadioError> {
        let Some(cancel) = self.discovery.lock().await.take() else {
            return Ok(());
        };
        cancel.cancel();

        let stopped: Result<(), dbus::Error> = self.adapter().method_call(ADAPTER_IFACE, "StopDiscovery", ()).await;
        match stopped {
            Ok(()) => {
                tracing::info!("BlueZ discovery stopped");
                Ok(())
            }
            // Already stopped, or the adapter went down with it
            Err(e) if matches!(e.name(), Some("org.bluez.Error.Failed") | Some("org.bluez.Error.NotReady")) => {
                tracing::debug!("StopDiscovery: {}", e);
                Ok(())
            }
            Err(e) => Err(radio_error(e)),
        }
    }

    async fn enable(&self) -> Result<(), RadioError> {
        self.adapter().set(ADAPTER_IFACE, "Powered", true).await.map_err(radio_error)
    }

    async fn disable(&self) -> Result<(), RadioError> {
        self.adapter().set(ADAPTER_IFACE, "Powered", false).await.map_err(radio_error)
    }
}

/// Turns BlueZ signals into scan events until cancelled or the session
/// drops its receiver.
struct SignalForwarder {
    conn: Arc<SyncConnection>,
    adapter_path: String,
    tx: mpsc::Sender<ScanEvent>,
    cancel: CancellationToken,
}

impl SignalForwarder {
    async fn run<A, C>(self, mut added: A, mut changed: C, matches: Vec<Token>)
    where
        A: Stream<Item = Message> + Unpin + Send + 'static,
        C: Stream<Item = Message> + Unpin + Send + 'static,
    {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.tx.closed() => break,
                Some(msg) = added.next() => self.interfaces_added(&msg),
                Some(msg) = changed.next() => self.properties_changed(msg).await,
                else => break,
            };

            if let Some(event) = event {
                let powered_off = event == ScanEvent::PoweredOff;
                if self.tx.send(event).await.is_err() || powered_off {
                    break;
                }
            }
        }

        for token in matches {
            if let Err(e) = self.conn.remove_match(token).await {
                tracing::debug!("Failed to remove signal match: {}", e);
            }
        }
        tracing::debug!("Scan signal forwarding stopped");
    }

    fn owns(&self, path: &str) -> bool {
        path.strip_prefix(self.adapter_path.as_str())
            .map_or(false, |rest| rest.starts_with('/'))
    }

    fn interfaces_added(&self, msg: &Message) -> Option<ScanEvent> {
        let (path, ifaces): (Path, HashMap<String, PropMap>) = msg.read2().ok()?;
        if !self.owns(&path) {
            return None;
        }
        let props = ifaces.get(DEVICE_IFACE)?;
        record_from_props(props).map(ScanEvent::DeviceFound)
    }

    async fn properties_changed(&self, msg: Message) -> Option<ScanEvent> {
        let path = match self.classify_change(&msg)? {
            Change::PoweredOff => return Some(ScanEvent::PoweredOff),
            Change::DeviceSeen(path) => path,
        };
        drop(msg);

        let device = Proxy::new(BLUEZ_SERVICE, path, CALL_TIMEOUT, self.conn.clone());
        match device.get_all(DEVICE_IFACE).await {
            Ok(props) => record_from_props(&props).map(ScanEvent::DeviceFound),
            Err(e) => {
                tracing::debug!("Could not read device properties: {}", e);
                None
            }
        }
    }

    fn classify_change(&self, msg: &Message) -> Option<Change> {
        let path = msg.path()?.to_string();
        let (iface, changed): (String, PropMap) = msg.read2().ok()?;

        if iface == ADAPTER_IFACE && path == self.adapter_path {
            let powered = prop_cast::<bool>(&changed, "Powered").copied();
            return (powered == Some(false)).then_some(Change::PoweredOff);
        }

        // RSSI updates mean a cached device was seen again in range
        let seen = iface == DEVICE_IFACE && self.owns(&path) && changed.contains_key("RSSI");
        seen.then_some(Change::DeviceSeen(path))
    }
}

enum Change {
    PoweredOff,
    DeviceSeen(String),
}

fn record_from_props(props: &PropMap) -> Option<DeviceRecord> {
    let address = prop_cast::<String>(props, "Address")?.clone();
    let name = prop_cast::<String>(props, "Name")
        .or_else(|| prop_cast::<String>(props, "Alias").filter(|alias| !is_mac_like_name(alias)))
        .cloned();
    let bond_state = prop_cast::<bool>(props, "Paired").map(|&paired| {
        if paired {
            BondState::Paired
        } else {
            BondState::Discovered
        }
    });

    Some(DeviceRecord {
        address,
        name,
        bond_state,
    })
}

/// BlueZ falls back to the address (with dashes) when a device has no name.
fn is_mac_like_name(name: &str) -> bool {
    name.len() == 17
        && name
            .chars()
            .nth(2)
            .map(|c| c == '-' || c == ':')
            .unwrap_or(false)
}

fn radio_error(err: dbus::Error) -> RadioError {
    match err.name() {
        Some("org.freedesktop.DBus.Error.ServiceUnknown")
        | Some("org.freedesktop.DBus.Error.UnknownObject")
        | Some("org.freedesktop.DBus.Error.NameHasNoOwner") => RadioError::HardwareUnavailable,
        Some("org.freedesktop.DBus.Error.NoReply")
        | Some("org.freedesktop.DBus.Error.Timeout")
        | Some("org.freedesktop.DBus.Error.TimedOut") => RadioError::OperationTimedOut,
        Some("org.freedesktop.DBus.Error.AccessDenied")
        | Some("org.bluez.Error.NotAuthorized")
        | Some("org.bluez.Error.NotPermitted") => RadioError::PermissionDenied,
        _ => RadioError::Backend(err.to_string()),
    }
}
