//! In-memory radio and permission providers for driving the core in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use bluedeck_core::{
    AdapterController, Capability, Config, DeviceRecord, DiscoverySession, PermissionError, PermissionGate,
    PermissionProvider, PermissionResult, PlatformProfile, RadioError, RadioProvider, ScanEvent, ScanEvents,
    ViewModel,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RadioCalls {
    pub enable: usize,
    pub disable: usize,
    pub bonded: usize,
    pub start_discovery: usize,
    pub cancel_discovery: usize,
}

struct RadioInner {
    available: bool,
    enabled: bool,
    hang_power: bool,
    bonded: Vec<DeviceRecord>,
    bonded_error: Option<RadioError>,
    scan: Option<mpsc::Sender<ScanEvent>>,
    calls: RadioCalls,
}

pub struct FakeRadio {
    inner: Mutex<RadioInner>,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RadioInner {
                available: true,
                enabled: true,
                hang_power: false,
                bonded: Vec::new(),
                bonded_error: None,
                scan: None,
                calls: RadioCalls::default(),
            }),
        }
    }

    pub fn with_bonded(self, records: Vec<DeviceRecord>) -> Self {
        self.inner.lock().unwrap().bonded = records;
        self
    }

    pub fn powered_off(self) -> Self {
        self.inner.lock().unwrap().enabled = false;
        self
    }

    pub fn unavailable(self) -> Self {
        self.inner.lock().unwrap().available = false;
        self
    }

    /// Power toggles never get acknowledged.
    pub fn hanging_power(self) -> Self {
        self.inner.lock().unwrap().hang_power = true;
        self
    }

    pub fn failing_bonded(self, err: RadioError) -> Self {
        self.inner.lock().unwrap().bonded_error = Some(err);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Flips the radio power behind the controller's back.
    pub fn set_enabled_externally(&self, enabled: bool) {
        self.inner.lock().unwrap().enabled = enabled;
    }

    pub fn is_enabled_now(&self) -> bool {
        self.inner.lock().unwrap().enabled
    }

    pub fn found(&self, record: DeviceRecord) {
        self.emit(ScanEvent::DeviceFound(record));
    }

    pub fn emit(&self, event: ScanEvent) {
        let inner = self.inner.lock().unwrap();
        let tx = inner.scan.as_ref().expect("no scan running");
        tx.try_send(event).expect("scan channel full or closed");
    }

    /// Closes the radio's scan window.
    pub fn end_scan(&self) {
        self.inner.lock().unwrap().scan = None;
    }

    pub fn calls(&self) -> RadioCalls {
        self.inner.lock().unwrap().calls
    }
}

#[async_trait]
impl RadioProvider for FakeRadio {
    async fn is_available(&self) -> Result<bool, RadioError> {
        Ok(self.inner.lock().unwrap().available)
    }

    async fn is_enabled(&self) -> Result<bool, RadioError> {
        Ok(self.inner.lock().unwrap().enabled)
    }

    async fn bonded_devices(&self) -> Result<Vec<DeviceRecord>, RadioError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.bonded += 1;
        match &inner.bonded_error {
            Some(err) => Err(err.clone()),
            None => Ok(inner.bonded.clone()),
        }
    }

    async fn start_discovery(&self) -> Result<ScanEvents, RadioError> {
        let (tx, rx) = mpsc::channel(32);
        let mut inner = self.inner.lock().unwrap();
        inner.calls.start_discovery += 1;
        inner.scan = Some(tx);
        Ok(rx)
    }

    async fn cancel_discovery(&self) -> Result<(), RadioError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.cancel_discovery += 1;
        inner.scan = None;
        Ok(())
    }

    async fn enable(&self) -> Result<(), RadioError> {
        let hang = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.enable += 1;
            if !inner.hang_power {
                inner.enabled = true;
            }
            inner.hang_power
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn disable(&self) -> Result<(), RadioError> {
        let hang = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.disable += 1;
            if !inner.hang_power {
                inner.enabled = false;
            }
            inner.hang_power
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

struct PermissionInner {
    current: BTreeMap<Capability, PermissionResult>,
    answers: BTreeMap<Capability, PermissionResult>,
    requests: Vec<Vec<Capability>>,
    settings_opened: usize,
}

pub struct FakePermissions {
    inner: Mutex<PermissionInner>,
}

impl FakePermissions {
    /// Everything already granted.
    pub fn granted() -> Self {
        Self::with(PermissionResult::Granted, PermissionResult::Granted)
    }

    /// Nothing granted yet; a request grants everything.
    pub fn prompting() -> Self {
        Self::with(PermissionResult::Denied, PermissionResult::Granted)
    }

    /// Nothing granted and the user declines every prompt.
    pub fn declining() -> Self {
        Self::with(PermissionResult::Denied, PermissionResult::Denied)
    }

    fn with(current: PermissionResult, answer: PermissionResult) -> Self {
        let all = [Capability::Scan, Capability::Connect, Capability::Location];
        Self {
            inner: Mutex::new(PermissionInner {
                current: all.iter().map(|&c| (c, current)).collect(),
                answers: all.iter().map(|&c| (c, answer)).collect(),
                requests: Vec::new(),
                settings_opened: 0,
            }),
        }
    }

    pub fn set_current(self, capability: Capability, result: PermissionResult) -> Self {
        self.inner.lock().unwrap().current.insert(capability, result);
        self
    }

    pub fn set_answer(self, capability: Capability, result: PermissionResult) -> Self {
        self.inner.lock().unwrap().answers.insert(capability, result);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn requests(&self) -> Vec<Vec<Capability>> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn settings_opened(&self) -> usize {
        self.inner.lock().unwrap().settings_opened
    }
}

#[async_trait]
impl PermissionProvider for FakePermissions {
    async fn query(&self, capability: Capability) -> Result<PermissionResult, PermissionError> {
        Ok(self.inner.lock().unwrap().current[&capability])
    }

    async fn request_many(
        &self,
        capabilities: &[Capability],
    ) -> Result<BTreeMap<Capability, PermissionResult>, PermissionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(capabilities.to_vec());

        let mut answers = BTreeMap::new();
        for &capability in capabilities {
            let answer = inner.answers[&capability];
            inner.current.insert(capability, answer);
            answers.insert(capability, answer);
        }
        Ok(answers)
    }

    async fn open_system_settings(&self) -> Result<(), PermissionError> {
        self.inner.lock().unwrap().settings_opened += 1;
        Ok(())
    }
}

pub const POWER_TIMEOUT: Duration = Duration::from_millis(50);
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(5);

pub fn record(address: &str, name: &str) -> DeviceRecord {
    DeviceRecord::new(address).named(name)
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.bluetooth.scan_timeout_secs = SCAN_TIMEOUT.as_secs();
    config.platform.api_level = 33;
    config
}

pub fn gate(permissions: &Arc<FakePermissions>, api_level: u32) -> PermissionGate {
    PermissionGate::new(permissions.clone(), PlatformProfile::new(api_level))
}

pub async fn adapter(radio: &Arc<FakeRadio>) -> AdapterController {
    AdapterController::init(radio.clone(), POWER_TIMEOUT).await
}

pub fn session(radio: &Arc<FakeRadio>, scan_timeout: Duration) -> DiscoverySession {
    DiscoverySession::new(radio.clone(), scan_timeout)
}

pub async fn view_model(radio: &Arc<FakeRadio>, permissions: &Arc<FakePermissions>) -> ViewModel {
    let config = config();
    ViewModel::from_parts(
        gate(permissions, config.platform.api_level),
        AdapterController::init(radio.clone(), POWER_TIMEOUT).await,
        DiscoverySession::new(radio.clone(), config.bluetooth.scan_timeout()),
    )
}
