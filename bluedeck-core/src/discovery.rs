/*!
 * Discovery Session
 * Bonded enumeration followed by a bounded radio scan, as an explicit
 * state machine
 */

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;

// Stand-in deadline for scan windows too long to represent
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterController, Power};
use crate::device::{validate_records, BondState, Device, DeviceRecord};
use crate::error::{CoreError, CoreResult};
use crate::permission::{Capability, PermissionState};
use crate::provider::{RadioProvider, ScanEvent, ScanEvents};
use crate::registry::{DeviceRegistry, MergeReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Aborted,
}

impl SessionState {
    pub fn is_busy(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Active | SessionState::Stopping)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The radio closed its own scan window.
    Completed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Idle,
    Scanning { pending: usize },
    Finished { merged: MergeReport, reason: StopReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartReport {
    pub paired: MergeReport,
    /// False when the session was cancelled before the scan sub-step began.
    pub scanning: bool,
}

struct ActiveScan {
    events: ScanEvents,
    deadline: Instant,
    pending: DeviceRegistry,
}

enum Tick {
    Found(DeviceRecord),
    PoweredOff,
    Ended,
    Deadline,
    Cancelled,
}

impl From<ScanEvent> for Tick {
    fn from(event: ScanEvent) -> Self {
        match event {
            ScanEvent::DeviceFound(record) => Tick::Found(record),
            ScanEvent::PoweredOff => Tick::PoweredOff,
        }
    }
}

pub struct DiscoverySession {
    provider: Arc<dyn RadioProvider>,
    state: SessionState,
    scan_timeout: Duration,
    cancel: CancellationToken,
    scan: Option<ActiveScan>,
}

impl DiscoverySession {
    pub fn new(provider: Arc<dyn RadioProvider>, scan_timeout: Duration) -> Self {
        Self {
            provider,
            state: SessionState::Idle,
            scan_timeout,
            cancel: CancellationToken::new(),
            scan: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Devices seen by the running scan but not merged yet.
    pub fn pending(&self) -> usize {
        self.scan.as_ref().map_or(0, |scan| scan.pending.len())
    }

    /// Cooperative stop request for code that cannot borrow the session.
    /// The next `pump`/`run` step (or the gap between the two sub-steps of
    /// `start`) honours it.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn start(
        &mut self,
        adapter: &mut AdapterController,
        permissions: &PermissionState,
        registry: &mut DeviceRegistry,
    ) -> CoreResult<StartReport> {
        if self.state.is_busy() {
            return Err(CoreError::AlreadyInProgress);
        }
        if !permissions.covers(Capability::Scan) {
            return Err(CoreError::PermissionDenied {
                blocked: permissions.is_blocked(),
            });
        }
        if !adapter.is_available() {
            return Err(CoreError::AdapterUnavailable);
        }
        if adapter.state().power != Power::On {
            return Err(CoreError::AdapterOff);
        }

        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.transition(SessionState::Starting);
        adapter.set_scanning(true);

        let bonded = match self.provider.bonded_devices().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Bonded device enumeration failed: {}", e);
                self.settle(adapter);
                return Err(e.into());
            }
        };
        let paired = registry.merge(validate_records(bonded, BondState::Paired));
        tracing::info!("Paired devices merged: {} new, {} updated", paired.added, paired.updated);

        if self.cancel.is_cancelled() {
            tracing::info!("Discovery cancelled before scanning");
            self.transition(SessionState::Stopping);
            self.settle(adapter);
            return Ok(StartReport {
                paired,
                scanning: false,
            });
        }

        let events = match self.provider.start_discovery().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Radio scan failed to start: {}", e);
                self.settle(adapter);
                return Err(e.into());
            }
        };

        self.scan = Some(ActiveScan {
            events,
            deadline: scan_deadline(self.scan_timeout),
            pending: DeviceRegistry::new(),
        });
        self.transition(SessionState::Active);

        Ok(StartReport {
            paired,
            scanning: true,
        })
    }

    /// Drains whatever the radio has reported so far without waiting.
    pub async fn pump(
        &mut self,
        adapter: &mut AdapterController,
        registry: &mut DeviceRegistry,
    ) -> CoreResult<Progress> {
        loop {
            let tick = match self.scan.as_mut() {
                None => return Ok(Progress::Idle),
                Some(scan) => {
                    if self.cancel.is_cancelled() {
                        Tick::Cancelled
                    } else if Instant::now() >= scan.deadline {
                        Tick::Deadline
                    } else {
                        match scan.events.try_recv() {
                            Ok(event) => event.into(),
                            Err(TryRecvError::Empty) => {
                                return Ok(Progress::Scanning {
                                    pending: scan.pending.len(),
                                })
                            }
                            Err(TryRecvError::Disconnected) => Tick::Ended,
                        }
                    }
                }
            };

            if let Some(progress) = self.apply(tick, adapter, registry).await? {
                return Ok(progress);
            }
        }
    }

    /// Waits for the scan sub-step to end.
    pub async fn run(
        &mut self,
        adapter: &mut AdapterController,
        registry: &mut DeviceRegistry,
    ) -> CoreResult<Progress> {
        loop {
            let cancel = self.cancel.clone();
            let tick = match self.scan.as_mut() {
                None => return Ok(Progress::Idle),
                Some(scan) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Tick::Cancelled,
                        _ = tokio::time::sleep_until(scan.deadline) => Tick::Deadline,
                        event = scan.events.recv() => event.map_or(Tick::Ended, Tick::from),
                    }
                }
            };

            if let Some(progress) = self.apply(tick, adapter, registry).await? {
                return Ok(progress);
            }
        }
    }

    pub async fn stop(
        &mut self,
        adapter: &mut AdapterController,
        registry: &mut DeviceRegistry,
    ) -> CoreResult<Progress> {
        match self.state {
            SessionState::Starting | SessionState::Active => {
                self.cancel.cancel();
                Ok(self.finish(StopReason::Cancelled, adapter, registry).await)
            }
            _ => Ok(Progress::Idle),
        }
    }

    /// Cascade from the adapter controller: power went off under us.
    pub async fn power_lost(&mut self, adapter: &mut AdapterController) -> CoreResult<()> {
        match self.state {
            SessionState::Starting | SessionState::Active => Err(self.abort(adapter).await),
            _ => Ok(()),
        }
    }

    async fn apply(
        &mut self,
        tick: Tick,
        adapter: &mut AdapterController,
        registry: &mut DeviceRegistry,
    ) -> CoreResult<Option<Progress>> {
        match tick {
            Tick::Found(record) => {
                if let Some(scan) = self.scan.as_mut() {
                    buffer(&mut scan.pending, record);
                }
                Ok(None)
            }
            Tick::PoweredOff => {
                adapter.note_powered_off();
                Err(self.abort(adapter).await)
            }
            Tick::Ended => Ok(Some(self.finish(StopReason::Completed, adapter, registry).await)),
            Tick::Deadline => Ok(Some(self.finish(StopReason::TimedOut, adapter, registry).await)),
            Tick::Cancelled => Ok(Some(self.finish(StopReason::Cancelled, adapter, registry).await)),
        }
    }

    async fn finish(
        &mut self,
        reason: StopReason,
        adapter: &mut AdapterController,
        registry: &mut DeviceRegistry,
    ) -> Progress {
        self.transition(SessionState::Stopping);

        // Keep results the radio delivered but no driver has pumped yet
        if let Some(scan) = self.scan.as_mut() {
            while let Ok(event) = scan.events.try_recv() {
                if let ScanEvent::DeviceFound(record) = event {
                    buffer(&mut scan.pending, record);
                }
            }
        }

        if let Err(e) = self.provider.cancel_discovery().await {
            tracing::warn!("Radio scan cleanup failed: {}", e);
        }

        let merged = match self.scan.take() {
            Some(mut scan) => registry.merge(scan.pending.drain()),
            None => MergeReport::default(),
        };
        tracing::info!("Discovery finished ({:?}): {} new, {} updated", reason, merged.added, merged.updated);

        self.settle(adapter);
        Progress::Finished { merged, reason }
    }

    async fn abort(&mut self, adapter: &mut AdapterController) -> CoreError {
        if let Some(scan) = self.scan.take() {
            tracing::warn!("Discarding {} unmerged scan results", scan.pending.len());
        }
        if let Err(e) = self.provider.cancel_discovery().await {
            tracing::debug!("Scan cleanup after power-off failed: {}", e);
        }

        adapter.set_scanning(false);
        self.transition(SessionState::Aborted);
        self.cancel = CancellationToken::new();
        CoreError::DiscoveryAborted
    }

    fn settle(&mut self, adapter: &mut AdapterController) {
        self.scan = None;
        adapter.set_scanning(false);
        self.transition(SessionState::Idle);
        self.cancel = CancellationToken::new();
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("Discovery {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn buffer(pending: &mut DeviceRegistry, record: DeviceRecord) {
    match Device::from_record(record, BondState::Discovered) {
        Ok(device) => {
            tracing::debug!("Found device {} ({})", device.display_name(), device.address);
            pending.merge([device]);
        }
        Err(e) => tracing::warn!("Ignoring scan result: {}", e),
    }
}

fn scan_deadline(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| {
        tracing::warn!("Scan timeout of {:?} is out of range, capping it", timeout);
        now + FAR_FUTURE
    })
}
