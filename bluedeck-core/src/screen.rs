/*!
 * Device Manager Screen Model
 * User actions composed from the gate, controller, session and registry;
 * every failure ends up as a notice
 */

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterController, AdapterState, Power};
use crate::config::Config;
use crate::device::Device;
use crate::discovery::{DiscoverySession, Progress, SessionState, StopReason};
use crate::error::{CoreError, ErrorKind};
use crate::permission::{Operation, PermissionGate, PlatformProfile};
use crate::provider::{PermissionProvider, RadioProvider};
use crate::registry::DeviceRegistry;

/// The step a notice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Step {
    Permission,
    Adapter,
    Discovery,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Permission => f.write_str("Permission"),
            Step::Adapter => f.write_str("Adapter"),
            Step::Discovery => f.write_str("Discovery"),
        }
    }
}

/// Follow-up a notice offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeAction {
    EnableBluetooth,
    OpenSettings,
}

impl NoticeAction {
    pub fn label(self) -> &'static str {
        match self {
            NoticeAction::EnableBluetooth => "Turn Bluetooth on and scan",
            NoticeAction::OpenSettings => "Open permission settings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub step: Step,
    pub kind: ErrorKind,
    pub message: String,
    pub action: Option<NoticeAction>,
    pub raised_at: DateTime<Local>,
}

impl Notice {
    fn from_error(step: Step, err: &CoreError) -> Self {
        let kind = err.kind();
        let action = match err {
            CoreError::PermissionDenied { blocked: true } => Some(NoticeAction::OpenSettings),
            CoreError::AdapterOff => Some(NoticeAction::EnableBluetooth),
            _ => None,
        };

        Self {
            step,
            kind,
            message: kind.describe().to_string(),
            action,
            raised_at: Local::now(),
        }
    }

    pub fn title(&self) -> String {
        format!("{} · {}", self.step, self.kind)
    }
}

type StepResult<T> = Result<T, (Step, CoreError)>;

fn at(step: Step) -> impl Fn(CoreError) -> (Step, CoreError) {
    move |err| (step, err)
}

pub struct ViewModel {
    gate: PermissionGate,
    adapter: AdapterController,
    session: DiscoverySession,
    registry: DeviceRegistry,
    notice: Option<Notice>,
    status: String,
}

impl ViewModel {
    pub async fn new(
        radio: Arc<dyn RadioProvider>,
        permissions: Arc<dyn PermissionProvider>,
        config: &Config,
    ) -> Self {
        let gate = PermissionGate::new(permissions, PlatformProfile::new(config.platform.api_level));
        let adapter = AdapterController::init(Arc::clone(&radio), config.bluetooth.power_timeout()).await;
        let session = DiscoverySession::new(radio, config.bluetooth.scan_timeout());
        Self::from_parts(gate, adapter, session)
    }

    pub fn from_parts(gate: PermissionGate, adapter: AdapterController, session: DiscoverySession) -> Self {
        let mut view = Self {
            gate,
            adapter,
            session,
            registry: DeviceRegistry::new(),
            notice: None,
            status: String::new(),
        };
        if !view.adapter.is_available() {
            view.raise(Step::Adapter, CoreError::AdapterUnavailable);
        }
        view
    }

    pub fn devices(&self) -> &[Device] {
        self.registry.devices()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.adapter.state()
    }

    pub fn is_available(&self) -> bool {
        self.adapter.is_available()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn pending(&self) -> usize {
        self.session.pending()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn cancel_handle(&self) -> CancellationToken {
        self.session.cancel_handle()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// "Scan for Devices"
    pub async fn scan_for_devices(&mut self) {
        if let Err((step, err)) = self.try_scan().await {
            self.raise(step, err);
        }
    }

    /// "Turn Bluetooth On/Off"
    pub async fn toggle_bluetooth(&mut self) {
        let target = self.adapter.state().power.toggled();
        if let Err((step, err)) = self.try_set_power(target).await {
            self.raise(step, err);
        }
    }

    pub async fn stop_scan(&mut self) {
        match self.session.stop(&mut self.adapter, &mut self.registry).await {
            Ok(progress) => self.record(progress),
            Err(err) => self.raise(Step::Discovery, err),
        }
    }

    /// Re-reads radio power; a radio found off mid-scan aborts the scan.
    pub async fn refresh_power(&mut self) {
        if let Err((step, err)) = self.try_refresh().await {
            self.raise(step, err);
        }
    }

    /// Runs the follow-up offered by the current notice, if any.
    pub async fn run_notice_action(&mut self) {
        let Some(action) = self.notice.as_ref().and_then(|n| n.action) else {
            return;
        };
        self.notice = None;

        match action {
            NoticeAction::EnableBluetooth => match self.try_set_power(Power::On).await {
                Ok(()) => self.scan_for_devices().await,
                Err((step, err)) => self.raise(step, err),
            },
            NoticeAction::OpenSettings => {
                if let Err(err) = self.gate.open_settings().await {
                    self.raise(Step::Permission, err);
                }
            }
        }
    }

    /// Non-blocking advance of a running scan, for a UI tick loop.
    pub async fn tick(&mut self) {
        if self.session.state() != SessionState::Active {
            return;
        }
        match self.session.pump(&mut self.adapter, &mut self.registry).await {
            Ok(progress) => self.record(progress),
            Err(err) => self.raise(Step::Discovery, err),
        }
    }

    /// Waits for a running scan to end, for headless use.
    pub async fn finish_scan(&mut self) {
        if self.session.state() != SessionState::Active {
            return;
        }
        match self.session.run(&mut self.adapter, &mut self.registry).await {
            Ok(progress) => self.record(progress),
            Err(err) => self.raise(Step::Discovery, err),
        }
    }

    async fn try_scan(&mut self) -> StepResult<()> {
        if self.session.state().is_busy() {
            return Err((Step::Discovery, CoreError::AlreadyInProgress));
        }

        let permissions = self
            .gate
            .check_operation(Operation::Discover)
            .await
            .map_err(at(Step::Permission))?;
        if !permissions.granted() {
            return Err((
                Step::Permission,
                CoreError::PermissionDenied {
                    blocked: permissions.is_blocked(),
                },
            ));
        }

        let state = self.adapter.get_power().await.map_err(at(Step::Adapter))?;
        if state.power == Power::Off {
            return Err((Step::Adapter, CoreError::AdapterOff));
        }

        self.registry.reset();
        let report = self
            .session
            .start(&mut self.adapter, &permissions, &mut self.registry)
            .await
            .map_err(at(Step::Discovery))?;

        self.status = if report.scanning {
            format!("Scanning... {} paired", self.registry.paired_count())
        } else {
            format!("Scan cancelled, {} paired", self.registry.paired_count())
        };
        Ok(())
    }

    async fn try_set_power(&mut self, target: Power) -> StepResult<()> {
        let permissions = self
            .gate
            .check_operation(Operation::TogglePower)
            .await
            .map_err(at(Step::Permission))?;
        if !permissions.granted() {
            return Err((
                Step::Permission,
                CoreError::PermissionDenied {
                    blocked: permissions.is_blocked(),
                },
            ));
        }

        let state = self
            .adapter
            .set_power(target == Power::On, &permissions)
            .await
            .map_err(at(Step::Adapter))?;
        self.status = format!("Bluetooth {}", state.power);

        if state.power == Power::Off {
            self.session
                .power_lost(&mut self.adapter)
                .await
                .map_err(at(Step::Discovery))?;
        }
        Ok(())
    }

    async fn try_refresh(&mut self) -> StepResult<()> {
        let state = self.adapter.get_power().await.map_err(at(Step::Adapter))?;
        self.status = format!("Bluetooth {}", state.power);
        if state.power == Power::Off {
            self.session
                .power_lost(&mut self.adapter)
                .await
                .map_err(at(Step::Discovery))?;
        }
        Ok(())
    }

    fn record(&mut self, progress: Progress) {
        match progress {
            Progress::Idle => {}
            Progress::Scanning { pending } => {
                self.status = format!("Scanning... {} found", pending);
            }
            Progress::Finished { merged, reason } => {
                let verb = match reason {
                    StopReason::Completed | StopReason::TimedOut => "Scan finished",
                    StopReason::Cancelled => "Scan stopped",
                };
                self.status = format!(
                    "{}: {} devices ({} new)",
                    verb,
                    self.registry.len(),
                    merged.added
                );
            }
        }
    }

    fn raise(&mut self, step: Step, err: CoreError) {
        if err.kind() == ErrorKind::AlreadyInProgress {
            tracing::debug!("Ignoring duplicate request: {}", err);
            return;
        }
        tracing::warn!("{} step failed: {}", step, err);
        self.notice = Some(Notice::from_error(step, &err));
    }
}
