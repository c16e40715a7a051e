/*!
 * Collaborator Contracts
 * What the core needs from the radio driver and the host permission system
 */

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::device::DeviceRecord;
use crate::error::{PermissionError, RadioError};
use crate::permission::Capability;

/// Something the radio reports while a scan is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    DeviceFound(DeviceRecord),
    PoweredOff,
}

/// Incremental scan results. The stream ends when the radio's own scan
/// window closes; the sender side is dropped at that point.
pub type ScanEvents = mpsc::Receiver<ScanEvent>;

#[async_trait]
pub trait RadioProvider: Send + Sync {
    async fn is_available(&self) -> Result<bool, RadioError>;

    async fn is_enabled(&self) -> Result<bool, RadioError>;

    async fn bonded_devices(&self) -> Result<Vec<DeviceRecord>, RadioError>;

    async fn start_discovery(&self) -> Result<ScanEvents, RadioError>;

    async fn cancel_discovery(&self) -> Result<(), RadioError>;

    async fn enable(&self) -> Result<(), RadioError>;

    async fn disable(&self) -> Result<(), RadioError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionResult {
    Granted,
    Denied,
    Blocked,
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn query(&self, capability: Capability) -> Result<PermissionResult, PermissionError>;

    /// One consolidated prompt for every capability in `capabilities`.
    async fn request_many(
        &self,
        capabilities: &[Capability],
    ) -> Result<BTreeMap<Capability, PermissionResult>, PermissionError>;

    async fn open_system_settings(&self) -> Result<(), PermissionError>;
}
