/*!
 * BlueDeck Core
 * Device discovery and adapter state for the BlueDeck device manager
 * Onyx Digital Intelligence Development LLC
 */

pub mod adapter;
pub mod bluez;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod permission;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod screen;

pub use adapter::{AdapterController, AdapterState, Power};
pub use config::Config;
pub use device::{Address, BondState, Device, DeviceRecord};
pub use discovery::{DiscoverySession, Progress, SessionState, StopReason};
pub use error::{CoreError, ErrorKind, PermissionError, RadioError};
pub use permission::{Capability, Deniability, Operation, PermissionGate, PermissionState, PlatformProfile};
pub use provider::{PermissionProvider, PermissionResult, RadioProvider, ScanEvent, ScanEvents};
pub use registry::DeviceRegistry;
pub use screen::{Notice, NoticeAction, Step, ViewModel};
