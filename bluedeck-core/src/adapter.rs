/*!
 * Adapter Controller
 * Owns the radio power state for the whole process
 */

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{CoreError, CoreResult, RadioError};
use crate::permission::{Capability, PermissionState};
use crate::provider::RadioProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Power {
    Off,
    On,
}

impl Power {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Power::On
        } else {
            Power::Off
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Power::On => Power::Off,
            Power::Off => Power::On,
        }
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Power::On => f.write_str("On"),
            Power::Off => f.write_str("Off"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdapterState {
    pub power: Power,
    pub scanning: bool,
}

impl AdapterState {
    fn off() -> Self {
        Self {
            power: Power::Off,
            scanning: false,
        }
    }
}

pub struct AdapterController {
    provider: Arc<dyn RadioProvider>,
    available: bool,
    state: AdapterState,
    power_timeout: Duration,
}

impl AdapterController {
    /// Probes the hardware once. Availability is cached for the lifetime of
    /// the controller.
    pub async fn init(provider: Arc<dyn RadioProvider>, power_timeout: Duration) -> Self {
        let available = match provider.is_available().await {
            Ok(available) => available,
            Err(e) => {
                tracing::warn!("Bluetooth availability probe failed: {}", e);
                false
            }
        };

        let mut state = AdapterState::off();
        if available {
            match provider.is_enabled().await {
                Ok(enabled) => state.power = Power::from_enabled(enabled),
                Err(e) => tracing::warn!("Could not read adapter power: {}", e),
            }
        } else {
            tracing::warn!("No Bluetooth adapter available");
        }

        tracing::info!("Adapter ready: available={}, power={}", available, state.power);

        Self {
            provider,
            available,
            state,
            power_timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Re-reads the radio power so external switches are picked up.
    pub async fn get_power(&mut self) -> CoreResult<AdapterState> {
        self.ensure_available()?;

        let enabled = self.acknowledged(self.provider.is_enabled()).await?;
        let power = Power::from_enabled(enabled);
        if power != self.state.power {
            tracing::info!("Adapter power changed externally: {} -> {}", self.state.power, power);
        }
        self.apply_power(power);

        Ok(self.state)
    }

    pub async fn set_power(&mut self, on: bool, permissions: &PermissionState) -> CoreResult<AdapterState> {
        self.ensure_available()?;
        if !permissions.covers(Capability::Connect) {
            return Err(CoreError::PermissionDenied {
                blocked: permissions.is_blocked(),
            });
        }

        let target = Power::from_enabled(on);
        if self.state.power == target {
            tracing::debug!("Adapter already {}", target);
            return Ok(self.state);
        }

        tracing::info!("Turning Bluetooth {}", target);
        match target {
            Power::On => self.acknowledged(self.provider.enable()).await?,
            Power::Off => self.acknowledged(self.provider.disable()).await?,
        }
        self.apply_power(target);

        Ok(self.state)
    }

    /// Called when the radio itself reports that it went down.
    pub(crate) fn note_powered_off(&mut self) {
        self.apply_power(Power::Off);
    }

    pub(crate) fn set_scanning(&mut self, scanning: bool) {
        self.state.scanning = scanning && self.state.power == Power::On;
    }

    fn apply_power(&mut self, power: Power) {
        self.state.power = power;
        if power == Power::Off {
            self.state.scanning = false;
        }
    }

    fn ensure_available(&self) -> CoreResult<()> {
        if self.available {
            Ok(())
        } else {
            Err(CoreError::AdapterUnavailable)
        }
    }

    async fn acknowledged<T, F>(&self, call: F) -> CoreResult<T>
    where
        F: std::future::Future<Output = Result<T, RadioError>>,
    {
        match timeout(self.power_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!("Radio did not acknowledge within {:?}", self.power_timeout);
                Err(CoreError::OperationTimedOut)
            }
        }
    }
}
