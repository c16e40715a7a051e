/*!
 * Permission Gate
 * Resolves, checks and requests the capabilities a radio operation needs
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::CoreResult;
use crate::provider::{PermissionProvider, PermissionResult};

/// First platform level with dedicated Scan/Connect permissions.
pub const MODERN_API_LEVEL: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Scan,
    Connect,
    Location,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Scan => f.write_str("Scan"),
            Capability::Connect => f.write_str("Connect"),
            Capability::Location => f.write_str("Location"),
        }
    }
}

/// User operations that need a gate check first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Discover,
    TogglePower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProfile {
    pub api_level: u32,
}

impl PlatformProfile {
    pub fn new(api_level: u32) -> Self {
        Self { api_level }
    }

    pub fn is_modern(&self) -> bool {
        self.api_level >= MODERN_API_LEVEL
    }

    pub fn required_for(&self, operation: Operation) -> BTreeSet<Capability> {
        match operation {
            Operation::Discover => {
                BTreeSet::from([Capability::Scan, Capability::Connect, Capability::Location])
            }
            Operation::TogglePower => BTreeSet::from([Capability::Connect]),
        }
    }

    /// Maps the logical capability set onto what this platform actually
    /// prompts for.
    pub fn resolve(&self, requested: &BTreeSet<Capability>) -> BTreeSet<Capability> {
        let radio = requested.contains(&Capability::Scan) || requested.contains(&Capability::Connect);
        let mut resolved = requested.clone();

        if self.is_modern() {
            if radio {
                resolved.remove(&Capability::Location);
            }
        } else if radio {
            resolved.remove(&Capability::Scan);
            resolved.remove(&Capability::Connect);
            resolved.insert(Capability::Location);
        }

        resolved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deniability {
    CanAskAgain,
    PermanentlyBlocked,
}

/// Outcome of one gate check. Only the gate constructs these, so holding
/// a granted state proves the check happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionState {
    granted: bool,
    deniability: Option<Deniability>,
    requested: BTreeSet<Capability>,
    missing: BTreeSet<Capability>,
}

impl PermissionState {
    pub fn granted(&self) -> bool {
        self.granted
    }

    pub fn deniability(&self) -> Option<Deniability> {
        self.deniability
    }

    pub fn is_blocked(&self) -> bool {
        self.deniability == Some(Deniability::PermanentlyBlocked)
    }

    pub fn missing(&self) -> &BTreeSet<Capability> {
        &self.missing
    }

    /// True when the check was granted and included `capability`.
    pub fn covers(&self, capability: Capability) -> bool {
        self.granted && self.requested.contains(&capability)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(granted: bool, requested: &[Capability]) -> Self {
        Self {
            granted,
            deniability: (!granted).then_some(Deniability::CanAskAgain),
            requested: requested.iter().copied().collect(),
            missing: BTreeSet::new(),
        }
    }
}

pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
    profile: PlatformProfile,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn PermissionProvider>, profile: PlatformProfile) -> Self {
        Self { provider, profile }
    }

    pub fn required_for(&self, operation: Operation) -> BTreeSet<Capability> {
        self.profile.required_for(operation)
    }

    pub async fn check_operation(&self, operation: Operation) -> CoreResult<PermissionState> {
        self.check_and_request(&self.required_for(operation)).await
    }

    pub async fn check_and_request(&self, required: &BTreeSet<Capability>) -> CoreResult<PermissionState> {
        let platform_caps = self.profile.resolve(required);

        let mut pending = Vec::new();
        let mut blocked = BTreeSet::new();
        for &capability in &platform_caps {
            match self.provider.query(capability).await? {
                PermissionResult::Granted => {}
                PermissionResult::Denied => pending.push(capability),
                PermissionResult::Blocked => {
                    blocked.insert(capability);
                }
            }
        }

        let mut missing: BTreeSet<Capability> = blocked.clone();
        if !pending.is_empty() {
            tracing::info!("Requesting permissions: {:?}", pending);
            let answers = self.provider.request_many(&pending).await?;
            for capability in pending {
                match answers.get(&capability).copied().unwrap_or(PermissionResult::Denied) {
                    PermissionResult::Granted => {}
                    PermissionResult::Denied => {
                        missing.insert(capability);
                    }
                    PermissionResult::Blocked => {
                        blocked.insert(capability);
                        missing.insert(capability);
                    }
                }
            }
        }

        let granted = missing.is_empty();
        let deniability = match (granted, blocked.is_empty()) {
            (true, _) => None,
            (false, true) => Some(Deniability::CanAskAgain),
            (false, false) => Some(Deniability::PermanentlyBlocked),
        };

        if granted {
            tracing::debug!("Permissions granted: {:?}", platform_caps);
        } else {
            tracing::warn!("Permissions missing: {:?} (blocked: {:?})", missing, blocked);
        }

        Ok(PermissionState {
            granted,
            deniability,
            requested: required.clone(),
            missing,
        })
    }

    pub async fn open_settings(&self) -> CoreResult<()> {
        self.provider.open_system_settings().await?;
        Ok(())
    }
}
