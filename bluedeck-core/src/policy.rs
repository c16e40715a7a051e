/*!
 * Policy Permissions
 * Desktop hosts have no runtime permission prompts; grants come from the
 * config file instead
 */

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::config::{PermissionsConfig, Policy};
use crate::error::PermissionError;
use crate::permission::Capability;
use crate::provider::{PermissionProvider, PermissionResult};

pub struct PolicyPermissions {
    config: PermissionsConfig,
    config_path: PathBuf,
    // `ask` capabilities granted by a request in this process
    session_grants: Mutex<BTreeSet<Capability>>,
}

impl PolicyPermissions {
    pub fn new(config: PermissionsConfig, config_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            config_path: config_path.into(),
            session_grants: Mutex::new(BTreeSet::new()),
        }
    }
}

#[async_trait]
impl PermissionProvider for PolicyPermissions {
    async fn query(&self, capability: Capability) -> Result<PermissionResult, PermissionError> {
        let granted_here = self.session_grants.lock().await.contains(&capability);
        let result = match self.config.policy(capability) {
            Policy::Allow => PermissionResult::Granted,
            Policy::Ask if granted_here => PermissionResult::Granted,
            Policy::Ask | Policy::Deny => PermissionResult::Denied,
            Policy::Block => PermissionResult::Blocked,
        };
        Ok(result)
    }

    async fn request_many(
        &self,
        capabilities: &[Capability],
    ) -> Result<BTreeMap<Capability, PermissionResult>, PermissionError> {
        let mut grants = self.session_grants.lock().await;
        let mut answers = BTreeMap::new();

        for &capability in capabilities {
            let result = match self.config.policy(capability) {
                Policy::Allow => PermissionResult::Granted,
                Policy::Ask => {
                    grants.insert(capability);
                    tracing::info!("{} permission granted for this session", capability);
                    PermissionResult::Granted
                }
                Policy::Deny => PermissionResult::Denied,
                Policy::Block => PermissionResult::Blocked,
            };
            answers.insert(capability, result);
        }

        Ok(answers)
    }

    async fn open_system_settings(&self) -> Result<(), PermissionError> {
        let (program, args) = self
            .config
            .settings_command
            .split_first()
            .ok_or_else(|| PermissionError::Settings("no settings command configured".to_string()))?;

        tracing::info!("Opening permission settings with {}", program);
        Command::new(program)
            .args(args)
            .arg(&self.config_path)
            .spawn()
            .map_err(|e| PermissionError::Settings(e.to_string()))?;

        Ok(())
    }
}
