use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::permission::Capability;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub bluetooth: BluetoothConfig,
    pub platform: PlatformConfig,
    pub permissions: PermissionsConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BluetoothConfig {
    pub adapter: String,
    pub scan_timeout_secs: u64,
    pub power_timeout_secs: u64,
    pub scan_event_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub api_level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Allow,
    Ask,
    Deny,
    Block,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PermissionsConfig {
    pub scan: Policy,
    pub connect: Policy,
    pub location: Policy,
    pub settings_command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UiConfig {
    pub tick_ms: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: "hci0".to_string(),
            scan_timeout_secs: 12,
            power_timeout_secs: 5,
            scan_event_buffer: 64,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self { api_level: 33 }
    }
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            scan: Policy::Ask,
            connect: Policy::Ask,
            location: Policy::Allow,
            settings_command: vec!["xdg-open".to_string()],
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { tick_ms: 100 }
    }
}

impl BluetoothConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn power_timeout(&self) -> Duration {
        Duration::from_secs(self.power_timeout_secs)
    }
}

impl PermissionsConfig {
    pub fn policy(&self, capability: Capability) -> Policy {
        match capability {
            Capability::Scan => self.scan,
            Capability::Connect => self.connect,
            Capability::Location => self.location,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bluedeck")
            .join("bluedeck.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Create default config if not found
                let config = Self::default();
                if let Some(parent) = path.parent() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        tracing::debug!("Could not create config directory {}: {}", parent.display(), e);
                    }
                }
                if let Err(e) = fs::write(path, toml::to_string_pretty(&config)?) {
                    tracing::debug!("Could not write default config to {}: {}", path.display(), e);
                }
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!("could not read config {}: {}", path.display(), e)),
        }
    }
}
