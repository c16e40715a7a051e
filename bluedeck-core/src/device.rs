/*!
 * Bluetooth Device Model
 * Strict device type validated from loosely typed provider records
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InvalidAddress;

/// Hardware address in canonical `AA:BB:CC:DD:EE:FF` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let octets: Vec<&str> = trimmed.split(|c| c == ':' || c == '-').collect();

        let well_formed = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if !well_formed {
            return Err(InvalidAddress(raw.to_string()));
        }

        Ok(Self(octets.join(":").to_ascii_uppercase()))
    }
}

impl TryFrom<String> for Address {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondState {
    Paired,
    Discovered,
}

impl fmt::Display for BondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BondState::Paired => f.write_str("Paired"),
            BondState::Discovered => f.write_str("Discovered"),
        }
    }
}

/// A device as reported by a radio provider, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    pub address: String,
    pub name: Option<String>,
    pub bond_state: Option<BondState>,
}

impl DeviceRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_bond_state(mut self, bond_state: BondState) -> Self {
        self.bond_state = Some(bond_state);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub address: Address,
    pub name: Option<String>,
    pub bond_state: BondState,
}

impl Device {
    pub fn new(address: Address, name: Option<String>, bond_state: BondState) -> Self {
        Self {
            address,
            name,
            bond_state,
        }
    }

    /// Validates a provider record. `implied` is used when the record does
    /// not say whether the device is bonded.
    pub fn from_record(record: DeviceRecord, implied: BondState) -> Result<Self, InvalidAddress> {
        let address = record.address.parse()?;
        let name = record
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(Self {
            address,
            name,
            bond_state: record.bond_state.unwrap_or(implied),
        })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    pub fn is_paired(&self) -> bool {
        self.bond_state == BondState::Paired
    }
}

/// Validates a batch of records, dropping the ones with unusable addresses.
pub fn validate_records(records: Vec<DeviceRecord>, implied: BondState) -> Vec<Device> {
    records
        .into_iter()
        .filter_map(|record| match Device::from_record(record, implied) {
            Ok(device) => Some(device),
            Err(e) => {
                tracing::warn!("Dropping device record: {}", e);
                None
            }
        })
        .collect()
}
