/*!
 * Device Registry
 * Known devices keyed by address, in order of first sighting
 */

use std::collections::HashMap;

use crate::device::{Address, Device};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub updated: usize,
}

/// Known devices, unique by address, in order of first appearance.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    entries: Vec<Device>,
    index: HashMap<Address, usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts by address. A known address keeps its position and takes
    /// the incoming name and bond state.
    pub fn merge<I>(&mut self, devices: I) -> MergeReport
    where
        I: IntoIterator<Item = Device>,
    {
        let mut report = MergeReport::default();

        for device in devices {
            match self.index.get(&device.address) {
                Some(&slot) => {
                    self.entries[slot] = device;
                    report.updated += 1;
                }
                None => {
                    self.index.insert(device.address.clone(), self.entries.len());
                    self.entries.push(device);
                    report.added += 1;
                }
            }
        }

        report
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.entries.clone()
    }

    pub fn devices(&self) -> &[Device] {
        &self.entries
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn get(&self, address: &Address) -> Option<&Device> {
        self.index.get(address).map(|&slot| &self.entries[slot])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paired_count(&self) -> usize {
        self.entries.iter().filter(|d| d.is_paired()).count()
    }

    pub(crate) fn drain(&mut self) -> Vec<Device> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }
}
