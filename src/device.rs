//! Connected-device model and the directory merger.
//!
//! A router reports clients through three independent sources: the wireless
//! association list, the ARP table and the DHCP leases. [`DeviceDirectory`]
//! folds them into one map keyed by canonical MAC address, in that order,
//! with each pass only touching the fields its source knows about.

use std::collections::BTreeMap;

use log::trace;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::LeaseMergePolicy;
use crate::parser::LeaseRecord;

/// A network client seen by the router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Device {
    /// Uppercase, colon separated MAC address.
    pub mac: String,
    pub ip: Option<String>,
    pub name: Option<String>,
}

impl Device {
    /// A device known only by its MAC, as reported by the association list.
    pub fn from_mac(mac: &str) -> Self {
        Self {
            mac: canonical_mac(mac),
            ip: None,
            name: None,
        }
    }

    pub fn with_ip(mac: &str, ip: impl Into<String>) -> Self {
        Self {
            mac: canonical_mac(mac),
            ip: Some(ip.into()),
            name: None,
        }
    }

    /// Builds a device from a DHCP lease. A `*` hostname means none was sent.
    pub fn from_lease(lease: &LeaseRecord) -> Self {
        Self {
            mac: canonical_mac(&lease.mac),
            ip: Some(lease.ip.clone()),
            name: Some(normalize_hostname(&lease.host)),
        }
    }
}

/// Normalizes a MAC to uppercase hex pairs joined by colons.
///
/// Accepts `:` or `-` separators and single-digit groups (`1:2:3:4:5:6`).
/// Input that is not six groups is only uppercased.
pub fn canonical_mac(mac: &str) -> String {
    let mac = mac.trim();
    let groups: Vec<&str> = mac.split([':', '-']).collect();
    let well_formed = groups.len() == 6
        && groups
            .iter()
            .all(|g| (1..=2).contains(&g.len()) && g.chars().all(|c| c.is_ascii_hexdigit()));
    if !well_formed {
        return mac.to_ascii_uppercase();
    }

    groups
        .iter()
        .map(|g| format!("{:0>2}", g.to_ascii_uppercase()))
        .collect::<Vec<_>>()
        .join(":")
}

/// dnsmasq writes `*` for clients that sent no hostname.
pub fn normalize_hostname(host: &str) -> String {
    if host == "*" {
        String::new()
    } else {
        host.to_string()
    }
}

/// Merged view of every source, keyed by canonical MAC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDirectory {
    devices: BTreeMap<String, Device>,
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds MAC-only entries from the association list.
    pub fn merge_wireless<S: AsRef<str>>(&mut self, macs: &[S]) {
        for mac in macs {
            let device = Device::from_mac(mac.as_ref());
            trace!("wireless: {}", device.mac);
            self.devices.entry(device.mac.clone()).or_insert(device);
        }
    }

    /// Sets the IP of every ARP entry, creating unknown MACs and keeping names.
    pub fn merge_arp<'a>(&mut self, entries: impl IntoIterator<Item = &'a Device>) {
        for entry in entries {
            let mac = canonical_mac(&entry.mac);
            trace!("arp: {} -> {:?}", mac, entry.ip);
            let device = self
                .devices
                .entry(mac.clone())
                .or_insert_with(|| Device::from_mac(&mac));
            if entry.ip.is_some() {
                device.ip = entry.ip.clone();
            }
        }
    }

    /// Overwrites IP and name from leases according to `policy`.
    pub fn merge_leases<'a>(
        &mut self,
        leases: impl IntoIterator<Item = &'a Device>,
        policy: LeaseMergePolicy,
    ) {
        for lease in leases {
            let mac = canonical_mac(&lease.mac);
            if !self.devices.contains_key(&mac) {
                match policy {
                    LeaseMergePolicy::AddAll => {
                        self.devices.insert(mac.clone(), Device::from_mac(&mac));
                    }
                    LeaseMergePolicy::EnrichKnown => {
                        trace!("lease for unknown {} skipped", mac);
                        continue;
                    }
                }
            }
            let Some(device) = self.devices.get_mut(&mac) else {
                continue;
            };
            trace!("lease: {} -> {:?} {:?}", mac, lease.ip, lease.name);
            if lease.ip.is_some() {
                device.ip = lease.ip.clone();
            }
            if lease.name.is_some() {
                device.name = lease.name.clone();
            }
        }
    }

    /// Drops entries without an IP address.
    pub fn retain_with_ip(&mut self) {
        self.devices.retain(|_, device| device.ip.is_some());
    }

    pub fn get(&self, mac: &str) -> Option<&Device> {
        self.devices.get(&canonical_mac(mac))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, Device> {
        self.devices
    }
}
