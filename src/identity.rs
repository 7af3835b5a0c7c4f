//! Host identity resolution
//!
//! A host's real hostname becomes known at different bootstrap phases
//! from different sources: the record itself, the reported hardware
//! inventory, the inventory manifest, or nothing at all. The status view
//! must never show a blank name, so resolution walks a priority chain
//! and bottoms out at a synthesized placeholder.

use crate::api::types::InstallHost;
use crate::manifest::NodeManifest;

/// Resolve the display name for a host record.
///
/// Priority, first non-empty wins:
/// 1. the hostname explicitly requested on the record
/// 2. the hostname reported in the hardware inventory
/// 3. a MAC-address match against the inventory manifest
/// 4. the first IPv4 address on any inventoried interface
/// 5. for the bootstrap-flagged master, the manifest's first master
/// 6. a `<role>-<id-prefix>` placeholder
pub fn resolve_hostname(host: &InstallHost, manifest: Option<&NodeManifest>) -> String {
    if let Some(requested) = non_empty(host.requested_hostname.as_deref()) {
        return requested.to_string();
    }

    let inventory = host.parsed_inventory();

    if let Some(inventory) = &inventory {
        if let Some(hostname) = non_empty(inventory.hostname.as_deref()) {
            return hostname.to_string();
        }

        if let Some(manifest) = manifest {
            for iface in &inventory.interfaces {
                if let Some(mac) = non_empty(iface.mac_address.as_deref()) {
                    if let Some(hostname) = manifest.hostname_for_mac(mac) {
                        return hostname.to_string();
                    }
                }
            }
        }

        for iface in &inventory.interfaces {
            if let Some(cidr) = iface.ipv4_addresses.first() {
                if let Some(address) = non_empty(cidr.split('/').next()) {
                    return address.to_string();
                }
            }
        }
    }

    let role = host.role.as_deref().unwrap_or("unknown");

    if role == "master" && host.bootstrap {
        if let Some(master) = manifest.and_then(|m| m.first_bootstrap_master()) {
            if !master.hostname.is_empty() {
                return master.hostname.clone();
            }
        }
    }

    let id_prefix: String = host
        .id
        .as_deref()
        .unwrap_or("unidentified")
        .chars()
        .take(8)
        .collect();
    format!("{}-{}", role, id_prefix)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
