//! Node-inventory manifest
//!
//! The manifest enumerates the hosts expected to join the cluster, with
//! their roles and NIC MAC addresses, plus the rendezvous address the
//! bootstrap machine answers on. It is the only place the monitor can
//! learn the expected cluster shape before either data source has
//! reported anything.

use crate::error::ManifestError;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;

/// One network interface entry in the manifest
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestInterface {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "macAddress", default)]
    pub mac_address: String,
}

/// One host entry in the manifest
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestHost {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub interfaces: Vec<ManifestInterface>,
    /// Explicit address; most manifests omit it and rely on the
    /// rendezvous-offset derivation instead.
    #[serde(default)]
    pub address: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawManifest {
    #[serde(rename = "rendezvousIP")]
    rendezvous_ip: Option<Ipv4Addr>,
    #[serde(default)]
    hosts: Vec<ManifestHost>,
}

/// Parsed node-inventory manifest.
#[derive(Debug, Clone)]
pub struct NodeManifest {
    pub rendezvous_ip: Ipv4Addr,
    pub hosts: Vec<ManifestHost>,
}

impl NodeManifest {
    /// Load and validate a manifest file.
    ///
    /// Failure here is a configuration-level problem: callers keep an
    /// `Option<NodeManifest>` and run with manifest-backed features
    /// disabled for the rest of the process lifetime.
    pub fn load(path: &Path) -> Result<NodeManifest, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ManifestError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let parsed: RawManifest =
            serde_yaml::from_str(&raw).map_err(|e| ManifestError::Invalid {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let rendezvous_ip = parsed
            .rendezvous_ip
            .ok_or_else(|| ManifestError::BadRendezvous("missing rendezvousIP".to_string()))?;

        Ok(NodeManifest {
            rendezvous_ip,
            hosts: parsed.hosts,
        })
    }

    /// Number of hosts expected to join the cluster.
    pub fn expected_node_count(&self) -> usize {
        self.hosts.len()
    }

    /// Look up a host's manifest hostname by NIC MAC address.
    /// MAC comparison is case-insensitive.
    pub fn hostname_for_mac(&self, mac: &str) -> Option<&str> {
        for host in &self.hosts {
            for iface in &host.interfaces {
                if iface.mac_address.eq_ignore_ascii_case(mac) && !host.hostname.is_empty() {
                    return Some(&host.hostname);
                }
            }
        }
        None
    }

    /// Address for the host at the given manifest position.
    ///
    /// An explicit address wins; otherwise the address is derived from
    /// the rendezvous address by offsetting the last octet by the host's
    /// position in the ordered list.
    pub fn address_for(&self, index: usize) -> Option<Ipv4Addr> {
        let host = self.hosts.get(index)?;
        if let Some(address) = host.address {
            return Some(address);
        }

        let octets = self.rendezvous_ip.octets();
        let last = octets[3].checked_add(index as u8)?;
        Some(Ipv4Addr::new(octets[0], octets[1], octets[2], last))
    }

    /// The first master host, which on an unattended install doubles as
    /// the rendezvous/bootstrap machine.
    pub fn first_bootstrap_master(&self) -> Option<&ManifestHost> {
        self.hosts.iter().find(|h| h.role == "master")
    }

    /// Pairs of (hostname, address) for every host the diagnostic
    /// scheduler should probe.
    pub fn probe_targets(&self) -> Vec<(String, Ipv4Addr)> {
        self.hosts
            .iter()
            .enumerate()
            .filter_map(|(i, host)| {
                let address = self.address_for(i)?;
                let name = if host.hostname.is_empty() {
                    address.to_string()
                } else {
                    host.hostname.clone()
                };
                Some((name, address))
            })
            .collect()
    }
}
