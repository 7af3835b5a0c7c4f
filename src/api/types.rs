//! Wire types for both progress data sources
//!
//! Every field is optional or defaulted: these records come from services
//! that are themselves mid-bootstrap, and a half-populated record is
//! normal. One undecodable field never costs the rest of the record.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Orchestration API (pre-bootstrap source)
// ---------------------------------------------------------------------------

/// Cluster record from the orchestration API
#[derive(Debug, Clone, Deserialize)]
pub struct InstallCluster {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_info: Option<String>,
    #[serde(default)]
    pub progress: Option<ClusterProgress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterProgress {
    #[serde(default)]
    pub total_percentage: Option<i64>,
}

/// Host record from the orchestration API
#[derive(Debug, Clone, Deserialize)]
pub struct InstallHost {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub requested_hostname: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_info: Option<String>,
    #[serde(default)]
    pub infra_env_id: Option<String>,
    /// Set on the host that runs the bootstrap control plane
    #[serde(default)]
    pub bootstrap: bool,
    #[serde(default)]
    pub progress: Option<HostProgress>,
    /// JSON-encoded hardware inventory; parsed lazily since it is large
    /// and frequently absent early in bootstrap
    #[serde(default)]
    pub inventory: Option<String>,
    /// JSON-encoded validation results, same encoding quirk as inventory
    #[serde(default)]
    pub validations_info: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostProgress {
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub progress_info: Option<String>,
}

/// Parsed form of `InstallHost::inventory`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostInventory {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<InventoryInterface>,
    #[serde(default)]
    pub disks: Vec<InventoryDisk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryInterface {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    /// CIDR strings, e.g. "192.168.1.210/24"
    #[serde(default)]
    pub ipv4_addresses: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryDisk {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub installation_eligibility: Option<DiskEligibility>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskEligibility {
    #[serde(default)]
    pub eligible: bool,
    #[serde(default)]
    pub not_eligible_reasons: Vec<String>,
}

impl InstallHost {
    /// Decode the embedded inventory JSON, if present and well-formed.
    pub fn parsed_inventory(&self) -> Option<HostInventory> {
        let raw = self.inventory.as_deref()?;
        serde_json::from_str(raw).ok()
    }

    /// Decode the embedded validation results, if present and well-formed.
    /// Returns (category, checks) pairs in feed order.
    pub fn parsed_validations(&self) -> Vec<(String, Vec<ValidationCheck>)> {
        let Some(raw) = self.validations_info.as_deref() else {
            return Vec::new();
        };
        let Ok(map) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw)
        else {
            return Vec::new();
        };

        map.into_iter()
            .map(|(category, value)| {
                let checks: Vec<ValidationCheck> =
                    serde_json::from_value(value).unwrap_or_default();
                (category, checks)
            })
            .collect()
    }
}

/// One validation check inside `validations_info`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationCheck {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Event record from the orchestration API feed
#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

impl EventRecord {
    /// Stable dedup key for this event. The feed has no dedicated id
    /// field, but (time, name, message) identifies an occurrence.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.event_time.as_deref().unwrap_or(""),
            self.name.as_deref().unwrap_or(""),
            self.message.as_deref().unwrap_or("")
        )
    }
}

// ---------------------------------------------------------------------------
// Management plane (post-bootstrap source)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectList<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Condition {
    #[serde(rename = "type", default)]
    pub condition_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Node object from the management plane
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterNode {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "nodeInfo", default)]
    pub node_info: Option<NodeSystemInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeSystemInfo {
    #[serde(rename = "kubeletVersion", default)]
    pub kubelet_version: Option<String>,
}

const MASTER_LABEL: &str = "node-role.kubernetes.io/master";
const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";

impl ClusterNode {
    /// A node is ready when its Ready condition reports status True.
    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| {
                c.condition_type.as_deref() == Some("Ready")
                    && c.status.as_deref() == Some("True")
            })
    }

    /// Control-plane membership comes from either of the two role labels.
    pub fn is_control_plane(&self) -> bool {
        self.metadata.labels.contains_key(MASTER_LABEL)
            || self.metadata.labels.contains_key(CONTROL_PLANE_LABEL)
    }
}

/// ClusterOperator object from the management plane
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterOperator {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: OperatorStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperatorStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ClusterOperator {
    fn condition_true(&self, condition_type: &str) -> bool {
        self.status.conditions.iter().any(|c| {
            c.condition_type.as_deref() == Some(condition_type)
                && c.status.as_deref() == Some("True")
        })
    }

    pub fn is_available(&self) -> bool {
        self.condition_true("Available")
    }

    pub fn is_progressing(&self) -> bool {
        self.condition_true("Progressing")
    }
}

/// CertificateSigningRequest object, read only for its approval state
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateRequest {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: CertificateRequestStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateRequestStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl CertificateRequest {
    /// A request with no Approved or Denied condition is still pending.
    pub fn is_pending(&self) -> bool {
        !self.status.conditions.iter().any(|c| {
            matches!(c.condition_type.as_deref(), Some("Approved") | Some("Denied"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_decodes_with_missing_fields() {
        let host: InstallHost = serde_json::from_str(r#"{"id": "h1"}"#).unwrap();
        assert_eq!(host.id.as_deref(), Some("h1"));
        assert!(host.requested_hostname.is_none());
        assert!(host.parsed_inventory().is_none());
        assert!(host.parsed_validations().is_empty());
    }

    #[test]
    fn test_bad_inventory_does_not_poison_host() {
        let host: InstallHost =
            serde_json::from_str(r#"{"id": "h1", "inventory": "{broken"}"#).unwrap();
        assert_eq!(host.id.as_deref(), Some("h1"));
        assert!(host.parsed_inventory().is_none());
    }

    #[test]
    fn test_validations_decode() {
        let info = r#"{"hardware": [{"id": "has-cpu", "status": "success", "message": "ok"}]}"#;
        let host: InstallHost = serde_json::from_str(
            &format!(r#"{{"id": "h1", "validations_info": {}}}"#, serde_json::to_string(info).unwrap()),
        )
        .unwrap();

        let validations = host.parsed_validations();
        assert_eq!(validations.len(), 1);
        assert_eq!(validations[0].0, "hardware");
        assert_eq!(validations[0].1[0].id.as_deref(), Some("has-cpu"));
    }

    #[test]
    fn test_node_readiness() {
        let node: ClusterNode = serde_json::from_str(
            r#"{
                "metadata": {"name": "master-0", "labels": {"node-role.kubernetes.io/master": ""}},
                "status": {"conditions": [{"type": "Ready", "status": "True"}]}
            }"#,
        )
        .unwrap();
        assert!(node.is_ready());
        assert!(node.is_control_plane());
    }

    #[test]
    fn test_operator_conditions() {
        let operator: ClusterOperator = serde_json::from_str(
            r#"{
                "metadata": {"name": "etcd"},
                "status": {"conditions": [
                    {"type": "Progressing", "status": "True", "message": "rolling out"},
                    {"type": "Available", "status": "False"}
                ]}
            }"#,
        )
        .unwrap();
        assert!(operator.is_progressing());
        assert!(!operator.is_available());
    }

    #[test]
    fn test_pending_certificate_request() {
        let csr: CertificateRequest = serde_json::from_str(r#"{"metadata": {"name": "csr-1"}}"#).unwrap();
        assert!(csr.is_pending());

        let approved: CertificateRequest = serde_json::from_str(
            r#"{"status": {"conditions": [{"type": "Approved", "status": "True"}]}}"#,
        )
        .unwrap();
        assert!(!approved.is_pending());
    }

    #[test]
    fn test_event_dedup_key_is_stable() {
        let event: EventRecord = serde_json::from_str(
            r#"{"event_time": "2026-01-01T00:00:00Z", "name": "host_registered", "message": "Host registered"}"#,
        )
        .unwrap();
        let again: EventRecord = serde_json::from_str(
            r#"{"event_time": "2026-01-01T00:00:00Z", "name": "host_registered", "message": "Host registered"}"#,
        )
        .unwrap();
        assert_eq!(event.dedup_key(), again.dedup_key());
    }
}
