//! Progress aggregation
//!
//! Reduces whatever the authoritative source reported this cycle into
//! one `ClusterSnapshot`. The two sources have different shapes: the
//! orchestration API reports its own status and percentage directly,
//! while the management plane has no single progress number and one is
//! synthesized from node readiness and operator availability. A snapshot
//! is always built from exactly one source.

use crate::api::types::{ClusterNode, ClusterOperator, InstallCluster, InstallHost};
use crate::identity::resolve_hostname;
use crate::manifest::NodeManifest;
use crate::snapshot::{
    ClusterSnapshot, Severity, SnapshotSource, StatusStyles, UnitRole, UnitRow,
    ValidationFinding, ValidationStatus,
};
use slog::{debug, Logger};

/// Weighting of the synthesized percentage: node join is the smaller,
/// earlier share of total bootstrap work; operator rollout dominates.
const NODE_WEIGHT: f64 = 0.30;
const OPERATOR_WEIGHT: f64 = 0.70;

/// Operators that roll out on the control-plane machines. Used to show
/// operator-level progress against master rows even though operators are
/// not node-scoped objects.
const CONTROL_PLANE_OPERATORS: &[&str] = &[
    "etcd",
    "kube-apiserver",
    "kube-controller-manager",
    "kube-scheduler",
    "machine-config",
];

/// Builds snapshots from raw per-source facts.
pub struct ProgressAggregator {
    styles: StatusStyles,
    logger: Logger,
}

impl ProgressAggregator {
    pub fn new(styles: StatusStyles, logger: Logger) -> Self {
        Self { styles, logger }
    }

    /// Snapshot from the orchestration API's view: status and percentage
    /// are the API's own reported values, one row per registered host.
    pub fn from_installation(
        &self,
        cluster: &InstallCluster,
        hosts: &[InstallHost],
        manifest: Option<&NodeManifest>,
        generation: u64,
    ) -> ClusterSnapshot {
        let status = cluster.status.as_deref().unwrap_or("unknown").to_string();
        let percent = cluster
            .progress
            .as_ref()
            .and_then(|p| p.total_percentage)
            .unwrap_or(0)
            .clamp(0, 100) as u8;

        let units = hosts
            .iter()
            .map(|host| self.host_row(host, manifest))
            .collect();

        debug!(self.logger, "Aggregated orchestration snapshot";
            "status" => &status, "percent" => percent, "hosts" => hosts.len());

        ClusterSnapshot {
            status_severity: self.styles.severity(&status),
            status,
            status_detail: cluster.status_info.clone().unwrap_or_default(),
            percent,
            units,
            source: SnapshotSource::Installation,
            generation,
        }
    }

    fn host_row(&self, host: &InstallHost, manifest: Option<&NodeManifest>) -> UnitRow {
        let state = host.status.as_deref().unwrap_or("unknown").to_string();
        let progress_text = host
            .progress
            .as_ref()
            .and_then(|p| p.current_stage.clone())
            .unwrap_or_default();

        let validations = host
            .parsed_validations()
            .into_iter()
            .flat_map(|(category, checks)| {
                checks.into_iter().map(move |check| ValidationFinding {
                    category: category.clone(),
                    check_id: check.id.unwrap_or_default(),
                    status: ValidationStatus::parse(check.status.as_deref().unwrap_or("")),
                    message: check.message.unwrap_or_default(),
                })
            })
            .collect();

        UnitRow {
            // Hosts briefly appear without ids right after discovery;
            // rows still need distinct ids within the snapshot
            id: host
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            display_name: resolve_hostname(host, manifest),
            role: UnitRole::parse(host.role.as_deref().unwrap_or("")),
            state_severity: self.styles.severity(&state),
            state,
            disk_summary: disk_summary(host),
            progress_text,
            validations,
        }
    }

    /// Snapshot synthesized from the management plane's view.
    ///
    /// percent = 30% node readiness + 70% operator availability,
    /// truncated; either term contributes zero when its denominator is
    /// zero. Status is "installed" exactly at 100.
    pub fn from_cluster(
        &self,
        nodes: &[ClusterNode],
        operators: &[ClusterOperator],
        generation: u64,
    ) -> ClusterSnapshot {
        let total_nodes = nodes.len();
        let ready_nodes = nodes.iter().filter(|n| n.is_ready()).count();
        let total_operators = operators.len();
        let available_operators = operators.iter().filter(|o| o.is_available()).count();

        let node_term = ratio_percent(ready_nodes, total_nodes);
        let operator_term = ratio_percent(available_operators, total_operators);
        let percent =
            ((NODE_WEIGHT * node_term + OPERATOR_WEIGHT * operator_term).trunc() as i64)
                .clamp(0, 100) as u8;

        let status = if percent >= 100 { "installed" } else { "installing" };

        // Operators still rolling out on the control plane, shown as
        // in-progress work on every master row
        let rolling_out: Vec<&str> = operators
            .iter()
            .filter(|o| o.is_progressing() && !o.is_available())
            .filter_map(|o| o.metadata.name.as_deref())
            .filter(|name| CONTROL_PLANE_OPERATORS.contains(name))
            .collect();

        let units = nodes
            .iter()
            .map(|node| self.node_row(node, &rolling_out))
            .collect();

        debug!(self.logger, "Aggregated cluster snapshot";
            "ready_nodes" => ready_nodes, "total_nodes" => total_nodes,
            "available_operators" => available_operators,
            "total_operators" => total_operators, "percent" => percent);

        ClusterSnapshot {
            status: status.to_string(),
            status_severity: self.styles.severity(status),
            status_detail: format!(
                "{}/{} nodes ready, {}/{} operators available",
                ready_nodes, total_nodes, available_operators, total_operators
            ),
            percent,
            units,
            source: SnapshotSource::Cluster,
            generation,
        }
    }

    fn node_row(&self, node: &ClusterNode, rolling_out: &[&str]) -> UnitRow {
        let name = node
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| "unnamed-node".to_string());
        let ready = node.is_ready();
        let role = if node.is_control_plane() {
            UnitRole::Master
        } else {
            UnitRole::Worker
        };

        // Master rows show operator rollout instead of version while
        // control-plane operators are still converging
        let progress_text = if role == UnitRole::Master && !rolling_out.is_empty() {
            format!("rolling out: {}", rolling_out.join(", "))
        } else {
            node.status
                .node_info
                .as_ref()
                .and_then(|i| i.kubelet_version.clone())
                .unwrap_or_default()
        };

        UnitRow {
            id: node.metadata.uid.clone().unwrap_or_else(|| name.clone()),
            display_name: name,
            role,
            state: if ready { "Ready".to_string() } else { "NotReady".to_string() },
            state_severity: if ready { Severity::Ok } else { Severity::Attention },
            disk_summary: None,
            progress_text,
            validations: Vec::new(),
        }
    }
}

fn ratio_percent(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

/// Short description of the install disk: size plus eligibility mark.
fn disk_summary(host: &InstallHost) -> Option<String> {
    let inventory = host.parsed_inventory()?;

    let disk = inventory
        .disks
        .iter()
        .find(|d| {
            d.installation_eligibility
                .as_ref()
                .map(|e| e.eligible)
                .unwrap_or(false)
        })
        .or_else(|| inventory.disks.first())?;

    let size_gb = disk.size_bytes.unwrap_or(0) / (1024 * 1024 * 1024);
    let eligible = disk
        .installation_eligibility
        .as_ref()
        .map(|e| e.eligible)
        .unwrap_or(false);

    Some(format!("{}GB {}", size_gb, if eligible { "✓" } else { "✗" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ObjectList;
    use slog::Logger;

    fn create_logger() -> Logger {
        use slog::Drain;
        let decorator = slog_term::PlainDecorator::new(std::io::stdout());
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, slog::o!())
    }

    fn aggregator() -> ProgressAggregator {
        ProgressAggregator::new(StatusStyles::default(), create_logger())
    }

    fn nodes(ready: usize, total: usize) -> Vec<ClusterNode> {
        (0..total)
            .map(|i| {
                let status = if i < ready { "True" } else { "False" };
                serde_json::from_value(serde_json::json!({
                    "metadata": {"name": format!("node-{}", i)},
                    "status": {"conditions": [{"type": "Ready", "status": status}]}
                }))
                .unwrap()
            })
            .collect()
    }

    fn operators(available: usize, total: usize) -> Vec<ClusterOperator> {
        (0..total)
            .map(|i| {
                let status = if i < available { "True" } else { "False" };
                serde_json::from_value(serde_json::json!({
                    "metadata": {"name": format!("operator-{}", i)},
                    "status": {"conditions": [{"type": "Available", "status": status}]}
                }))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_cluster_percent_weighted_sum() {
        // 2/4 nodes ready, 20/29 operators available:
        // trunc(0.30*50 + 0.70*68.97) = trunc(63.28) = 63
        let snapshot = aggregator().from_cluster(&nodes(2, 4), &operators(20, 29), 1);
        assert_eq!(snapshot.percent, 63);
        assert_eq!(snapshot.status, "installing");
    }

    #[test]
    fn test_cluster_percent_complete() {
        let snapshot = aggregator().from_cluster(&nodes(4, 4), &operators(29, 29), 1);
        assert_eq!(snapshot.percent, 100);
        assert_eq!(snapshot.status, "installed");
        assert_eq!(snapshot.status_severity, Severity::Ok);
    }

    #[test]
    fn test_zero_denominators_contribute_zero() {
        let snapshot = aggregator().from_cluster(&[], &[], 1);
        assert_eq!(snapshot.percent, 0);
        assert_eq!(snapshot.status, "installing");

        let snapshot = aggregator().from_cluster(&nodes(3, 3), &[], 1);
        assert_eq!(snapshot.percent, 30);
    }

    #[test]
    fn test_rollout_attribution_on_masters_only() {
        let nodes: ObjectList<ClusterNode> = serde_json::from_value(serde_json::json!({
            "items": [
                {
                    "metadata": {"name": "master-0",
                                 "labels": {"node-role.kubernetes.io/master": ""}},
                    "status": {"conditions": [{"type": "Ready", "status": "True"}],
                               "nodeInfo": {"kubeletVersion": "v1.31.0"}}
                },
                {
                    "metadata": {"name": "worker-0"},
                    "status": {"conditions": [{"type": "Ready", "status": "True"}],
                               "nodeInfo": {"kubeletVersion": "v1.31.0"}}
                }
            ]
        }))
        .unwrap();

        let operators: ObjectList<ClusterOperator> = serde_json::from_value(serde_json::json!({
            "items": [
                {"metadata": {"name": "etcd"},
                 "status": {"conditions": [
                     {"type": "Progressing", "status": "True"},
                     {"type": "Available", "status": "False"}]}},
                {"metadata": {"name": "console"},
                 "status": {"conditions": [
                     {"type": "Progressing", "status": "True"},
                     {"type": "Available", "status": "False"}]}}
            ]
        }))
        .unwrap();

        let snapshot = aggregator().from_cluster(&nodes.items, &operators.items, 1);

        // etcd is a control-plane operator, console is not
        assert_eq!(snapshot.units[0].progress_text, "rolling out: etcd");
        // Workers keep their version text
        assert_eq!(snapshot.units[1].progress_text, "v1.31.0");
    }

    #[test]
    fn test_installation_snapshot_passthrough() {
        let cluster: InstallCluster = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "status": "installing",
            "status_info": "Installation in progress",
            "progress": {"total_percentage": 44}
        }))
        .unwrap();

        let hosts: Vec<InstallHost> = serde_json::from_value(serde_json::json!([
            {
                "id": "h1",
                "requested_hostname": "master-0",
                "role": "master",
                "status": "installing",
                "progress": {"current_stage": "Writing image to disk"}
            }
        ]))
        .unwrap();

        let snapshot = aggregator().from_installation(&cluster, &hosts, None, 3);
        assert_eq!(snapshot.status, "installing");
        assert_eq!(snapshot.status_severity, Severity::Working);
        assert_eq!(snapshot.percent, 44);
        assert_eq!(snapshot.units.len(), 1);
        assert_eq!(snapshot.units[0].display_name, "master-0");
        assert_eq!(snapshot.units[0].progress_text, "Writing image to disk");
        assert_eq!(snapshot.generation, 3);
    }

    #[test]
    fn test_disk_summary_prefers_eligible_disk() {
        let inventory = serde_json::json!({
            "disks": [
                {"name": "sr0", "size_bytes": 1073741824u64,
                 "installation_eligibility": {"eligible": false,
                     "not_eligible_reasons": ["Disk is removable"]}},
                {"name": "sda", "size_bytes": 128849018880u64,
                 "installation_eligibility": {"eligible": true}}
            ]
        });
        let host: InstallHost = serde_json::from_value(serde_json::json!({
            "id": "h1",
            "inventory": inventory.to_string()
        }))
        .unwrap();

        assert_eq!(disk_summary(&host).unwrap(), "120GB ✓");
    }

    #[test]
    fn test_validation_findings_grouped_per_unit() {
        let validations = serde_json::json!({
            "hardware": [
                {"id": "has-min-cpu", "status": "success", "message": "Sufficient CPU"}
            ],
            "network": [
                {"id": "connected", "status": "failure", "message": "No connectivity"}
            ]
        });
        let hosts: Vec<InstallHost> = serde_json::from_value(serde_json::json!([
            {"id": "h1", "validations_info": validations.to_string()}
        ]))
        .unwrap();
        let cluster: InstallCluster =
            serde_json::from_value(serde_json::json!({"id": "c1", "status": "ready"})).unwrap();

        let snapshot = aggregator().from_installation(&cluster, &hosts, None, 1);
        let row = &snapshot.units[0];
        assert_eq!(row.validations.len(), 2);
        assert!(row
            .validations
            .iter()
            .any(|v| v.category == "network" && v.status == ValidationStatus::Failure));
    }
}
