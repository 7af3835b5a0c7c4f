//! Diagnostic cycle scheduling
//!
//! Fans the per-node probe out across the fleet with bounded
//! parallelism, folds the results into the shared findings map, and runs
//! the cluster-level checks once per cycle. The periodic timer and the
//! manual trigger share one reentrancy guard; a cycle never overlaps a
//! running one.

use crate::api::ClusterApiClient;
use crate::diagnostics::parser::{DiagnosticFinding, DiagnosticSeverity};
use crate::diagnostics::probe::NodeDiagnosticProbe;
use crate::error::ApiError;
use slog::{debug, info, warn, Logger};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{RwLock, Semaphore};

/// Findings that are not about any single node (pending certificate
/// requests, config drift) hang off this synthetic entry.
pub const CLUSTER_PSEUDO_NODE: &str = "cluster";

const CURRENT_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/currentConfig";
const DESIRED_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/desiredConfig";

/// One node's findings from the most recent completed cycle
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub findings: Vec<DiagnosticFinding>,
    pub captured_at: SystemTime,
}

impl NodeReport {
    fn now(findings: Vec<DiagnosticFinding>) -> Self {
        Self {
            findings,
            captured_at: SystemTime::now(),
        }
    }
}

/// Latest-cycle findings for every checked node
pub type FindingsMap = HashMap<String, NodeReport>;

/// Runs diagnostic cycles over the known node fleet.
pub struct DiagnosticScheduler {
    probe: Arc<NodeDiagnosticProbe>,
    cluster_api: Arc<ClusterApiClient>,
    /// (hostname, address) pairs from the inventory manifest. Empty when
    /// no manifest was available: per-node probing stays disabled for
    /// the process lifetime, cluster-level checks still run.
    targets: Vec<(String, Ipv4Addr)>,
    findings: RwLock<FindingsMap>,
    running: AtomicBool,
    workers: usize,
    logger: Logger,
}

impl DiagnosticScheduler {
    pub fn new(
        probe: NodeDiagnosticProbe,
        cluster_api: Arc<ClusterApiClient>,
        targets: Vec<(String, Ipv4Addr)>,
        workers: usize,
        logger: Logger,
    ) -> Self {
        Self {
            probe: Arc::new(probe),
            cluster_api,
            targets,
            findings: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            workers: workers.max(1),
            logger,
        }
    }

    /// Snapshot of the current findings map.
    pub async fn findings(&self) -> FindingsMap {
        self.findings.read().await.clone()
    }

    /// Run one full diagnostic cycle, unless one is already in flight.
    ///
    /// # Returns
    /// * `true` - a cycle ran to completion
    /// * `false` - a cycle was already running; this call did nothing
    pub async fn run_cycle(&self) -> bool {
        if !self.try_begin_cycle() {
            debug!(self.logger, "Diagnostic cycle already in flight; skipping");
            return false;
        }

        let fresh = self.collect_cycle().await;
        *self.findings.write().await = fresh;

        self.end_cycle();
        true
    }

    fn try_begin_cycle(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn end_cycle(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Probe every target concurrently and fold in the cluster check.
    /// The result replaces the previous cycle's map wholesale.
    async fn collect_cycle(&self) -> FindingsMap {
        info!(self.logger, "Starting diagnostic cycle"; "targets" => self.targets.len());

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(self.targets.len());

        for (hostname, address) in self.targets.clone() {
            let probe = self.probe.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let findings = probe.probe(&hostname, &address.to_string()).await;
                (hostname, findings)
            }));
        }

        let mut fresh: FindingsMap = HashMap::new();
        for handle in handles {
            match handle.await {
                Ok((hostname, findings)) => {
                    fresh.insert(hostname, NodeReport::now(findings));
                }
                Err(e) => {
                    warn!(self.logger, "Diagnostic probe task failed"; "error" => %e);
                }
            }
        }

        match self.cluster_check().await {
            Ok(findings) => {
                fresh.insert(CLUSTER_PSEUDO_NODE.to_string(), NodeReport::now(findings));
            }
            Err(e) => {
                // The cluster check degrades softly: keep what the last
                // successful check reported
                debug!(self.logger, "Cluster-level check unavailable"; "error" => %e);
                let previous = self.findings.read().await;
                if let Some(report) = previous.get(CLUSTER_PSEUDO_NODE) {
                    fresh.insert(CLUSTER_PSEUDO_NODE.to_string(), report.clone());
                }
            }
        }

        fresh
    }

    /// Cluster-scoped health facts: certificate requests stuck pending
    /// and nodes whose machine config has not converged.
    async fn cluster_check(&self) -> Result<Vec<DiagnosticFinding>, ApiError> {
        let mut findings = Vec::new();

        let pending = self.cluster_api.pending_csr_count().await?;
        if pending > 0 {
            findings.push(DiagnosticFinding::new(
                DiagnosticSeverity::Warning,
                format!("{} certificate signing requests pending approval", pending),
            ));
        }

        let nodes = self.cluster_api.list_nodes().await?;
        for node in &nodes {
            let annotations = &node.metadata.annotations;
            let (Some(current), Some(desired)) = (
                annotations.get(CURRENT_CONFIG_ANNOTATION),
                annotations.get(DESIRED_CONFIG_ANNOTATION),
            ) else {
                continue;
            };
            if current != desired {
                let name = node.metadata.name.as_deref().unwrap_or("unknown");
                findings.push(DiagnosticFinding::new(
                    DiagnosticSeverity::Warning,
                    format!("machine config drift on {}: {} != {}", name, current, desired),
                ));
            }
        }

        if findings.is_empty() {
            findings.push(DiagnosticFinding::no_issues());
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn create_logger() -> Logger {
        use slog::Drain;
        let decorator = slog_term::PlainDecorator::new(std::io::stdout());
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, slog::o!())
    }

    fn scheduler_for(server: &MockServer, targets: Vec<(String, Ipv4Addr)>) -> DiagnosticScheduler {
        let cluster_api = Arc::new(
            ClusterApiClient::new(
                server.base_url(),
                None,
                Duration::from_secs(2),
                Duration::from_secs(1),
                create_logger(),
            )
            .unwrap(),
        );
        let probe = NodeDiagnosticProbe::new(
            "core".to_string(),
            None,
            Duration::from_secs(2),
            create_logger(),
        );
        DiagnosticScheduler::new(probe, cluster_api, targets, 6, create_logger())
    }

    fn mock_healthy_cluster(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET)
                .path("/apis/certificates.k8s.io/v1/certificatesigningrequests");
            then.status(200).json_body(serde_json::json!({"items": []}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/nodes");
            then.status(200).json_body(serde_json::json!({"items": []}));
        });
    }

    #[tokio::test]
    async fn test_reentrancy_guard_blocks_second_cycle() {
        let server = MockServer::start();
        mock_healthy_cluster(&server);
        let scheduler = scheduler_for(&server, Vec::new());

        // Simulate an in-flight cycle holding the guard
        assert!(scheduler.try_begin_cycle());
        assert!(!scheduler.run_cycle().await, "second cycle must not start");

        scheduler.end_cycle();
        assert!(scheduler.run_cycle().await, "guard must release after the cycle");
    }

    #[tokio::test]
    async fn test_clean_cluster_check_reports_ok_pseudo_node() {
        let server = MockServer::start();
        mock_healthy_cluster(&server);
        let scheduler = scheduler_for(&server, Vec::new());

        assert!(scheduler.run_cycle().await);
        let findings = scheduler.findings().await;

        let report = findings.get(CLUSTER_PSEUDO_NODE).unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].severity, DiagnosticSeverity::Ok);
    }

    #[tokio::test]
    async fn test_pending_csrs_and_config_drift_surface() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/apis/certificates.k8s.io/v1/certificatesigningrequests");
            then.status(200).json_body(serde_json::json!({
                "items": [{"metadata": {"name": "csr-1"}}, {"metadata": {"name": "csr-2"}}]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/nodes");
            then.status(200).json_body(serde_json::json!({
                "items": [{
                    "metadata": {
                        "name": "worker-0",
                        "annotations": {
                            "machineconfiguration.openshift.io/currentConfig": "rendered-a",
                            "machineconfiguration.openshift.io/desiredConfig": "rendered-b"
                        }
                    }
                }]
            }));
        });
        let scheduler = scheduler_for(&server, Vec::new());

        assert!(scheduler.run_cycle().await);
        let findings = scheduler.findings().await;
        let report = findings.get(CLUSTER_PSEUDO_NODE).unwrap();

        assert_eq!(report.findings.len(), 2);
        assert!(report.findings[0]
            .message
            .contains("2 certificate signing requests pending"));
        assert!(report.findings[1]
            .message
            .contains("machine config drift on worker-0"));
    }

    #[tokio::test]
    async fn test_failed_cluster_check_keeps_previous_entry() {
        let server = MockServer::start();
        mock_healthy_cluster(&server);
        let scheduler = scheduler_for(&server, Vec::new());

        assert!(scheduler.run_cycle().await);
        assert!(scheduler.findings().await.contains_key(CLUSTER_PSEUDO_NODE));

        // The management plane goes away; the old report must survive
        drop(server);
        assert!(scheduler.run_cycle().await);
        let findings = scheduler.findings().await;
        assert!(findings.contains_key(CLUSTER_PSEUDO_NODE));
    }
}
