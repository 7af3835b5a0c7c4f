//! Monitor runtime
//!
//! Owns every component and the background loops: the main poll loop
//! (mode decision, collection, aggregation, snapshot publish), the
//! faster event-feed loop, and the diagnostic cycle timer. The
//! presentation layer sees only the message bus and the current
//! snapshot; background work never reaches into it.

use crate::api::types::InstallHost;
use crate::api::{ClusterApiClient, InstallApiClient};
use crate::auth::TokenSource;
use crate::bus::Bus;
use crate::config::MonitorConfig;
use crate::diagnostics::{
    run_gather, DiagnosticScheduler, FindingsMap, GatherOutcome, NodeDiagnosticProbe,
};
use crate::error::GatherError;
use crate::events::{EventStream, InstallEvent};
use crate::manifest::NodeManifest;
use crate::mode::{ModeController, ModeThresholds, PollMode};
use crate::progress::ProgressAggregator;
use crate::snapshot::{ClusterSnapshot, SnapshotSource, StatusStyles};
use slog::{debug, info, warn, Logger};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};

/// Typed messages delivered to the presentation layer
#[derive(Debug, Clone)]
pub enum MonitorMessage {
    /// A new status snapshot replaced the previous one
    Snapshot(Arc<ClusterSnapshot>),
    /// A never-before-seen installation event
    Event(InstallEvent),
    /// A diagnostic cycle completed; full findings map attached
    Diagnostics(FindingsMap),
}

/// Handle to a running monitor.
pub struct MonitorRuntime {
    inner: Arc<MonitorInner>,
    shutdown: watch::Sender<bool>,
}

struct MonitorInner {
    config: MonitorConfig,
    tokens: TokenSource,
    install_api: InstallApiClient,
    cluster_api: Arc<ClusterApiClient>,
    aggregator: ProgressAggregator,
    mode: Mutex<ModeController>,
    manifest: Option<NodeManifest>,
    scheduler: Arc<DiagnosticScheduler>,
    events: Mutex<EventStream>,
    bus: Bus<MonitorMessage>,
    snapshot: RwLock<Arc<ClusterSnapshot>>,
    /// Orchestrator ids learned from polling; shared with the event
    /// loop through here, nowhere else
    cluster_id: RwLock<Option<String>>,
    infra_env_id: RwLock<Option<String>>,
    generation: AtomicU64,
    logger: Logger,
}

impl MonitorRuntime {
    /// Build every component and start the background loops.
    ///
    /// A missing or invalid manifest is logged and tolerated: it only
    /// disables the expected-node-count criterion, address derivation,
    /// and per-node diagnostics for the process lifetime. A missing
    /// orchestration API URL with no manifest to derive it from is a
    /// real configuration error.
    pub fn start(
        config: MonitorConfig,
        logger: Logger,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let manifest = match NodeManifest::load(&config.manifest_path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(logger, "Node manifest unavailable; manifest-backed features disabled";
                    "error" => %e);
                None
            }
        };

        let api_base = match (&config.api_base, &manifest) {
            (Some(base), _) => base.clone(),
            (None, Some(manifest)) => format!(
                "http://{}:8090/api/assisted-install/v2",
                manifest.rendezvous_ip
            ),
            (None, None) => {
                return Err("no orchestration API URL and no manifest to derive one from".into())
            }
        };

        info!(logger, "Starting monitor";
            "api_base" => &api_base,
            "cluster_api_base" => &config.cluster_api_base,
            "expected_nodes" => manifest.as_ref().map(|m| m.expected_node_count()).unwrap_or(0));

        let tokens = TokenSource::new(config.state_file.clone());
        let install_api = InstallApiClient::new(
            api_base,
            tokens.clone(),
            config.api_timeout,
            logger.new(slog::o!("client" => "install")),
        )?;
        let cluster_api = Arc::new(ClusterApiClient::new(
            config.cluster_api_base.clone(),
            config.cluster_api_token.clone(),
            config.api_timeout,
            config.probe_timeout,
            logger.new(slog::o!("client" => "cluster")),
        )?);

        let styles = StatusStyles::load(config.status_style_path.as_deref());
        let aggregator = ProgressAggregator::new(styles, logger.clone());

        let mode = ModeController::new(ModeThresholds {
            success_threshold: config.success_threshold,
            failure_threshold: config.failure_threshold,
            handover_deadline: config.handover_deadline,
        });

        let probe = NodeDiagnosticProbe::new(
            config.ssh_user.clone(),
            config.ssh_key.clone(),
            config.ssh_timeout,
            logger.new(slog::o!("component" => "probe")),
        );
        let targets = manifest
            .as_ref()
            .map(|m| m.probe_targets())
            .unwrap_or_default();
        let scheduler = Arc::new(DiagnosticScheduler::new(
            probe,
            cluster_api.clone(),
            targets,
            config.diagnostic_workers,
            logger.new(slog::o!("component" => "diagnostics")),
        ));

        let events = EventStream::new(logger.new(slog::o!("component" => "events")));

        let inner = Arc::new(MonitorInner {
            config,
            tokens,
            install_api,
            cluster_api,
            aggregator,
            mode: Mutex::new(mode),
            manifest,
            scheduler,
            events: Mutex::new(events),
            bus: Bus::default(),
            snapshot: RwLock::new(Arc::new(ClusterSnapshot::waiting("Waiting on API...", 0))),
            cluster_id: RwLock::new(None),
            infra_env_id: RwLock::new(None),
            generation: AtomicU64::new(0),
            logger,
        });

        let (shutdown, _) = watch::channel(false);

        tokio::spawn(poll_loop(inner.clone(), shutdown.subscribe()));
        tokio::spawn(event_loop(inner.clone(), shutdown.subscribe()));
        tokio::spawn(diagnostic_loop(inner.clone(), shutdown.subscribe()));

        Ok(Self { inner, shutdown })
    }

    /// The current snapshot. Always present; before any source has
    /// answered it is the explicit waiting view.
    pub async fn snapshot(&self) -> Arc<ClusterSnapshot> {
        self.inner.snapshot.read().await.clone()
    }

    /// Subscribe to the typed message stream.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorMessage> {
        self.inner.bus.subscribe()
    }

    /// Latest diagnostic findings per node.
    pub async fn findings(&self) -> FindingsMap {
        self.inner.scheduler.findings().await
    }

    /// Which source is currently authoritative.
    pub async fn mode(&self) -> PollMode {
        self.inner.mode.lock().await.mode()
    }

    /// Kick off a diagnostic cycle now. A cycle already in flight wins;
    /// this is then a no-op.
    pub fn trigger_diagnostics(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if inner.scheduler.run_cycle().await {
                let findings = inner.scheduler.findings().await;
                inner.bus.publish(MonitorMessage::Diagnostics(findings));
            }
        });
    }

    /// Run the external gather script, if one is configured.
    pub async fn gather(&self) -> Result<GatherOutcome, GatherError> {
        let command = self.inner.config.gather_command.clone().ok_or_else(|| {
            GatherError::SpawnFailed {
                command: String::new(),
                reason: "no gather command configured".to_string(),
            }
        })?;
        run_gather(&command, self.inner.config.gather_timeout, &self.inner.logger).await
    }

    /// Stop the background loops. In-flight network calls are not
    /// cancelled; they run into their own timeouts and their results
    /// are discarded.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        info!(self.inner.logger, "Monitor shutting down");
    }
}

/// Main poll loop. The timer fires unconditionally on schedule; each
/// cycle runs as its own task so a slow cycle can never stall the
/// cadence. Generation-checked publishing keeps stragglers from
/// overwriting newer snapshots.
async fn poll_loop(inner: Arc<MonitorInner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.refresh_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let inner = inner.clone();
                let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(async move {
                    inner.run_poll_cycle(generation).await;
                });
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Event-feed loop, polling faster than the main loop. Sleeps while the
/// feed is not plausibly relevant (no credential or no known cluster).
async fn event_loop(inner: Arc<MonitorInner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.event_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                inner.poll_events().await;
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Diagnostic cycle timer. Shares the reentrancy guard with the manual
/// trigger; an overlapping tick is simply skipped.
async fn diagnostic_loop(inner: Arc<MonitorInner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.diagnostic_interval);
    // The interval's immediate first tick would probe machines that
    // have barely booted; skip it
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if inner.scheduler.run_cycle().await {
                    let findings = inner.scheduler.findings().await;
                    inner.bus.publish(MonitorMessage::Diagnostics(findings));
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

impl MonitorInner {
    /// One poll cycle: mode decision first, then collection and
    /// aggregation for the authoritative source, then publish.
    async fn run_poll_cycle(&self, generation: u64) {
        let mode = self.mode.lock().await.mode();

        match mode {
            PollMode::Installation => {
                self.poll_installation(generation).await;
                self.observe_cluster_side().await;
            }
            PollMode::Cluster => {
                self.poll_cluster(generation).await;
            }
        }
    }

    async fn poll_installation(&self, generation: u64) {
        let clusters = match self.install_api.list_clusters().await {
            Ok(clusters) => {
                self.mode.lock().await.record_success();
                clusters
            }
            Err(e) if !e.counts_as_failure() => {
                self.mode.lock().await.record_credential_absent();
                self.publish_waiting_if_blank("Waiting for install credentials...", generation)
                    .await;
                return;
            }
            Err(e) => {
                let switched = self.mode.lock().await.record_failure();
                if let Some(reason) = switched {
                    info!(self.logger, "Switched to cluster source"; "reason" => ?reason);
                } else {
                    debug!(self.logger, "Orchestration poll failed"; "error" => %e);
                }
                return;
            }
        };

        let Some(cluster) = clusters.into_iter().next() else {
            self.publish_waiting_if_blank("Waiting for cluster to register...", generation)
                .await;
            return;
        };

        if let Some(id) = &cluster.id {
            *self.cluster_id.write().await = Some(id.clone());
        }

        let hosts = match &cluster.id {
            Some(id) => self.fetch_hosts(id).await,
            None => Vec::new(),
        };

        let snapshot =
            self.aggregator
                .from_installation(&cluster, &hosts, self.manifest.as_ref(), generation);
        self.publish(snapshot).await;
    }

    /// Host records, preferring the infra-env listing once an infra-env
    /// id has been learned; it carries identity data for hosts that
    /// have not bound to the cluster yet.
    async fn fetch_hosts(&self, cluster_id: &str) -> Vec<InstallHost> {
        let known_infra_env = self.infra_env_id.read().await.clone();

        if let Some(infra_env_id) = known_infra_env {
            if let Ok(hosts) = self.install_api.infra_env_hosts(&infra_env_id).await {
                return hosts;
            }
        }

        match self.install_api.cluster_hosts(cluster_id).await {
            Ok(hosts) => {
                if let Some(id) = hosts.iter().find_map(|h| h.infra_env_id.clone()) {
                    *self.infra_env_id.write().await = Some(id);
                }
                hosts
            }
            Err(e) => {
                debug!(self.logger, "Host listing unavailable"; "error" => %e);
                Vec::new()
            }
        }
    }

    /// Watch the cluster side while the orchestrator is authoritative,
    /// feeding the handover criteria.
    async fn observe_cluster_side(&self) {
        let reachable = self.cluster_api.reachable().await;
        let visible_nodes = if reachable {
            self.cluster_api
                .list_nodes()
                .await
                .map(|nodes| nodes.len())
                .unwrap_or(0)
        } else {
            0
        };
        let expected = self
            .manifest
            .as_ref()
            .map(|m| m.expected_node_count())
            .unwrap_or(0);

        let switched = self
            .mode
            .lock()
            .await
            .observe_cluster(reachable, visible_nodes, expected);
        if let Some(reason) = switched {
            info!(self.logger, "Switched to cluster source";
                "reason" => ?reason, "visible_nodes" => visible_nodes,
                "expected_nodes" => expected);
        }
    }

    async fn poll_cluster(&self, generation: u64) {
        let nodes = match self.cluster_api.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!(self.logger, "Cluster poll failed"; "error" => %e);
                return;
            }
        };
        let operators = match self.cluster_api.list_cluster_operators().await {
            Ok(operators) => operators,
            Err(e) => {
                debug!(self.logger, "Operator listing unavailable"; "error" => %e);
                return;
            }
        };

        let snapshot = self.aggregator.from_cluster(&nodes, &operators, generation);
        self.publish(snapshot).await;
    }

    /// Replace the current snapshot, last write wins but never
    /// backwards: a cycle that lost the race against a newer one is
    /// discarded here.
    async fn publish(&self, snapshot: ClusterSnapshot) {
        let mut current = self.snapshot.write().await;
        if snapshot.generation < current.generation {
            debug!(self.logger, "Discarding stale snapshot";
                "generation" => snapshot.generation,
                "current" => current.generation);
            return;
        }
        let snapshot = Arc::new(snapshot);
        *current = snapshot.clone();
        drop(current);

        self.bus.publish(MonitorMessage::Snapshot(snapshot));
    }

    /// Publish a waiting snapshot only when no real data has ever been
    /// shown; established data stays visible through degraded cycles.
    async fn publish_waiting_if_blank(&self, detail: &str, generation: u64) {
        let blank = self.snapshot.read().await.source == SnapshotSource::None;
        if blank {
            self.publish(ClusterSnapshot::waiting(detail, generation)).await;
        }
    }

    async fn poll_events(&self) {
        if self.tokens.read().is_none() {
            return;
        }
        let Some(cluster_id) = self.cluster_id.read().await.clone() else {
            return;
        };

        let mut events = self.events.lock().await;
        match events.poll(&self.install_api, &cluster_id).await {
            Ok(fresh) => {
                drop(events);
                for event in fresh {
                    self.bus.publish(MonitorMessage::Event(event));
                }
            }
            Err(e) => {
                debug!(self.logger, "Event poll failed"; "error" => %e);
            }
        }
    }
}
