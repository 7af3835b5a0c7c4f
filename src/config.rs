//! Configuration for the bootstrap monitor

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a running monitor.
///
/// Every knob the engine consults lives here as an explicit field; the
/// components receive what they need at construction and nothing reads
/// ambient global state.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Path to the install state JSON blob the auth token is read from
    pub state_file: PathBuf,

    /// Base URL of the installation orchestration API
    /// (e.g., "http://192.168.1.201:8090/api/assisted-install/v2").
    /// If None, derived from the manifest's rendezvous address.
    pub api_base: Option<String>,

    /// Base URL of the target cluster's management plane
    /// (e.g., "https://api.cluster.example:6443")
    pub cluster_api_base: String,

    /// Bearer token for the target cluster's management plane.
    /// None restricts the cluster client to the unauthenticated
    /// reachability probe; authenticated reads fail soft.
    pub cluster_api_token: Option<String>,

    /// Path to the node-inventory manifest (YAML). A missing manifest
    /// disables manifest-backed features for the process lifetime.
    pub manifest_path: PathBuf,

    /// Main snapshot refresh interval
    pub refresh_interval: Duration,

    /// Event feed poll interval. Faster than the snapshot refresh:
    /// events are latency-sensitive narrative, the percentage is not.
    pub event_interval: Duration,

    /// Per-node diagnostic cycle interval
    pub diagnostic_interval: Duration,

    /// Timeout for orchestration / management plane reads
    pub api_timeout: Duration,

    /// Timeout for the cheap reachability probe
    pub probe_timeout: Duration,

    /// Overall timeout for one remote diagnostic command
    pub ssh_timeout: Duration,

    /// Timeout for the external gather script
    pub gather_timeout: Duration,

    /// Successful orchestration reads required before a failure streak
    /// may be interpreted as source death
    pub success_threshold: u32,

    /// Consecutive orchestration failures that confirm source death
    pub failure_threshold: u32,

    /// Escape hatch for a handover the node-count criterion never
    /// confirms: once installation-mode polling has run this long and
    /// the cluster endpoint answers the probe, switch anyway.
    /// None disables the deadline.
    pub handover_deadline: Option<Duration>,

    /// Maximum concurrent remote diagnostic probes
    pub diagnostic_workers: usize,

    /// Remote user for diagnostic probes
    pub ssh_user: String,

    /// Optional identity file for diagnostic probes
    pub ssh_key: Option<PathBuf>,

    /// Optional JSON file overriding the status severity table
    pub status_style_path: Option<PathBuf>,

    /// Optional external diagnostic-gather command
    pub gather_command: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(".openshift_install_state.json"),
            api_base: None,
            cluster_api_base: String::new(),
            cluster_api_token: None,
            manifest_path: PathBuf::from("agent-config.yaml"),
            refresh_interval: Duration::from_secs(5),
            event_interval: Duration::from_secs(2),
            diagnostic_interval: Duration::from_secs(60),
            api_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(3),
            ssh_timeout: Duration::from_secs(30),
            gather_timeout: Duration::from_secs(600),
            success_threshold: 5,
            failure_threshold: 3,
            handover_deadline: Some(Duration::from_secs(90 * 60)),
            diagnostic_workers: 6,
            ssh_user: "core".to_string(),
            ssh_key: None,
            status_style_path: None,
            gather_command: None,
        }
    }
}

impl MonitorConfig {
    /// Create a configuration for monitoring a given cluster endpoint.
    pub fn new(state_file: PathBuf, manifest_path: PathBuf, cluster_api_base: String) -> Self {
        Self {
            state_file,
            manifest_path,
            cluster_api_base,
            ..Default::default()
        }
    }

    /// Set the orchestration API base URL explicitly instead of deriving
    /// it from the manifest's rendezvous address.
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = Some(api_base);
        self
    }

    /// Set the management-plane bearer token.
    pub fn with_cluster_api_token(mut self, token: String) -> Self {
        self.cluster_api_token = Some(token);
        self
    }

    /// Set the main refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the mode-switch thresholds.
    pub fn with_thresholds(mut self, success_threshold: u32, failure_threshold: u32) -> Self {
        self.success_threshold = success_threshold;
        self.failure_threshold = failure_threshold;
        self
    }

    /// Set or disable the handover deadline.
    pub fn with_handover_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.handover_deadline = deadline;
        self
    }

    /// Set the remote user used for diagnostic probes.
    pub fn with_ssh_user(mut self, user: String) -> Self {
        self.ssh_user = user;
        self
    }

    /// Set the external gather command.
    pub fn with_gather_command(mut self, command: String) -> Self {
        self.gather_command = Some(command);
        self
    }
}
