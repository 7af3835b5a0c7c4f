//! Data-source mode state machine
//!
//! Decides which of the two progress sources is authoritative. The
//! machine starts on the orchestration API and moves to the cluster's
//! own management plane exactly once; there is no way back, because the
//! orchestration API lives on a machine that is consumed by the install.
//!
//! Pure synchronous logic over explicit counters, so the transition
//! rules are testable without a network.

use std::time::{Duration, Instant};

/// Which data source is currently authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Early phase: the installation orchestration API answers
    Installation,
    /// Terminal phase: the target cluster's management plane answers
    Cluster,
}

/// Why the controller moved to cluster mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    /// The control plane answered and every expected node is visible
    /// through it. The preferred path: the new source has proven itself
    /// while the old one may still be answering.
    NodesVisible,

    /// The orchestration API answered in the past, then failed enough
    /// times in a row to be presumed torn down.
    SourceSilent,

    /// Installation mode outlived its deadline while the control plane
    /// was answering the probe. Safety valve for an expected node count
    /// that never materializes.
    DeadlineReached,
}

/// Tunables for the transition rules
#[derive(Debug, Clone)]
pub struct ModeThresholds {
    /// Successful reads required before a failure streak means death
    pub success_threshold: u32,
    /// Consecutive failures that confirm death
    pub failure_threshold: u32,
    /// Maximum lifetime of installation mode once the cluster endpoint
    /// answers; None disables the deadline
    pub handover_deadline: Option<Duration>,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            success_threshold: 5,
            failure_threshold: 3,
            handover_deadline: None,
        }
    }
}

/// State machine deciding the authoritative data source.
#[derive(Debug)]
pub struct ModeController {
    mode: PollMode,
    thresholds: ModeThresholds,
    consecutive_failures: u32,
    cumulative_successes: u32,
    last_switch_reason: Option<SwitchReason>,
    entered_installation_at: Instant,
}

impl ModeController {
    pub fn new(thresholds: ModeThresholds) -> Self {
        Self {
            mode: PollMode::Installation,
            thresholds,
            consecutive_failures: 0,
            cumulative_successes: 0,
            last_switch_reason: None,
            entered_installation_at: Instant::now(),
        }
    }

    pub fn mode(&self) -> PollMode {
        self.mode
    }

    pub fn last_switch_reason(&self) -> Option<SwitchReason> {
        self.last_switch_reason
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn cumulative_successes(&self) -> u32 {
        self.cumulative_successes
    }

    /// Record a successful orchestration read. Any success breaks the
    /// failure streak: a single failure must never look like death.
    pub fn record_success(&mut self) {
        if self.mode != PollMode::Installation {
            return;
        }
        self.consecutive_failures = 0;
        self.cumulative_successes = self.cumulative_successes.saturating_add(1);
    }

    /// Record a failed orchestration read.
    ///
    /// # Returns
    /// The switch reason when this failure completes the death criteria:
    /// the source must have proven itself first (successes above the
    /// threshold) and then failed enough consecutive times.
    pub fn record_failure(&mut self) -> Option<SwitchReason> {
        if self.mode != PollMode::Installation {
            return None;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.cumulative_successes > self.thresholds.success_threshold
            && self.consecutive_failures >= self.thresholds.failure_threshold
        {
            self.switch(SwitchReason::SourceSilent);
            return Some(SwitchReason::SourceSilent);
        }
        None
    }

    /// Record that no credential was available this cycle.
    ///
    /// A missing credential is a setup gap, not source death; it touches
    /// neither counter so it can never trip the failure path.
    pub fn record_credential_absent(&mut self) {}

    /// Feed the controller the latest cluster-side observation.
    ///
    /// # Arguments
    /// * `reachable` - the cheap control-plane probe answered
    /// * `visible_nodes` - nodes currently listed by the management plane
    /// * `expected_nodes` - node count expected from the inventory manifest
    pub fn observe_cluster(
        &mut self,
        reachable: bool,
        visible_nodes: usize,
        expected_nodes: usize,
    ) -> Option<SwitchReason> {
        self.evaluate_handover(
            reachable,
            visible_nodes,
            expected_nodes,
            self.entered_installation_at.elapsed(),
        )
    }

    fn evaluate_handover(
        &mut self,
        reachable: bool,
        visible_nodes: usize,
        expected_nodes: usize,
        installation_age: Duration,
    ) -> Option<SwitchReason> {
        if self.mode != PollMode::Installation || !reachable {
            return None;
        }

        if visible_nodes >= expected_nodes.max(1) {
            self.switch(SwitchReason::NodesVisible);
            return Some(SwitchReason::NodesVisible);
        }

        if let Some(deadline) = self.thresholds.handover_deadline {
            if installation_age >= deadline {
                self.switch(SwitchReason::DeadlineReached);
                return Some(SwitchReason::DeadlineReached);
            }
        }

        None
    }

    fn switch(&mut self, reason: SwitchReason) {
        self.mode = PollMode::Cluster;
        self.last_switch_reason = Some(reason);
    }
}
