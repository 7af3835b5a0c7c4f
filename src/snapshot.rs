//! Snapshot data model
//!
//! One `ClusterSnapshot` is the entire state the presentation layer
//! depends on. Snapshots are immutable once produced and replaced
//! wholesale; a renderer never observes a snapshot under construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Which source produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SnapshotSource {
    /// No source has answered yet
    None,
    /// The installation orchestration API
    Installation,
    /// The target cluster's management plane
    Cluster,
}

/// Renderer-facing severity of a status or finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Working,
    Attention,
    Failed,
    Unknown,
}

/// Role of a monitored unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitRole {
    Master,
    Worker,
    Unknown,
}

impl UnitRole {
    pub fn parse(role: &str) -> Self {
        match role {
            "master" | "control-plane" => UnitRole::Master,
            "worker" => UnitRole::Worker,
            _ => UnitRole::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitRole::Master => "master",
            UnitRole::Worker => "worker",
            UnitRole::Unknown => "unknown",
        }
    }
}

/// Status of one validation check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Success,
    Failure,
    Error,
    Pending,
}

impl ValidationStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "success" => ValidationStatus::Success,
            "failure" => ValidationStatus::Failure,
            "error" => ValidationStatus::Error,
            _ => ValidationStatus::Pending,
        }
    }
}

/// One validation check result, grouped per unit by category
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFinding {
    pub category: String,
    pub check_id: String,
    pub status: ValidationStatus,
    pub message: String,
}

/// One row in the status view: a bootstrapping host early on, a joined
/// node later. Ids are unique within a snapshot but do not correlate
/// across the source switch.
#[derive(Debug, Clone, Serialize)]
pub struct UnitRow {
    pub id: String,
    pub display_name: String,
    pub role: UnitRole,
    pub state: String,
    pub state_severity: Severity,
    pub disk_summary: Option<String>,
    pub progress_text: String,
    pub validations: Vec<ValidationFinding>,
}

/// The complete, atomic status view.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub status: String,
    pub status_severity: Severity,
    pub status_detail: String,
    pub percent: u8,
    pub units: Vec<UnitRow>,
    pub source: SnapshotSource,
    /// Poll-cycle generation; replacement is last-write-wins but never
    /// backwards
    pub generation: u64,
}

impl ClusterSnapshot {
    /// The explicit "nothing answered yet" view. Absence of data is
    /// always rendered as a waiting state, never a blank.
    pub fn waiting(detail: &str, generation: u64) -> Self {
        Self {
            status: "waiting".to_string(),
            status_severity: Severity::Attention,
            status_detail: detail.to_string(),
            percent: 0,
            units: Vec::new(),
            source: SnapshotSource::None,
            generation,
        }
    }
}

/// Built-in status severity table. Status strings come from the
/// orchestration API's own vocabulary.
const DEFAULT_STYLES: &[(&str, Severity)] = &[
    ("ready", Severity::Ok),
    ("installed", Severity::Ok),
    ("known", Severity::Ok),
    ("added-to-existing-cluster", Severity::Ok),
    ("installing", Severity::Working),
    ("installing-in-progress", Severity::Working),
    ("preparing-for-installation", Severity::Working),
    ("preparing-successful", Severity::Working),
    ("waiting", Severity::Attention),
    ("pending-for-input", Severity::Attention),
    ("installing-pending-user-action", Severity::Attention),
    ("insufficient", Severity::Failed),
    ("error", Severity::Failed),
    ("cancelled", Severity::Failed),
];

/// Status-string to severity mapping.
///
/// The table is data, not logic: a JSON file of
/// `{"status-string": "severity"}` pairs can extend or override the
/// built-in entries without a code change.
#[derive(Debug, Clone)]
pub struct StatusStyles {
    map: HashMap<String, Severity>,
}

impl Default for StatusStyles {
    fn default() -> Self {
        let map = DEFAULT_STYLES
            .iter()
            .map(|(status, severity)| (status.to_string(), *severity))
            .collect();
        Self { map }
    }
}

impl StatusStyles {
    /// Load overrides from a JSON file on top of the built-in table.
    /// An unreadable or unparsable file leaves the defaults untouched.
    pub fn load(path: Option<&Path>) -> Self {
        let mut styles = Self::default();
        let Some(path) = path else {
            return styles;
        };
        let Ok(raw) = std::fs::read_to_string(path) else {
            return styles;
        };
        let Ok(overrides) = serde_json::from_str::<HashMap<String, Severity>>(&raw) else {
            return styles;
        };
        styles.map.extend(overrides);
        styles
    }

    /// Severity for a status string; unmapped statuses are Unknown.
    pub fn severity(&self, status: &str) -> Severity {
        self.map.get(status).copied().unwrap_or(Severity::Unknown)
    }
}
