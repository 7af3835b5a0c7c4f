//! Error types for the monitoring engine

use std::fmt;

/// Errors produced by the API clients.
///
/// Nothing in this taxonomy is fatal to the polling loops: a credential
/// gap pauses orchestration-API polling, and everything else costs at
/// most the current cycle's data.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// No bearer token could be read from the install state store.
    /// Counts as a pause condition, not a source failure.
    CredentialAbsent,

    /// Network error, non-200 status, or a response body that did not
    /// decode. All three look the same to the caller: no data this cycle.
    Transient { endpoint: String, reason: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::CredentialAbsent => {
                write!(f, "no credential available in the install state store")
            }
            ApiError::Transient { endpoint, reason } => {
                write!(f, "request to {} failed: {}", endpoint, reason)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// True when the failure should count toward the source-death streak.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }
}

/// Errors loading the node-inventory manifest
#[derive(Debug)]
pub enum ManifestError {
    /// Manifest file could not be read
    Unreadable { path: String, reason: String },

    /// Manifest file was read but did not parse
    Invalid { path: String, reason: String },

    /// The rendezvous address is missing or not an IPv4 address
    BadRendezvous(String),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::Unreadable { path, reason } => {
                write!(f, "cannot read manifest {}: {}", path, reason)
            }
            ManifestError::Invalid { path, reason } => {
                write!(f, "cannot parse manifest {}: {}", path, reason)
            }
            ManifestError::BadRendezvous(value) => {
                write!(f, "bad rendezvous address in manifest: {}", value)
            }
        }
    }
}

impl std::error::Error for ManifestError {}

/// Errors from the external diagnostic-gather process
#[derive(Debug)]
pub enum GatherError {
    /// The gather process ran past its deadline. It is not retried.
    Timeout { command: String, seconds: u64 },

    /// The gather process could not be spawned
    SpawnFailed { command: String, reason: String },

    /// The gather process exited non-zero
    Failed { command: String, code: Option<i32> },
}

impl fmt::Display for GatherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatherError::Timeout { command, seconds } => {
                write!(f, "gather command '{}' timed out after {}s", command, seconds)
            }
            GatherError::SpawnFailed { command, reason } => {
                write!(f, "failed to spawn gather command '{}': {}", command, reason)
            }
            GatherError::Failed { command, code } => match code {
                Some(code) => write!(f, "gather command '{}' exited with status {}", command, code),
                None => write!(f, "gather command '{}' was killed", command),
            },
        }
    }
}

impl std::error::Error for GatherError {}
