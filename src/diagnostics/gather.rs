//! External diagnostic-gather script invocation
//!
//! When bootstrap goes sideways the operator wants the full evidence
//! bundle, which an external script assembles. The monitor only invokes
//! it: one blocking child process, a long deadline, and a scan of its
//! stdout for the line announcing where the archive landed.

use crate::error::GatherError;
use slog::{info, warn, Logger};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Stdout substrings that announce the produced archive. The path is
/// the last whitespace-delimited token of the matching line.
const ARCHIVE_MARKERS: &[&str] = &["Archive saved to", "Bundle written to"];

/// Result of a completed gather run
#[derive(Debug, Clone)]
pub struct GatherOutcome {
    /// Where the script said it wrote the archive, if it said so
    pub archive_path: Option<String>,
}

/// Run the external gather command once.
///
/// Success is solely exit code 0. A timed-out run is killed and not
/// retried; retrying a multi-minute evidence collection without an
/// operator asking for it only makes a bad situation slower.
pub async fn run_gather(
    command: &str,
    timeout: Duration,
    logger: &Logger,
) -> Result<GatherOutcome, GatherError> {
    info!(logger, "Running diagnostic gather"; "command" => command);

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| GatherError::SpawnFailed {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(GatherError::SpawnFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            warn!(logger, "Gather command timed out"; "command" => command);
            return Err(GatherError::Timeout {
                command: command.to_string(),
                seconds: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        return Err(GatherError::Failed {
            command: command.to_string(),
            code: output.status.code(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let archive_path = stdout
        .lines()
        .find(|line| ARCHIVE_MARKERS.iter().any(|marker| line.contains(marker)))
        .and_then(|line| line.split_whitespace().last())
        .map(|path| path.to_string());

    if let Some(path) = &archive_path {
        info!(logger, "Gather archive produced"; "path" => path);
    }

    Ok(GatherOutcome { archive_path })
}
