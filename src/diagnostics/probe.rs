//! Remote per-node health probe
//!
//! Node-local facts (service state, log errors, machine-config
//! convergence, disk and memory pressure, stopped containers) are not
//! visible through either API. The probe gathers them with a single
//! consolidated command over ssh and classifies the sectioned output.
//!
//! A probe never raises: every failure mode collapses to findings, so a
//! dead node shows up as "unreachable" in the same place a healthy node
//! shows "No issues detected".

use crate::diagnostics::parser::{parse_report, DiagnosticFinding, DiagnosticSeverity, SECTION_PREFIX};
use slog::{debug, Logger};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// The consolidated remote command. Section markers must match the
/// parser's `SECTION_PREFIX`.
const REMOTE_SCRIPT: &str = r#"
echo '--bootwatch-section:services--'
for unit in kubelet crio; do
  printf '%s %s\n' "$unit" "$(systemctl is-active $unit 2>/dev/null)"
done
echo '--bootwatch-section:logs--'
journalctl -u kubelet --since '-15 min' --no-pager 2>/dev/null \
  | grep -iE 'x509|certificate|imagepull|image pull|pull backoff' | tail -n 20
echo '--bootwatch-section:machineconfig--'
cat /etc/machine-config-daemon/currentconfig 2>/dev/null
echo '--bootwatch-section:disk--'
df -P /var /sysroot 2>/dev/null | tail -n +2
echo '--bootwatch-section:memory--'
awk '/MemTotal/ {t=$2} /MemAvailable/ {a=$2} END {print t, t-a}' /proc/meminfo
echo '--bootwatch-section:containers--'
sudo crictl ps -a 2>/dev/null | tail -n +2 | grep -v Running | tail -n 5
"#;

/// Executes the consolidated health check against one node.
pub struct NodeDiagnosticProbe {
    ssh_user: String,
    ssh_key: Option<PathBuf>,
    timeout: Duration,
    logger: Logger,
}

impl NodeDiagnosticProbe {
    pub fn new(
        ssh_user: String,
        ssh_key: Option<PathBuf>,
        timeout: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            ssh_user,
            ssh_key,
            timeout,
            logger,
        }
    }

    /// Probe one node and classify whatever came back.
    ///
    /// # Returns
    /// Ordered findings; at least one element, always. Timeouts and
    /// connection failures become a single error finding.
    pub async fn probe(&self, hostname: &str, address: &str) -> Vec<DiagnosticFinding> {
        debug!(self.logger, "Probing node"; "hostname" => hostname, "address" => address);

        match tokio::time::timeout(self.timeout, self.run_remote(address)).await {
            Err(_) => vec![DiagnosticFinding::new(
                DiagnosticSeverity::Error,
                format!("diagnostic probe timed out after {}s", self.timeout.as_secs()),
            )],
            Ok(Err(reason)) => vec![DiagnosticFinding::new(
                DiagnosticSeverity::Error,
                format!("node unreachable: {}", reason),
            )],
            Ok(Ok(output)) => parse_report(&output),
        }
    }

    async fn run_remote(&self, address: &str) -> Result<String, String> {
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg("ConnectTimeout=5");

        if let Some(key) = &self.ssh_key {
            command.arg("-i").arg(key);
        }

        command
            .arg(format!("{}@{}", self.ssh_user, address))
            .arg(REMOTE_SCRIPT)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = command.output().await.map_err(|e| e.to_string())?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        // A non-zero exit with usable sectioned output still parses:
        // the last remote command's status decides the exit code, not
        // whether the connection worked.
        if output.status.success() || stdout.contains(SECTION_PREFIX) {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("connection failed");
            Err(reason.to_string())
        }
    }
}
