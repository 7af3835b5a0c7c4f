//! Sectioned diagnostic output parsing
//!
//! The remote probe runs one consolidated command whose output is split
//! into named sections by sentinel markers. Each section is interpreted
//! independently; a malformed section costs only its own findings.

use std::collections::HashMap;

/// Marker line prefix emitted by the remote command before each section
pub const SECTION_PREFIX: &str = "--bootwatch-section:";

/// Disk usage above this percentage (strictly) is reported
pub const DISK_USAGE_THRESHOLD: u64 = 85;

/// Memory usage above this percentage (strictly) is reported
pub const MEMORY_USAGE_THRESHOLD: u64 = 90;

/// How many matching lines a single bucket may surface
const MAX_LINES_PER_BUCKET: usize = 3;

/// Severity of a node health finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticSeverity {
    Ok,
    Info,
    Warning,
    Error,
}

/// One node health fact from a diagnostic cycle
#[derive(Debug, Clone)]
pub struct DiagnosticFinding {
    pub severity: DiagnosticSeverity,
    pub message: String,
}

impl DiagnosticFinding {
    pub fn new(severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    /// The synthetic all-clear finding. A checked, clean node gets this
    /// instead of an empty list so "checked, clean" and "not yet
    /// checked" stay distinguishable.
    pub fn no_issues() -> Self {
        Self::new(DiagnosticSeverity::Ok, "No issues detected")
    }
}

/// Parse one probe's full output into findings.
///
/// Never fails and never returns an empty list: output with no
/// recognizable problems yields the single all-clear finding.
pub fn parse_report(output: &str) -> Vec<DiagnosticFinding> {
    let mut findings = Vec::new();

    for (section, lines) in split_sections(output) {
        match section.as_str() {
            "services" => parse_services(&lines, &mut findings),
            "logs" => parse_logs(&lines, &mut findings),
            "machineconfig" => parse_machine_config(&lines, &mut findings),
            "disk" => parse_disk(&lines, &mut findings),
            "memory" => parse_memory(&lines, &mut findings),
            "containers" => parse_containers(&lines, &mut findings),
            _ => {}
        }
    }

    if findings.is_empty() {
        findings.push(DiagnosticFinding::no_issues());
    }
    findings
}

/// Split output into (section name, non-empty lines) in marker order.
fn split_sections(output: &str) -> Vec<(String, Vec<String>)> {
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(SECTION_PREFIX) {
            let name = rest.trim_end_matches('-').trim().to_string();
            sections.push((name, Vec::new()));
        } else if !trimmed.is_empty() {
            if let Some((_, lines)) = sections.last_mut() {
                lines.push(trimmed.to_string());
            }
        }
    }

    sections
}

/// Lines of "unit-name state"; anything not active is worth surfacing.
fn parse_services(lines: &[String], findings: &mut Vec<DiagnosticFinding>) {
    for line in lines {
        let mut parts = line.split_whitespace();
        let (Some(unit), Some(state)) = (parts.next(), parts.next()) else {
            continue;
        };
        if state != "active" {
            findings.push(DiagnosticFinding::new(
                DiagnosticSeverity::Warning,
                format!("service {} is {}", unit, state),
            ));
        }
    }
}

/// Grep output from the node's journal, classified into certificate,
/// image-pull, and other buckets. Only the most recent few lines per
/// bucket are surfaced.
fn parse_logs(lines: &[String], findings: &mut Vec<DiagnosticFinding>) {
    let mut buckets: HashMap<&str, Vec<&String>> = HashMap::new();

    for line in lines {
        let lower = line.to_lowercase();
        let bucket = if lower.contains("x509") || lower.contains("certificate") {
            "certificate"
        } else if lower.contains("imagepull") || lower.contains("image pull") {
            "image-pull"
        } else {
            "other"
        };
        buckets.entry(bucket).or_default().push(line);
    }

    for (bucket, severity) in [
        ("certificate", DiagnosticSeverity::Error),
        ("image-pull", DiagnosticSeverity::Warning),
        ("other", DiagnosticSeverity::Warning),
    ] {
        let Some(lines) = buckets.get(bucket) else {
            continue;
        };
        let recent = lines.len().saturating_sub(MAX_LINES_PER_BUCKET);
        for line in &lines[recent..] {
            findings.push(DiagnosticFinding::new(
                severity,
                format!("{} error in logs: {}", bucket, line),
            ));
        }
    }
}

/// The machine-config daemon writes its rendered config id once the node
/// has one; an empty section means the node has not converged yet.
fn parse_machine_config(lines: &[String], findings: &mut Vec<DiagnosticFinding>) {
    if lines.is_empty() {
        findings.push(DiagnosticFinding::new(
            DiagnosticSeverity::Info,
            "no rendered machine config observed yet",
        ));
    }
}

/// `df -P` body lines: filesystem, blocks, used, available, capacity,
/// mount point. The threshold is strictly greater-than.
fn parse_disk(lines: &[String], findings: &mut Vec<DiagnosticFinding>) {
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            continue;
        }
        let Ok(used) = fields[4].trim_end_matches('%').parse::<u64>() else {
            continue;
        };
        let mount = fields[5];
        if used > DISK_USAGE_THRESHOLD {
            findings.push(DiagnosticFinding::new(
                DiagnosticSeverity::Warning,
                format!("disk usage {}% on {}", used, mount),
            ));
        }
    }
}

/// One line of "total-kb used-kb" from the memory summary.
fn parse_memory(lines: &[String], findings: &mut Vec<DiagnosticFinding>) {
    let Some(line) = lines.first() else {
        return;
    };
    let mut parts = line.split_whitespace();
    let (Some(total), Some(used)) = (parts.next(), parts.next()) else {
        return;
    };
    let (Ok(total), Ok(used)) = (total.parse::<u64>(), used.parse::<u64>()) else {
        return;
    };
    if total == 0 {
        return;
    }

    let percent = used * 100 / total;
    if percent > MEMORY_USAGE_THRESHOLD {
        findings.push(DiagnosticFinding::new(
            DiagnosticSeverity::Warning,
            format!("memory usage {}%", percent),
        ));
    }
}

/// Trailing listing of containers that are not running.
fn parse_containers(lines: &[String], findings: &mut Vec<DiagnosticFinding>) {
    let recent = lines.len().saturating_sub(MAX_LINES_PER_BUCKET);
    for line in &lines[recent..] {
        findings.push(DiagnosticFinding::new(
            DiagnosticSeverity::Warning,
            format!("container not running: {}", line),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, body: &str) -> String {
        format!("{}{}--\n{}\n", SECTION_PREFIX, name, body)
    }

    #[test]
    fn test_clean_output_yields_single_ok_finding() {
        let output = [
            section("services", "kubelet active\ncrio active"),
            section("logs", ""),
            section("machineconfig", "rendered-master-abc123"),
            section("disk", "/dev/sda4 104857600 52428800 52428800 50% /var"),
            section("memory", "16384000 8192000"),
            section("containers", ""),
        ]
        .concat();

        let findings = parse_report(&output);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, DiagnosticSeverity::Ok);
        assert_eq!(findings[0].message, "No issues detected");
    }

    #[test]
    fn test_empty_output_yields_single_ok_finding() {
        let findings = parse_report("");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "No issues detected");
    }

    #[test]
    fn test_inactive_service_is_surfaced() {
        let output = section("services", "kubelet inactive\ncrio active");
        let findings = parse_report(&output);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, DiagnosticSeverity::Warning);
        assert_eq!(findings[0].message, "service kubelet is inactive");
    }

    #[test]
    fn test_disk_threshold_is_strictly_greater() {
        let over = section("disk", "/dev/sda4 100 86 14 86% /var");
        let findings = parse_report(&over);
        assert_eq!(findings[0].severity, DiagnosticSeverity::Warning);
        assert_eq!(findings[0].message, "disk usage 86% on /var");

        let exactly = section("disk", "/dev/sda4 100 85 15 85% /var");
        let findings = parse_report(&exactly);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "No issues detected");
    }

    #[test]
    fn test_memory_threshold_is_strictly_greater() {
        let over = section("memory", "1000 911");
        let findings = parse_report(&over);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "memory usage 91%");

        let exactly = section("memory", "1000 900");
        let findings = parse_report(&exactly);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "No issues detected");
    }

    #[test]
    fn test_log_classification_buckets() {
        let body = "\
Jan 01 kubelet: x509: certificate signed by unknown authority
Jan 01 kubelet: Failed to pull image: ImagePullBackOff
Jan 01 kubelet: generic failure happened";
        let findings = parse_report(&section("logs", body));

        assert!(findings.iter().any(|f| f.severity == DiagnosticSeverity::Error
            && f.message.starts_with("certificate error in logs:")));
        assert!(findings.iter().any(|f| f.severity == DiagnosticSeverity::Warning
            && f.message.starts_with("image-pull error in logs:")));
        assert!(findings.iter().any(|f| f.severity == DiagnosticSeverity::Warning
            && f.message.starts_with("other error in logs:")));
    }

    #[test]
    fn test_log_bucket_caps_at_most_recent_lines() {
        let body = (0..10)
            .map(|i| format!("x509 failure number {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let findings = parse_report(&section("logs", &body));

        assert_eq!(findings.len(), 3);
        // The most recent lines survive, oldest are dropped
        assert!(findings[0].message.contains("number 7"));
        assert!(findings[2].message.contains("number 9"));
    }

    #[test]
    fn test_missing_machine_config_is_info() {
        let output = section("machineconfig", "");
        let findings = parse_report(&output);
        assert_eq!(findings[0].severity, DiagnosticSeverity::Info);
    }

    #[test]
    fn test_non_running_containers_capped() {
        let body = "one Exited\ntwo Exited\nthree Exited\nfour Exited";
        let findings = parse_report(&section("containers", body));
        assert_eq!(findings.len(), 3);
        assert!(findings[0].message.contains("two"));
        assert!(findings[2].message.contains("four"));
    }

    #[test]
    fn test_sections_interpret_independently() {
        // A garbage section does not stop later sections from parsing
        let output = [
            section("disk", "garbage line that is not df output"),
            section("services", "kubelet failed"),
        ]
        .concat();
        let findings = parse_report(&output);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "service kubelet is failed");
    }
}
