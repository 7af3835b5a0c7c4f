use bootwatch::runtime::{MonitorMessage, MonitorRuntime};
use bootwatch::snapshot::SnapshotSource;
use bootwatch::MonitorConfig;
use clap::Parser;
use log::{error, info};
use slog::{o, Drain, Logger};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "bootwatch")]
#[command(about = "Watch an unattended cluster bootstrap to completion", long_about = None)]
struct Args {
    /// Path to the install state file holding the API auth token
    #[arg(short = 's', long, default_value = ".openshift_install_state.json")]
    state_file: PathBuf,

    /// Path to the node-inventory manifest
    #[arg(short = 'm', long, default_value = "agent-config.yaml")]
    manifest: PathBuf,

    /// Target cluster API endpoint (e.g., https://api.cluster.example:6443)
    #[arg(short = 'c', long)]
    cluster_api: String,

    /// Bearer token for the target cluster API
    #[arg(long)]
    cluster_token: Option<String>,

    /// Orchestration API base URL; derived from the manifest's
    /// rendezvous address when omitted
    #[arg(short = 'a', long)]
    api_url: Option<String>,

    /// Snapshot refresh interval in seconds
    #[arg(short = 'r', long, default_value_t = 5)]
    refresh: u64,

    /// Remote user for per-node diagnostics
    #[arg(long, default_value = "core")]
    ssh_user: String,

    /// Optional JSON file overriding the status severity table
    #[arg(long)]
    status_styles: Option<PathBuf>,

    /// External diagnostic-gather command to run on demand
    #[arg(long)]
    gather_command: Option<String>,
}

fn create_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn severity_mark(severity: bootwatch::Severity) -> &'static str {
    match severity {
        bootwatch::Severity::Ok => "✓",
        bootwatch::Severity::Working => "…",
        bootwatch::Severity::Attention => "!",
        bootwatch::Severity::Failed => "✗",
        bootwatch::Severity::Unknown => "?",
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let logger = create_logger();

    let mut config = MonitorConfig::new(args.state_file, args.manifest, args.cluster_api)
        .with_refresh_interval(Duration::from_secs(args.refresh))
        .with_ssh_user(args.ssh_user);
    config.api_base = args.api_url;
    config.cluster_api_token = args.cluster_token;
    config.status_style_path = args.status_styles;
    config.gather_command = args.gather_command;

    let runtime = match MonitorRuntime::start(config, logger) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start monitor: {}", e);
            return Err(e);
        }
    };
    let mut messages = runtime.subscribe();

    info!("Monitoring started; press Ctrl+C to stop");

    loop {
        tokio::select! {
            message = messages.recv() => {
                match message {
                    Ok(MonitorMessage::Snapshot(snapshot)) => {
                        let source = match snapshot.source {
                            SnapshotSource::None => "-",
                            SnapshotSource::Installation => "orchestrator",
                            SnapshotSource::Cluster => "cluster",
                        };
                        println!(
                            "[{}] {} {} {}% - {}",
                            source,
                            severity_mark(snapshot.status_severity),
                            snapshot.status,
                            snapshot.percent,
                            snapshot.status_detail
                        );
                        for unit in &snapshot.units {
                            println!(
                                "  {} {:<20} {:<8} {:<12} {:<10} {}",
                                severity_mark(unit.state_severity),
                                unit.display_name,
                                unit.role.as_str(),
                                unit.state,
                                unit.disk_summary.as_deref().unwrap_or("-"),
                                unit.progress_text
                            );
                        }
                    }
                    Ok(MonitorMessage::Event(event)) => {
                        println!("  event [{:?}]: {}", event.severity, event.message);
                    }
                    Ok(MonitorMessage::Diagnostics(findings)) => {
                        for (node, report) in &findings {
                            for finding in &report.findings {
                                println!(
                                    "  diag {} [{:?}]: {}",
                                    node, finding.severity, finding.message
                                );
                            }
                        }
                    }
                    // Fell behind the feed; the next snapshot resyncs us
                    Err(_) => continue,
                }
            }
            _ = signal::ctrl_c() => break,
        }
    }

    runtime.shutdown();
    info!("Stopped");
    Ok(())
}
