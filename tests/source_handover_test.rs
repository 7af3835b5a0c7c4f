use bootwatch::runtime::MonitorRuntime;
use bootwatch::snapshot::{SnapshotSource, UnitRole};
use bootwatch::{MonitorConfig, PollMode};
use httpmock::prelude::*;
use slog::{o, Drain, Logger};
use std::io::Write;
use std::time::Duration;

fn create_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Mock a management plane where every expected node has joined and the
/// control-plane operators are partway through rollout.
fn mock_cluster_side(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/version");
        then.status(200).json_body(serde_json::json!({"gitVersion": "v1.31.0"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/nodes");
        then.status(200).json_body(serde_json::json!({
            "items": [
                {"metadata": {"name": "master-0", "uid": "u0",
                              "labels": {"node-role.kubernetes.io/master": ""}},
                 "status": {"conditions": [{"type": "Ready", "status": "True"}],
                            "nodeInfo": {"kubeletVersion": "v1.31.0"}}},
                {"metadata": {"name": "master-1", "uid": "u1",
                              "labels": {"node-role.kubernetes.io/control-plane": ""}},
                 "status": {"conditions": [{"type": "Ready", "status": "True"}],
                            "nodeInfo": {"kubeletVersion": "v1.31.0"}}},
                {"metadata": {"name": "worker-0", "uid": "u2"},
                 "status": {"conditions": [{"type": "Ready", "status": "True"}],
                            "nodeInfo": {"kubeletVersion": "v1.31.0"}}}
            ]
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/apis/config.openshift.io/v1/clusteroperators");
        then.status(200).json_body(serde_json::json!({
            "items": [
                {"metadata": {"name": "etcd"},
                 "status": {"conditions": [
                     {"type": "Progressing", "status": "True", "message": "rolling out"},
                     {"type": "Available", "status": "False"}]}},
                {"metadata": {"name": "console"},
                 "status": {"conditions": [{"type": "Available", "status": "True"}]}}
            ]
        }));
    });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_graceful_handover_to_cluster_source() {
    let install_server = MockServer::start();
    let cluster_server = MockServer::start();

    // The orchestrator is still answering, but with nothing useful yet
    install_server.mock(|when, then| {
        when.method(GET).path("/clusters");
        then.status(200).json_body(serde_json::json!([]));
    });
    install_server.mock(|when, then| {
        when.method(GET).path("/events");
        then.status(200).json_body(serde_json::json!([]));
    });
    mock_cluster_side(&cluster_server);

    let state = write_temp(r#"{"*gencrypto.AuthConfig": {"UserAuthToken": "test-token"}}"#);
    let manifest = write_temp(
        r#"
rendezvousIP: 192.168.1.201
hosts:
  - hostname: master-0
    role: master
  - hostname: master-1
    role: master
  - hostname: worker-0
    role: worker
"#,
    );

    let config = MonitorConfig::new(
        state.path().to_path_buf(),
        manifest.path().to_path_buf(),
        cluster_server.base_url(),
    )
    .with_api_base(install_server.base_url())
    .with_refresh_interval(Duration::from_millis(200));

    println!("=== Step 1: start while the orchestrator is authoritative ===");
    let runtime = MonitorRuntime::start(config, create_logger()).unwrap();

    println!("=== Step 2: all three expected nodes are visible; expect handover ===");
    let mut switched = false;
    for _ in 0..50 {
        if runtime.mode().await == PollMode::Cluster {
            switched = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(switched, "expected a graceful handover to the cluster source");

    println!("=== Step 3: the snapshot must come from the cluster source ===");
    let mut snapshot = runtime.snapshot().await;
    for _ in 0..50 {
        if snapshot.source == SnapshotSource::Cluster {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        snapshot = runtime.snapshot().await;
    }
    assert_eq!(snapshot.source, SnapshotSource::Cluster);

    // 3/3 nodes ready (30 points) + 1/2 operators available (35 points)
    assert_eq!(snapshot.percent, 65);
    assert_eq!(snapshot.status, "installing");
    assert_eq!(snapshot.units.len(), 3);

    println!("=== Step 4: rollout attribution lands on the masters ===");
    for unit in &snapshot.units {
        match unit.role {
            UnitRole::Master => {
                assert_eq!(unit.progress_text, "rolling out: etcd");
            }
            _ => {
                assert_eq!(unit.progress_text, "v1.31.0");
            }
        }
    }

    println!("✓ Handover complete and cluster snapshot consistent");
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_handover_while_nodes_missing() {
    let install_server = MockServer::start();
    let cluster_server = MockServer::start();

    install_server.mock(|when, then| {
        when.method(GET).path("/clusters");
        then.status(200).json_body(serde_json::json!([]));
    });
    install_server.mock(|when, then| {
        when.method(GET).path("/events");
        then.status(200).json_body(serde_json::json!([]));
    });

    // Control plane answers, but only one of three nodes has joined
    cluster_server.mock(|when, then| {
        when.method(GET).path("/version");
        then.status(200).json_body(serde_json::json!({"gitVersion": "v1.31.0"}));
    });
    cluster_server.mock(|when, then| {
        when.method(GET).path("/api/v1/nodes");
        then.status(200).json_body(serde_json::json!({
            "items": [{"metadata": {"name": "master-0"},
                       "status": {"conditions": [{"type": "Ready", "status": "True"}]}}]
        }));
    });

    let state = write_temp(r#"{"*gencrypto.AuthConfig": {"UserAuthToken": "test-token"}}"#);
    let manifest = write_temp(
        r#"
rendezvousIP: 192.168.1.201
hosts:
  - hostname: master-0
    role: master
  - hostname: master-1
    role: master
  - hostname: worker-0
    role: worker
"#,
    );

    let config = MonitorConfig::new(
        state.path().to_path_buf(),
        manifest.path().to_path_buf(),
        cluster_server.base_url(),
    )
    .with_api_base(install_server.base_url())
    .with_refresh_interval(Duration::from_millis(200));

    let runtime = MonitorRuntime::start(config, create_logger()).unwrap();

    // Give the monitor several poll cycles to (wrongly) switch
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        runtime.mode().await,
        PollMode::Installation,
        "one visible node out of three expected must not trigger handover"
    );

    runtime.shutdown();
}
