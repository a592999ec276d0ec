//! Shared multi-node test harness: spins up real `MeshNode`s bound to
//! loopback TCP ports and cross-registers them as peers, so these tests
//! exercise the actual gossip wire path rather than calling subsystem
//! methods directly in-process.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use mesh_core::Job;
use mesh_node::{MeshConfig, MeshNode};
use mesh_node::config::{
    DashboardSection, ExecutorSection, NetworkSection, NodeSection, RlSection, TokenSection, TrustSection,
};

/// Builds a config for a node listening on `port`, with its own isolated
/// data directory under `base`. Ports must be distinct per node within a
/// test, and distinct across test files sharing the default test runner.
pub fn config(base: &std::path::Path, name: &str, port: u16) -> MeshConfig {
    MeshConfig {
        node: NodeSection {
            id: name.to_string(),
            data_dir: base.join(name),
            log_level: "info".to_string(),
        },
        network: NetworkSection {
            pub_port: port,
            sub_port: 0,
            bootstrap_peers: vec![],
            discovery_interval_secs: 5,
            heartbeat_interval_secs: 10,
            max_peers: 256,
        },
        token: TokenSection {
            starting_balance: 1000.0,
            network_fee: 0.02,
            idle_reward: 0.0,
            stake_requirement: 0.1,
            success_bonus: 0.05,
            late_penalty: 0.1,
            failure_penalty: 0.0,
        },
        trust: TrustSection {
            starting_trust: 0.5,
            quarantine_threshold: 0.2,
            rehabilitation_jobs: 10,
            rehabilitation_threshold: 0.3,
            success_reward: 0.0,
            malicious_penalty: 0.0,
        },
        executor: ExecutorSection {
            max_concurrent_jobs: 4,
            job_timeout_secs: 30,
        },
        rl: RlSection::default(),
        dashboard: DashboardSection::default(),
    }
}

/// Note: `NetworkSection::listen_addr` binds `0.0.0.0:<port>`; peers then
/// dial each other at `127.0.0.1:<port>`, which routes back to the same
/// listener on a single test host.
pub async fn spawn_cluster(data_dir: &std::path::Path, ports: &[u16]) -> Vec<Arc<MeshNode>> {
    let mut nodes = Vec::new();
    for (i, &port) in ports.iter().enumerate() {
        let cfg = config(data_dir, &format!("node{i}"), port);
        let node = MeshNode::new(cfg).await.expect("node should start");
        nodes.push((node, port));
    }

    for i in 0..nodes.len() {
        for j in 0..nodes.len() {
            if i == j {
                continue;
            }
            let (ref node_i, _) = nodes[i];
            let (peer_id, peer_port) = {
                let (ref node_j, port_j) = nodes[j];
                (node_j.self_id.clone(), port_j)
            };
            node_i
                .gossip
                .register_peer(peer_id, format!("node{j}"), "127.0.0.1".to_string(), peer_port, String::new());
        }
    }

    nodes.into_iter().map(|(n, _)| n).collect()
}

pub fn shell_job(job_id: &str, command: &str, deadline_secs_from_now: f64) -> Job {
    Job {
        job_id: job_id.to_string(),
        job_type: "shell".to_string(),
        priority: 0.5,
        payment: 100.0,
        deadline: mesh_core::now_unix() + deadline_secs_from_now,
        requirements: BTreeSet::new(),
        payload: command.as_bytes().to_vec(),
        verify: false,
        verifiers: vec![],
        timestamp: mesh_core::now_unix(),
    }
}

pub fn tmp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "mesh-e2e-{label}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
