//! Node configuration loading and validation (§6, §10).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete node configuration: `{node, network, token, trust, rl, executor,
/// dashboard}`. `rl` and `dashboard` are recognized but inert placeholders —
/// deserialized and shape-validated, never consulted by core logic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeshConfig {
    pub node: NodeSection,
    pub network: NetworkSection,
    pub token: TokenSection,
    pub trust: TrustSection,
    pub executor: ExecutorSection,
    #[serde(default)]
    pub rl: RlSection,
    #[serde(default)]
    pub dashboard: DashboardSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSection {
    pub id: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkSection {
    pub pub_port: u16,
    #[serde(default)]
    pub sub_port: u16,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
}

impl NetworkSection {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("0.0.0.0:{}", self.pub_port)
            .parse()
            .context("invalid pub_port")
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenSection {
    #[serde(default = "default_starting_balance")]
    pub starting_balance: f64,
    #[serde(default = "default_network_fee")]
    pub network_fee: f64,
    #[serde(default)]
    pub idle_reward: f64,
    #[serde(default = "default_stake_requirement")]
    pub stake_requirement: f64,
    #[serde(default = "default_success_bonus")]
    pub success_bonus: f64,
    #[serde(default = "default_late_penalty")]
    pub late_penalty: f64,
    #[serde(default)]
    pub failure_penalty: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrustSection {
    #[serde(default = "default_starting_trust")]
    pub starting_trust: f64,
    #[serde(default = "default_quarantine_threshold")]
    pub quarantine_threshold: f64,
    #[serde(default = "default_rehabilitation_jobs")]
    pub rehabilitation_jobs: u32,
    #[serde(default = "default_rehabilitation_threshold")]
    pub rehabilitation_threshold: f64,
    #[serde(default)]
    pub success_reward: f64,
    #[serde(default)]
    pub malicious_penalty: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorSection {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
}

/// Pluggable-advisor seam (§4.3, §9): reserved for a reinforcement-learning
/// fairness advisor that is out of scope. Any fields present in a config
/// file deserialize here; nothing in this crate reads them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RlSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

/// Out-of-scope operator dashboard/metrics surface (§9). Same treatment as
/// [`RlSection`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DashboardSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_discovery_interval() -> u64 {
    5
}
fn default_heartbeat_interval() -> u64 {
    10
}
fn default_max_peers() -> usize {
    256
}
fn default_starting_balance() -> f64 {
    100.0
}
fn default_network_fee() -> f64 {
    0.02
}
fn default_stake_requirement() -> f64 {
    0.1
}
fn default_success_bonus() -> f64 {
    0.05
}
fn default_late_penalty() -> f64 {
    0.1
}
fn default_starting_trust() -> f64 {
    0.5
}
fn default_quarantine_threshold() -> f64 {
    0.2
}
fn default_rehabilitation_jobs() -> u32 {
    10
}
fn default_rehabilitation_threshold() -> f64 {
    0.3
}
fn default_max_concurrent_jobs() -> u32 {
    4
}
fn default_job_timeout() -> u64 {
    30
}

impl MeshConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).context("failed to read configuration file")?;
        let config: MeshConfig = toml::from_str(&contents).context("failed to parse configuration file")?;
        Ok(config)
    }

    /// Validates the subset of configuration core logic actually consults.
    /// `rl` and `dashboard` are validated only for deserializability, never
    /// for semantic content (§6, §9).
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.token.network_fee) {
            anyhow::bail!("token.network_fee must be between 0.0 and 1.0");
        }
        if self.token.stake_requirement <= 0.0 {
            anyhow::bail!("token.stake_requirement must be positive");
        }
        if !(0.0..=1.0).contains(&self.trust.starting_trust) {
            anyhow::bail!("trust.starting_trust must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.trust.quarantine_threshold) {
            anyhow::bail!("trust.quarantine_threshold must be between 0.0 and 1.0");
        }
        if self.executor.max_concurrent_jobs == 0 {
            anyhow::bail!("executor.max_concurrent_jobs must be at least 1");
        }
        if self.executor.job_timeout_secs == 0 {
            anyhow::bail!("executor.job_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        if self.node.data_dir.is_absolute() {
            self.node.data_dir.clone()
        } else {
            std::env::current_dir().unwrap_or_default().join(&self.node.data_dir)
        }
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.data_dir().join("checkpoints")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir().join(format!("ledger_{}.jsonl", self.node.id))
    }

    pub fn wallet_snapshot_path(&self) -> PathBuf {
        self.data_dir().join(format!("wallet_{}.json", self.node.id))
    }

    pub fn reputation_path(&self) -> PathBuf {
        self.data_dir().join(format!("reputation_{}.json", self.node.id))
    }

    pub fn signing_key_path(&self) -> PathBuf {
        self.data_dir().join("signing_key.json")
    }

    pub fn encryption_key_path(&self) -> PathBuf {
        self.data_dir().join("encryption_key.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> MeshConfig {
        MeshConfig {
            node: NodeSection {
                id: "n1".into(),
                data_dir: PathBuf::from("/tmp/mesh-test"),
                log_level: "info".into(),
            },
            network: NetworkSection {
                pub_port: 9000,
                sub_port: 0,
                bootstrap_peers: vec![],
                discovery_interval_secs: 5,
                heartbeat_interval_secs: 10,
                max_peers: 256,
            },
            token: TokenSection {
                starting_balance: 100.0,
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

    #[test]
    fn valid_config_passes() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn out_of_range_network_fee_fails() {
        let mut config = minimal_config();
        config.token.network_fee = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_concurrent_jobs_fails() {
        let mut config = minimal_config();
        config.executor.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());
    }
}
