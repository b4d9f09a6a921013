use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use desched_balance::BalanceOptions;
use desched_cluster::ListOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// JSON cluster snapshot to balance.
    pub snapshot_path: PathBuf,

    /// Where to write the post-run snapshot, if anywhere.
    pub snapshot_out: Option<PathBuf>,

    /// TOML policy file. `None` enables every strategy.
    pub policy_path: Option<PathBuf>,

    pub dry_run: bool,

    /// Maximum evictions per node per cycle. Zero is unlimited.
    pub max_pods_per_node: usize,

    /// Let the lister return instances bound to node-local storage.
    pub evict_local_storage: bool,

    /// Time between cycles. Zero runs a single cycle.
    pub interval: Duration,

    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let snapshot_path = lookup("DESCHED_SNAPSHOT")
            .unwrap_or_else(|| "snapshot.json".to_string())
            .into();

        let snapshot_out = lookup("DESCHED_SNAPSHOT_OUT")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let policy_path = lookup("DESCHED_POLICY")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let dry_run = lookup("DESCHED_DRY_RUN")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let max_pods_per_node = match lookup("DESCHED_MAX_PODS_PER_NODE") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid DESCHED_MAX_PODS_PER_NODE: {v}"))?,
            None => 0,
        };

        let evict_local_storage = lookup("DESCHED_EVICT_LOCAL_STORAGE")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let interval = match lookup("DESCHED_INTERVAL_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .with_context(|| format!("invalid DESCHED_INTERVAL_SECS: {v}"))?,
            ),
            None => Duration::ZERO,
        };

        let log_level = lookup("DESCHED_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            snapshot_path,
            snapshot_out,
            policy_path,
            dry_run,
            max_pods_per_node,
            evict_local_storage,
            interval,
            log_level,
        })
    }

    /// Options for a balancing pass.
    pub fn balance_options(&self) -> BalanceOptions {
        BalanceOptions {
            dry_run: self.dry_run,
            max_per_node: self.max_pods_per_node,
            list: ListOptions {
                include_local_storage: self.evict_local_storage,
            },
        }
    }
}

fn parse_bool(v: &str) -> bool {
    v == "1" || v.to_lowercase() == "true"
}
