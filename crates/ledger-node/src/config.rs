use crate::constants::{DEFAULT_PERSIST_INTERVAL_SECS, DEFAULT_RECONCILE_INTERVAL_SECS};
use clap::Parser;
use ledger_core::constants::DEFAULT_DIFFICULTY;
use ledger_core::{ChainConfig, MiningStrategy};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-node")]
#[command(about = "Tamper-evident audit ledger for order state transitions")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Data directory for sled
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Leading zero hex characters required of each block hash (0 disables mining)
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u32,

    /// Search nonces on all cores instead of one
    #[arg(long)]
    pub parallel_mining: bool,

    /// Peer base URLs, comma separated (e.g. http://10.0.0.2:8080,http://10.0.0.3:8080)
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Seconds between reconciliation passes
    #[arg(long, default_value_t = DEFAULT_RECONCILE_INTERVAL_SECS)]
    pub reconcile_interval_secs: u64,

    /// Seconds between flushes of new blocks to disk
    #[arg(long, default_value_t = DEFAULT_PERSIST_INTERVAL_SECS)]
    pub persist_interval_secs: u64,
}

impl Args {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            difficulty: self.difficulty,
            mining: if self.parallel_mining {
                MiningStrategy::Parallel
            } else {
                MiningStrategy::Sequential
            },
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }
}
