//! Timer-driven background work: reconciliation with peers and flushing blocks to disk.

use crate::peer::HttpPeer;
use ledger_core::{reconcile::Reconciler, Chain, ChainStore};
use ledger_storage::SledStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

pub async fn reconcile_loop(
    reconciler: Reconciler<HttpPeer>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        peers = reconciler.peers().len(),
        every_secs = every.as_secs(),
        "reconciler started"
    );
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = reconciler.reconcile_once().await;
                match report.adopted() {
                    Some(height) => info!(height, "reconciliation adopted a peer chain"),
                    None => debug!(outcomes = ?report.outcomes, "reconciliation pass complete"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("reconciler stopped");
}

pub async fn persist_loop(
    chain: Arc<Chain>,
    store: Arc<SledStore>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = persist(Arc::clone(&chain), Arc::clone(&store)).await {
                    // The next tick retries; in-memory state stays authoritative.
                    error!(error = %e, "persisting chain failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Runs one flush on the blocking pool, since sled writes are synchronous.
pub async fn persist(chain: Arc<Chain>, store: Arc<SledStore>) -> anyhow::Result<usize> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
        let written = chain.persist_to(store.as_ref())?;
        store.close()?;
        Ok(written)
    })
    .await?
}
