//! Cross-replica reconciliation: longest valid chain wins, ties keep the incumbent,
//! and adoption is always whole-chain.

use crate::chain::{Adoption, Chain, ChainSummary, ValidationReport};
use crate::Block;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A remote replica as seen by the reconciler.
pub trait Peer: Send + Sync {
    fn name(&self) -> &str;
    fn summary(&self) -> impl Future<Output = anyhow::Result<ChainSummary>> + Send;
    fn blocks(&self) -> impl Future<Output = anyhow::Result<Vec<Block>>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerOutcome {
    /// The peer was not strictly ahead of the local chain.
    NotAhead { local: u64, remote: u64 },
    Adopted { height: u64 },
    Rejected(ValidationReport),
    Unreachable(String),
}

#[derive(Clone, Debug, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<(String, PeerOutcome)>,
}

impl ReconcileReport {
    /// Height of the last chain adopted during the pass, if any.
    pub fn adopted(&self) -> Option<u64> {
        self.outcomes.iter().rev().find_map(|(_, outcome)| match outcome {
            PeerOutcome::Adopted { height } => Some(*height),
            _ => None,
        })
    }
}

pub struct Reconciler<P> {
    chain: Arc<Chain>,
    peers: Vec<P>,
}

impl<P: Peer> Reconciler<P> {
    pub fn new(chain: Arc<Chain>, peers: Vec<P>) -> Self {
        Self { chain, peers }
    }

    pub fn peers(&self) -> &[P] {
        &self.peers
    }

    /// One pass over every peer, in configured order. Failures are reported, never raised.
    ///
    /// Peers are compared against the local chain as it stands when each is visited,
    /// so after an adoption a later peer must beat the adopted chain to replace it.
    pub async fn reconcile_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for peer in &self.peers {
            let outcome = self.reconcile_peer(peer).await;
            report.outcomes.push((peer.name().to_string(), outcome));
        }
        report
    }

    async fn reconcile_peer(&self, peer: &P) -> PeerOutcome {
        let local = match self.chain.height() {
            Ok(height) => height,
            Err(e) => return PeerOutcome::Unreachable(format!("local chain: {e}")),
        };
        let remote = match peer.summary().await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(peer = peer.name(), error = %e, "peer summary unavailable");
                return PeerOutcome::Unreachable(e.to_string());
            }
        };
        if remote.height <= local {
            debug!(peer = peer.name(), local, remote = remote.height, "peer not ahead");
            return PeerOutcome::NotAhead {
                local,
                remote: remote.height,
            };
        }

        let blocks = match peer.blocks().await {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(peer = peer.name(), error = %e, "peer blocks unavailable");
                return PeerOutcome::Unreachable(e.to_string());
            }
        };
        match self.chain.adopt_if_longer(blocks) {
            Adoption::Adopted { height } => {
                info!(peer = peer.name(), height, "adopted peer chain");
                PeerOutcome::Adopted { height }
            }
            Adoption::NotLonger { local, candidate } => PeerOutcome::NotAhead {
                local,
                remote: candidate,
            },
            Adoption::Invalid(report) => {
                warn!(peer = peer.name(), %report, "peer chain failed validation");
                PeerOutcome::Rejected(report)
            }
        }
    }
}
