use ledger_core::chain::{validate_blocks, Violation};
use ledger_core::reconcile::{Peer, PeerOutcome, Reconciler};
use ledger_core::{Block, Chain, ChainConfig, ChainSummary, Transaction, TransactionKind};
use std::sync::{Arc, Barrier};
use std::thread;

fn tx(order: &str, kind: TransactionKind) -> Transaction {
    Transaction::new(order, kind, "user-1", None, r#"{"amount":990}"#, None).unwrap()
}

/// Rebuilds a transaction with a different payload, keeping every other field.
fn with_payload(tx: &Transaction, payload: &str) -> Transaction {
    let mut value = serde_json::to_value(tx).unwrap();
    value["payload"] = serde_json::Value::String(payload.to_string());
    serde_json::from_value(value).unwrap()
}

#[test]
fn appending_n_batches_yields_n_plus_one_blocks() {
    let chain = Chain::new(ChainConfig::default()).unwrap();
    for i in 0..10 {
        chain
            .append(vec![tx(&format!("order-{i}"), TransactionKind::OrderCreated)])
            .unwrap();
        assert!(chain.is_valid());
    }
    let blocks = chain.snapshot();
    assert_eq!(blocks.len(), 11);
    assert_eq!(
        blocks.iter().map(|b| b.header.height).collect::<Vec<_>>(),
        (0..=10).collect::<Vec<_>>()
    );
    assert!(blocks
        .windows(2)
        .all(|w| w[1].header.previous_hash == w[0].hash));
}

#[test]
fn tampered_snapshot_fails_validation() {
    let chain = Chain::new(ChainConfig::default()).unwrap();
    chain.append(vec![tx("A", TransactionKind::OrderCreated)]).unwrap();
    chain.append(vec![tx("A", TransactionKind::OrderPaid)]).unwrap();

    let mut blocks = chain.snapshot();
    blocks[1].transactions[0] = with_payload(&blocks[1].transactions[0], r#"{"amount":991}"#);
    assert_eq!(
        validate_blocks(&blocks).violations,
        vec![Violation::HashMismatch { height: 1 }]
    );

    // The live chain only hands out copies.
    assert!(chain.is_valid());
}

#[test]
fn recompute_hash_is_deterministic() {
    let chain = Chain::new(ChainConfig::default()).unwrap();
    let block = chain.append(vec![tx("A", TransactionKind::OrderCreated)]).unwrap();
    assert_eq!(block.recompute_hash(), block.recompute_hash());
    assert_eq!(block.recompute_hash(), block.hash);

    let mut bumped = block.clone();
    bumped.header.nonce += 1;
    assert_ne!(bumped.recompute_hash(), block.hash);
}

#[test]
fn order_history_example() {
    let chain = Chain::new(ChainConfig::default()).unwrap();
    chain.append(vec![tx("A", TransactionKind::OrderCreated)]).unwrap();
    chain.append(vec![tx("B", TransactionKind::OrderCreated)]).unwrap();
    chain.append(vec![tx("A", TransactionKind::OrderPaid)]).unwrap();

    let trail: Vec<_> = chain
        .transactions_for_order("A")
        .into_iter()
        .map(|t| (t.order_id().to_string(), t.kind()))
        .collect();
    assert_eq!(
        trail,
        vec![
            ("A".to_string(), TransactionKind::OrderCreated),
            ("A".to_string(), TransactionKind::OrderPaid),
        ]
    );
}

#[test]
fn simultaneous_batches_land_at_consecutive_heights() {
    let chain = Arc::new(Chain::new(ChainConfig::default()).unwrap());
    chain.append(vec![tx("seed", TransactionKind::OrderCreated)]).unwrap();
    let n = chain.height().unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["A", "B"]
        .into_iter()
        .map(|order| {
            let chain = Arc::clone(&chain);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                chain
                    .append(vec![tx(order, TransactionKind::OrderPaid)])
                    .unwrap()
                    .header
                    .height
            })
        })
        .collect();
    let mut heights: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    heights.sort_unstable();
    assert_eq!(heights, vec![n + 1, n + 2]);
    assert!(chain.is_valid());
}

struct StaticPeer(Vec<Block>);

impl Peer for StaticPeer {
    fn name(&self) -> &str {
        "static"
    }

    async fn summary(&self) -> anyhow::Result<ChainSummary> {
        let head = self.0.last().ok_or_else(|| anyhow::anyhow!("empty"))?;
        Ok(ChainSummary {
            height: head.header.height,
            head_hash: head.hash,
        })
    }

    async fn blocks(&self) -> anyhow::Result<Vec<Block>> {
        Ok(self.0.clone())
    }
}

fn chain_of_len(len: usize) -> Chain {
    let chain = Chain::new(ChainConfig::default()).unwrap();
    for i in 1..len {
        chain
            .append(vec![tx(&format!("order-{i}"), TransactionKind::OrderCreated)])
            .unwrap();
    }
    chain
}

#[tokio::test]
async fn reconciliation_scenarios() {
    // Longer and valid: adopted wholesale.
    let local = Arc::new(chain_of_len(3));
    let peer = chain_of_len(5).snapshot();
    let reconciler = Reconciler::new(Arc::clone(&local), vec![StaticPeer(peer.clone())]);
    reconciler.reconcile_once().await;
    assert_eq!(local.snapshot(), peer);

    // Longer but invalid: ignored.
    let local = Arc::new(chain_of_len(3));
    let before = local.snapshot();
    let mut broken = chain_of_len(5).snapshot();
    broken[4].header.previous_hash = [0xAB; 32];
    let reconciler = Reconciler::new(Arc::clone(&local), vec![StaticPeer(broken)]);
    let report = reconciler.reconcile_once().await;
    assert!(matches!(report.outcomes[0].1, PeerOutcome::Rejected(_)));
    assert_eq!(local.snapshot(), before);

    // Equal length: incumbent kept.
    let reconciler = Reconciler::new(
        Arc::clone(&local),
        vec![StaticPeer(chain_of_len(3).snapshot())],
    );
    reconciler.reconcile_once().await;
    assert_eq!(local.snapshot(), before);
}
