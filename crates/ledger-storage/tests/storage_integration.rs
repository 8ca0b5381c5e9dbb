mod helpers;

use helpers::{chain_with, create_temp_store, teardown_store, tx};
use ledger_core::chain::Violation;
use ledger_core::{Block, Chain, ChainConfig, ChainStore, LedgerError, TransactionKind};
use ledger_storage::SledStore;
use rand::Rng;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_storage_round_trip() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let chain = chain_with(20);
    let blocks = chain.snapshot();
    for block in &blocks {
        store.put_block(block)?;
    }
    for block in &blocks {
        let retrieved = store
            .get_block(block.header.height)?
            .expect("Block should exist");
        assert_eq!(&retrieved, block);
        assert!(retrieved.is_intact());
    }
    assert_eq!(store.tip_height()?, 20);
    assert_eq!(store.tip_hash()?, Some(blocks[20].hash));
    assert_eq!(store.len(), 21);
    assert!(store.get_block(21)?.is_none());
    teardown_store(temp_dir, store);
    Ok(())
}

#[test]
fn test_empty_store() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    assert!(store.is_empty());
    assert_eq!(store.tip_height()?, 0);
    assert_eq!(store.tip_hash()?, None);
    assert!(Chain::load_from(&store, ChainConfig::default())?.is_none());
    teardown_store(temp_dir, store);
    Ok(())
}

#[test]
fn test_storage_persistence_across_reopen() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().to_path_buf();
    let original = chain_with(5);
    {
        let store = SledStore::open(&db_path)?;
        assert_eq!(original.persist_to(&store)?, 6);
        store.close()?;
    }
    {
        let store = SledStore::open(&db_path)?;
        let loaded = Chain::load_from(&store, ChainConfig::default())?
            .expect("Chain should be stored");
        assert_eq!(loaded.snapshot(), original.snapshot());
        assert!(loaded.is_valid());

        // Appends resume on top of the rehydrated head.
        let block = loaded.append(vec![tx("order-0", TransactionKind::OrderPaid)])?;
        assert_eq!(block.header.height, 6);
        assert_eq!(loaded.persist_to(&store)?, 1);
        assert_eq!(
            loaded
                .transactions_for_order("order-0")
                .iter()
                .map(|t| t.kind())
                .collect::<Vec<_>>(),
            vec![TransactionKind::OrderCreated, TransactionKind::OrderPaid]
        );
    }
    temp_dir.close()?;
    Ok(())
}

#[test]
fn test_load_or_init_seeds_genesis() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let chain = Chain::load_or_init(&store, ChainConfig::default())?;
    assert_eq!(chain.len(), 1);
    assert_eq!(store.get_block(0)?, Some(Block::genesis()));

    let again = Chain::load_or_init(&store, ChainConfig::default())?;
    assert_eq!(again.snapshot(), chain.snapshot());
    teardown_store(temp_dir, store);
    Ok(())
}

#[test]
fn test_large_block() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let chain = chain_with(0);
    let large: Vec<_> = (0..5_000)
        .map(|i| tx(&format!("order-{i}"), TransactionKind::OrderDelivered))
        .collect();
    chain.append(large.clone())?;
    chain.persist_to(&store)?;

    let retrieved = store.get_block(1)?.expect("Large block should exist");
    assert_eq!(retrieved.transactions, large);
    assert!(retrieved.is_intact());
    teardown_store(temp_dir, store);
    Ok(())
}

#[test]
fn test_tampered_payload_is_refused_on_load() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let chain = chain_with(4);
    chain.persist_to(&store)?;

    // Rewrite one stored transaction's payload behind the ledger's back.
    let mut rng = rand::thread_rng();
    let height = rng.gen_range(1..4u64);
    let mut block = store.get_block(height)?.expect("Block should exist");
    let mut value = serde_json::to_value(&block.transactions[0])?;
    value["payload"] = serde_json::json!(r#"{"amount":1,"currency":"EUR"}"#);
    block.transactions[0] = serde_json::from_value(value)?;
    store.put_block(&block)?;
    // put_block moved the tip; put the real head back.
    store.put_block(&chain.latest()?)?;

    let err = Chain::load_from(&store, ChainConfig::default()).unwrap_err();
    match err.downcast_ref::<LedgerError>() {
        Some(LedgerError::InvalidChain(report)) => {
            assert_eq!(report.violations, vec![Violation::HashMismatch { height }]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    teardown_store(temp_dir, store);
    Ok(())
}

#[test]
fn test_corrupted_bytes_fail_gracefully() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().to_path_buf();
    {
        let store = SledStore::open(&db_path)?;
        chain_with(2).persist_to(&store)?;
        store.close()?;
    }
    {
        let sled_db = sled::open(&db_path)?;
        let blocks = sled_db.open_tree("blocks")?;
        blocks.insert(1u64.to_be_bytes(), vec![0xFFu8; 10])?;
        sled_db.flush()?;
    }
    let store = SledStore::open(&db_path)?;
    assert!(store.get_block(1).is_err());
    assert!(Chain::load_from(&store, ChainConfig::default()).is_err());
    drop(store);
    temp_dir.close()?;
    Ok(())
}

#[test]
fn test_corrupt_tip_height_fails_cleanly() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().to_path_buf();
    {
        let store = SledStore::open(&db_path)?;
        chain_with(2).persist_to(&store)?;
        store.close()?;
    }
    {
        let sled_db = sled::open(&db_path)?;
        sled_db.insert(b"tip_height", (u64::MAX / 2).to_be_bytes().to_vec())?;
        sled_db.flush()?;
    }
    let store = SledStore::open(&db_path)?;
    assert_eq!(store.tip_height()?, u64::MAX / 2);
    let err = Chain::load_from(&store, ChainConfig::default()).unwrap_err();
    assert!(err.to_string().contains("block 3 missing from store"), "{err}");
    drop(store);
    temp_dir.close()?;
    Ok(())
}

#[test]
fn test_interrupted_rewrite_leaves_loadable_prefix() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let local = chain_with(3);
    local.persist_to(&store)?;

    let peer = chain_with(6);
    local.adopt_if_longer(peer.snapshot());
    // Only the first two heights of the adopted chain reach disk.
    for block in &peer.snapshot()[..2] {
        store.put_block(block)?;
    }
    let partial = Chain::load_from(&store, ChainConfig::default())?.expect("stored");
    assert_eq!(partial.snapshot(), peer.snapshot()[..2].to_vec());

    // The next flush resumes from the stored head.
    assert_eq!(local.persist_to(&store)?, 5);
    let loaded = Chain::load_from(&store, ChainConfig::default())?.expect("stored");
    assert_eq!(loaded.snapshot(), peer.snapshot());
    teardown_store(temp_dir, store);
    Ok(())
}

#[test]
fn test_persist_rewrites_after_adoption() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let local = chain_with(2);
    local.persist_to(&store)?;

    let peer = chain_with(6);
    local.adopt_if_longer(peer.snapshot());
    assert_eq!(local.persist_to(&store)?, 7);

    let loaded = Chain::load_from(&store, ChainConfig::default())?.expect("stored");
    assert_eq!(loaded.snapshot(), peer.snapshot());
    teardown_store(temp_dir, store);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_appends_persist_cleanly() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let chain = Arc::new(chain_with(0));
    let mut handles = Vec::new();
    for i in 0..50 {
        let chain = Arc::clone(&chain);
        handles.push(tokio::task::spawn_blocking(move || {
            chain.append(vec![tx(&format!("order-{i}"), TransactionKind::OrderPaid)])
        }));
    }
    for handle in handles {
        handle.await??;
    }
    chain.persist_to(&store)?;

    let loaded = Chain::load_from(&store, ChainConfig::default())?.expect("stored");
    assert_eq!(loaded.len(), 51);
    assert!(loaded.is_valid());
    teardown_store(temp_dir, store);
    Ok(())
}

#[test]
fn test_storage_trait_compliance() {
    fn assert_chain_store<T: ChainStore>() {}
    assert_chain_store::<SledStore>();
}
