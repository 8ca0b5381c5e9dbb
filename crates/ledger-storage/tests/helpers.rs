#![allow(dead_code)]

use std::fs;

use ledger_core::{Chain, ChainConfig, ChainStore, Transaction, TransactionKind};
use ledger_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

pub fn tx(order: &str, kind: TransactionKind) -> Transaction {
    Transaction::new(
        order,
        kind,
        "user-1",
        Some("merchant-7".to_string()),
        r#"{"amount":1250,"currency":"EUR"}"#,
        Some("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08".to_string()),
    )
    .expect("valid transaction")
}

/// A chain with `appends` blocks on top of genesis, one transaction each.
pub fn chain_with(appends: usize) -> Chain {
    let chain = Chain::new(ChainConfig::default()).expect("default config is valid");
    for i in 0..appends {
        chain
            .append(vec![tx(&format!("order-{i}"), TransactionKind::OrderCreated)])
            .expect("append");
    }
    chain
}
