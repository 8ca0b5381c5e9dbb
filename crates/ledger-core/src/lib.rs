use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;
pub mod reconcile;
pub mod transaction;

pub use chain::{Chain, ChainConfig, ChainStore, ChainSummary, MiningStrategy};
pub use error::LedgerError;
pub use transaction::{Transaction, TransactionKind};

use constants::{GENESIS_PREVIOUS_HASH, HASH_SIZE};
use transaction::put_len_prefixed;

pub type Hash = [u8; HASH_SIZE];

/// Unix time in milliseconds. A clock set before the epoch reads as 0.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    #[serde(with = "hex::serde")]
    pub previous_hash: Hash,
    pub timestamp: u64,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn new(height: u64, previous_hash: Hash, timestamp: u64) -> Self {
        Self {
            height,
            previous_hash,
            timestamp,
            nonce: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Digest of the block contents as they were when sealed.
    #[serde(with = "hex::serde")]
    pub hash: Hash,
}

impl Block {
    /// Builds a block with `nonce = 0` and computes its digest.
    ///
    /// Only the genesis block (height 0) may carry no transactions.
    pub fn seal(
        height: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
        timestamp: u64,
    ) -> error::Result<Self> {
        if height > 0 && transactions.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }
        let mut block = Block {
            header: BlockHeader::new(height, previous_hash, timestamp),
            transactions,
            hash: [0u8; HASH_SIZE],
        };
        block.hash = block.recompute_hash();
        Ok(block)
    }

    /// The fixed first block. Its timestamp is pinned to 0 so that every
    /// replica starts from an identical genesis.
    pub fn genesis() -> Self {
        let mut block = Block {
            header: BlockHeader::new(0, GENESIS_PREVIOUS_HASH, 0),
            transactions: vec![],
            hash: [0u8; HASH_SIZE],
        };
        block.hash = block.recompute_hash();
        block
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Canonical encoding of everything except the nonce, in hashing order:
    /// height, previous hash, timestamp, transaction count, each transaction.
    pub fn content_prefix(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + HASH_SIZE + 8 + 8 + self.transactions.len() * 128);
        bytes.extend_from_slice(&self.header.height.to_le_bytes());
        bytes.extend_from_slice(&self.header.previous_hash);
        bytes.extend_from_slice(&self.header.timestamp.to_le_bytes());
        bytes.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            put_len_prefixed(&mut bytes, &tx.canonical_bytes());
        }
        bytes
    }

    /// Full canonical encoding: the content prefix followed by the nonce.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = self.content_prefix();
        bytes.extend_from_slice(&self.header.nonce.to_le_bytes());
        bytes
    }

    /// Re-derives the digest from the block's current contents and stored nonce.
    pub fn recompute_hash(&self) -> Hash {
        sha256(&self.hash_bytes())
    }

    /// True when the stored hash still matches the contents.
    pub fn is_intact(&self) -> bool {
        self.hash == self.recompute_hash()
    }
}

pub fn sha256(bytes: &[u8]) -> Hash {
    Sha256::digest(bytes).into()
}

pub mod pow {
    use super::{Block, Hash};
    use sha2::{Digest, Sha256};

    /// The acceptance predicate for a sealed digest. Difficulty 0 accepts every hash.
    pub fn is_acceptable(hash: &Hash, difficulty: u32) -> bool {
        count_leading_zero_nibbles(hash) >= difficulty
    }

    /// Number of leading `0` characters in the lowercase hex rendering of `hash`.
    pub fn count_leading_zero_nibbles(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if *b < 0x10 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    /// Digest of a block whose nonce-free encoding has already been fed into `prefix`.
    pub(crate) fn digest_with_nonce(prefix: &Sha256, nonce: u64) -> Hash {
        let mut hasher = prefix.clone();
        hasher.update(nonce.to_le_bytes());
        hasher.finalize().into()
    }

    /// Mine the block by incrementing the nonce, starting from its current
    /// value, until the hash has at least `difficulty` leading zero hex characters.
    /// At difficulty 0 the block is returned as sealed.
    pub fn mine(mut block: Block, difficulty: u32) -> Block {
        let mut prefix = Sha256::new();
        prefix.update(block.content_prefix());
        let mut nonce = block.header.nonce;
        loop {
            let hash = digest_with_nonce(&prefix, nonce);
            if is_acceptable(&hash, difficulty) {
                block.header.nonce = nonce;
                block.hash = hash;
                return block;
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}
