//! The ordered, append-only block sequence and its integrity checks.
//!
//! A [`Chain`] is one shared resource per process. Appends and whole-chain
//! swaps take the write lock; validation and queries take the read lock, so no
//! reader ever observes a half-appended block or a mix of old and new blocks.

use crate::constants::{DEFAULT_DIFFICULTY, GENESIS_PREVIOUS_HASH, MAX_DIFFICULTY};
use crate::error::{LedgerError, Result};
use crate::{mine::mine_parallel, now_millis, pow, Block, Hash, Transaction};
use anyhow::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Trait the storage backends implement so a chain can be persisted and rehydrated.
/// This lives in `ledger-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    fn put_block(&self, block: &Block) -> anyhow::Result<()>;
    fn get_block(&self, height: u64) -> anyhow::Result<Option<Block>>;
    /// Height of the highest stored block, 0 when the store is empty.
    fn tip_height(&self) -> anyhow::Result<u64>;
    /// `None` when the store is empty.
    fn tip_hash(&self) -> anyhow::Result<Option<Hash>>;
    fn clear(&self) -> anyhow::Result<()>;
    fn close(&self) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiningStrategy {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Leading zero hex characters required of every appended block hash. 0 disables mining.
    pub difficulty: u32,
    pub mining: MiningStrategy,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining: MiningStrategy::default(),
        }
    }
}

impl ChainConfig {
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::DifficultyOutOfRange {
                difficulty: self.difficulty,
                max: MAX_DIFFICULTY,
            });
        }
        Ok(())
    }
}

/// What a replica advertises to its peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub height: u64,
    #[serde(with = "hex::serde")]
    pub head_hash: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// The block list has no genesis block.
    Empty,
    /// The height-0 block has a non-zero parent or carries transactions.
    MalformedGenesis,
    /// A block above genesis carries no transactions.
    EmptyBlock { height: u64 },
    /// Stored hash differs from the digest recomputed over the block contents.
    HashMismatch { height: u64 },
    /// `previous_hash` does not equal the predecessor's hash.
    LinkMismatch { height: u64 },
    /// The block at `index` claims a different height.
    HeightMismatch { index: u64, height: u64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Empty => write!(f, "chain is empty"),
            Violation::MalformedGenesis => {
                write!(f, "genesis must have a zero parent and no transactions")
            }
            Violation::EmptyBlock { height } => write!(f, "block {height} has no transactions"),
            Violation::HashMismatch { height } => write!(f, "block {height} hash mismatch"),
            Violation::LinkMismatch { height } => {
                write!(f, "block {height} previous_hash mismatch")
            }
            Violation::HeightMismatch { index, height } => {
                write!(f, "block at index {index} claims height {height}")
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "{} blocks, no violations", self.checked);
        }
        write!(f, "{} blocks, violations: ", self.checked)?;
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Lazily yields every integrity violation in chain order.
/// Genesis is checked for content integrity and its fixed shape, but not for linkage.
fn violations(blocks: &[Block]) -> impl Iterator<Item = Violation> + '_ {
    let empty = blocks.is_empty().then_some(Violation::Empty);
    let per_block = blocks.iter().enumerate().flat_map(move |(i, block)| {
        let index = i as u64;
        let height = (block.header.height != index).then_some(Violation::HeightMismatch {
            index,
            height: block.header.height,
        });
        let shape = if i == 0 {
            (block.header.previous_hash != GENESIS_PREVIOUS_HASH
                || !block.transactions.is_empty())
            .then_some(Violation::MalformedGenesis)
        } else {
            block
                .transactions
                .is_empty()
                .then_some(Violation::EmptyBlock { height: index })
        };
        let content = (!block.is_intact()).then_some(Violation::HashMismatch { height: index });
        let link = (i > 0 && block.header.previous_hash != blocks[i - 1].hash)
            .then_some(Violation::LinkMismatch { height: index });
        height.into_iter().chain(shape).chain(content).chain(link)
    });
    empty.into_iter().chain(per_block)
}

/// Cheap check that stops at the first violation.
pub fn is_valid_blocks(blocks: &[Block]) -> bool {
    violations(blocks).next().is_none()
}

/// Full report over a detached block list.
pub fn validate_blocks(blocks: &[Block]) -> ValidationReport {
    ValidationReport {
        checked: blocks.len(),
        violations: violations(blocks).collect(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Adoption {
    Adopted { height: u64 },
    NotLonger { local: u64, candidate: u64 },
    Invalid(ValidationReport),
}

pub struct Chain {
    blocks: RwLock<Vec<Block>>,
    config: ChainConfig,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Chain {
    /// A fresh chain holding only the genesis block. Genesis is never mined.
    pub fn new(config: ChainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            blocks: RwLock::new(vec![Block::genesis()]),
            config,
        })
    }

    /// Rehydrates a chain from previously stored blocks, refusing any list that fails validation.
    pub fn from_blocks(blocks: Vec<Block>, config: ChainConfig) -> Result<Self> {
        config.validate()?;
        let report = validate_blocks(&blocks);
        if !report.is_valid() {
            warn!(%report, "refusing to load chain");
            return Err(LedgerError::InvalidChain(report));
        }
        Ok(Self {
            blocks: RwLock::new(blocks),
            config,
        })
    }

    pub fn config(&self) -> ChainConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    /// Always false for a correctly constructed chain.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    pub fn latest(&self) -> Result<Block> {
        self.blocks.read().last().cloned().ok_or(LedgerError::EmptyChain)
    }

    pub fn height(&self) -> Result<u64> {
        Ok(self.latest()?.header.height)
    }

    pub fn summary(&self) -> Result<ChainSummary> {
        let latest = self.latest()?;
        Ok(ChainSummary {
            height: latest.header.height,
            head_hash: latest.hash,
        })
    }

    /// Seals `transactions` into a new block on top of the current head.
    ///
    /// The whole read-head, seal, mine, push sequence runs under the write lock,
    /// so concurrent appends land at consecutive heights.
    pub fn append(&self, transactions: Vec<Transaction>) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }
        let mut blocks = self.blocks.write();
        let (height, previous_hash) = {
            let head = blocks.last().ok_or(LedgerError::EmptyChain)?;
            (head.header.height + 1, head.hash)
        };
        let sealed = Block::seal(height, previous_hash, transactions, now_millis())?;
        let block = self.mine(sealed)?;
        blocks.push(block.clone());
        info!(
            height,
            txs = block.transactions.len(),
            nonce = block.header.nonce,
            hash = %hex::encode(block.hash),
            "appended block"
        );
        Ok(block)
    }

    fn mine(&self, block: Block) -> Result<Block> {
        let difficulty = self.config.difficulty;
        match self.config.mining {
            MiningStrategy::Sequential => Ok(pow::mine(block, difficulty)),
            MiningStrategy::Parallel => {
                let height = block.header.height;
                mine_parallel(block, difficulty)
                    .ok_or(LedgerError::NonceSpaceExhausted { height })
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        is_valid_blocks(&self.blocks.read())
    }

    pub fn validate(&self) -> ValidationReport {
        let report = validate_blocks(&self.blocks.read());
        if !report.is_valid() {
            warn!(%report, "chain validation failed");
        }
        report
    }

    /// The audit trail for one order, in chain order then in-block order.
    pub fn transactions_for_order(&self, order_id: &str) -> Vec<Transaction> {
        self.blocks
            .read()
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| tx.order_id() == order_id)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Block> {
        self.blocks.read().clone()
    }

    /// Up to `limit` blocks starting at height `from`.
    pub fn blocks_range(&self, from: u64, limit: usize) -> Vec<Block> {
        self.blocks
            .read()
            .iter()
            .skip(usize::try_from(from).unwrap_or(usize::MAX))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Replaces the whole chain with `candidate` if it is valid and strictly longer.
    ///
    /// Validation runs before the write lock is taken; the length comparison is
    /// repeated under the lock because local appends may have happened meanwhile.
    /// Ties keep the incumbent.
    pub fn adopt_if_longer(&self, candidate: Vec<Block>) -> Adoption {
        let report = validate_blocks(&candidate);
        if !report.is_valid() {
            warn!(%report, "rejecting invalid candidate chain");
            return Adoption::Invalid(report);
        }
        let candidate_height = candidate.len() as u64 - 1;

        let mut blocks = self.blocks.write();
        let local_len = blocks.len();
        if candidate.len() <= local_len {
            debug!(
                local = local_len as u64 - 1,
                candidate = candidate_height,
                "candidate chain not longer"
            );
            return Adoption::NotLonger {
                local: local_len.saturating_sub(1) as u64,
                candidate: candidate_height,
            };
        }
        *blocks = candidate;
        info!(
            from = local_len.saturating_sub(1),
            to = candidate_height,
            "adopted longer chain"
        );
        Adoption::Adopted {
            height: candidate_height,
        }
    }

    /// Writes the blocks the store has not seen yet and returns how many were written.
    ///
    /// If the stored head no longer belongs to this chain (after an adoption), every
    /// height is overwritten in place from genesis. The store is never cleared first,
    /// so an interrupted rewrite still leaves a loadable prefix behind.
    pub fn persist_to<S: ChainStore + ?Sized>(&self, store: &S) -> anyhow::Result<usize> {
        let blocks = self.snapshot();
        let start = match store.tip_hash()? {
            None => 0,
            Some(stored_hash) => {
                let stored_height = store.tip_height()?;
                match blocks.get(stored_height as usize) {
                    Some(block) if block.hash == stored_hash => stored_height as usize + 1,
                    _ => {
                        warn!(stored_height, "stored chain diverged, rewriting from genesis");
                        0
                    }
                }
            }
        };
        for block in &blocks[start.min(blocks.len())..] {
            store
                .put_block(block)
                .with_context(|| format!("persisting block {}", block.header.height))?;
        }
        let written = blocks.len().saturating_sub(start);
        if written > 0 {
            debug!(written, "persisted blocks");
        }
        Ok(written)
    }

    /// Rehydrates and validates a stored chain. `Ok(None)` means the store is empty.
    pub fn load_from<S: ChainStore + ?Sized>(
        store: &S,
        config: ChainConfig,
    ) -> anyhow::Result<Option<Self>> {
        if store.tip_hash()?.is_none() {
            return Ok(None);
        }
        let tip = store.tip_height()?;
        // No capacity hint: `tip` comes from disk and may be garbage.
        let mut blocks = Vec::new();
        for height in 0..=tip {
            let block = store
                .get_block(height)?
                .with_context(|| format!("block {height} missing from store"))?;
            blocks.push(block);
        }
        let chain = Chain::from_blocks(blocks, config)?;
        info!(height = tip, "loaded chain from store");
        Ok(Some(chain))
    }

    /// Loads the stored chain, or starts a new one and persists its genesis block.
    pub fn load_or_init<S: ChainStore + ?Sized>(
        store: &S,
        config: ChainConfig,
    ) -> anyhow::Result<Self> {
        if let Some(chain) = Self::load_from(store, config)? {
            return Ok(chain);
        }
        let chain = Chain::new(config)?;
        chain.persist_to(store)?;
        info!("initialised new chain with genesis block");
        Ok(chain)
    }

    #[cfg(test)]
    pub(crate) fn tamper<F: FnOnce(&mut Vec<Block>)>(&self, f: F) {
        f(&mut self.blocks.write());
    }
}
