use anyhow::{bail, Context, Result};
use ledger_core::{Block, ChainStore, Hash};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

/// Blocks are bincode-encoded and keyed by big-endian height, so tree order is chain order.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!(path = %path.display(), "sled store opened");
    Ok(Self { db, blocks })
  }

  /// Number of stored blocks.
  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }
}

impl ChainStore for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    let height = block.header.height;
    let bytes = bincode::serialize(block)?;
    self.blocks.insert(height.to_be_bytes(), bytes)?;

    // update tip
    self.db.insert(KEY_TIP_HEIGHT, height.to_be_bytes().to_vec())?;
    self.db.insert(KEY_TIP_HASH, block.hash.to_vec())?;

    self.db.flush()?;
    debug!(height, "stored block");
    Ok(())
  }

  fn get_block(&self, height: u64) -> Result<Option<Block>> {
    match self.blocks.get(height.to_be_bytes())? {
      None => Ok(None),
      Some(bytes) => {
        let block = bincode::deserialize(&bytes)
          .with_context(|| format!("decoding stored block {height}"))?;
        Ok(Some(block))
      }
    }
  }

  fn tip_height(&self) -> Result<u64> {
    match self.db.get(KEY_TIP_HEIGHT)? {
      None => Ok(0),
      Some(v) => {
        let arr: [u8; 8] = v
          .as_ref()
          .try_into()
          .context("stored tip height is not 8 bytes")?;
        Ok(u64::from_be_bytes(arr))
      }
    }
  }

  fn tip_hash(&self) -> Result<Option<Hash>> {
    match self.db.get(KEY_TIP_HASH)? {
      None => Ok(None),
      Some(v) => {
        if v.len() != 32 {
          bail!("stored tip hash is {} bytes, expected 32", v.len());
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&v);
        Ok(Some(arr))
      }
    }
  }

  fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.remove(KEY_TIP_HASH)?;
    self.db.flush()?;
    info!("sled store cleared");
    Ok(())
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
