use crate::{
    pow::{digest_with_nonce, is_acceptable},
    Block,
};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Searches nonces in parallel until the block hash has at least `difficulty`
/// leading zero hex characters. Returns `None` only if the whole nonce space
/// was exhausted.
pub fn mine_parallel(mut block: Block, difficulty: u32) -> Option<Block> {
    // Everything but the nonce is fixed, so hash that part once and clone the state per attempt.
    let mut prefix = Sha256::new();
    prefix.update(block.content_prefix());

    let (nonce, hash) = (0u64..u64::MAX).into_par_iter().find_map_any(|nonce| {
        let hash = digest_with_nonce(&prefix, nonce);
        is_acceptable(&hash, difficulty).then_some((nonce, hash))
    })?;

    debug!(
        height = block.header.height,
        nonce,
        hash = %hex::encode(hash),
        "mined block"
    );

    block.header.nonce = nonce;
    block.hash = hash;
    Some(block)
}
