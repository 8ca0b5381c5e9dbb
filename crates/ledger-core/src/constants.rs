pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Stand-in parent hash for the genesis block.
pub const GENESIS_PREVIOUS_HASH: [u8; HASH_SIZE] = [0u8; HASH_SIZE];
pub const DEFAULT_DIFFICULTY: u32 = 0;
/// A difficulty is a count of leading zero hex characters, so it cannot exceed the digest width.
pub const MAX_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;
