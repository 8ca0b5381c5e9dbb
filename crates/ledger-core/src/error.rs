use crate::chain::ValidationReport;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown transaction kind `{0}`")]
    InvalidTransactionKind(String),

    #[error("required transaction field `{0}` is missing")]
    MissingField(&'static str),

    #[error("a non-genesis block needs at least one transaction")]
    EmptyBatch,

    /// Only reachable through a construction bug: every chain starts with a genesis block.
    #[error("chain has no blocks")]
    EmptyChain,

    #[error("difficulty {difficulty} exceeds the maximum of {max}")]
    DifficultyOutOfRange { difficulty: u32, max: u32 },

    #[error("nonce space exhausted while mining block {height}")]
    NonceSpaceExhausted { height: u64 },

    #[error("chain failed validation: {0}")]
    InvalidChain(ValidationReport),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
