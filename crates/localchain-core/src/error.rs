use thiserror::Error;

/// Every way a ledger operation can be refused. None of these are fatal to
/// the owning process; callers report them and move on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("insufficient funds: {available} available, {required} required")]
    InsufficientFunds { available: i64, required: u64 },

    #[error("invalid signature for sender {0}")]
    InvalidSignature(String),

    #[error("block #{index} does not extend the head (expected {expected}, got {found})")]
    LinkageMismatch {
        index: u64,
        expected: String,
        found: String,
    },

    #[error("block #{index} rejected: {reason}")]
    InvalidBlock { index: u64, reason: String },

    #[error("chain is corrupt at block #{0}")]
    ChainCorrupt(u64),

    #[error("every block after genesis is already corrupted")]
    AlreadyCorrupted,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
