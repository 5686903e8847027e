pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Leading character a mined hash must repeat `difficulty` times.
pub const POW_TARGET_DIGIT: u8 = b'0';
/// Attempts between two cooperative yields of the miner.
pub const MINING_BATCH_SIZE: u64 = 500;

pub const SYSTEM_ADDRESS: &str = "SYSTEM";
pub const REWARD_NOTE: &str = "Mining reward";
pub const TRANSFER_NOTE: &str = "Transfer";

pub const GENESIS_TIMESTAMP: u64 = 1_704_067_200_000;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_SENTINEL: &str = "Genesis Block";
pub const CORRUPTION_SENTINEL: &str = "HACKED";

pub const DEFAULT_MINING_REWARD: u64 = 10;
pub const DEFAULT_GAS_FEE: u64 = 3;
pub const DEFAULT_DIFFICULTY: usize = 3;

pub const ADDRESS_PREFIX: &str = "Wallet_";
pub const ADDRESS_HASH_CHARS: usize = 10;
pub const PRIVATE_KEY_PREFIX: &str = "Priv_";
pub const PRIVATE_KEY_HASH_CHARS: usize = 32;

/// Search queries longer than this are treated as block hashes.
pub const MIN_BLOCK_QUERY_LEN: usize = 20;
