use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{Block, Transaction, Wallet};

pub const KEY_CHAIN: &str = "blockchain_chain";
pub const KEY_PENDING: &str = "blockchain_pending";
pub const KEY_WALLET_PRIVATE: &str = "wallet_private_key";
pub const KEY_WALLET_ADDRESS: &str = "wallet_address";

/// Everything needed to rebuild a ledger: the chain and the pending pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub chain: Vec<Block>,
    pub pending: Vec<Transaction>,
}

/// Key-value persistence the storage backends implement.
/// This lives in core to avoid a circular dependency.
///
/// Loads hand back blocks exactly as stored; verifying them is a separate,
/// explicit step for the caller.
pub trait SnapshotStore: Send + Sync {
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
    /// `None` when no chain has ever been saved.
    fn load_snapshot(&self) -> Result<Option<Snapshot>>;
    fn save_wallet(&self, wallet: &Wallet) -> Result<()>;
    fn load_wallet(&self) -> Result<Option<Wallet>>;
    /// Drops every stored key.
    fn clear(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}
