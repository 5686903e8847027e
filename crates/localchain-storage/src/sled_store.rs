use crate::{decode, encode};
use anyhow::{Context, Result};
use localchain_core::store::{
    Snapshot, SnapshotStore, KEY_CHAIN, KEY_PENDING, KEY_WALLET_ADDRESS, KEY_WALLET_PRIVATE,
};
use localchain_core::{Block, Transaction, Wallet};
use serde::de::DeserializeOwned;
use sled::{Batch, Db};
use std::path::Path;
use tracing::{debug, info};

#[derive(Clone)]
pub struct SledStore {
  db: Db,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("open sled at {}", path.display()))?;
    info!("sled store opened");
    Ok(Self { db })
  }

  /// A store that disappears when dropped.
  pub fn temporary() -> Result<Self> {
    let db = sled::Config::new().temporary(true).open()?;
    Ok(Self { db })
  }

  fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    self
      .db
      .get(key)?
      .map(|bytes| decode(key, &bytes))
      .transpose()
  }
}

impl SnapshotStore for SledStore {
  fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
    // chain and pool land together or not at all
    let mut batch = Batch::default();
    batch.insert(KEY_CHAIN, encode(KEY_CHAIN, &snapshot.chain)?);
    batch.insert(KEY_PENDING, encode(KEY_PENDING, &snapshot.pending)?);
    self.db.apply_batch(batch)?;
    self.db.flush()?;
    debug!(
      blocks = snapshot.chain.len(),
      pending = snapshot.pending.len(),
      "snapshot saved"
    );
    Ok(())
  }

  fn load_snapshot(&self) -> Result<Option<Snapshot>> {
    let Some(chain) = self.get_value::<Vec<Block>>(KEY_CHAIN)? else {
      return Ok(None);
    };
    let pending = self
      .get_value::<Vec<Transaction>>(KEY_PENDING)?
      .unwrap_or_default();
    Ok(Some(Snapshot { chain, pending }))
  }

  fn save_wallet(&self, wallet: &Wallet) -> Result<()> {
    let mut batch = Batch::default();
    batch.insert(KEY_WALLET_PRIVATE, wallet.private_key().as_bytes());
    batch.insert(KEY_WALLET_ADDRESS, wallet.address().as_bytes());
    self.db.apply_batch(batch)?;
    self.db.flush()?;
    Ok(())
  }

  fn load_wallet(&self) -> Result<Option<Wallet>> {
    let private = self.db.get(KEY_WALLET_PRIVATE)?;
    let address = self.db.get(KEY_WALLET_ADDRESS)?;
    match (private, address) {
      (Some(private), Some(address)) => Ok(Some(Wallet::from_parts(
        String::from_utf8(private.to_vec()).context("wallet private key is not UTF-8")?,
        String::from_utf8(address.to_vec()).context("wallet address is not UTF-8")?,
      ))),
      _ => Ok(None),
    }
  }

  fn clear(&self) -> Result<()> {
    self.db.clear()?;
    self.db.flush()?;
    info!("sled store cleared");
    Ok(())
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
