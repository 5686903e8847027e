use crate::{decode, encode};
use anyhow::{anyhow, Result};
use localchain_core::store::{
    Snapshot, SnapshotStore, KEY_CHAIN, KEY_PENDING, KEY_WALLET_ADDRESS, KEY_WALLET_PRIVATE,
};
use localchain_core::Wallet;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Process-local store for tests and throwaway nodes. Values go through the
/// same JSON encoding as the sled store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }
}

impl SnapshotStore for MemoryStore {
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let chain = encode(KEY_CHAIN, &snapshot.chain)?;
        let pending = encode(KEY_PENDING, &snapshot.pending)?;
        let mut entries = self.write()?;
        entries.insert(KEY_CHAIN.to_string(), chain);
        entries.insert(KEY_PENDING.to_string(), pending);
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        let entries = self.read()?;
        let Some(chain) = entries.get(KEY_CHAIN) else {
            return Ok(None);
        };
        let chain = decode(KEY_CHAIN, chain)?;
        let pending = match entries.get(KEY_PENDING) {
            Some(bytes) => decode(KEY_PENDING, bytes)?,
            None => Vec::new(),
        };
        Ok(Some(Snapshot { chain, pending }))
    }

    fn save_wallet(&self, wallet: &Wallet) -> Result<()> {
        let mut entries = self.write()?;
        entries.insert(
            KEY_WALLET_PRIVATE.to_string(),
            wallet.private_key().as_bytes().to_vec(),
        );
        entries.insert(
            KEY_WALLET_ADDRESS.to_string(),
            wallet.address().as_bytes().to_vec(),
        );
        Ok(())
    }

    fn load_wallet(&self) -> Result<Option<Wallet>> {
        let entries = self.read()?;
        match (entries.get(KEY_WALLET_PRIVATE), entries.get(KEY_WALLET_ADDRESS)) {
            (Some(private), Some(address)) => Ok(Some(Wallet::from_parts(
                String::from_utf8(private.clone())?,
                String::from_utf8(address.clone())?,
            ))),
            _ => Ok(None),
        }
    }

    fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
