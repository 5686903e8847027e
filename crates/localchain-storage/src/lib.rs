pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Stored values are JSON, the same encoding peers exchange.
pub(crate) fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).with_context(|| format!("encode `{key}`"))
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).with_context(|| format!("decode stored `{key}`"))
}
