//! Hash-derived pseudo-identities.
//!
//! This is a simulation, not cryptography: the "signature" on a transfer is
//! the sender's private material itself, and anyone holding it is
//! indistinguishable from the owner.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{
    ADDRESS_HASH_CHARS, ADDRESS_PREFIX, PRIVATE_KEY_HASH_CHARS, PRIVATE_KEY_PREFIX,
};
use crate::error::{LedgerError, Result};
use crate::{Address, Transaction};

fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// `Wallet_` followed by the first ten hex digits, uppercased, of
/// SHA-256(private material).
pub fn derive_address(private_key: &str) -> Address {
    let digest = sha256_hex(private_key.as_bytes());
    format!(
        "{ADDRESS_PREFIX}{}",
        digest[..ADDRESS_HASH_CHARS].to_uppercase()
    )
}

/// SYSTEM transactions pass; everything else must carry private material
/// that derives to its `from` address.
pub fn verify_signature(tx: &Transaction) -> bool {
    if tx.is_system() {
        return true;
    }
    tx.signature
        .as_deref()
        .is_some_and(|sig| derive_address(sig) == tx.from)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    private_key: String,
    address: Address,
}

impl Wallet {
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let seed: [u8; 32] = rng.gen();
        let digest = sha256_hex(hex::encode(seed).as_bytes());
        Self::from_private_key(format!(
            "{PRIVATE_KEY_PREFIX}{}",
            &digest[..PRIVATE_KEY_HASH_CHARS]
        ))
    }

    pub fn from_private_key(private_key: impl Into<String>) -> Self {
        let private_key = private_key.into();
        let address = derive_address(&private_key);
        Self {
            private_key,
            address,
        }
    }

    /// Restores a stored identity as-is, without re-deriving the address.
    pub fn from_parts(private_key: String, address: Address) -> Self {
        Self {
            private_key,
            address,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Builds an unstamped transfer signed with this wallet's material.
    pub fn create_transfer(
        &self,
        to: impl Into<Address>,
        amount: u64,
        note: impl Into<String>,
    ) -> Result<Transaction> {
        let to = to.into();
        if to.trim().is_empty() {
            return Err(LedgerError::MalformedTransaction("missing recipient".into()));
        }
        if amount == 0 {
            return Err(LedgerError::MalformedTransaction(
                "amount must be positive".into(),
            ));
        }
        Ok(Transaction {
            from: self.address.clone(),
            to,
            amount,
            fee: None,
            signature: Some(self.private_key.clone()),
            note: note.into(),
        })
    }
}
