use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod mine;
pub mod store;
pub mod wallet;

pub use chain::Ledger;
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use wallet::Wallet;

use constants::{GENESIS_PREVIOUS_HASH, GENESIS_SENTINEL, GENESIS_TIMESTAMP, SYSTEM_ADDRESS};

/// Lowercase hex SHA-256 digest.
pub type Hash = String;
pub type Address = String;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Field order is part of the block hash; do not reorder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub note: String,
}

impl Transaction {
    /// A minted transaction crediting `to`; never signature-checked.
    pub fn reward(to: impl Into<Address>, amount: u64, note: impl Into<String>) -> Self {
        Self {
            from: SYSTEM_ADDRESS.to_string(),
            to: to.into(),
            amount,
            fee: None,
            signature: None,
            note: note.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.from == SYSTEM_ADDRESS
    }

    /// What the sender gives up: amount plus any stamped fee.
    pub fn cost(&self) -> u64 {
        self.amount.saturating_add(self.fee.unwrap_or(0))
    }
}

/// Block body: a transaction list, or a bare marker string for genesis and
/// for blocks that have been deliberately overwritten.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Transactions(Vec<Transaction>),
    Sentinel(String),
}

impl Payload {
    pub fn transactions(&self) -> &[Transaction] {
        match self {
            Payload::Transactions(txs) => txs,
            Payload::Sentinel(_) => &[],
        }
    }

    pub fn is_sentinel(&self, marker: &str) -> bool {
        matches!(self, Payload::Sentinel(s) if s == marker)
    }
}

/// Bytes fed to SHA-256: decimal index, previous hash, decimal timestamp,
/// JSON payload and decimal nonce, concatenated without separators.
pub fn hash_material(
    index: u64,
    previous_hash: &str,
    timestamp: u64,
    transactions: &Payload,
    nonce: u64,
) -> Vec<u8> {
    let payload = serde_json::to_vec(transactions).expect("payload is always serializable");
    let mut bytes = Vec::with_capacity(previous_hash.len() + payload.len() + 48);
    bytes.extend_from_slice(index.to_string().as_bytes());
    bytes.extend_from_slice(previous_hash.as_bytes());
    bytes.extend_from_slice(timestamp.to_string().as_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(nonce.to_string().as_bytes());
    bytes
}

pub fn calculate_hash(
    index: u64,
    previous_hash: &str,
    timestamp: u64,
    transactions: &Payload,
    nonce: u64,
) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(hash_material(index, previous_hash, timestamp, transactions, nonce));
    hex::encode(hasher.finalize())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Payload,
    pub previous_hash: Hash,
    pub hash: Hash,
    pub nonce: u64,
}

impl Block {
    /// Builds an unmined block at nonce 0. Its hash already matches its
    /// fields, so it is internally consistent before any proof-of-work.
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Payload,
        previous_hash: impl Into<Hash>,
    ) -> Self {
        let previous_hash = previous_hash.into();
        let hash = calculate_hash(index, &previous_hash, timestamp, &transactions, 0);
        Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            hash,
            nonce: 0,
        }
    }

    pub fn calculate_hash(&self) -> Hash {
        calculate_hash(
            self.index,
            &self.previous_hash,
            self.timestamp,
            &self.transactions,
            self.nonce,
        )
    }

    /// True when the stored hash still matches the block's contents.
    pub fn is_intact(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.transactions.transactions()
    }
}

/// Fixed first block shared by every peer.
pub fn genesis_block() -> Block {
    Block::new(
        0,
        GENESIS_TIMESTAMP,
        Payload::Sentinel(GENESIS_SENTINEL.to_string()),
        GENESIS_PREVIOUS_HASH,
    )
}

pub mod pow {
    use super::Block;
    use crate::constants::POW_TARGET_DIGIT;

    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        hash.len() >= difficulty
            && hash.as_bytes()[..difficulty]
                .iter()
                .all(|b| *b == POW_TARGET_DIGIT)
    }

    /// Tries at most `max_attempts` nonces, starting from the block's current
    /// one. Returns true once the block's hash meets `difficulty`; on false the
    /// block is left at the next untried nonce so a later call can resume.
    pub fn search(block: &mut Block, difficulty: usize, max_attempts: u64) -> bool {
        for _ in 0..max_attempts {
            if meets_difficulty(&block.hash, difficulty) {
                return true;
            }
            block.nonce += 1;
            block.hash = block.calculate_hash();
        }
        meets_difficulty(&block.hash, difficulty)
    }

    /// Runs the search to completion on the current thread.
    pub fn mine_blocking(mut block: Block, difficulty: usize) -> Block {
        while !search(&mut block, difficulty, u64::MAX) {}
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_txs() -> Payload {
        Payload::Transactions(vec![
            Transaction {
                from: "Alice".to_string(),
                to: "Bob".to_string(),
                amount: 10,
                fee: Some(3),
                signature: Some("Priv_x".to_string()),
                note: "Transfer".to_string(),
            },
            Transaction::reward("Alice", 13, "Mining reward"),
        ])
    }

    #[test]
    fn genesis_block_example() {
        let genesis = genesis_block();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.nonce, 0);
        assert_eq!(genesis.timestamp, 1_704_067_200_000);
        assert!(genesis.transactions.is_sentinel("Genesis Block"));
        assert_eq!(
            genesis.hash,
            "3dd351cdb0ec3fe278ca81480b5fd0555011b8481b841388c13683154689348d"
        );
        assert!(genesis.transactions().is_empty());
    }

    #[test]
    fn block_hash_example() {
        let block = Block::new(1, 1_600_000_000_000, sample_txs(), "abc");
        assert_eq!(
            block.hash,
            "079975fc68c65835ed68638e6582b3e1ab31dc2384c998facc7f5fca92e9b585"
        );
        assert!(block.is_intact());
    }

    #[test]
    fn block_hash_changes_with_nonce() {
        let mut block = Block::new(1, 1_600_000_000_000, sample_txs(), "abc");
        block.nonce = 42;
        let hash = block.calculate_hash();
        assert_eq!(
            hash,
            "ac7a675a19ec018096319e36542e7ac2635ef09307a6b1d1e3451b3fad645873"
        );
        assert!(!block.is_intact());
    }

    #[test]
    fn block_hash_consistency() {
        let a = Block::new(7, 1_600_000_000_000, sample_txs(), "prev");
        let b = Block::new(7, 1_600_000_000_000, sample_txs(), "prev");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.calculate_hash(), a.calculate_hash());
    }

    #[test]
    fn block_hash_changes_with_payload() {
        let a = Block::new(1, 1_600_000_000_000, sample_txs(), "abc");
        let mut tampered = a.clone();
        tampered.transactions = Payload::Sentinel("HACKED".into());
        assert_ne!(a.hash, tampered.calculate_hash());
        assert!(!tampered.is_intact());
    }

    #[test]
    fn transaction_serialization_example() {
        let tx = Transaction::reward("Alice", 13, "Mining reward");
        let json = serde_json::to_string(&tx).unwrap();
        assert_eq!(
            json,
            r#"{"from":"SYSTEM","to":"Alice","amount":13,"note":"Mining reward"}"#
        );
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
        assert!(back.is_system());
        assert_eq!(back.cost(), 13);
    }

    #[test]
    fn block_serialization_uses_wire_field_names() {
        let block = Block::new(1, 1_600_000_000_000, sample_txs(), "abc");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["previousHash"], "abc");
        assert_eq!(value["transactions"][0]["fee"], 3);

        let genesis = serde_json::to_value(genesis_block()).unwrap();
        assert_eq!(genesis["transactions"], "Genesis Block");
    }

    #[test]
    fn stored_hash_is_kept_as_transmitted() {
        let stored = serde_json::json!({
            "index": 3,
            "timestamp": 1,
            "transactions": [],
            "previousHash": "prev",
            "hash": "not-a-real-hash",
            "nonce": 9
        });
        let block: Block = serde_json::from_value(stored).unwrap();
        assert_eq!(block.hash, "not-a-real-hash");
        assert!(!block.is_intact());
    }

    #[test]
    fn sentinel_and_empty_payloads_deserialize() {
        let empty: Payload = serde_json::from_str("[]").unwrap();
        assert_eq!(empty, Payload::Transactions(vec![]));
        let marker: Payload = serde_json::from_str(r#""HACKED""#).unwrap();
        assert!(marker.is_sentinel("HACKED"));
    }

    #[test]
    fn leading_target_digit_examples() {
        assert!(pow::meets_difficulty("00ff", 2));
        assert!(!pow::meets_difficulty("0fff", 2));
        assert!(pow::meets_difficulty("anything", 0));
        assert!(!pow::meets_difficulty("00", 3));
    }

    #[test]
    fn difficulty_zero_keeps_nonce_zero() {
        let block = Block::new(1, 1_600_000_000_000, sample_txs(), "abc");
        let mined = pow::mine_blocking(block.clone(), 0);
        assert_eq!(mined.nonce, 0);
        assert_eq!(mined.hash, block.hash);
    }

    #[test]
    fn mine_block_example() {
        let block = Block::new(1, 1_600_000_000_000, sample_txs(), "abc");
        let mined = pow::mine_blocking(block, 2);
        assert!(mined.hash.starts_with("00"));
        assert!(mined.is_intact());
    }

    #[test]
    fn search_resumes_where_it_stopped() {
        let mut block = Block::new(1, 1_600_000_000_000, sample_txs(), "abc");
        let mut calls = 0;
        while !pow::search(&mut block, 2, 10) {
            calls += 1;
        }
        let fresh = Block::new(1, 1_600_000_000_000, sample_txs(), "abc");
        let reference = pow::mine_blocking(fresh, 2);
        assert_eq!(block.nonce, reference.nonce);
        assert!(calls as u64 * 10 <= block.nonce);
    }
}
