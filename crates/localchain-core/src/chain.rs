//! The ledger state machine: chain, pending pool, accounting and fork choice.

use std::collections::BTreeMap;

use rand::{seq::SliceRandom, Rng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::constants::{ADDRESS_PREFIX, CORRUPTION_SENTINEL, MIN_BLOCK_QUERY_LEN, REWARD_NOTE};
use crate::error::{LedgerError, Result};
use crate::mine::mine_block;
use crate::store::Snapshot;
use crate::wallet::verify_signature;
use crate::{genesis_block, now_millis, pow, Address, Block, Payload, Transaction};

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Checks every block after the first against its own contents and against
/// its predecessor's hash. Reports the position of the front-most failure.
///
/// Hashes are recomputed in parallel; the result is the same as a sequential
/// front-to-back scan.
pub fn verify_blocks(chain: &[Block]) -> Result<()> {
    let failure = chain.par_windows(2).position_first(|pair| {
        let (previous, current) = (&pair[0], &pair[1]);
        current.hash != current.calculate_hash() || current.previous_hash != previous.hash
    });
    match failure {
        Some(offset) => Err(LedgerError::ChainCorrupt(offset as u64 + 1)),
        None => Ok(()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// One line of an address's history. Outgoing amounts include the fee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub block_index: u64,
    pub direction: Direction,
    pub counterparty: Address,
    pub amount: u64,
    pub note: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    pub length: usize,
    pub pending: usize,
    pub valid: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub address: Address,
    pub balance: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SearchResult {
    Wallet {
        address: Address,
        balance: i64,
        history: Vec<HistoryEntry>,
    },
    Block {
        block: Block,
    },
    NotFound {
        query: String,
    },
    Invalid {
        query: String,
    },
}

/// Owns one chain and its pending pool. Every operation takes the ledger
/// exclusively, so operations never interleave on one instance.
#[derive(Clone, Debug)]
pub struct Ledger {
    config: LedgerConfig,
    chain: Vec<Block>,
    pending: Vec<Transaction>,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            chain: vec![genesis_block()],
            pending: Vec::new(),
        }
    }

    /// Restores from stored fields as-is. An empty stored chain falls back to
    /// genesis; nothing is verified.
    pub fn from_snapshot(config: LedgerConfig, snapshot: Snapshot) -> Self {
        if snapshot.chain.is_empty() {
            return Self::new(config);
        }
        Self {
            config,
            chain: snapshot.chain,
            pending: snapshot.pending,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            chain: self.chain.clone(),
            pending: self.pending.clone(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn latest_block(&self) -> &Block {
        // never empty: every constructor starts from genesis and replacement
        // only ever installs a longer chain
        &self.chain[self.chain.len() - 1]
    }

    /// Back to a genesis-only chain with an empty pool.
    pub fn reset(&mut self) {
        self.chain = vec![genesis_block()];
        self.pending.clear();
    }

    fn confirmed_transactions(&self) -> impl Iterator<Item = (u64, &Transaction)> {
        self.chain
            .iter()
            .flat_map(|block| block.transactions().iter().map(move |tx| (block.index, tx)))
    }

    /// Authoritative balance: a full rescan of every confirmed transaction.
    /// SYSTEM-originated transactions never debit.
    pub fn compute_balance(&self, address: &str) -> i64 {
        self.confirmed_transactions()
            .fold(0i64, |mut balance, (_, tx)| {
                if tx.from == address && !tx.is_system() {
                    balance = balance.saturating_sub(signed(tx.cost()));
                }
                if tx.to == address {
                    balance = balance.saturating_add(signed(tx.amount));
                }
                balance
            })
    }

    /// Outstanding commitments of `address` still sitting in the pool.
    fn pending_spend(&self, address: &str) -> u64 {
        self.pending
            .iter()
            .filter(|tx| tx.from == address)
            .fold(0u64, |acc, tx| acc.saturating_add(tx.cost()))
    }

    /// Validates `tx` and queues it, stamped with the current gas fee.
    /// A rejected transaction leaves the pool untouched.
    pub fn submit_transaction(&mut self, mut tx: Transaction) -> Result<Transaction> {
        if tx.from.trim().is_empty() || tx.to.trim().is_empty() {
            return Err(LedgerError::MalformedTransaction(
                "missing sender or recipient".into(),
            ));
        }

        let confirmed = self.compute_balance(&tx.from);
        let available = confirmed.saturating_sub(signed(self.pending_spend(&tx.from)));
        let required = tx.amount.saturating_add(self.config.gas_fee);
        if i128::from(available) < i128::from(required) {
            warn!(from = %tx.from, available, required, "insufficient funds");
            return Err(LedgerError::InsufficientFunds {
                available,
                required,
            });
        }

        if !verify_signature(&tx) {
            warn!(from = %tx.from, "signature does not derive to sender");
            return Err(LedgerError::InvalidSignature(tx.from));
        }

        tx.fee = Some(self.config.gas_fee);
        debug!(from = %tx.from, to = %tx.to, amount = tx.amount, "transaction queued");
        self.pending.push(tx.clone());
        Ok(tx)
    }

    /// Unmined candidate on top of the head: every pending transaction plus a
    /// reward of base reward and collected fees for `miner`.
    pub fn prepare_block(&self, miner: &str) -> Block {
        let total_fees = self
            .pending
            .iter()
            .fold(0u64, |acc, tx| acc.saturating_add(tx.fee.unwrap_or(0)));
        let reward = Transaction::reward(
            miner,
            self.config.mining_reward.saturating_add(total_fees),
            REWARD_NOTE,
        );

        let mut transactions = self.pending.clone();
        transactions.push(reward);

        let head = self.latest_block();
        Block::new(
            head.index + 1,
            now_millis(),
            Payload::Transactions(transactions),
            head.hash.clone(),
        )
    }

    /// Appends a locally mined block and clears the pool. Refuses a block
    /// whose parent is no longer the head.
    pub fn commit_block(&mut self, block: Block) -> Result<Block> {
        let head = self.latest_block();
        if block.previous_hash != head.hash {
            return Err(LedgerError::LinkageMismatch {
                index: block.index,
                expected: head.hash.clone(),
                found: block.previous_hash,
            });
        }
        info!(index = block.index, hash = %block.hash, "block appended");
        self.chain.push(block.clone());
        self.pending.clear();
        Ok(block)
    }

    /// Packages the pool into a block for `miner`, mines it at `difficulty`
    /// and appends it.
    pub async fn mine<F>(&mut self, miner: &str, difficulty: usize, on_progress: F) -> Result<Block>
    where
        F: FnMut(u64),
    {
        let candidate = self.prepare_block(miner);
        let mined = mine_block(candidate, difficulty, on_progress).await;
        self.commit_block(mined)
    }

    fn check_external(&self, block: &Block) -> Result<()> {
        let head = self.latest_block();
        if block.previous_hash != head.hash {
            return Err(LedgerError::LinkageMismatch {
                index: block.index,
                expected: head.hash.clone(),
                found: block.previous_hash.clone(),
            });
        }
        if !self.config.verify_external_blocks {
            return Ok(());
        }

        let reject = |reason: String| LedgerError::InvalidBlock {
            index: block.index,
            reason,
        };
        if block.index != head.index + 1 {
            return Err(reject(format!(
                "index {} does not follow head {}",
                block.index, head.index
            )));
        }
        if !block.is_intact() {
            return Err(reject("stored hash does not match contents".into()));
        }
        if !pow::meets_difficulty(&block.hash, self.config.difficulty) {
            return Err(reject(format!(
                "hash lacks {} leading zeros",
                self.config.difficulty
            )));
        }
        Ok(())
    }

    /// Fast path for a block announced by a peer: accepted only when it
    /// extends the current head. Acceptance clears the pool.
    pub fn append_external_block(&mut self, block: Block) -> Result<()> {
        if let Err(err) = self.check_external(&block) {
            debug!(index = block.index, %err, "external block rejected");
            return Err(err);
        }
        info!(index = block.index, hash = %block.hash, "external block appended");
        self.chain.push(block);
        self.pending.clear();
        Ok(())
    }

    pub fn verify_chain(&self) -> Result<()> {
        verify_blocks(&self.chain)
    }

    pub fn validate_chain(&self) -> bool {
        self.verify_chain().is_ok()
    }

    /// Full check of a chain offered by a peer: our genesis, contiguous
    /// indices, intact hashes and linkage, and the configured proof-of-work
    /// on every block after genesis.
    pub fn verify_candidate(&self, chain: &[Block]) -> Result<()> {
        if chain.first() != Some(&genesis_block()) {
            return Err(LedgerError::InvalidBlock {
                index: 0,
                reason: "genesis does not match ours".into(),
            });
        }
        if let Some((position, block)) = chain
            .iter()
            .enumerate()
            .find(|(position, block)| block.index != *position as u64)
        {
            return Err(LedgerError::InvalidBlock {
                index: block.index,
                reason: format!("found at position {position}"),
            });
        }
        verify_blocks(chain)?;

        let difficulty = self.config.difficulty;
        let unworked = chain[1..]
            .par_iter()
            .find_first(|block| !pow::meets_difficulty(&block.hash, difficulty));
        match unworked {
            Some(block) => Err(LedgerError::InvalidBlock {
                index: block.index,
                reason: format!("hash lacks {difficulty} leading zeros"),
            }),
            None => Ok(()),
        }
    }

    /// Longest chain wins: `candidate` is installed, unverified, only when it
    /// is strictly longer. Installing it clears the pool.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() {
            debug!(
                current = self.chain.len(),
                candidate = candidate.len(),
                "candidate chain not longer; ignored"
            );
            return false;
        }
        info!(
            current = self.chain.len(),
            candidate = candidate.len(),
            "chain replaced"
        );
        self.chain = candidate;
        self.pending.clear();
        true
    }

    /// Overwrites the payload of a random intact non-genesis block with the
    /// corruption marker, leaving its hash stale. Returns the block's index.
    pub fn corrupt_random_block<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<u64> {
        let targets: Vec<usize> = self
            .chain
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, block)| !block.transactions.is_sentinel(CORRUPTION_SENTINEL))
            .map(|(pos, _)| pos)
            .collect();

        let Some(&pos) = targets.choose(rng) else {
            warn!("nothing left to corrupt");
            return Err(LedgerError::AlreadyCorrupted);
        };
        let block = &mut self.chain[pos];
        block.transactions = Payload::Sentinel(CORRUPTION_SENTINEL.to_string());
        warn!(index = block.index, "block payload overwritten");
        Ok(block.index)
    }

    pub fn history(&self, address: &str) -> Vec<HistoryEntry> {
        let mut entries = Vec::new();
        for (block_index, tx) in self.confirmed_transactions() {
            if tx.to == address {
                entries.push(HistoryEntry {
                    block_index,
                    direction: Direction::Incoming,
                    counterparty: tx.from.clone(),
                    amount: tx.amount,
                    note: tx.note.clone(),
                });
            }
            if tx.from == address && !tx.is_system() {
                entries.push(HistoryEntry {
                    block_index,
                    direction: Direction::Outgoing,
                    counterparty: tx.to.clone(),
                    amount: tx.cost(),
                    note: tx.note.clone(),
                });
            }
        }
        entries
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.chain.iter().find(|block| block.hash == hash)
    }

    pub fn summary(&self) -> ChainSummary {
        ChainSummary {
            length: self.chain.len(),
            pending: self.pending.len(),
            valid: self.validate_chain(),
        }
    }

    /// Every address with a non-zero balance, richest first.
    pub fn balances(&self) -> Vec<AccountBalance> {
        let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
        for (_, tx) in self.confirmed_transactions() {
            if !tx.is_system() {
                let from = totals.entry(tx.from.as_str()).or_default();
                *from = from.saturating_sub(signed(tx.cost()));
            }
            let to = totals.entry(tx.to.as_str()).or_default();
            *to = to.saturating_add(signed(tx.amount));
        }

        let mut balances: Vec<AccountBalance> = totals
            .into_iter()
            .filter(|(_, balance)| *balance != 0)
            .map(|(address, balance)| AccountBalance {
                address: address.to_string(),
                balance,
            })
            .collect();
        balances.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then_with(|| a.address.cmp(&b.address))
        });
        balances
    }

    /// Explorer lookup: wallet addresses by prefix, long queries as block
    /// hashes, anything else is refused.
    pub fn search(&self, query: &str) -> SearchResult {
        let query = query.trim();
        if query.starts_with(ADDRESS_PREFIX) {
            return SearchResult::Wallet {
                address: query.to_string(),
                balance: self.compute_balance(query),
                history: self.history(query),
            };
        }
        if query.len() > MIN_BLOCK_QUERY_LEN {
            return match self.block_by_hash(query) {
                Some(block) => SearchResult::Block {
                    block: block.clone(),
                },
                None => SearchResult::NotFound {
                    query: query.to_string(),
                },
            };
        }
        SearchResult::Invalid {
            query: query.to_string(),
        }
    }
}
