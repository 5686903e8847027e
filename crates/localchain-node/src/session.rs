//! One participant: identity, wallet, ledger and the store they are saved to.

use std::sync::Arc;

use localchain_core::store::SnapshotStore;
use localchain_core::{Block, Ledger, LedgerConfig, LedgerError, Transaction, Wallet};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("a block is being mined; try again when it is done")]
    MiningInProgress,

    #[error("mining abandoned: the chain head moved")]
    MiningAbandoned,

    #[error("session has shut down")]
    SessionClosed,
}

/// What became of a block announced by a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    Appended,
    /// The sender is ahead of us; its chain should be fetched.
    Behind,
    Rejected,
}

pub struct Session {
    node_id: String,
    wallet: Wallet,
    ledger: Ledger,
    store: Arc<dyn SnapshotStore>,
}

impl Session {
    /// Restores wallet and ledger from `store`, creating and saving whatever
    /// is missing.
    pub fn open<R: Rng>(
        node_id: impl Into<String>,
        config: LedgerConfig,
        store: Arc<dyn SnapshotStore>,
        rng: &mut R,
    ) -> anyhow::Result<Self> {
        let node_id = node_id.into();
        let wallet = match store.load_wallet()? {
            Some(wallet) => wallet,
            None => {
                let wallet = Wallet::generate(rng);
                store.save_wallet(&wallet)?;
                wallet
            }
        };
        let ledger = match store.load_snapshot()? {
            Some(snapshot) => Ledger::from_snapshot(config, snapshot),
            None => Ledger::new(config),
        };
        info!(
            %node_id,
            address = wallet.address(),
            blocks = ledger.chain_len(),
            pending = ledger.pending().len(),
            "session opened"
        );
        Ok(Self {
            node_id,
            wallet,
            ledger,
            store,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// True while only genesis is known.
    pub fn needs_chain(&self) -> bool {
        self.ledger.chain_len() == 1
    }

    fn persist(&self) {
        if let Err(err) = self.store.save_snapshot(&self.ledger.snapshot()) {
            warn!("failed to save snapshot: {err:#}");
        }
    }

    pub fn submit(&mut self, tx: Transaction) -> Result<Transaction, SessionError> {
        let tx = self.ledger.submit_transaction(tx)?;
        self.persist();
        Ok(tx)
    }

    /// Transfer out of this session's own wallet.
    pub fn transfer(
        &mut self,
        to: &str,
        amount: u64,
        note: &str,
    ) -> Result<Transaction, SessionError> {
        let tx = self.wallet.create_transfer(to, amount, note)?;
        self.submit(tx)
    }

    /// Candidate block paying this session's wallet.
    pub fn prepare_block(&self) -> Block {
        self.ledger.prepare_block(self.wallet.address())
    }

    pub fn commit_block(&mut self, block: Block) -> Result<Block, SessionError> {
        let block = self.ledger.commit_block(block)?;
        self.persist();
        Ok(block)
    }

    pub fn receive_block(&mut self, block: Block) -> BlockOutcome {
        let index = block.index;
        match self.ledger.append_external_block(block) {
            Ok(()) => {
                self.persist();
                BlockOutcome::Appended
            }
            Err(LedgerError::LinkageMismatch { .. })
                if index >= self.ledger.chain_len() as u64 =>
            {
                debug!(index, "peer is ahead of us");
                BlockOutcome::Behind
            }
            Err(_) => BlockOutcome::Rejected,
        }
    }

    /// Offers a peer's full chain to the length rule. Returns true when it
    /// replaced ours.
    pub fn receive_chain(&mut self, chain: Vec<Block>) -> bool {
        if chain.len() <= self.ledger.chain_len() {
            debug!(
                offered = chain.len(),
                ours = self.ledger.chain_len(),
                "offered chain is not longer"
            );
            return false;
        }
        if self.ledger.config().verify_external_blocks {
            if let Err(err) = self.ledger.verify_candidate(&chain) {
                warn!(%err, "offered chain refused");
                return false;
            }
        }
        let replaced = self.ledger.replace_chain(chain);
        if replaced {
            self.persist();
        }
        replaced
    }

    /// Tampers with a random block in memory only; the stored snapshot keeps
    /// the intact chain.
    pub fn corrupt<R: Rng>(&mut self, rng: &mut R) -> Result<u64, SessionError> {
        Ok(self.ledger.corrupt_random_block(rng)?)
    }

    /// Replaces the wallet with a fresh one and saves it.
    pub fn rotate_wallet<R: Rng>(&mut self, rng: &mut R) -> &Wallet {
        self.wallet = Wallet::generate(rng);
        if let Err(err) = self.store.save_wallet(&self.wallet) {
            warn!("failed to save wallet: {err:#}");
        }
        info!(address = self.wallet.address(), "new wallet");
        &self.wallet
    }

    /// Wipes the store and starts over: new wallet, genesis-only ledger.
    pub fn reset<R: Rng>(&mut self, rng: &mut R) {
        if let Err(err) = self.store.clear() {
            warn!("failed to clear store: {err:#}");
        }
        self.ledger.reset();
        self.rotate_wallet(rng);
        self.persist();
        warn!(node_id = %self.node_id, "session reset");
    }

    pub fn close(&self) {
        if let Err(err) = self.store.close() {
            warn!("failed to close store: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use localchain_core::{genesis_block, pow, Payload};
    use localchain_storage::MemoryStore;
    use rand::{rngs::StdRng, SeedableRng};

    fn config() -> LedgerConfig {
        LedgerConfig {
            difficulty: 1,
            ..LedgerConfig::default()
        }
    }

    fn open(store: &Arc<MemoryStore>, seed: u64) -> Session {
        let store: Arc<dyn SnapshotStore> = store.clone();
        Session::open("node", config(), store, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    fn mine(session: &mut Session) -> Block {
        let mined = pow::mine_blocking(session.prepare_block(), 1);
        session.commit_block(mined).unwrap()
    }

    #[test]
    fn open_creates_and_then_reuses_identity() {
        let store = Arc::new(MemoryStore::new());
        let first = open(&store, 1);
        assert!(first.needs_chain());
        assert_eq!(store.load_wallet().unwrap().as_ref(), Some(first.wallet()));

        let second = open(&store, 2);
        assert_eq!(second.wallet(), first.wallet());
    }

    #[test]
    fn mutations_are_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store, 1);
        mine(&mut session);
        session.transfer("Wallet_FRIEND", 2, "Transfer").unwrap();

        let restored = open(&store, 1);
        assert_eq!(restored.ledger().chain(), session.ledger().chain());
        assert_eq!(restored.ledger().pending().len(), 1);
    }

    #[test]
    fn rejected_transfer_leaves_store_untouched() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store, 1);

        let err = session.transfer("Wallet_FRIEND", 5, "Transfer").unwrap_err();
        assert!(matches!(
            err,
            SessionError::Ledger(LedgerError::InsufficientFunds { .. })
        ));
        assert!(store.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn corruption_is_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store, 1);
        mine(&mut session);

        session.corrupt(&mut StdRng::seed_from_u64(3)).unwrap();
        assert!(!session.ledger().validate_chain());

        let restored = open(&store, 1);
        assert!(restored.ledger().validate_chain());
    }

    #[test]
    fn peer_block_outcomes() {
        let store = Arc::new(MemoryStore::new());
        let mut ahead = open(&Arc::new(MemoryStore::new()), 5);
        let mut session = open(&store, 1);

        let first = mine(&mut ahead);
        let second = mine(&mut ahead);

        assert_eq!(session.receive_block(second.clone()), BlockOutcome::Behind);
        assert_eq!(session.receive_block(first.clone()), BlockOutcome::Appended);
        assert_eq!(session.receive_block(first), BlockOutcome::Rejected);
        assert_eq!(session.receive_block(second), BlockOutcome::Appended);
        assert_eq!(
            store.load_snapshot().unwrap().unwrap().chain,
            ahead.ledger().chain()
        );
    }

    #[test]
    fn tampered_chain_is_refused_when_verifying() {
        let mut ahead = open(&Arc::new(MemoryStore::new()), 5);
        mine(&mut ahead);
        mine(&mut ahead);
        let mut chain = ahead.ledger().chain().to_vec();
        chain[1].nonce += 1;

        let mut session = open(&Arc::new(MemoryStore::new()), 1);
        assert!(!session.receive_chain(chain));
        assert!(session.receive_chain(ahead.ledger().chain().to_vec()));
        assert!(!session.receive_chain(vec![genesis_block()]));
        assert_eq!(session.ledger().chain_len(), 3);
    }

    #[test]
    fn unworked_or_foreign_chain_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let strict = LedgerConfig {
            difficulty: 4,
            ..config()
        };
        let mut session = Session::open(
            "node",
            strict,
            store.clone(),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        let payout = Payload::Transactions(vec![Transaction::reward(
            "Wallet_EVIL",
            1_000_000,
            "Mining reward",
        )]);
        let first = Block::new(1, 1_600_000_000_000, payout, genesis_block().hash);
        let second = Block::new(
            2,
            1_600_000_000_001,
            Payload::Transactions(vec![]),
            first.hash.clone(),
        );
        assert!(!first.hash.starts_with('0'));
        assert_eq!(session.receive_block(first.clone()), BlockOutcome::Rejected);
        assert!(!session.receive_chain(vec![genesis_block(), first.clone(), second]));
        assert_eq!(session.ledger().compute_balance("Wallet_EVIL"), 0);

        let other = Block::new(0, 1, Payload::Sentinel("other".into()), "zz");
        let orphan = Block::new(
            1,
            1_600_000_000_000,
            Payload::Transactions(vec![]),
            other.hash.clone(),
        );
        let orphan = pow::mine_blocking(orphan, 4);
        assert!(!session.receive_chain(vec![other, orphan]));
        assert!(session.needs_chain());
        assert!(store.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn reset_wipes_everything() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store, 1);
        mine(&mut session);
        let old_address = session.wallet().address().to_string();

        session.reset(&mut StdRng::seed_from_u64(9));
        assert!(session.needs_chain());
        assert_ne!(session.wallet().address(), old_address);

        let restored = open(&store, 1);
        assert_eq!(restored.wallet(), session.wallet());
        assert_eq!(restored.ledger().chain_len(), 1);
    }
}
