//! The session actor. A single task owns the [`Session`] and applies commands
//! one at a time; mining runs beside it as a separate cooperative task whose
//! result is posted back as another command.

use localchain_core::constants::{HASH_HEX_SIZE, TRANSFER_NOTE};
use localchain_core::mine::mine_block;
use localchain_core::{Block, LedgerError, Transaction, Wallet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::constants::{COMMAND_BUFFER, STARTUP_SYNC_DELAY};
use crate::peer::{Envelope, Message, PeerNetwork};
use crate::session::{BlockOutcome, Session, SessionError};

/// A transfer as submitted by a client. Without `from` the node's own wallet
/// pays and signs.
#[derive(Clone, Debug, Deserialize)]
pub struct TransferRequest {
    pub to: String,
    pub amount: u64,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MiningStatus {
    pub mining: bool,
    pub index: Option<u64>,
    pub difficulty: Option<usize>,
    /// Last nonce reported by the miner.
    pub nonce: u64,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Query(Box<dyn FnOnce(&Session) + Send>),
    Transfer {
        request: TransferRequest,
        reply: Reply<Transaction>,
    },
    Mine {
        difficulty: Option<usize>,
        reply: Reply<Block>,
    },
    MiningStatus {
        reply: oneshot::Sender<MiningStatus>,
    },
    MiningFinished {
        job: u64,
        block: Block,
    },
    Corrupt {
        reply: Reply<u64>,
    },
    NewWallet {
        reply: oneshot::Sender<Wallet>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Peer(Envelope),
    Sync,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable entry point to a running session.
#[derive(Clone)]
pub struct Handle {
    commands: mpsc::Sender<Command>,
}

impl Handle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        response.await.map_err(|_| SessionError::SessionClosed)
    }

    /// Runs `read` against the session between two commands.
    pub async fn query<T, F>(&self, read: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> T + Send + 'static,
    {
        self.request(|reply| {
            Command::Query(Box::new(move |session: &Session| {
                let _ = reply.send(read(session));
            }))
        })
        .await
    }

    pub async fn transfer(&self, request: TransferRequest) -> Result<Transaction, SessionError> {
        self.request(|reply| Command::Transfer { request, reply })
            .await?
    }

    /// Mines the pool into a block for the node's wallet and resolves once it
    /// is appended and announced.
    pub async fn mine(&self, difficulty: Option<usize>) -> Result<Block, SessionError> {
        self.request(|reply| Command::Mine { difficulty, reply })
            .await?
    }

    pub async fn mining_status(&self) -> Result<MiningStatus, SessionError> {
        self.request(|reply| Command::MiningStatus { reply }).await
    }

    pub async fn corrupt(&self) -> Result<u64, SessionError> {
        self.request(|reply| Command::Corrupt { reply }).await?
    }

    pub async fn new_wallet(&self) -> Result<Wallet, SessionError> {
        self.request(|reply| Command::NewWallet { reply }).await
    }

    /// Resets this node and tells every peer to do the same.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub async fn deliver(&self, envelope: Envelope) -> Result<(), SessionError> {
        self.commands
            .send(Command::Peer(envelope))
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Stops the actor after abandoning any mining and closing the store.
    pub async fn shutdown(&self) {
        if self.request(|reply| Command::Shutdown { reply }).await.is_err() {
            debug!("session already stopped");
        }
    }
}

struct MiningJob {
    id: u64,
    index: u64,
    difficulty: usize,
    progress: watch::Receiver<u64>,
    task: JoinHandle<()>,
    reply: Reply<Block>,
}

struct Runtime {
    session: Session,
    network: PeerNetwork,
    commands: mpsc::WeakSender<Command>,
    rng: StdRng,
    mining: Option<MiningJob>,
    next_job: u64,
}

/// Starts the actor for `session`.
pub fn spawn(session: Session, network: PeerNetwork) -> (Handle, JoinHandle<()>) {
    let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
    let runtime = Runtime {
        session,
        network,
        commands: commands.downgrade(),
        rng: StdRng::from_entropy(),
        mining: None,
        next_job: 0,
    };
    let task = tokio::spawn(runtime.run(inbox));
    (Handle { commands }, task)
}

impl Runtime {
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>) {
        self.schedule_sync();
        while let Some(command) = inbox.recv().await {
            let stopping = matches!(command, Command::Shutdown { .. });
            self.handle(command);
            if stopping {
                return;
            }
        }
        self.stop();
    }

    fn stop(&mut self) {
        self.abandon_mining();
        self.session.close();
        info!(node_id = self.session.node_id(), "session stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Query(read) => read(&self.session),
            Command::Transfer { request, reply } => {
                let _ = reply.send(self.transfer(request));
            }
            Command::Mine { difficulty, reply } => self.start_mining(difficulty, reply),
            Command::MiningStatus { reply } => {
                let _ = reply.send(self.mining_status());
            }
            Command::MiningFinished { job, block } => self.finish_mining(job, block),
            Command::Corrupt { reply } => {
                let _ = reply.send(self.session.corrupt(&mut self.rng));
            }
            Command::NewWallet { reply } => {
                let wallet = self.session.rotate_wallet(&mut self.rng).clone();
                let _ = reply.send(wallet);
            }
            Command::Reset { reply } => {
                self.network.broadcast(Message::ResetNetwork);
                self.reset();
                let _ = reply.send(());
            }
            Command::Peer(envelope) => self.on_envelope(envelope),
            Command::Sync => {
                if self.session.needs_chain() {
                    info!("asking peers for their chain");
                    self.network.broadcast(Message::RequestChain);
                } else {
                    debug!(
                        blocks = self.session.ledger().chain_len(),
                        "chain loaded; no sync needed"
                    );
                }
            }
            Command::Shutdown { reply } => {
                self.stop();
                let _ = reply.send(());
            }
        }
    }

    /// Queues a delayed chain request, as a freshly started node does.
    fn schedule_sync(&self) {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            sleep(STARTUP_SYNC_DELAY).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Sync).await;
            }
        });
    }

    fn transfer(&mut self, request: TransferRequest) -> Result<Transaction, SessionError> {
        if self.mining.is_some() {
            return Err(SessionError::MiningInProgress);
        }
        let note = request.note.as_deref().unwrap_or(TRANSFER_NOTE);
        let Some(from) = request.from else {
            return self.session.transfer(&request.to, request.amount, note);
        };
        if request.amount == 0 {
            let err = LedgerError::MalformedTransaction("amount must be positive".into());
            return Err(err.into());
        }
        self.session.submit(Transaction {
            from,
            to: request.to,
            amount: request.amount,
            fee: None,
            signature: request.signature,
            note: note.to_string(),
        })
    }

    fn start_mining(&mut self, difficulty: Option<usize>, reply: Reply<Block>) {
        if self.mining.is_some() {
            let _ = reply.send(Err(SessionError::MiningInProgress));
            return;
        }
        let difficulty = difficulty.unwrap_or(self.session.ledger().config().difficulty);
        if difficulty > HASH_HEX_SIZE {
            let err = LedgerError::Config(format!(
                "difficulty {difficulty} exceeds the {HASH_HEX_SIZE} characters of a hash"
            ));
            let _ = reply.send(Err(err.into()));
            return;
        }

        let candidate = self.session.prepare_block();
        let index = candidate.index;
        let id = self.next_job;
        self.next_job += 1;

        let (progress_tx, progress) = watch::channel(0);
        let commands = self.commands.clone();
        let task = tokio::spawn(async move {
            let block = mine_block(candidate, difficulty, move |nonce| {
                let _ = progress_tx.send(nonce);
            })
            .await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::MiningFinished { job: id, block }).await;
            }
        });

        info!(index, difficulty, "mining started");
        self.mining = Some(MiningJob {
            id,
            index,
            difficulty,
            progress,
            task,
            reply,
        });
    }

    fn finish_mining(&mut self, id: u64, block: Block) {
        let Some(job) = self.mining.take_if(|job| job.id == id) else {
            debug!(job = id, "result of an abandoned job dropped");
            return;
        };
        let result = self.session.commit_block(block);
        if let Ok(block) = &result {
            self.network.broadcast(Message::NewBlock(block.clone()));
        }
        let _ = job.reply.send(result);
    }

    /// Stops any in-flight mining; its caller is told the work was abandoned.
    fn abandon_mining(&mut self) {
        if let Some(job) = self.mining.take() {
            job.task.abort();
            warn!(index = job.index, "mining abandoned");
            let _ = job.reply.send(Err(SessionError::MiningAbandoned));
        }
    }

    fn mining_status(&self) -> MiningStatus {
        match &self.mining {
            Some(job) => MiningStatus {
                mining: true,
                index: Some(job.index),
                difficulty: Some(job.difficulty),
                nonce: *job.progress.borrow(),
            },
            None => MiningStatus::default(),
        }
    }

    fn reset(&mut self) {
        self.abandon_mining();
        self.session.reset(&mut self.rng);
        self.schedule_sync();
    }

    fn on_envelope(&mut self, envelope: Envelope) {
        if envelope.sender == self.session.node_id() {
            return;
        }
        match envelope.message {
            Message::NewBlock(block) => match self.session.receive_block(block) {
                BlockOutcome::Appended => self.abandon_mining(),
                BlockOutcome::Behind => self.network.broadcast(Message::RequestChain),
                BlockOutcome::Rejected => {}
            },
            Message::RequestChain => {
                if !self.session.needs_chain() {
                    let chain = self.session.ledger().chain().to_vec();
                    self.network.broadcast(Message::SendChain(chain));
                }
            }
            Message::SendChain(chain) => {
                if self.session.receive_chain(chain) {
                    self.abandon_mining();
                }
            }
            Message::ResetNetwork => {
                warn!(sender = %envelope.sender, "network reset requested");
                self.reset();
            }
        }
    }
}
