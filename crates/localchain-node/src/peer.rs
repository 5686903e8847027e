//! Same-host peer transport: one newline-terminated JSON envelope per TCP
//! connection, pushed to every configured peer without acknowledgement.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use localchain_core::Block;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants::{MAX_ENVELOPE_BYTES, PEER_CONNECT_TIMEOUT};
use crate::runtime::Handle;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    NewBlock(Block),
    RequestChain,
    SendChain(Vec<Block>),
    ResetNetwork,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::NewBlock(_) => "NEW_BLOCK",
            Message::RequestChain => "REQUEST_CHAIN",
            Message::SendChain(_) => "SEND_CHAIN",
            Message::ResetNetwork => "RESET_NETWORK",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub message: Message,
}

impl Envelope {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

#[derive(Clone, Debug)]
pub struct PeerNetwork {
    node_id: String,
    peers: Arc<[SocketAddr]>,
}

impl PeerNetwork {
    pub fn new(node_id: impl Into<String>, peers: Vec<SocketAddr>) -> Self {
        Self {
            node_id: node_id.into(),
            peers: peers.into(),
        }
    }

    /// Sends `message` to every peer in the background. Unreachable peers
    /// are skipped.
    pub fn broadcast(&self, message: Message) {
        let envelope = Envelope {
            sender: self.node_id.clone(),
            message,
        };
        let line: Arc<[u8]> = match envelope.encode() {
            Ok(line) => line.into(),
            Err(err) => {
                warn!("failed to encode {}: {err:#}", envelope.message.kind());
                return;
            }
        };
        debug!(
            kind = envelope.message.kind(),
            peers = self.peers.len(),
            bytes = line.len(),
            "broadcasting"
        );
        for &addr in self.peers.iter() {
            let line = line.clone();
            tokio::spawn(async move {
                if let Err(err) = send_line(addr, &line).await {
                    debug!(%addr, "peer unreachable: {err:#}");
                }
            });
        }
    }
}

async fn send_line(addr: SocketAddr, line: &[u8]) -> Result<()> {
    let mut stream = timeout(PEER_CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .context("connect timed out")??;
    stream.write_all(line).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn read_envelope(stream: TcpStream) -> Result<Envelope> {
    let mut reader = BufReader::new(stream.take(MAX_ENVELOPE_BYTES));
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Envelope::decode(&line)
}

/// Accepts peer connections forever, handing each decoded envelope to the
/// session runtime.
pub async fn listen(listener: TcpListener, handle: Handle) -> Result<()> {
    info!("peer listener on {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        let handle = handle.clone();
        tokio::spawn(async move {
            match read_envelope(stream).await {
                Ok(envelope) => {
                    debug!(
                        %addr,
                        sender = %envelope.sender,
                        kind = envelope.message.kind(),
                        "peer message received"
                    );
                    if handle.deliver(envelope).await.is_err() {
                        debug!("session gone; dropping peer message");
                    }
                }
                Err(err) => warn!(%addr, "discarding peer message: {err:#}"),
            }
        });
    }
}
