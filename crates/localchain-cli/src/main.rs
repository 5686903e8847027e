use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "localchain-cli")]
#[command(about = "CLI client for a localchain node")]
struct Cli {
    /// Node base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Chain length, pool size and validity
    Summary,
    /// Every block
    Chain,
    /// Latest block height and hash
    Head,
    /// A block by hash
    Block { hash: String },
    /// Pending transactions
    Mempool,
    /// Submit a transfer; pays from the node's wallet unless --from is given
    Submit {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
        #[arg(long, requires = "signature")]
        from: Option<String>,
        /// Private key of --from
        #[arg(long)]
        signature: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Mine the pool into a block; waits until it is found
    Mine {
        #[arg(long)]
        difficulty: Option<usize>,
    },
    /// Progress of the current mining job
    Status,
    Balance { address: String },
    History { address: String },
    /// Every non-zero balance
    Balances,
    /// Look up a wallet address or block hash
    Search { query: String },
    /// Re-verify every block
    Validate,
    /// Tamper with a random block (in memory only)
    Corrupt,
    /// Wipe this node and every peer
    Reset,
    /// The node's wallet
    Wallet,
    /// Replace the node's wallet
    NewWallet,
}

#[derive(Serialize, Debug, PartialEq)]
struct Tx {
    to: String,
    amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

#[derive(Debug, PartialEq)]
struct Endpoint {
    method: Method,
    path: String,
    body: Option<Tx>,
}

impl Endpoint {
    fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: None,
        }
    }
}

impl Command {
    fn endpoint(self) -> Endpoint {
        match self {
            Command::Summary => Endpoint::get("/summary"),
            Command::Chain => Endpoint::get("/chain"),
            Command::Head => Endpoint::get("/chain/head"),
            Command::Block { hash } => Endpoint::get(format!("/chain/blocks/{hash}")),
            Command::Mempool => Endpoint::get("/mempool"),
            Command::Submit {
                to,
                amount,
                from,
                signature,
                note,
            } => Endpoint {
                body: Some(Tx {
                    to,
                    amount,
                    from,
                    signature,
                    note,
                }),
                ..Endpoint::post("/tx")
            },
            Command::Mine { difficulty: None } => Endpoint::post("/mine"),
            Command::Mine {
                difficulty: Some(difficulty),
            } => Endpoint::post(format!("/mine?difficulty={difficulty}")),
            Command::Status => Endpoint::get("/mine/status"),
            Command::Balance { address } => Endpoint::get(format!("/balance/{address}")),
            Command::History { address } => Endpoint::get(format!("/history/{address}")),
            Command::Balances => Endpoint::get("/balances"),
            Command::Search { query } => Endpoint::get(format!("/search/{query}")),
            Command::Validate => Endpoint::get("/validate"),
            Command::Corrupt => Endpoint::post("/corrupt"),
            Command::Reset => Endpoint::post("/reset"),
            Command::Wallet => Endpoint::get("/wallet"),
            Command::NewWallet => Endpoint::post("/wallet/new"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let endpoint = cli.cmd.endpoint();
    let url = format!("{}{}", cli.node.trim_end_matches('/'), endpoint.path);
    debug!(method = %endpoint.method, %url, "sending request");

    let client = reqwest::Client::new();
    let mut request = client.request(endpoint.method, &url);
    if let Some(tx) = &endpoint.body {
        request = request.json(tx);
    }
    let res = request.send().await?;
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if body.is_empty() => {}
        Err(_) => println!("{body}"),
    }
    if !status.is_success() {
        bail!("node refused the request ({status})");
    }
    Ok(())
}
