use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use localchain_core::chain::{AccountBalance, ChainSummary, HistoryEntry, SearchResult};
use localchain_core::{Block, LedgerError, Transaction, Wallet};
use serde::{Deserialize, Serialize};

use crate::runtime::{Handle, MiningStatus, TransferRequest};
use crate::session::SessionError;

#[derive(Debug)]
pub enum ApiError {
    Session(SessionError),
    NotFound(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Session(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Session(SessionError::SessionClosed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Session(
                SessionError::MiningInProgress
                | SessionError::MiningAbandoned
                | SessionError::Ledger(
                    LedgerError::LinkageMismatch { .. }
                    | LedgerError::InvalidBlock { .. }
                    | LedgerError::ChainCorrupt(_)
                    | LedgerError::AlreadyCorrupted,
                ),
            ) => StatusCode::CONFLICT,
            ApiError::Session(SessionError::Ledger(_)) => StatusCode::BAD_REQUEST,
        };
        let error = match self {
            ApiError::Session(err) => err.to_string(),
            ApiError::NotFound(what) => what,
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeSummary {
    node_id: String,
    address: String,
    balance: i64,
    #[serde(flatten)]
    chain: ChainSummary,
}

#[derive(Serialize)]
struct Head {
    height: u64,
    hash: String,
}

#[derive(Serialize)]
struct Accepted {
    accepted: bool,
    tx: Transaction,
}

#[derive(Deserialize)]
struct MineParams {
    difficulty: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Validation {
    valid: bool,
    corrupt_at: Option<u64>,
}

#[derive(Serialize)]
struct Corrupted {
    corrupted: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletView {
    address: String,
    private_key: String,
    balance: i64,
}

pub fn router(handle: Handle) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/summary", get(summary))
        .route("/chain", get(chain))
        .route("/chain/head", get(head))
        .route("/chain/blocks/{hash}", get(block_by_hash))
        .route("/mempool", get(mempool))
        .route("/tx", post(submit_tx))
        .route("/mine", post(mine))
        .route("/mine/status", get(mining_status))
        .route("/balance/{addr}", get(balance))
        .route("/history/{addr}", get(history))
        .route("/balances", get(balances))
        .route("/search/{query}", get(search))
        .route("/validate", get(validate))
        .route("/corrupt", post(corrupt))
        .route("/reset", post(reset))
        .route("/wallet", get(wallet))
        .route("/wallet/new", post(new_wallet))
        .with_state(handle)
}

async fn summary(State(handle): State<Handle>) -> ApiResult<NodeSummary> {
    let summary = handle
        .query(|s| NodeSummary {
            node_id: s.node_id().to_string(),
            address: s.wallet().address().to_string(),
            balance: s.ledger().compute_balance(s.wallet().address()),
            chain: s.ledger().summary(),
        })
        .await?;
    Ok(Json(summary))
}

async fn chain(State(handle): State<Handle>) -> ApiResult<Vec<Block>> {
    Ok(Json(handle.query(|s| s.ledger().chain().to_vec()).await?))
}

async fn head(State(handle): State<Handle>) -> ApiResult<Head> {
    let head = handle
        .query(|s| {
            let block = s.ledger().latest_block();
            Head {
                height: block.index,
                hash: block.hash.clone(),
            }
        })
        .await?;
    Ok(Json(head))
}

async fn block_by_hash(
    State(handle): State<Handle>,
    Path(hash): Path<String>,
) -> ApiResult<Block> {
    let lookup = hash.clone();
    handle
        .query(move |s| s.ledger().block_by_hash(&lookup).cloned())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no block with hash {hash}")))
}

async fn mempool(State(handle): State<Handle>) -> ApiResult<Vec<Transaction>> {
    Ok(Json(handle.query(|s| s.ledger().pending().to_vec()).await?))
}

async fn submit_tx(
    State(handle): State<Handle>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<Accepted> {
    let tx = handle.transfer(request).await?;
    Ok(Json(Accepted { accepted: true, tx }))
}

async fn mine(State(handle): State<Handle>, Query(params): Query<MineParams>) -> ApiResult<Block> {
    Ok(Json(handle.mine(params.difficulty).await?))
}

async fn mining_status(State(handle): State<Handle>) -> ApiResult<MiningStatus> {
    Ok(Json(handle.mining_status().await?))
}

async fn balance(
    State(handle): State<Handle>,
    Path(addr): Path<String>,
) -> ApiResult<AccountBalance> {
    let balance = handle
        .query(move |s| AccountBalance {
            balance: s.ledger().compute_balance(&addr),
            address: addr,
        })
        .await?;
    Ok(Json(balance))
}

async fn history(
    State(handle): State<Handle>,
    Path(addr): Path<String>,
) -> ApiResult<Vec<HistoryEntry>> {
    Ok(Json(handle.query(move |s| s.ledger().history(&addr)).await?))
}

async fn balances(State(handle): State<Handle>) -> ApiResult<Vec<AccountBalance>> {
    Ok(Json(handle.query(|s| s.ledger().balances()).await?))
}

async fn search(
    State(handle): State<Handle>,
    Path(query): Path<String>,
) -> ApiResult<SearchResult> {
    Ok(Json(handle.query(move |s| s.ledger().search(&query)).await?))
}

async fn validate(State(handle): State<Handle>) -> ApiResult<Validation> {
    let validation = handle
        .query(|s| match s.ledger().verify_chain() {
            Ok(()) => Validation {
                valid: true,
                corrupt_at: None,
            },
            Err(LedgerError::ChainCorrupt(index)) => Validation {
                valid: false,
                corrupt_at: Some(index),
            },
            Err(_) => Validation {
                valid: false,
                corrupt_at: None,
            },
        })
        .await?;
    Ok(Json(validation))
}

async fn corrupt(State(handle): State<Handle>) -> ApiResult<Corrupted> {
    Ok(Json(Corrupted {
        corrupted: handle.corrupt().await?,
    }))
}

async fn reset(State(handle): State<Handle>) -> Result<StatusCode, ApiError> {
    handle.reset().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn wallet(State(handle): State<Handle>) -> ApiResult<WalletView> {
    let view = handle
        .query(|s| wallet_view(s.wallet(), s.ledger().compute_balance(s.wallet().address())))
        .await?;
    Ok(Json(view))
}

async fn new_wallet(State(handle): State<Handle>) -> ApiResult<WalletView> {
    let wallet = handle.new_wallet().await?;
    let address = wallet.address().to_string();
    let balance = handle
        .query(move |s| s.ledger().compute_balance(&address))
        .await?;
    Ok(Json(wallet_view(&wallet, balance)))
}

fn wallet_view(wallet: &Wallet, balance: i64) -> WalletView {
    WalletView {
        address: wallet.address().to_string(),
        private_key: wallet.private_key().to_string(),
        balance,
    }
}
