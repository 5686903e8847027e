use std::net::SocketAddr;
use std::sync::Arc;

use localchain_core::store::SnapshotStore;
use localchain_core::LedgerConfig;
use localchain_node::peer::PeerNetwork;
use localchain_node::{api, runtime, Session};
use localchain_storage::MemoryStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn serve() -> anyhow::Result<SocketAddr> {
    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
    let config = LedgerConfig {
        difficulty: 1,
        ..LedgerConfig::default()
    };
    let session = Session::open("api-test", config, store, &mut StdRng::seed_from_u64(4))?;
    let (handle, _actor) = runtime::spawn(session, PeerNetwork::new("api-test", vec![]));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, api::router(handle)).await });
    Ok(addr)
}

#[tokio::test]
async fn test_mine_transfer_and_query() -> anyhow::Result<()> {
    let base = format!("http://{}", serve().await?);
    let client = reqwest::Client::new();

    let health: Value = client.get(format!("{base}/health")).send().await?.json().await?;
    assert_eq!(health, json!({ "status": "ok" }));

    let refused = client
        .post(format!("{base}/tx"))
        .json(&json!({ "to": "Wallet_FRIEND", "amount": 5 }))
        .send()
        .await?;
    assert_eq!(refused.status(), StatusCode::BAD_REQUEST);
    let body: Value = refused.json().await?;
    assert!(body["error"].as_str().unwrap().contains("insufficient funds"));

    let mined = client.post(format!("{base}/mine")).send().await?;
    assert_eq!(mined.status(), StatusCode::OK);
    let block: Value = mined.json().await?;
    assert_eq!(block["index"], 1);
    let hash = block["hash"].as_str().unwrap().to_string();

    let accepted: Value = client
        .post(format!("{base}/tx"))
        .json(&json!({ "to": "Wallet_FRIEND", "amount": 5 }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(accepted["accepted"], true);
    assert_eq!(accepted["tx"]["fee"], 3);

    let mempool: Value = client.get(format!("{base}/mempool")).send().await?.json().await?;
    assert_eq!(mempool.as_array().unwrap().len(), 1);

    let wallet: Value = client.get(format!("{base}/wallet")).send().await?.json().await?;
    assert_eq!(wallet["balance"], 10);

    let found: Value = client
        .get(format!("{base}/chain/blocks/{hash}"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(found["hash"], hash.as_str());

    let search: Value = client
        .get(format!("{base}/search/{hash}"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(search["kind"], "block");

    let missing = client
        .get(format!("{base}/chain/blocks/{}", "f".repeat(64)))
        .send()
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let head: Value = client.get(format!("{base}/chain/head")).send().await?.json().await?;
    assert_eq!(head["height"], 1);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_validate_reset() -> anyhow::Result<()> {
    let base = format!("http://{}", serve().await?);
    let client = reqwest::Client::new();

    let nothing = client.post(format!("{base}/corrupt")).send().await?;
    assert_eq!(nothing.status(), StatusCode::CONFLICT);

    client.post(format!("{base}/mine?difficulty=2")).send().await?;
    let corrupted: Value = client.post(format!("{base}/corrupt")).send().await?.json().await?;
    assert_eq!(corrupted["corrupted"], 1);

    let validation: Value = client.get(format!("{base}/validate")).send().await?.json().await?;
    assert_eq!(validation, json!({ "valid": false, "corruptAt": 1 }));

    let reset = client.post(format!("{base}/reset")).send().await?;
    assert_eq!(reset.status(), StatusCode::NO_CONTENT);

    let summary: Value = client.get(format!("{base}/summary")).send().await?.json().await?;
    assert_eq!(summary["length"], 1);
    assert_eq!(summary["valid"], true);
    assert_eq!(summary["balance"], 0);

    let too_hard = client.post(format!("{base}/mine?difficulty=65")).send().await?;
    assert_eq!(too_hard.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
