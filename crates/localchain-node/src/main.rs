use clap::Parser;
use localchain_core::store::SnapshotStore;
use localchain_node::{api, config, generate_node_id, peer, runtime, Session};
use localchain_storage::{sled_store::SledStore, MemoryStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// HTTP API address, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Address peers send messages to
    #[arg(long, default_value = "127.0.0.1:7000")]
    p2p_listen: SocketAddr,

    /// Peer transport address of another node; repeat for each peer
    #[arg(long = "peer")]
    peers: Vec<SocketAddr>,

    /// Data directory for sled
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// TOML file with a [ledger] section
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured mining difficulty
    #[arg(long)]
    difficulty: Option<usize>,

    /// Keep all state in memory
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = config::resolve(args.config.as_deref(), args.difficulty)?;
    let store: Arc<dyn SnapshotStore> = if args.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SledStore::open(&args.data_dir)?)
    };

    let mut rng = StdRng::from_entropy();
    let node_id = generate_node_id(&mut rng);
    let session = Session::open(node_id.clone(), config, store, &mut rng)?;
    let network = peer::PeerNetwork::new(node_id, args.peers);
    let (handle, actor) = runtime::spawn(session, network);

    let p2p = TcpListener::bind(args.p2p_listen).await?;
    let peers = tokio::spawn(peer::listen(p2p, handle.clone()));

    let app = api::router(handle.clone()).layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(args.listen).await?;
    info!("localchain-node listening on http://{}", args.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    peers.abort();
    handle.shutdown().await;
    actor.await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
    }
    info!("shutting down");
}
