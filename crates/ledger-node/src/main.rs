mod config;
mod constants;
mod error;
mod peer;
mod routes;
mod tasks;

use clap::Parser;
use config::Args;
use ledger_core::{reconcile::Reconciler, Chain};
use ledger_storage::SledStore;
use peer::HttpPeer;
use routes::AppState;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let store = Arc::new(SledStore::open(&args.data_dir)?);
    // Refuses to start on a stored chain that fails validation.
    let chain = Arc::new(Chain::load_or_init(store.as_ref(), args.chain_config())?);
    let summary = chain.summary()?;
    info!(
        height = summary.height,
        difficulty = args.difficulty,
        "chain ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let persister = tokio::spawn(tasks::persist_loop(
        Arc::clone(&chain),
        Arc::clone(&store),
        args.persist_interval(),
        shutdown_rx.clone(),
    ));

    let reconciler = if args.peers.is_empty() {
        warn!("no peers configured, reconciliation disabled");
        None
    } else {
        let client = HttpPeer::client()?;
        let peers = args
            .peers
            .iter()
            .map(|url| HttpPeer::new(url.as_str(), client.clone()))
            .collect();
        Some(tokio::spawn(tasks::reconcile_loop(
            Reconciler::new(Arc::clone(&chain), peers),
            args.reconcile_interval(),
            shutdown_rx.clone(),
        )))
    };

    let app = routes::router(AppState {
        chain: Arc::clone(&chain),
    });

    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    persister.await?;
    if let Some(handle) = reconciler {
        handle.await?;
    }
    let written = tasks::persist(Arc::clone(&chain), Arc::clone(&store)).await?;
    info!(written, "final flush complete");
    Ok(())
}
