//! Server personality: opens the catalog, starts the worker pool and
//! dispatcher, optionally joins an existing cluster, then blocks until
//! shutdown (spec §4.6-§4.9, §6).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dfd_catalog::SqliteCatalog;
use dfd_core::PeerAddress;
use dfd_server::Server;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::ServerOpts;

pub async fn run(opts: ServerOpts, shutdown: CancellationToken) -> anyhow::Result<()> {
    let catalog_path = match opts.catalog_path {
        Some(p) => PathBuf::from(p),
        None => dfd_core::config::config_dir()?.join("catalog.db"),
    };
    info!(path = %catalog_path.display(), "opening catalog");
    let catalog = Arc::new(SqliteCatalog::open(&catalog_path).await.context("opening catalog")?);

    let server = Server::start(catalog, opts.port, shutdown.clone())
        .await
        .context("starting server")?;
    info!(port = server.client_port, "server listening");

    if let Some(known) = opts.join {
        let peer_id = dfd_core::config::PeerIdFile::at_config_dir()?.load_or_create()?;
        let self_addr = local_peer_address(known, peer_id, server.client_port)?;
        let download_dir = dfd_core::config::download_dir()?;
        std::fs::create_dir_all(&download_dir).context("creating download directory")?;
        dfd_server::join_cluster(known, self_addr, &download_dir, server.state.clone())
            .await
            .context("joining cluster")?;
        info!(%known, "joined cluster");
    }

    shutdown.cancelled().await;
    info!("server shutting down");
    Ok(())
}

fn local_peer_address(known: SocketAddr, peer_id: dfd_core::PeerId, port: u16) -> anyhow::Result<PeerAddress> {
    let ip = crate::net_util::local_ipv4_towards(known)?;
    Ok(PeerAddress::new(peer_id, ip, port))
}
