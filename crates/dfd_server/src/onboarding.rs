//! Cluster onboarding (spec §4.9): a joining server streams a catalog
//! snapshot from a known server, reusing the download protocol's
//! framing (DOWNLOAD_CONFIRM/REQUEST_CHUNK/DATA_CHUNK/FINISH_DOWNLOAD)
//! as a one-off file transfer over the same connection SERVER_REG
//! arrived on.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use dfd_catalog::Catalog;
use dfd_core::PeerAddress;
use dfd_wire::Message;
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::state::ServerState;

const SNAPSHOT_BASE_NAME: &str = "catalog-snapshot.db";

/// K's side: called by the dispatcher when the first frame on a new
/// connection is SERVER_REG.
pub async fn serve_join<C: Catalog + 'static>(
    mut stream: TcpStream,
    joining_addr: PeerAddress,
    state: Arc<ServerState<C>>,
) -> anyhow::Result<()> {
    state.deferred_writes.start_recording();

    let snapshot_dir = std::env::temp_dir();
    let snapshot_path = snapshot_dir.join(format!("dfd-onboard-{}.db", joining_addr.peer_id));
    state.catalog.backup(&snapshot_path).await?;

    let roster = state.roster.snapshot();
    let response = Message::ServerRegResponse(
        roster
            .iter()
            .filter_map(|addr| to_peer_address(*addr))
            .collect(),
    );
    dfd_transport::tcp::send_framed(&mut stream, &response.encode()).await?;

    stream_snapshot(&mut stream, &snapshot_path).await?;
    let _ = std::fs::remove_file(&snapshot_path);

    // Wait for MIGRATE_OK.
    let frame = dfd_transport::tcp::recv_framed(&mut stream, dfd_core::constants::DEFAULT_RESPONSE_TIMEOUT * 4).await?;
    if !matches!(Message::decode(&frame), Some(Message::MigrateOk)) {
        warn!("onboarding: joiner did not send MIGRATE_OK");
    }

    let deferred = state.deferred_writes.stop_and_drain();
    for write in deferred {
        let message = Message::Forward(write);
        if dfd_transport::tcp::send_framed(&mut stream, &message.encode())
            .await
            .is_err()
        {
            break;
        }
        // Best-effort: read the joiner's FORWARD_OK/FAIL, but don't
        // abort the replay if one is missing.
        let _ = dfd_transport::tcp::recv_framed(&mut stream, dfd_core::constants::DEFAULT_RESPONSE_TIMEOUT).await;
    }

    let joining_socket = SocketAddr::V4(joining_addr.socket_addr());
    state.roster.add(joining_socket);
    info!("onboarding: {joining_addr} joined the cluster");
    Ok(())
}

/// S's side: opens a connection to a known server `K`, registers, pulls
/// the snapshot, merges it, and drains K's replayed writes.
pub async fn join_cluster<C: Catalog + 'static>(
    known_server: SocketAddr,
    self_addr: PeerAddress,
    download_dir: &Path,
    state: Arc<ServerState<C>>,
) -> anyhow::Result<()> {
    let mut stream = dfd_transport::tcp::connect(known_server, dfd_core::constants::DEFAULT_CONNECT_TIMEOUT).await?;
    dfd_transport::tcp::send_framed(&mut stream, &Message::ServerReg(self_addr).encode()).await?;

    let frame = dfd_transport::tcp::recv_framed(&mut stream, dfd_core::constants::DEFAULT_RESPONSE_TIMEOUT).await?;
    let Some(Message::ServerRegResponse(roster)) = Message::decode(&frame) else {
        anyhow::bail!("join_cluster: expected SERVER_REG_RESPONSE");
    };
    for addr in &roster {
        state.roster.add(SocketAddr::V4(addr.socket_addr()));
    }

    let snapshot_path = receive_snapshot(&mut stream, download_dir).await?;
    state.catalog.merge(&snapshot_path).await?;
    let _ = std::fs::remove_file(&snapshot_path);

    dfd_transport::tcp::send_framed(&mut stream, &Message::MigrateOk.encode()).await?;

    loop {
        let frame = match dfd_transport::tcp::recv_framed(&mut stream, dfd_core::constants::DEFAULT_RESPONSE_TIMEOUT).await {
            Ok(frame) => frame,
            Err(_) => break, // K closed the connection once the replay queue drained.
        };
        let Some(Message::Forward(write)) = Message::decode(&frame) else {
            break;
        };
        let result = crate::worker::apply_forward(&state, &write).await;
        let reply = match result {
            Ok(()) => Message::ForwardOk,
            Err(e) => Message::Fail(e),
        };
        if dfd_transport::tcp::send_framed(&mut stream, &reply.encode()).await.is_err() {
            break;
        }
    }

    state.roster.add(known_server);
    Ok(())
}

async fn stream_snapshot(stream: &mut TcpStream, snapshot_path: &Path) -> anyhow::Result<()> {
    let size = std::fs::metadata(snapshot_path)?.len();
    let confirm = Message::DownloadConfirm {
        size,
        name: SNAPSHOT_BASE_NAME.to_string(),
    };
    dfd_transport::tcp::send_framed(stream, &confirm.encode()).await?;

    loop {
        let frame = dfd_transport::tcp::recv_framed(stream, dfd_core::constants::DEFAULT_RESPONSE_TIMEOUT).await?;
        match Message::decode(&frame) {
            Some(Message::RequestChunk { chunk_index }) => {
                let path = snapshot_path.to_path_buf();
                let payload = tokio::task::spawn_blocking(move || dfd_chunked_io::package_chunk(&path, chunk_index))
                    .await
                    .expect("blocking task panicked")?;
                let data = Message::DataChunk {
                    chunk_index,
                    payload: bytes::Bytes::from(payload),
                };
                dfd_transport::tcp::send_framed(stream, &data.encode()).await?;
            }
            Some(Message::FinishDownload) => return Ok(()),
            _ => anyhow::bail!("onboarding: unexpected message while streaming snapshot"),
        }
    }
}

async fn receive_snapshot(stream: &mut TcpStream, download_dir: &Path) -> anyhow::Result<std::path::PathBuf> {
    let frame = dfd_transport::tcp::recv_framed(stream, dfd_core::constants::DEFAULT_RESPONSE_TIMEOUT).await?;
    let Some(Message::DownloadConfirm { size, name }) = Message::decode(&frame) else {
        anyhow::bail!("onboarding: expected DOWNLOAD_CONFIRM for the snapshot transfer");
    };

    let num_chunks = dfd_chunked_io::num_chunks(size);
    for chunk_index in 0..num_chunks {
        let request = Message::RequestChunk { chunk_index };
        dfd_transport::tcp::send_framed(stream, &request.encode()).await?;
        let reply = dfd_transport::tcp::recv_framed(stream, dfd_core::constants::DEFAULT_RESPONSE_TIMEOUT).await?;
        let Some(Message::DataChunk { payload, .. }) = Message::decode(&reply) else {
            anyhow::bail!("onboarding: expected DATA_CHUNK for the snapshot transfer");
        };
        let dir = download_dir.to_path_buf();
        let base = name.clone();
        tokio::task::spawn_blocking(move || dfd_chunked_io::unpack_chunk(&dir, &base, chunk_index, &payload))
            .await
            .expect("blocking task panicked")?;
    }

    dfd_transport::tcp::send_framed(stream, &Message::FinishDownload.encode()).await?;

    let dir = download_dir.to_path_buf();
    let base = name.clone();
    let assembled = if num_chunks == 0 {
        let path = dir.join(&base);
        std::fs::File::create(&path)?;
        path
    } else {
        let mut handle = tokio::task::spawn_blocking({
            let dir = dir.clone();
            let base = base.clone();
            move || dfd_chunked_io::open_assembly(&dir, &base)
        })
        .await
        .expect("blocking task panicked")?;
        for chunk_index in 1..num_chunks {
            let dir = dir.clone();
            let base = base.clone();
            handle = tokio::task::spawn_blocking(move || {
                dfd_chunked_io::merge_chunk(&mut handle, &dir, &base, chunk_index).map(|_| handle)
            })
            .await
            .expect("blocking task panicked")?;
        }
        dir.join(&base)
    };

    Ok(assembled)
}

fn to_peer_address(addr: SocketAddr) -> Option<PeerAddress> {
    match addr {
        SocketAddr::V4(v4) => Some(PeerAddress::new(dfd_core::PeerId::INVALID, *v4.ip(), v4.port())),
        SocketAddr::V6(_) => None,
    }
}
