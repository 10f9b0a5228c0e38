//! Steps 2-6 of the download algorithm (spec §4.5): peer probing for
//! the initial handshake, the bounded worker pool, and the main
//! thread's merge loop.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dfd_core::{FileId, PeerAddress, CHUNK_SIZE};
use dfd_wire::Message;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::DownloadConfig;
use crate::error::DownloadError;

pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bad_peers: Vec<PeerAddress>,
}

struct PeerSlot {
    addr: PeerAddress,
    busy: bool,
}

struct SessionState {
    peers: Mutex<Vec<PeerSlot>>,
    remaining: Mutex<VecDeque<u64>>,
    done: Mutex<VecDeque<u64>>,
    notify: Notify,
    bad_peers: Mutex<HashSet<PeerAddress>>,
}

impl SessionState {
    /// Picks the lowest-indexed free, non-bad peer and marks it busy.
    /// `None` when no peer remains available.
    fn claim_peer(&self) -> Option<PeerAddress> {
        let bad = self.bad_peers.lock();
        let mut peers = self.peers.lock();
        for slot in peers.iter_mut() {
            if !slot.busy && !bad.contains(&slot.addr) {
                slot.busy = true;
                return Some(slot.addr);
            }
        }
        None
    }

    fn mark_bad(&self, addr: PeerAddress) {
        self.bad_peers.lock().insert(addr);
    }

    fn pop_remaining(&self) -> Option<u64> {
        self.remaining.lock().pop_front()
    }

    fn requeue(&self, chunk_index: u64) {
        self.remaining.lock().push_back(chunk_index);
    }

    fn push_done(&self, chunk_index: u64) {
        self.done.lock().push_back(chunk_index);
        self.notify.notify_one();
    }
}

/// Probes `sources` sequentially for the handshake + chunk 0. The
/// first peer to answer within the connect+response timeout wins;
/// peers that fail are folded into the returned `bad_peers` seed.
async fn probe_for_handshake(
    sources: &[PeerAddress],
    file_id: FileId,
    download_dir: &Path,
    cfg: &DownloadConfig,
) -> Result<(PeerAddress, String, u64, HashSet<PeerAddress>), DownloadError> {
    let mut bad_peers = HashSet::new();

    for &peer in sources {
        match handshake_and_chunk_zero(peer, file_id, download_dir, cfg).await {
            Ok((name, size)) => return Ok((peer, name, size, bad_peers)),
            Err(e) => {
                debug!("probe: peer {peer} failed handshake: {e}");
                bad_peers.insert(peer);
            }
        }
    }
    Err(DownloadError::NoPeerAvailable)
}

async fn handshake_and_chunk_zero(
    peer: PeerAddress,
    file_id: FileId,
    download_dir: &Path,
    cfg: &DownloadConfig,
) -> Result<(String, u64), DownloadError> {
    let addr = std::net::SocketAddr::V4(peer.socket_addr());
    let mut stream = dfd_transport::tcp::connect(addr, cfg.connect_timeout).await?;

    let init = Message::DownloadInit {
        file_id,
        chunk_size: CHUNK_SIZE,
    };
    dfd_transport::tcp::send_framed(&mut stream, &init.encode()).await?;
    let reply = dfd_transport::tcp::recv_framed(&mut stream, cfg.response_timeout).await?;
    let (size, name) = match Message::decode(&reply) {
        Some(Message::DownloadConfirm { size, name }) => (size, name),
        _ => return Err(DownloadError::NoPeerAvailable),
    };

    let payload = request_chunk(&mut stream, 0, cfg).await?;
    let download_dir = download_dir.to_path_buf();
    let base_name = name.clone();
    tokio::task::spawn_blocking(move || {
        dfd_chunked_io::unpack_chunk(&download_dir, &base_name, 0, &payload)
    })
    .await
    .expect("blocking task panicked")?;

    let _ = send_finish(&mut stream).await;
    Ok((name, size))
}

async fn request_chunk(
    stream: &mut TcpStream,
    chunk_index: u64,
    cfg: &DownloadConfig,
) -> Result<bytes::Bytes, DownloadError> {
    let request = Message::RequestChunk { chunk_index };
    dfd_transport::tcp::send_framed(stream, &request.encode()).await?;
    let reply = dfd_transport::tcp::recv_framed(stream, cfg.response_timeout).await?;
    match Message::decode(&reply) {
        Some(Message::DataChunk { payload, .. }) => Ok(payload),
        _ => Err(DownloadError::NoPeerAvailable),
    }
}

async fn send_finish(stream: &mut TcpStream) -> Result<(), DownloadError> {
    dfd_transport::tcp::send_framed(stream, &Message::FinishDownload.encode()).await?;
    Ok(())
}

/// Runs one worker: repeatedly claims a free peer and drains `remaining`
/// against it, per spec §4.5 step 4.
async fn worker_loop(state: Arc<SessionState>, file_id: FileId, download_dir: PathBuf, base_name: String, cfg: DownloadConfig) {
    loop {
        let Some(peer) = state.claim_peer() else {
            return;
        };

        let addr = std::net::SocketAddr::V4(peer.socket_addr());
        let mut stream = match dfd_transport::tcp::connect(addr, cfg.connect_timeout).await {
            Ok(s) => s,
            Err(_) => {
                state.mark_bad(peer);
                continue;
            }
        };

        let init = Message::DownloadInit {
            file_id,
            chunk_size: CHUNK_SIZE,
        };
        if dfd_transport::tcp::send_framed(&mut stream, &init.encode())
            .await
            .is_err()
        {
            state.mark_bad(peer);
            continue;
        }
        let handshake_reply = dfd_transport::tcp::recv_framed(&mut stream, cfg.response_timeout).await;
        match handshake_reply.as_ref().map(|b| Message::decode(b)) {
            Ok(Some(Message::DownloadConfirm { .. })) => {}
            _ => {
                state.mark_bad(peer);
                continue;
            }
        }

        let mut had_failure = false;
        loop {
            let Some(chunk_index) = state.pop_remaining() else {
                break;
            };

            let request = Message::RequestChunk { chunk_index };
            if dfd_transport::tcp::send_framed(&mut stream, &request.encode())
                .await
                .is_err()
            {
                state.requeue(chunk_index);
                break;
            }

            match dfd_transport::tcp::recv_framed(&mut stream, cfg.response_timeout).await {
                Ok(body) => match Message::decode(&body) {
                    Some(Message::DataChunk { payload, .. }) => {
                        let dir = download_dir.clone();
                        let name = base_name.clone();
                        let write = tokio::task::spawn_blocking(move || {
                            dfd_chunked_io::unpack_chunk(&dir, &name, chunk_index, &payload)
                        })
                        .await
                        .expect("blocking task panicked");
                        match write {
                            Ok(()) => {
                                state.push_done(chunk_index);
                            }
                            Err(e) => {
                                warn!("worker: failed writing chunk {chunk_index}: {e}");
                                state.requeue(chunk_index);
                                had_failure = true;
                                break;
                            }
                        }
                    }
                    _ => {
                        state.requeue(chunk_index);
                        had_failure = true;
                        break;
                    }
                },
                Err(_) => {
                    state.requeue(chunk_index);
                    had_failure = true;
                    break;
                }
            }
        }

        let _ = send_finish(&mut stream).await;
        if had_failure {
            state.mark_bad(peer);
        }
    }
}

pub async fn download_file(
    file_id: FileId,
    sources: Vec<PeerAddress>,
    download_dir: &Path,
    cfg: &DownloadConfig,
) -> Result<DownloadOutcome, DownloadError> {
    if sources.is_empty() {
        return Err(DownloadError::NoPeerAvailable);
    }

    let (initial_peer, base_name, size, mut bad_peers) =
        probe_for_handshake(&sources, file_id, download_dir, cfg).await?;

    let num_chunks = dfd_chunked_io::num_chunks(size);
    let remaining: VecDeque<u64> = (1..num_chunks).collect();
    let done = VecDeque::from([0u64]);

    // The initial-chunk peer already completed its handshake, so it
    // rejoins the pool as free (not busy) rather than being excluded
    // (spec §4.5 tie-breaks).
    let peers: Vec<PeerSlot> = sources
        .iter()
        .filter(|&&addr| !bad_peers.contains(&addr))
        .map(|&addr| PeerSlot { addr, busy: false })
        .collect();

    let num_threads = [
        peers.len(),
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        remaining.len(),
        cfg.max_workers,
    ]
    .into_iter()
    .min()
    .unwrap_or(0);

    let state = Arc::new(SessionState {
        peers: Mutex::new(peers),
        remaining: Mutex::new(remaining),
        done: Mutex::new(done),
        notify: Notify::new(),
        bad_peers: Mutex::new(HashSet::new()),
    });

    let mut workers = Vec::with_capacity(num_threads);
    for _ in 0..num_threads {
        let state = state.clone();
        let download_dir = download_dir.to_path_buf();
        let base_name = base_name.clone();
        workers.push(tokio::spawn(worker_loop(
            state,
            file_id,
            download_dir,
            base_name.clone(),
            *cfg,
        )));
    }

    // Main thread: drain `done` into the assembly file as workers
    // produce it, waking on `notify` (spec §4.5 step 5).
    let assembly = {
        let dir = download_dir.to_path_buf();
        let name = base_name.clone();
        tokio::task::spawn_blocking(move || dfd_chunked_io::open_assembly(&dir, &name))
            .await
            .expect("blocking task panicked")?
    };
    let assembly = Arc::new(Mutex::new(assembly));
    let mut merged: u64 = 1; // chunk 0 already merged by open_assembly

    loop {
        let batch: Vec<u64> = {
            let mut done_guard = state.done.lock();
            done_guard.drain(..).collect()
        };
        for chunk_index in batch {
            let assembly = assembly.clone();
            let dir = download_dir.to_path_buf();
            let name = base_name.clone();
            tokio::task::spawn_blocking(move || {
                let mut file = assembly.lock();
                dfd_chunked_io::merge_chunk(&mut file, &dir, &name, chunk_index)
            })
            .await
            .expect("blocking task panicked")?;
            merged += 1;
        }

        if merged >= num_chunks {
            break;
        }
        if workers.iter().all(|h| h.is_finished()) {
            // Workers are all done; drain whatever is left one more
            // time, then give up if still short.
            let leftover: Vec<u64> = state.done.lock().drain(..).collect();
            for chunk_index in leftover {
                let assembly = assembly.clone();
                let dir = download_dir.to_path_buf();
                let name = base_name.clone();
                tokio::task::spawn_blocking(move || {
                    let mut file = assembly.lock();
                    dfd_chunked_io::merge_chunk(&mut file, &dir, &name, chunk_index)
                })
                .await
                .expect("blocking task panicked")?;
                merged += 1;
            }
            break;
        }

        tokio::select! {
            _ = state.notify.notified() => {}
            _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
        }
    }

    for handle in workers {
        let _ = handle.await;
    }

    bad_peers.extend(state.bad_peers.lock().iter().copied());

    if merged < num_chunks {
        dfd_chunked_io::cleanup_partial_chunks(download_dir, &base_name, num_chunks);
        let _ = std::fs::remove_file(download_dir.join(&base_name));
        return Err(DownloadError::Incomplete {
            got: merged,
            want: num_chunks,
        });
    }

    Ok(DownloadOutcome {
        path: download_dir.join(&base_name),
        bad_peers: bad_peers.into_iter().collect(),
    })
}
