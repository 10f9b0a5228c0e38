//! TCP listener and per-client dispatcher (spec §4.8): accept, decode
//! one request, route it to a worker over UDP, retry with a strike
//! counter, and replicate successful writes to the rest of the
//! cluster.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dfd_catalog::Catalog;
use dfd_core::constants::{DISPATCHER_MAX_ATTEMPTS, DISPATCHER_WORKER_REPLY_TIMEOUT, KEEP_ALIVE_INTERVAL, WORKER_STRIKE_LIMIT};
use dfd_wire::{ForwardedWrite, Message};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info_span, warn};

use crate::onboarding;
use crate::state::ServerState;

/// Round-robins over healthy reader indices, skipping the current
/// writer and any worker marked dead.
struct ReaderRing {
    next: AtomicUsize,
}

impl ReaderRing {
    fn new() -> Self {
        Self { next: AtomicUsize::new(0) }
    }

    fn pick<C: Catalog>(&self, state: &ServerState<C>) -> Option<usize> {
        let n = state.workers.len();
        for _ in 0..n {
            let i = self.next.fetch_add(1, Ordering::Relaxed) % n;
            if state.is_reader(i) && state.workers.is_alive(i) && state.workers.port(i) != 0 {
                return Some(i);
            }
        }
        None
    }
}

pub async fn run<C: Catalog + 'static>(listener: TcpListener, state: Arc<ServerState<C>>) -> anyhow::Result<()> {
    let readers = Arc::new(ReaderRing::new());

    loop {
        let accepted = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("dispatcher: accept failed: {e}");
                continue;
            }
        };

        let state = state.clone();
        let readers = readers.clone();
        dfd_core::spawn::spawn(info_span!("client_connection", %peer), async move {
            handle_connection(stream, state, readers).await
        });
    }
    Ok(())
}

async fn handle_connection<C: Catalog + 'static>(
    mut stream: TcpStream,
    state: Arc<ServerState<C>>,
    readers: Arc<ReaderRing>,
) -> anyhow::Result<()> {
    let frame = dfd_transport::tcp::recv_framed(&mut stream, DISPATCHER_WORKER_REPLY_TIMEOUT * 4).await?;
    let Some(message) = Message::decode(&frame) else {
        let _ = dfd_transport::tcp::send_framed(&mut stream, &Message::Fail("malformed request".into()).encode()).await;
        return Ok(());
    };

    if let Message::ServerReg(addr) = message {
        return onboarding::serve_join(stream, addr, state).await;
    }

    if matches!(message, Message::ElectLeader) {
        state.trigger_election();
        let _ = dfd_transport::tcp::send_framed(&mut stream, &Message::ForwardOk.encode()).await;
        return Ok(());
    }

    // Server-to-server replication: dispatch straight to the writer
    // and reply, without the keep-alive dance or a further broadcast
    // (this message IS the broadcast).
    if matches!(message, Message::Forward(_)) {
        let reply = dispatch_with_retries(&state, state.leader(), &message).await;
        dfd_transport::tcp::send_framed(&mut stream, &reply.encode()).await?;
        return Ok(());
    }

    let is_write = is_write_request(&message);
    let worker_index = if is_write {
        Some(state.leader())
    } else {
        readers.pick(&state)
    };

    let Some(worker_index) = worker_index else {
        let _ = dfd_transport::tcp::send_framed(&mut stream, &Message::Fail("no reader available".into()).encode()).await;
        return Ok(());
    };

    let (_read_half, write_half) = stream.into_split();
    let write_half = Arc::new(tokio::sync::Mutex::new(write_half));

    let keep_alive_stop = tokio_util::sync::CancellationToken::new();
    let keep_alive_task = spawn_keep_alive(write_half.clone(), keep_alive_stop.clone());

    let reply = dispatch_with_retries(&state, worker_index, &message).await;
    keep_alive_stop.cancel();
    let _ = keep_alive_task.await;

    let mut write_half = write_half.lock().await;
    dfd_transport::tcp::send_framed(&mut *write_half, &reply.encode()).await?;

    if is_write && matches!(reply, Message::IndexOk | Message::DropOk | Message::ReregisterOk) {
        if let Some(write) = to_forwarded_write(&message) {
            broadcast_forward(&state, write).await;
        }
    }

    Ok(())
}

/// Broadcasts a write to every known server as its FORWARD variant
/// (spec §4.8, §4.9). Peers that time out or NACK are pruned from the
/// roster rather than retried — replication is best-effort.
async fn broadcast_forward<C: Catalog>(state: &Arc<ServerState<C>>, write: ForwardedWrite) {
    let servers = state.roster.snapshot();
    let message = Message::Forward(write);
    for server in servers {
        match forward_once(server, &message).await {
            Ok(true) => {}
            _ => state.roster.remove(server),
        }
    }
}

async fn forward_once(server: SocketAddr, message: &Message) -> anyhow::Result<bool> {
    let mut stream = dfd_transport::tcp::connect(
        server,
        dfd_core::constants::DEFAULT_CONNECT_TIMEOUT,
    )
    .await?;
    dfd_transport::tcp::send_framed(&mut stream, &message.encode()).await?;
    let reply = dfd_transport::tcp::recv_framed(&mut stream, DISPATCHER_WORKER_REPLY_TIMEOUT).await?;
    Ok(matches!(Message::decode(&reply), Some(Message::ForwardOk)))
}

fn is_write_request(message: &Message) -> bool {
    matches!(
        message,
        Message::IndexRequest { .. } | Message::DropRequest { .. } | Message::ReregisterRequest { .. }
    )
}

fn to_forwarded_write(message: &Message) -> Option<ForwardedWrite> {
    match *message {
        Message::IndexRequest { file_id, size, source } => {
            Some(ForwardedWrite::Index { file_id, size, source })
        }
        Message::DropRequest { file_id, peer_id } => Some(ForwardedWrite::Drop { file_id, peer_id }),
        Message::ReregisterRequest { addr } => Some(ForwardedWrite::Reregister { addr }),
        _ => None,
    }
}

/// Sends the original message to the chosen worker, retrying up to
/// [`DISPATCHER_MAX_ATTEMPTS`] times.
async fn dispatch_with_retries<C: Catalog>(state: &Arc<ServerState<C>>, worker_index: usize, message: &Message) -> Message {
    for attempt in 0..DISPATCHER_MAX_ATTEMPTS {
        let addr = state.workers.socket_addr(worker_index);
        let (sock, _) = match dfd_transport::udp::open_udp(0).await {
            Ok(pair) => pair,
            Err(_) => continue,
        };
        if dfd_transport::udp::send_to(&sock, addr, &message.encode()).await.is_err() {
            note_failure(state, worker_index);
            continue;
        }
        match dfd_transport::udp::recv_from(&sock, DISPATCHER_WORKER_REPLY_TIMEOUT).await {
            Ok((bytes, _)) => {
                if let Some(reply) = Message::decode(&bytes) {
                    state.workers.reset_strikes(worker_index);
                    return reply;
                }
            }
            Err(_) => note_failure(state, worker_index),
        }
        if attempt + 1 >= DISPATCHER_MAX_ATTEMPTS {
            break;
        }
    }
    Message::Fail("Database appears to be down".into())
}

/// A worker that fails to reply takes a strike; at
/// [`WORKER_STRIKE_LIMIT`] strikes it's marked dead (for the current
/// writer, an election is triggered instead of a mark-dead, since the
/// writer is never simply skipped the way a dead reader is).
fn note_failure<C: Catalog>(state: &Arc<ServerState<C>>, worker_index: usize) {
    let strikes = state.workers.strike(worker_index);
    if strikes < WORKER_STRIKE_LIMIT {
        return;
    }
    if state.is_reader(worker_index) {
        state.workers.set_alive(worker_index, false);
    } else {
        state.election_triggers[worker_index].fire();
    }
}

/// A client-facing keep-alive rides the same connection the client is
/// blocked reading from, so it shares the write half (under a mutex)
/// with the eventual final reply rather than needing its own socket.
fn spawn_keep_alive(
    write_half: Arc<tokio::sync::Mutex<tokio::net::tcp::OwnedWriteHalf>>,
    stop: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(KEEP_ALIVE_INTERVAL) => {}
            }
            let mut stream = write_half.lock().await;
            if dfd_transport::tcp::send_framed(&mut *stream, &Message::KeepAlive.encode())
                .await
                .is_err()
            {
                return;
            }
        }
    })
}
