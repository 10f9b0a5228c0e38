//! Bully leader election (spec §4.7). Each worker runs a companion
//! election task on its own UDP socket, independent of the request
//! socket used for ordinary dispatch.

use std::net::SocketAddr;
use std::sync::Arc;

use dfd_catalog::Catalog;
use dfd_core::constants::{ELECTION_REPLY_TIMEOUT, WORKER_RECV_TIMEOUT};
use dfd_transport::TransportError;
use dfd_wire::Message;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::state::ServerState;

/// A channel-less trigger: the dispatcher (or a worker noticing the
/// writer is unreachable) calls [`ElectionTrigger::fire`] to start an
/// election on this worker's behalf.
#[derive(Default)]
pub struct ElectionTrigger {
    notify: Notify,
}

impl ElectionTrigger {
    pub fn fire(&self) {
        self.notify.notify_one();
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Runs the election companion task for worker `index` until shutdown.
/// Binds its own UDP socket, independent of the worker's request port,
/// and publishes it into `state.election_ports[index]`.
pub async fn run<C: Catalog + 'static>(index: usize, state: Arc<ServerState<C>>, trigger: Arc<ElectionTrigger>) -> anyhow::Result<()> {
    let (sock, port) = dfd_transport::udp::open_udp(0).await?;
    state.election_ports.lock()[index] = port;

    loop {
        if state.shutdown.is_cancelled() {
            return Ok(());
        }

        tokio::select! {
            _ = trigger.wait() => {
                run_election(index, &state, &sock).await;
            }
            result = dfd_transport::udp::recv_from(&sock, WORKER_RECV_TIMEOUT) => {
                match result {
                    Ok((bytes, from)) => handle_datagram(index, &state, &sock, from, &bytes).await,
                    Err(TransportError::RecvTimeout(_)) => {}
                    Err(_) => {}
                }
            }
        }
    }
}

async fn handle_datagram<C: Catalog>(index: usize, state: &Arc<ServerState<C>>, sock: &UdpSocket, from: SocketAddr, bytes: &[u8]) {
    match Message::decode(bytes) {
        Some(Message::ElectX(j)) if (j as usize) < index => {
            let _ = dfd_transport::udp::send_to(sock, from, &Message::Bully.encode()).await;
            run_election(index, state, sock).await;
        }
        Some(Message::ElectX(_)) => {
            // Lower-ranked challenger; nothing to do, we outrank it.
        }
        Some(Message::Bully) => {
            debug!("worker {index}: dropped out of contention");
        }
        Some(Message::LeaderX(winner)) => {
            info!("worker {index}: new leader is worker {winner}");
            let _guard = state.election_lock.lock().await;
            state.set_leader(winner as usize);
        }
        _ => {}
    }
}

/// Challenges every worker ranked above `index`; if none answers within
/// [`ELECTION_REPLY_TIMEOUT`], `index` wins and announces itself.
async fn run_election<C: Catalog>(index: usize, state: &Arc<ServerState<C>>, sock: &UdpSocket) {
    let higher: Vec<u16> = {
        let ports = state.election_ports.lock();
        ports
            .iter()
            .enumerate()
            .filter(|&(i, &port)| i > index && port != 0)
            .map(|(_, &port)| port)
            .collect()
    };

    let mut challenged = false;
    for port in &higher {
        let addr = SocketAddr::from(([127, 0, 0, 1], *port));
        if dfd_transport::udp::send_to(sock, addr, &Message::ElectX(index as u8).encode())
            .await
            .is_ok()
        {
            challenged = true;
        }
    }

    if !challenged {
        win_election(index, state, sock).await;
        return;
    }

    match dfd_transport::udp::recv_from(sock, ELECTION_REPLY_TIMEOUT).await {
        Ok(_) => {
            // Someone answered (BULLY or a higher ELECT_X); they take
            // it from here.
        }
        Err(_) => win_election(index, state, sock).await,
    }
}

async fn win_election<C: Catalog>(index: usize, state: &Arc<ServerState<C>>, sock: &UdpSocket) {
    let _guard = state.election_lock.lock().await;
    state.set_leader(index);
    info!("worker {index}: won election, now writer");

    let ports: Vec<u16> = state.election_ports.lock().iter().copied().collect();
    for (i, port) in ports.iter().enumerate() {
        if i == index || *port == 0 {
            continue;
        }
        let addr = SocketAddr::from(([127, 0, 0, 1], *port));
        let _ = dfd_transport::udp::send_to(sock, addr, &Message::LeaderX(index as u8).encode()).await;
    }
}
