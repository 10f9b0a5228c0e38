//! A single worker's request-socket loop (spec §4.6). Readers answer
//! SOURCE_REQUEST; the current writer answers the mutating requests;
//! SERVER_REG and the election triggers are handled elsewhere (the
//! listener and the election task, respectively) since both need more
//! than a single request/reply round trip.

use std::sync::Arc;
use std::time::Duration;

use dfd_catalog::Catalog;
use dfd_core::constants::WORKER_RECV_TIMEOUT;
use dfd_transport::TransportError;
use dfd_wire::{ForwardedWrite, Message};
use tracing::{debug, trace, warn};

use crate::state::ServerState;

/// Binds the worker's request socket, publishes its port, waits for
/// every sibling to do the same, then serves until shutdown.
pub async fn run<C: Catalog + 'static>(index: usize, state: Arc<ServerState<C>>) -> anyhow::Result<()> {
    let (sock, port) = dfd_transport::udp::open_udp(0).await?;
    state.workers.set_port(index, port);
    state.workers.set_alive(index, true);

    while !state.workers.all_published() {
        if state.shutdown.is_cancelled() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    debug!("worker {index} serving on port {port}");

    loop {
        if state.shutdown.is_cancelled() {
            break;
        }
        match dfd_transport::udp::recv_from(&sock, WORKER_RECV_TIMEOUT).await {
            Ok((bytes, from)) => {
                if let Some(message) = Message::decode(&bytes) {
                    if let Some(reply) = handle(index, &state, message).await {
                        if let Err(e) = dfd_transport::udp::send_to(&sock, from, &reply.encode()).await {
                            warn!("worker {index}: reply send failed: {e}");
                        }
                    }
                }
            }
            Err(TransportError::RecvTimeout(_)) => continue,
            Err(e) => trace!("worker {index}: recv error: {e}"),
        }
    }

    state.workers.set_alive(index, false);
    Ok(())
}

async fn handle<C: Catalog>(index: usize, state: &Arc<ServerState<C>>, message: Message) -> Option<Message> {
    let is_writer = !state.is_reader(index);

    match message {
        Message::SourceRequest { file_id } => {
            if state.is_reader(index) {
                match state.catalog.sources(file_id).await {
                    Ok(sources) => Some(Message::SourceList(sources)),
                    Err(e) => Some(Message::Fail(e.to_string())),
                }
            } else {
                None
            }
        }
        Message::IndexRequest { file_id, size, source } if is_writer => {
            let result = state.catalog.index(file_id, size, source).await;
            state.deferred_writes.record(ForwardedWrite::Index { file_id, size, source });
            Some(apply_result(result, Message::IndexOk))
        }
        Message::DropRequest { file_id, peer_id } if is_writer => {
            let result = state.catalog.drop_entry(file_id, peer_id).await;
            state.deferred_writes.record(ForwardedWrite::Drop { file_id, peer_id });
            Some(apply_result(result, Message::DropOk))
        }
        Message::ReregisterRequest { addr } if is_writer => {
            let result = state.catalog.reregister(addr).await;
            state.deferred_writes.record(ForwardedWrite::Reregister { addr });
            Some(apply_result(result, Message::ReregisterOk))
        }
        Message::Forward(write) if is_writer => {
            let result = apply_forward(state, &write).await;
            Some(apply_result(result, Message::ForwardOk))
        }
        _ => None,
    }
}

fn apply_result<E: std::fmt::Display>(result: Result<(), E>, ok: Message) -> Message {
    match result {
        Ok(()) => ok,
        Err(e) => Message::Fail(e.to_string()),
    }
}

/// Applies a forwarded write exactly as its direct counterpart, except
/// a `NoRowsUpdated`-style error on a drop is not itself a failure:
/// replaying a drop that already happened locally is a no-op, not a
/// FORWARD_OK-withholding error (forwards use `INSERT OR IGNORE`
/// semantics end to end, §4.9).
pub(crate) async fn apply_forward<C: Catalog>(state: &Arc<ServerState<C>>, write: &ForwardedWrite) -> Result<(), String> {
    match write {
        ForwardedWrite::Index { file_id, size, source } => state
            .catalog
            .index(*file_id, *size, *source)
            .await
            .map_err(|e| e.to_string()),
        ForwardedWrite::Drop { file_id, peer_id } => {
            match state.catalog.drop_entry(*file_id, *peer_id).await {
                Ok(()) => Ok(()),
                Err(e) if matches!(e, dfd_catalog::CatalogError::NoRowsUpdated) => Ok(()),
                Err(e) => Err(e.to_string()),
            }
        }
        ForwardedWrite::Reregister { addr } => {
            state.catalog.reregister(*addr).await.map_err(|e| e.to_string())
        }
    }
}
