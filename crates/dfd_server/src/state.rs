//! The state shared by every task a running server spawns: the worker
//! pool's bookkeeping, the catalog, the roster and the election lock
//! (spec §4.6-§4.9).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dfd_catalog::Catalog;
use dfd_core::constants::SERVER_WORKER_COUNT;
use dfd_wire::ForwardedWrite;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::election::ElectionTrigger;
use crate::roster::Roster;
use crate::worker_table::WorkerTable;

/// While `Some`, incoming writes destined for the local catalog are
/// also appended here, for replay to a joining server once onboarding
/// finishes taking its snapshot (spec §4.9).
#[derive(Default)]
pub struct DeferredWrites {
    queue: Mutex<Option<VecDeque<ForwardedWrite>>>,
}

impl DeferredWrites {
    pub fn start_recording(&self) {
        *self.queue.lock() = Some(VecDeque::new());
    }

    pub fn record(&self, write: ForwardedWrite) {
        if let Some(queue) = self.queue.lock().as_mut() {
            queue.push_back(write);
        }
    }

    /// Stops recording and returns everything queued, in order.
    pub fn stop_and_drain(&self) -> VecDeque<ForwardedWrite> {
        self.queue.lock().take().unwrap_or_default()
    }
}

pub struct ServerState<C: Catalog> {
    pub catalog: Arc<C>,
    pub workers: WorkerTable,
    pub roster: Roster,
    pub deferred_writes: DeferredWrites,
    /// Index of the current writer/leader worker; swapped atomically by
    /// a winning election (spec §4.7).
    pub leader_index: AtomicUsize,
    pub election_lock: tokio::sync::Mutex<()>,
    /// One trigger per worker, so any task can start an election on the
    /// *current* leader's behalf without needing to know which worker
    /// that is ahead of time — look it up via `leader()`.
    pub election_triggers: Vec<Arc<ElectionTrigger>>,
    pub election_ports: Mutex<Vec<u16>>,
    pub shutdown: CancellationToken,
}

impl<C: Catalog> ServerState<C> {
    pub fn new(catalog: Arc<C>, shutdown: CancellationToken) -> Self {
        let worker_count = SERVER_WORKER_COUNT;
        Self {
            catalog,
            workers: WorkerTable::new(),
            roster: Roster::new(),
            deferred_writes: DeferredWrites::default(),
            leader_index: AtomicUsize::new(worker_count - 1),
            election_lock: tokio::sync::Mutex::new(()),
            election_triggers: (0..worker_count).map(|_| Arc::new(ElectionTrigger::default())).collect(),
            election_ports: Mutex::new(vec![0u16; worker_count]),
            shutdown,
        }
    }

    /// Fires an election starting from the current leader's worker.
    pub fn trigger_election(&self) {
        self.election_triggers[self.leader()].fire();
    }

    pub fn leader(&self) -> usize {
        self.leader_index.load(Ordering::SeqCst)
    }

    pub fn set_leader(&self, index: usize) {
        self.leader_index.store(index, Ordering::SeqCst);
    }

    pub fn is_reader(&self, index: usize) -> bool {
        index != self.leader()
    }
}
