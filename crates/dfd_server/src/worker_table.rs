//! Shared bookkeeping for the worker pool (spec §4.6): each worker
//! publishes its request-socket port here on startup, and the
//! supervisor/dispatcher read `alive` to route around dead workers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};

use dfd_core::constants::SERVER_WORKER_COUNT;

pub struct WorkerSlot {
    pub port: AtomicU16,
    pub alive: AtomicBool,
    pub strikes: AtomicU64,
}

impl Default for WorkerSlot {
    fn default() -> Self {
        Self {
            port: AtomicU16::new(0),
            alive: AtomicBool::new(false),
            strikes: AtomicU64::new(0),
        }
    }
}

pub struct WorkerTable {
    slots: Vec<WorkerSlot>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self {
            slots: (0..SERVER_WORKER_COUNT).map(|_| WorkerSlot::default()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn set_port(&self, index: usize, port: u16) {
        self.slots[index].port.store(port, Ordering::SeqCst);
    }

    pub fn port(&self, index: usize) -> u16 {
        self.slots[index].port.load(Ordering::SeqCst)
    }

    pub fn set_alive(&self, index: usize, alive: bool) {
        self.slots[index].alive.store(alive, Ordering::SeqCst);
        if alive {
            self.slots[index].strikes.store(0, Ordering::SeqCst);
        }
    }

    pub fn is_alive(&self, index: usize) -> bool {
        self.slots[index].alive.load(Ordering::SeqCst)
    }

    /// All workers have published a non-zero port. Workers block on
    /// this before serving (spec §4.6).
    pub fn all_published(&self) -> bool {
        self.slots.iter().all(|s| s.port.load(Ordering::SeqCst) != 0)
    }

    pub fn socket_addr(&self, index: usize) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port(index)))
    }

    /// Adds a strike to `index`; returns the new count.
    pub fn strike(&self, index: usize) -> u64 {
        self.slots[index].strikes.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_strikes(&self, index: usize) {
        self.slots[index].strikes.store(0, Ordering::SeqCst);
    }
}

impl Default for WorkerTable {
    fn default() -> Self {
        Self::new()
    }
}
