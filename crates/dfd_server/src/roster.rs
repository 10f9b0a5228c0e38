//! The known-servers list, shared between the dispatcher and onboarding
//! (spec §4.8, §4.9). A plain mutex: contention is low and every
//! operation is O(roster size).

use std::net::SocketAddr;

use parking_lot::Mutex;

#[derive(Default)]
pub struct Roster {
    servers: Mutex<Vec<SocketAddr>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<SocketAddr> {
        self.servers.lock().clone()
    }

    pub fn add(&self, addr: SocketAddr) {
        let mut servers = self.servers.lock();
        if !servers.contains(&addr) {
            servers.push(addr);
        }
    }

    pub fn add_many(&self, addrs: impl IntoIterator<Item = SocketAddr>) {
        for addr in addrs {
            self.add(addr);
        }
    }

    pub fn remove(&self, addr: SocketAddr) {
        self.servers.lock().retain(|a| *a != addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let roster = Roster::new();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        roster.add(addr);
        roster.add(addr);
        assert_eq!(roster.snapshot().len(), 1);
    }

    #[test]
    fn remove_prunes_entry() {
        let roster = Roster::new();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        roster.add(addr);
        roster.remove(addr);
        assert!(roster.snapshot().is_empty());
    }
}
