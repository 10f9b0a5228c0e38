//! Process-wide constants. `CHUNK_SIZE` is fixed for the lifetime of a
//! running process (invariant 6 of the data model): every actor that
//! indexes chunks by byte offset must agree on it.

use std::time::Duration;

/// Default chunk size used to split files for transfer: 1 MiB.
pub const CHUNK_SIZE: u64 = 1024 * 1024;

/// Number of workers a server runs: N-1 readers plus one writer/leader.
pub const SERVER_WORKER_COUNT: usize = 5;

/// Maximum parallel download worker threads for a single session.
pub const MAX_DOWNLOAD_WORKERS: usize = 5;

/// Maximum concurrent seeder connections a peer serves at once.
pub const DEFAULT_SEEDER_CONCURRENCY: usize = 5;

/// Maximum dispatcher attempts per client request (§4.8).
pub const DISPATCHER_MAX_ATTEMPTS: u32 = 10;

/// Reader-worker strike threshold before it is marked dead.
pub const WORKER_STRIKE_LIMIT: u32 = 5;

/// Dispatcher -> worker reply wait, per attempt.
pub const DISPATCHER_WORKER_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Keep-alive cadence sent to a waiting client.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Worker receive timeout on its request socket.
pub const WORKER_RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Supervisor dead-worker poll interval.
pub const WORKER_SUPERVISOR_INTERVAL: Duration = Duration::from_secs(30);

/// Bully election: time to wait for a higher-ranked worker to answer.
pub const ELECTION_REPLY_TIMEOUT: Duration = Duration::from_micros(100);

/// Default TCP connect timeout used by clients and inter-server RPCs.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default response timeout for a single client request.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1750);

/// Inter-worker UDP request timeout.
pub const INTER_WORKER_UDP_TIMEOUT: Duration = Duration::from_millis(500);
