//! Replicated index server (spec §4.6-§4.9): a fixed-size worker pool
//! behind a single client-facing dispatcher, one worker elected writer
//! via bully election, writes replicated to the rest of the cluster,
//! and a join protocol for bringing up a new server from a snapshot.

pub mod dispatcher;
pub mod election;
pub mod error;
pub mod onboarding;
pub mod roster;
pub mod server;
pub mod state;
pub mod supervisor;
pub mod worker;
pub mod worker_table;

pub use error::ServerError;
pub use onboarding::join_cluster;
pub use roster::Roster;
pub use server::Server;
pub use state::ServerState;
