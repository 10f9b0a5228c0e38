//! Shared data model and ambient helpers for the `dfd` peer-to-peer file
//! distribution network. Nothing in this crate talks to a socket or a
//! disk file directly; it is the vocabulary the other crates share.

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod peer_addr;
pub mod spawn;

pub use constants::CHUNK_SIZE;
pub use error::FailureKind;
pub use ids::{FileId, PeerId};
pub use peer_addr::{FileRecord, PeerAddress};
