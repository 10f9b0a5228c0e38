//! Transport primitives (spec §4.2): length-framed TCP for client/server
//! and peer connections, and unframed UDP for intra-server dispatch.

pub mod error;
pub mod tcp;
pub mod udp;

pub use error::TransportError;
