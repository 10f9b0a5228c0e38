//! Wire codec for the dfd protocol (spec §4.1): the opcode table and the
//! exact per-message layout. This crate knows nothing about sockets or
//! timeouts — see `dfd_transport` for framing bytes onto a connection.

pub mod bytes_io;
pub mod message;
pub mod opcode;

pub use message::{ForwardedWrite, Message};
pub use opcode::Opcode;
