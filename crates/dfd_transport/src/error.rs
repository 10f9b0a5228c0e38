//! Transport-kind failures (spec §7 "Transport error"): connect timeout,
//! send/recv failure, unexpected close. The dispatcher's 10-attempt loop
//! and the client's "try every known server" loop are the only places
//! that retry these; everything else treats them as terminal for the
//! current attempt.

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("peer closed the connection")]
    Eof,
    #[error("receive timed out after {0:?}")]
    RecvTimeout(std::time::Duration),
    #[error("frame length {0} exceeds the {1}-byte limit")]
    FrameTooLarge(u64, usize),
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),
}

impl TransportError {
    pub const fn kind(&self) -> dfd_core::FailureKind {
        dfd_core::FailureKind::Transport
    }
}
