//! Download-kind failures (spec §7): everything that aborts a whole
//! session rather than just one chunk request.

use dfd_core::FailureKind;

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("no index server answered with a source list")]
    NoServerAvailable,
    #[error("no peer completed the initial handshake for this file")]
    NoPeerAvailable,
    #[error("session failed: only {got}/{want} chunks were recovered")]
    Incomplete { got: u64, want: u64 },
    #[error("chunked io error: {0}")]
    ChunkIo(#[from] dfd_chunked_io::ChunkIoError),
    #[error("transport error: {0}")]
    Transport(#[from] dfd_transport::TransportError),
    #[error("local io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub const fn kind(&self) -> FailureKind {
        match self {
            DownloadError::NoServerAvailable
            | DownloadError::NoPeerAvailable
            | DownloadError::Incomplete { .. } => FailureKind::CapacityOrPeer,
            DownloadError::ChunkIo(_) | DownloadError::Io(_) => FailureKind::Resource,
            DownloadError::Transport(_) => FailureKind::Transport,
        }
    }
}
