//! Server-kind failures (spec §7): everything the dispatcher turns into
//! a FAIL reply or an election retry.

use dfd_core::FailureKind;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("database appears to be down")]
    DatabaseDown,
    #[error("no healthy reader available")]
    NoReaderAvailable,
    #[error("catalog error: {0}")]
    Catalog(#[from] dfd_catalog::CatalogError),
    #[error("transport error: {0}")]
    Transport(#[from] dfd_transport::TransportError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub const fn kind(&self) -> FailureKind {
        match self {
            ServerError::DatabaseDown | ServerError::NoReaderAvailable => {
                FailureKind::CapacityOrPeer
            }
            ServerError::Catalog(_) => FailureKind::Catalog,
            ServerError::Transport(_) => FailureKind::Transport,
            ServerError::Io(_) => FailureKind::Resource,
        }
    }
}
