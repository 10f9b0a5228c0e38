//! Catalog-kind failures (spec §7): uniqueness violation, no rows
//! updated, merge conflict. Returned verbatim in a FAIL message's text
//! body by the worker that hit them (§4.6).

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("no such (peer, file) entry to drop")]
    NoRowsUpdated,
    #[error("merge conflict applying snapshot: {0}")]
    MergeConflict(String),
    #[error("catalog backend error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("catalog io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub const fn kind(&self) -> dfd_core::FailureKind {
        dfd_core::FailureKind::Catalog
    }
}
