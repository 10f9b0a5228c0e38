//! The `Catalog` contract (spec §1, C10): an index server's view of the
//! network, kept behind a trait so the rest of the server never depends
//! on a concrete storage backend.

use std::future::Future;
use std::path::Path;

use dfd_core::{FileId, PeerAddress, PeerId};

use crate::error::CatalogError;

/// `PEERS(peer_id PK, ip, port)`, `FILES(file_id PK, size)`,
/// `INDEX(peer_id, file_id)` (composite key, unique pair) — §3.
///
/// All mutating operations are idempotent on primary keys: calling
/// `index` twice with the same `(file_id, peer_id)` leaves the catalog
/// size unchanged, so forwarded writes never need "already applied"
/// bookkeeping of their own (§4.9).
pub trait Catalog: Send + Sync {
    /// Publishes `file_id` as held by `source`, recording `size` and
    /// `source`'s address. Invariant 1: this also upserts PEERS and
    /// FILES rows so INDEX never dangles.
    fn index(
        &self,
        file_id: FileId,
        size: u64,
        source: PeerAddress,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send;

    /// Removes the `(peer_id, file_id)` row. Errors with
    /// `CatalogError::NoRowsUpdated` if no such row existed.
    fn drop_entry(
        &self,
        file_id: FileId,
        peer_id: PeerId,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send;

    /// Updates (or inserts) a peer's address.
    fn reregister(&self, addr: PeerAddress) -> impl Future<Output = Result<(), CatalogError>> + Send;

    /// Lists every peer currently indexing `file_id`. No duplicate
    /// peer_ids (invariant 2 makes the underlying join unique already).
    fn sources(
        &self,
        file_id: FileId,
    ) -> impl Future<Output = Result<Vec<PeerAddress>, CatalogError>> + Send;

    /// Takes a point-in-time snapshot of the whole catalog, written to
    /// `dest_path`, for a new server's onboarding transfer (§4.9).
    fn backup(&self, dest_path: &Path) -> impl Future<Output = Result<(), CatalogError>> + Send;

    /// Merges a snapshot (or a single forwarded write's worth of rows,
    /// via the higher-level forward-application helpers) into this
    /// catalog. Idempotent on primary keys.
    fn merge(&self, snapshot_path: &Path) -> impl Future<Output = Result<(), CatalogError>> + Send;
}
