//! A concrete [`Catalog`] implementation backed by an embedded SQLite
//! database, one file per server. `backup`/`merge` lean on SQLite's own
//! `VACUUM INTO` and `ATTACH DATABASE` rather than hand-rolled file
//! copying, the same way the teacher crate leans on its chosen backend's
//! native features instead of reimplementing them.

use std::path::Path;

use dfd_core::{FileId, PeerAddress, PeerId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::catalog::Catalog;
use crate::error::CatalogError;

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Opens (creating if absent) the catalog database at `path` and
    /// ensures the PEERS/FILES/INDEX schema exists.
    pub async fn open(path: &Path) -> Result<Self, CatalogError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let catalog = Self { pool };
        catalog.ensure_schema().await?;
        Ok(catalog)
    }

    /// An in-memory catalog, used by tests and by a single-process
    /// seeder that never persists across restarts.
    pub async fn open_in_memory() -> Result<Self, CatalogError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let catalog = Self { pool };
        catalog.ensure_schema().await?;
        Ok(catalog)
    }

    async fn ensure_schema(&self) -> Result<(), CatalogError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS peers (\
                peer_id INTEGER PRIMARY KEY, \
                ip TEXT NOT NULL, \
                port INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS files (\
                file_id INTEGER PRIMARY KEY, \
                size INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS catalog_index (\
                peer_id INTEGER NOT NULL, \
                file_id INTEGER NOT NULL, \
                PRIMARY KEY (peer_id, file_id))",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl Catalog for SqliteCatalog {
    async fn index(
        &self,
        file_id: FileId,
        size: u64,
        source: PeerAddress,
    ) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO peers (peer_id, ip, port) VALUES (?, ?, ?) \
             ON CONFLICT(peer_id) DO UPDATE SET ip = excluded.ip, port = excluded.port",
        )
        .bind(source.peer_id.get() as i64)
        .bind(source.ip.to_string())
        .bind(source.port as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO files (file_id, size) VALUES (?, ?)")
            .bind(file_id.get() as i64)
            .bind(size as i64)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO catalog_index (peer_id, file_id) VALUES (?, ?)")
            .bind(source.peer_id.get() as i64)
            .bind(file_id.get() as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn drop_entry(&self, file_id: FileId, peer_id: PeerId) -> Result<(), CatalogError> {
        let result = sqlx::query("DELETE FROM catalog_index WHERE peer_id = ? AND file_id = ?")
            .bind(peer_id.get() as i64)
            .bind(file_id.get() as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NoRowsUpdated);
        }
        Ok(())
    }

    async fn reregister(&self, addr: PeerAddress) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT INTO peers (peer_id, ip, port) VALUES (?, ?, ?) \
             ON CONFLICT(peer_id) DO UPDATE SET ip = excluded.ip, port = excluded.port",
        )
        .bind(addr.peer_id.get() as i64)
        .bind(addr.ip.to_string())
        .bind(addr.port as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sources(&self, file_id: FileId) -> Result<Vec<PeerAddress>, CatalogError> {
        let rows = sqlx::query(
            "SELECT p.peer_id, p.ip, p.port FROM catalog_index i \
             JOIN peers p ON p.peer_id = i.peer_id \
             WHERE i.file_id = ?",
        )
        .bind(file_id.get() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let peer_id: i64 = row.try_get("peer_id")?;
            let ip: String = row.try_get("ip")?;
            let port: i64 = row.try_get("port")?;
            let ip = ip
                .parse()
                .map_err(|_| CatalogError::MergeConflict(format!("bad ip in catalog: {ip}")))?;
            out.push(PeerAddress::new(PeerId::new(peer_id as u64), ip, port as u16));
        }
        Ok(out)
    }

    async fn backup(&self, dest_path: &Path) -> Result<(), CatalogError> {
        if dest_path.exists() {
            std::fs::remove_file(dest_path)?;
        }
        let dest = dest_path.to_string_lossy().replace('\'', "''");
        sqlx::query(&format!("VACUUM INTO '{dest}'"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn merge(&self, snapshot_path: &Path) -> Result<(), CatalogError> {
        let attach = snapshot_path.to_string_lossy().replace('\'', "''");
        let mut conn = self.pool.acquire().await?;
        sqlx::query(&format!("ATTACH DATABASE '{attach}' AS snap"))
            .execute(&mut *conn)
            .await?;

        let result = async {
            sqlx::query(
                "INSERT OR IGNORE INTO peers (peer_id, ip, port) \
                 SELECT peer_id, ip, port FROM snap.peers",
            )
            .execute(&mut *conn)
            .await?;
            sqlx::query(
                "INSERT OR IGNORE INTO files (file_id, size) \
                 SELECT file_id, size FROM snap.files",
            )
            .execute(&mut *conn)
            .await?;
            sqlx::query(
                "INSERT OR IGNORE INTO catalog_index (peer_id, file_id) \
                 SELECT peer_id, file_id FROM snap.catalog_index",
            )
            .execute(&mut *conn)
            .await?;
            Ok::<_, sqlx::Error>(())
        }
        .await;

        sqlx::query("DETACH DATABASE snap").execute(&mut *conn).await?;
        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(id: u64, port: u16) -> PeerAddress {
        PeerAddress::new(PeerId::new(id), Ipv4Addr::new(127, 0, 0, 1), port)
    }

    #[tokio::test]
    async fn index_then_sources_observes_the_write() {
        let catalog = SqliteCatalog::open_in_memory().await.unwrap();
        let file_id = FileId::new(42);
        catalog.index(file_id, 100, addr(1, 9000)).await.unwrap();

        let sources = catalog.sources(file_id).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].peer_id, PeerId::new(1));
    }

    #[tokio::test]
    async fn index_is_idempotent() {
        let catalog = SqliteCatalog::open_in_memory().await.unwrap();
        let file_id = FileId::new(1);
        catalog.index(file_id, 1, addr(1, 1)).await.unwrap();
        catalog.index(file_id, 1, addr(1, 1)).await.unwrap();
        assert_eq!(catalog.sources(file_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drop_unknown_entry_errors() {
        let catalog = SqliteCatalog::open_in_memory().await.unwrap();
        let err = catalog
            .drop_entry(FileId::new(1), PeerId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NoRowsUpdated));
    }

    #[tokio::test]
    async fn drop_then_sources_is_empty() {
        let catalog = SqliteCatalog::open_in_memory().await.unwrap();
        let file_id = FileId::new(7);
        catalog.index(file_id, 1, addr(1, 1)).await.unwrap();
        catalog.drop_entry(file_id, PeerId::new(1)).await.unwrap();
        assert!(catalog.sources(file_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sources_has_no_duplicate_peers() {
        let catalog = SqliteCatalog::open_in_memory().await.unwrap();
        let file_id = FileId::new(1);
        catalog.index(file_id, 1, addr(1, 1)).await.unwrap();
        catalog.index(file_id, 1, addr(1, 1)).await.unwrap();
        catalog.index(file_id, 1, addr(2, 2)).await.unwrap();
        let sources = catalog.sources(file_id).await.unwrap();
        let mut ids: Vec<_> = sources.iter().map(|a| a.peer_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), sources.len());
    }

    #[tokio::test]
    async fn backup_then_merge_transfers_rows() {
        let dir = tempfile::tempdir().unwrap();
        let source = SqliteCatalog::open(&dir.path().join("source.db")).await.unwrap();
        let file_id = FileId::new(55);
        source.index(file_id, 10, addr(1, 1111)).await.unwrap();

        let snapshot_path = dir.path().join("snapshot.db");
        source.backup(&snapshot_path).await.unwrap();

        let target = SqliteCatalog::open(&dir.path().join("target.db")).await.unwrap();
        target.merge(&snapshot_path).await.unwrap();

        let sources = target.sources(file_id).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].port, 1111);
    }

    #[tokio::test]
    async fn merge_is_idempotent_on_primary_keys() {
        let dir = tempfile::tempdir().unwrap();
        let source = SqliteCatalog::open(&dir.path().join("source.db")).await.unwrap();
        source.index(FileId::new(1), 1, addr(1, 1)).await.unwrap();
        let snapshot_path = dir.path().join("snap.db");
        source.backup(&snapshot_path).await.unwrap();

        let target = SqliteCatalog::open(&dir.path().join("target.db")).await.unwrap();
        target.merge(&snapshot_path).await.unwrap();
        target.merge(&snapshot_path).await.unwrap();
        assert_eq!(target.sources(FileId::new(1)).await.unwrap().len(), 1);
    }
}
