//! The seeder's accept loop: binds a listener, spawns one task per
//! connection, bounded by a semaphore (spec §4.4).

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn};

use crate::seeder::{seeder_semaphore, serve_connection};
use crate::shared_files::SharedFiles;

/// Runs until `shutdown` fires. Connections already in flight are
/// allowed to finish their current reply (see `serve_connection`).
pub async fn run(
    listener: TcpListener,
    files: Arc<SharedFiles>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let semaphore = seeder_semaphore();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("seeder: accept failed: {e}");
                continue;
            }
        };

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let files = files.clone();
        let shutdown = shutdown.clone();
        dfd_core::spawn::spawn(info_span!("seeder_connection", %peer), async move {
            let _permit = permit;
            serve_connection(stream, files, shutdown).await
        });
    }
    Ok(())
}
