//! Task-spawning helpers shared by the server and client binaries.
//! Mirrors the teacher crate's `spawn_utils`: every long-lived task runs
//! inside a tracing span and is cooperatively cancellable through a
//! [`CancellationToken`], since this system has no single-threaded event
//! loop to hang a global shutdown off of (§5).

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, trace};

#[derive(Debug)]
struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Spawns `fut` under `span`, logging completion or failure.
#[track_caller]
pub fn spawn(
    span: tracing::Span,
    fut: impl std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    let fut = async move {
        trace!("started");
        match fut.await {
            Ok(()) => trace!("finished"),
            Err(e) if e.is::<Cancelled>() => trace!("cancelled"),
            Err(e) => error!("finished with error: {e:#}"),
        }
    }
    .instrument(span);
    tokio::task::spawn(fut)
}

/// Like [`spawn`], but the future is raced against `token` and reports a
/// clean cancellation rather than running to completion.
#[track_caller]
pub fn spawn_with_cancel(
    span: tracing::Span,
    token: CancellationToken,
    fut: impl std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    spawn(span, async move {
        tokio::select! {
            _ = token.cancelled() => Err(Cancelled.into()),
            r = fut => r,
        }
    })
}
