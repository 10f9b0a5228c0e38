//! Per-connection seeder loop (spec §4.4): DOWNLOAD_INIT, then a
//! REQUEST_CHUNK/DATA_CHUNK loop until FINISH_DOWNLOAD or the peer
//! hangs up.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dfd_wire::Message;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::shared_files::SharedFiles;

/// Default receive timeout applied while idling between chunk
/// requests; a seeder that hears nothing for this long assumes the
/// peer is gone.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds concurrent seeder connections (spec default: 5).
pub fn seeder_semaphore() -> Arc<Semaphore> {
    Arc::new(Semaphore::new(dfd_core::constants::DEFAULT_SEEDER_CONCURRENCY))
}

/// Serves one accepted connection. Runs until FINISH_DOWNLOAD, socket
/// close, a protocol violation, or `shutdown` firing — in the shutdown
/// case the in-flight reply is still sent before returning.
pub async fn serve_connection(
    mut stream: TcpStream,
    files: Arc<SharedFiles>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let init = match dfd_transport::tcp::recv_framed(&mut stream, IDLE_TIMEOUT).await {
        Ok(body) => body,
        Err(e) => {
            debug!("seeder: no handshake received: {e}");
            return Ok(());
        }
    };

    let Some(Message::DownloadInit { file_id, .. }) = Message::decode(&init) else {
        warn!("seeder: expected DOWNLOAD_INIT, got something else");
        return Ok(());
    };

    let snapshot = files.snapshot();
    let Some(entry) = snapshot.get(&file_id).cloned() else {
        let fail = Message::Fail(format!("file not shared: {file_id}"));
        let _ = dfd_transport::tcp::send_framed(&mut stream, &fail.encode()).await;
        return Ok(());
    };

    let confirm = Message::DownloadConfirm {
        size: entry.size,
        name: entry.name.clone(),
    };
    dfd_transport::tcp::send_framed(&mut stream, &confirm.encode()).await?;

    loop {
        if shutdown.is_cancelled() {
            debug!("seeder: shutting down mid-session after current reply");
            return Ok(());
        }

        let frame = match dfd_transport::tcp::recv_framed(&mut stream, IDLE_TIMEOUT).await {
            Ok(body) => body,
            Err(_) => return Ok(()),
        };

        match Message::decode(&frame) {
            Some(Message::RequestChunk { chunk_index }) => {
                let reply = match dfd_chunked_io::package_chunk(&entry.path, chunk_index) {
                    Ok(bytes) => Message::DataChunk {
                        chunk_index,
                        payload: Bytes::from(bytes),
                    },
                    Err(e) => Message::Fail(e.to_string()),
                };
                dfd_transport::tcp::send_framed(&mut stream, &reply.encode()).await?;
            }
            Some(Message::FinishDownload) => return Ok(()),
            _ => {
                warn!("seeder: unexpected message mid-session, closing");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfd_core::FileId;
    use dfd_transport::tcp::{connect, open_listener, recv_framed, send_framed};
    use std::io::Write;

    use crate::shared_files::SharedFile;

    #[tokio::test]
    async fn full_session_serves_a_single_chunk_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::File::create(&path).unwrap().write_all(b"hello world").unwrap();

        let files = Arc::new(SharedFiles::new());
        let file_id = FileId::new(7);
        files.insert(
            file_id,
            SharedFile {
                path: path.clone(),
                size: 11,
                name: "payload.bin".into(),
            },
        );

        let (listener, port) = open_listener(0).await.unwrap();
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_connection(stream, files, shutdown_clone).await
        });

        let mut client = connect(
            format!("127.0.0.1:{port}").parse().unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        send_framed(
            &mut client,
            &Message::DownloadInit {
                file_id,
                chunk_size: 1024 * 1024,
            }
            .encode(),
        )
        .await
        .unwrap();
        let reply = Message::decode(&recv_framed(&mut client, Duration::from_secs(1)).await.unwrap()).unwrap();
        assert_eq!(
            reply,
            Message::DownloadConfirm {
                size: 11,
                name: "payload.bin".into(),
            }
        );

        send_framed(&mut client, &Message::RequestChunk { chunk_index: 0 }.encode())
            .await
            .unwrap();
        let chunk = Message::decode(&recv_framed(&mut client, Duration::from_secs(1)).await.unwrap()).unwrap();
        assert_eq!(
            chunk,
            Message::DataChunk {
                chunk_index: 0,
                payload: Bytes::from_static(b"hello world"),
            }
        );

        send_framed(&mut client, &Message::FinishDownload.encode()).await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_file_id_gets_fail_and_closes() {
        let files = Arc::new(SharedFiles::new());
        let (listener, port) = open_listener(0).await.unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_connection(stream, files, shutdown).await
        });

        let mut client = connect(
            format!("127.0.0.1:{port}").parse().unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        send_framed(
            &mut client,
            &Message::DownloadInit {
                file_id: FileId::new(99),
                chunk_size: 1024,
            }
            .encode(),
        )
        .await
        .unwrap();

        let reply = Message::decode(&recv_framed(&mut client, Duration::from_secs(1)).await.unwrap()).unwrap();
        assert!(matches!(reply, Message::Fail(_)));
        server.await.unwrap().unwrap();
    }
}
