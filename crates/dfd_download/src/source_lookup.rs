//! Step 1 of the download algorithm (spec §4.5): ask index servers for
//! the source list of a file, trying the next known server whenever
//! one answers FAIL or times out.

use std::net::SocketAddr;

use dfd_core::{FileId, PeerAddress};
use dfd_wire::Message;
use tracing::debug;

use crate::config::DownloadConfig;
use crate::error::DownloadError;

pub async fn fetch_sources(
    servers: &[SocketAddr],
    file_id: FileId,
    cfg: &DownloadConfig,
) -> Result<Vec<PeerAddress>, DownloadError> {
    for &server in servers {
        match try_one_server(server, file_id, cfg).await {
            Ok(sources) => return Ok(sources),
            Err(e) => debug!("source lookup: {server} unavailable: {e}"),
        }
    }
    Err(DownloadError::NoServerAvailable)
}

async fn try_one_server(
    server: SocketAddr,
    file_id: FileId,
    cfg: &DownloadConfig,
) -> Result<Vec<PeerAddress>, DownloadError> {
    let mut stream = dfd_transport::tcp::connect(server, cfg.connect_timeout).await?;
    let request = Message::SourceRequest { file_id };
    dfd_transport::tcp::send_framed(&mut stream, &request.encode()).await?;

    // A slow catalog read (e.g. during an election) keeps the connection
    // alive with KEEP_ALIVE frames; ignore them and keep waiting for the
    // real reply rather than treating silence as a dead server.
    let reply = loop {
        let frame = dfd_transport::tcp::recv_framed(&mut stream, cfg.response_timeout).await?;
        match Message::decode(&frame) {
            Some(Message::KeepAlive) => continue,
            other => break other,
        }
    };
    match reply {
        Some(Message::SourceList(sources)) => Ok(sources),
        Some(Message::Fail(text)) => Err(DownloadError::NoServerAvailable).inspect_err(|_| {
            debug!("server {server} replied FAIL: {text}");
        }),
        _ => Err(DownloadError::NoServerAvailable),
    }
}
