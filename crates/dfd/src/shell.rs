//! Interactive client shell (spec §6, supplemented from
//! `examples/original_source/`): a minimal `BufRead`-driven REPL over
//! `index`/`download`/`remove`/`help`/`exit`. Out of core scope but
//! still implemented so the binary is runnable end to end.

use std::path::PathBuf;
use std::time::Instant;

use dfd_core::FileId;
use dfd_download::DownloadConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::client::ClientSession;

const HELP_BANNER: &str = "\
commands:
  index <path>            register a local file with the cluster
  download <file_id_hex>  fetch a file from the peers that hold it
  remove <path>           unregister a previously indexed file
  help                    show this message
  exit                    quit";

pub async fn run(session: ClientSession) -> anyhow::Result<()> {
    println!("{HELP_BANNER}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("dfd> ");
        use std::io::Write;
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            _ = session.shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let Some(line) = line? else {
            break; // stdin closed (EOF).
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let cmd = parts.next().unwrap_or_default();
        let arg = parts.next().unwrap_or_default().trim();

        match cmd {
            "index" => handle_index(&session, arg).await,
            "download" => handle_download(&session, arg).await,
            "remove" => handle_remove(&session, arg).await,
            "help" => {
                println!("{HELP_BANNER}");
            }
            "exit" => break,
            other => println!("unknown command: {other} (try 'help')"),
        }
    }

    session.shutdown.cancel();
    Ok(())
}

async fn handle_index(session: &ClientSession, arg: &str) {
    if arg.is_empty() {
        println!("usage: index <path>");
        return;
    }
    match session.index_file(&PathBuf::from(arg)).await {
        Ok(file_id) => println!("indexed {arg} as {file_id}"),
        Err(e) => {
            warn!("index failed: {e:#}");
            println!("index failed: {e}");
        }
    }
}

async fn handle_remove(session: &ClientSession, arg: &str) {
    if arg.is_empty() {
        println!("usage: remove <path>");
        return;
    }
    match session.remove_file(&PathBuf::from(arg)).await {
        Ok(file_id) => println!("removed {file_id}"),
        Err(e) => {
            warn!("remove failed: {e:#}");
            println!("remove failed: {e}");
        }
    }
}

async fn handle_download(session: &ClientSession, arg: &str) {
    if arg.is_empty() {
        println!("usage: download <file_id_hex>");
        return;
    }
    let file_id: FileId = match arg.parse() {
        Ok(id) => id,
        Err(_) => {
            println!("not a valid file id: {arg}");
            return;
        }
    };

    let cfg = DownloadConfig::default();
    let started = Instant::now();
    let sources = match dfd_download::fetch_sources(&session.servers, file_id, &cfg).await {
        Ok(sources) => sources,
        Err(e) => {
            println!("could not look up sources: {e}");
            return;
        }
    };

    match dfd_download::download_file(file_id, sources, &session.download_dir, &cfg).await {
        Ok(outcome) => {
            let elapsed = started.elapsed();
            info!(path = %outcome.path.display(), ?elapsed, "download finished");
            println!("downloaded to {}", outcome.path.display());
            if !outcome.bad_peers.is_empty() {
                println!("evicted {} unresponsive peer(s) during the download", outcome.bad_peers.len());
            }
        }
        Err(e) => {
            warn!("download failed: {e:#}");
            println!("download failed: {e}");
        }
    }
}
