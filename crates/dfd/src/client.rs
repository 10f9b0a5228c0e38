//! Client (peer) personality (spec §4.4, §4.5, §6): a peer both serves
//! files it has indexed (via the seeder) and issues requests to the
//! cluster (index, download, remove). Holds everything the shell needs
//! across commands.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use dfd_core::{FileId, PeerAddress, PeerId};
use dfd_seeder::{SharedFile, SharedFiles};
use dfd_wire::Message;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::ClientOpts;

pub struct ClientSession {
    pub peer_id: PeerId,
    pub self_addr: PeerAddress,
    pub servers: Vec<SocketAddr>,
    pub files: Arc<SharedFiles>,
    pub download_dir: PathBuf,
    pub shutdown: CancellationToken,
}

impl ClientSession {
    pub async fn start(opts: ClientOpts, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let peer_id = dfd_core::config::PeerIdFile::at_config_dir()?.load_or_create()?;

        let mut servers = dfd_core::config::HostsFile::at_config_dir()?
            .load()?
            .into_iter()
            .map(SocketAddr::V4)
            .collect::<Vec<_>>();
        if !servers.contains(&opts.server) {
            servers.insert(0, opts.server);
        }
        save_hosts(&servers)?;

        let download_dir = dfd_core::config::download_dir()?;
        std::fs::create_dir_all(&download_dir).context("creating download directory")?;

        let files = Arc::new(SharedFiles::new());
        let (listener, seeder_port) = dfd_transport::tcp::open_listener(opts.seeder_port)
            .await
            .context("binding seeder listener")?;
        let self_ip = crate::net_util::local_ipv4_towards(opts.server)?;
        let self_addr = PeerAddress::new(peer_id, self_ip, seeder_port);

        let seeder_files = files.clone();
        let seeder_shutdown = shutdown.clone();
        dfd_core::spawn::spawn_with_cancel(
            tracing::info_span!("seeder_listener"),
            shutdown.clone(),
            async move { dfd_seeder::listener::run(listener, seeder_files, seeder_shutdown).await },
        );
        info!(%self_addr, "seeding on");

        Ok(Self {
            peer_id,
            self_addr,
            servers,
            files,
            download_dir,
            shutdown,
        })
    }

    /// Registers `path`'s content as `self_addr`'s to seed, both locally
    /// (so the seeder can serve it) and with every known server (first
    /// to accept wins, matching the download engine's "try every known
    /// server" pattern).
    pub async fn index_file(&self, path: &Path) -> anyhow::Result<FileId> {
        let metadata = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
        let size = metadata.len();
        let mut reader = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
        let file_id = FileId::from_reader(&mut reader)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        self.files.insert(
            file_id,
            SharedFile {
                path: path.to_path_buf(),
                size,
                name,
            },
        );

        let request = Message::IndexRequest {
            file_id,
            size,
            source: self.self_addr,
        };
        self.send_to_any_server(&request).await?;
        Ok(file_id)
    }

    /// Unregisters the file found at `path` among the locally-indexed
    /// files, both from the server and from the local seeder table.
    pub async fn remove_file(&self, path: &Path) -> anyhow::Result<FileId> {
        let snapshot = self.files.snapshot();
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let found = snapshot
            .iter()
            .find(|(_, entry)| entry.path == *path || entry.path == canonical)
            .map(|(id, _)| *id)
            .with_context(|| format!("{} is not locally indexed", path.display()))?;

        let request = Message::DropRequest {
            file_id: found,
            peer_id: self.peer_id,
        };
        self.send_to_any_server(&request).await?;
        self.files.remove(found);
        Ok(found)
    }

    /// Sends `request` to each known server in turn, returning the
    /// first non-FAIL reply (spec §4.5's "try every known server" loop,
    /// reused here for client writes rather than just source lookup).
    pub async fn send_to_any_server(&self, request: &Message) -> anyhow::Result<Message> {
        for &server in &self.servers {
            let Ok(mut stream) = dfd_transport::tcp::connect(server, dfd_core::constants::DEFAULT_CONNECT_TIMEOUT).await else {
                continue;
            };
            if dfd_transport::tcp::send_framed(&mut stream, &request.encode()).await.is_err() {
                continue;
            }
            // A slow catalog write keeps the connection alive with
            // KEEP_ALIVE frames; ignore them and keep waiting for the
            // real reply rather than treating silence as a dead server.
            let reply = loop {
                let Ok(frame) = dfd_transport::tcp::recv_framed(&mut stream, dfd_core::constants::DEFAULT_RESPONSE_TIMEOUT).await else {
                    break None;
                };
                match Message::decode(&frame) {
                    Some(Message::KeepAlive) => continue,
                    other => break other,
                }
            };
            match reply {
                Some(Message::Fail(text)) => {
                    tracing::debug!("server {server} replied FAIL: {text}");
                    continue;
                }
                Some(reply) => return Ok(reply),
                None => continue,
            }
        }
        anyhow::bail!("no known server accepted the request")
    }
}

fn save_hosts(servers: &[SocketAddr]) -> anyhow::Result<()> {
    let addrs: Vec<PeerAddress> = servers
        .iter()
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(PeerAddress::new(PeerId::INVALID, *v4.ip(), v4.port())),
            SocketAddr::V6(_) => None,
        })
        .collect();
    dfd_core::config::HostsFile::at_config_dir()?.save(&addrs)
}
