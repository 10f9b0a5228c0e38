//! End-to-end: two seeders holding the same file, one download session
//! pulling every chunk through the worker pool.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use dfd_core::{FileId, PeerAddress, PeerId, CHUNK_SIZE};
use dfd_seeder::{SharedFile, SharedFiles};
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::session::download_file;

async fn spawn_seeder(file_id: FileId, path: std::path::PathBuf, size: u64, name: &str) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let files = Arc::new(SharedFiles::new());
    files.insert(
        file_id,
        SharedFile {
            path,
            size,
            name: name.to_string(),
        },
    );
    let (listener, port) = dfd_transport::tcp::open_listener(0).await.unwrap();
    let shutdown = CancellationToken::new();
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let handle = tokio::spawn(async move {
        let _ = dfd_seeder::listener::run(listener, files, shutdown).await;
    });
    (addr, handle)
}

#[tokio::test]
async fn downloads_a_multi_chunk_file_from_two_seeders() {
    let src_dir = tempfile::tempdir().unwrap();
    let dl_dir = tempfile::tempdir().unwrap();

    let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 777)).map(|i| (i % 251) as u8).collect();
    let src_path = src_dir.path().join("movie.mkv");
    std::fs::File::create(&src_path).unwrap().write_all(&data).unwrap();

    let file_id = FileId::new(123456789);
    let (addr_a, _seeder_a) = spawn_seeder(file_id, src_path.clone(), data.len() as u64, "movie.mkv").await;
    let (addr_b, _seeder_b) = spawn_seeder(file_id, src_path.clone(), data.len() as u64, "movie.mkv").await;

    let sources = vec![
        PeerAddress::new(PeerId::new(1), Ipv4Addr::LOCALHOST, addr_a.port()),
        PeerAddress::new(PeerId::new(2), Ipv4Addr::LOCALHOST, addr_b.port()),
    ];

    let outcome = download_file(file_id, sources, dl_dir.path(), &DownloadConfig::default())
        .await
        .unwrap();

    let downloaded = std::fs::read(&outcome.path).unwrap();
    assert_eq!(downloaded, data);
    assert!(outcome.bad_peers.is_empty());
}

#[tokio::test]
async fn a_dead_peer_in_the_source_list_is_skipped() {
    let src_dir = tempfile::tempdir().unwrap();
    let dl_dir = tempfile::tempdir().unwrap();

    let data = b"small file, one chunk only".to_vec();
    let src_path = src_dir.path().join("small.txt");
    std::fs::File::create(&src_path).unwrap().write_all(&data).unwrap();

    let file_id = FileId::new(42);
    let (addr_a, _seeder_a) = spawn_seeder(file_id, src_path.clone(), data.len() as u64, "small.txt").await;

    let dead = PeerAddress::new(PeerId::new(99), Ipv4Addr::LOCALHOST, 1);
    let alive = PeerAddress::new(PeerId::new(1), Ipv4Addr::LOCALHOST, addr_a.port());

    let mut cfg = DownloadConfig::default();
    cfg.connect_timeout = std::time::Duration::from_millis(200);

    let outcome = download_file(file_id, vec![dead, alive], dl_dir.path(), &cfg)
        .await
        .unwrap();

    let downloaded = std::fs::read(&outcome.path).unwrap();
    assert_eq!(downloaded, data);
}
