//! `dfd`: index server and peer client for the replicated file
//! distribution network (spec §6). Wires CLI parsing to the `dfd_server`
//! and `dfd_download`/`dfd_seeder` crates, the way `rqbit`'s `main.rs`
//! wires CLI parsing to `librqbit::Session` without that wiring being
//! part of the torrent engine itself.

mod cli;
mod client;
mod logging;
mod net_util;
mod server_cmd;
mod shell;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use cli::{Command, Opts};

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    logging::init(opts.log_level);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let shutdown = CancellationToken::new();
    install_signal_handler(&rt, shutdown.clone());

    let result = rt.block_on(async_main(opts.command, shutdown));
    if let Err(e) = result.as_ref() {
        error!("dfd exited with an error: {e:#}");
    }
    match result {
        Ok(()) => std::process::exit(0),
        Err(_) => std::process::exit(1),
    }
}

async fn async_main(command: Command, shutdown: CancellationToken) -> anyhow::Result<()> {
    match command {
        Command::Server(opts) => server_cmd::run(opts, shutdown).await,
        Command::Client(opts) => {
            let session = client::ClientSession::start(opts, shutdown).await?;
            shell::run(session).await
        }
    }
}

fn install_signal_handler(rt: &tokio::runtime::Runtime, shutdown: CancellationToken) {
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received ctrl-c, shutting down");
            shutdown.cancel();
        }
    });
}
