//! CLI surface (spec §6): a single binary with a `server` and a `client`
//! personality, modeled on `rqbit`'s subcommand-based `Opts`.

use std::net::SocketAddr;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Parser)]
#[command(name = "dfd", version, about = "Peer-to-peer file distribution over a replicated index cluster")]
pub struct Opts {
    /// Console log level.
    #[arg(value_enum, short = 'v', long = "log-level", env = "DFD_LOG_LEVEL_CONSOLE")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an index server.
    Server(ServerOpts),
    /// Run an interactive peer client against a known index server.
    Client(ClientOpts),
}

#[derive(Parser)]
pub struct ServerOpts {
    /// Client-facing TCP port. 0 picks an ephemeral port.
    #[arg(long, default_value_t = 0, env = "DFD_SERVER_PORT")]
    pub port: u16,

    /// An existing cluster member to join on startup.
    #[arg(long, env = "DFD_SERVER_JOIN")]
    pub join: Option<SocketAddr>,

    /// Path to the SQLite catalog file. Defaults to `<config_dir>/catalog.db`.
    #[arg(long, env = "DFD_CATALOG_PATH")]
    pub catalog_path: Option<String>,
}

#[derive(Parser)]
pub struct ClientOpts {
    /// A known index server to register with and query.
    #[arg(long, env = "DFD_CLIENT_SERVER")]
    pub server: SocketAddr,

    /// Port the local seeder listens on for incoming downloads. 0 picks
    /// an ephemeral port.
    #[arg(long, default_value_t = 0, env = "DFD_SEEDER_PORT")]
    pub seeder_port: u16,
}
