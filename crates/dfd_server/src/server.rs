//! Wires the worker pool, election tasks, supervisor and client
//! dispatcher together into one running server (spec §4.6-§4.8).

use std::sync::Arc;

use dfd_catalog::Catalog;
use tokio::net::TcpListener;
use tracing::{info, info_span};

use crate::election;
use crate::state::ServerState;
use crate::{dispatcher, supervisor, worker};

pub struct Server<C: Catalog> {
    pub state: Arc<ServerState<C>>,
    pub client_port: u16,
}

impl<C: Catalog + 'static> Server<C> {
    /// Binds the client-facing TCP listener and spawns the full set of
    /// worker, election, supervisor and dispatcher tasks. Returns once
    /// every worker has published its port (i.e. the server is ready
    /// to serve), running the rest in the background until `shutdown`
    /// fires.
    pub async fn start(
        catalog: Arc<C>,
        port: u16,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> anyhow::Result<Self> {
        let state = Arc::new(ServerState::new(catalog, shutdown));
        let (listener, client_port) = TcpListener::bind(("0.0.0.0", port))
            .await
            .map(|l| {
                let port = l.local_addr().unwrap().port();
                (l, port)
            })?;

        let worker_count = state.workers.len();

        for index in 0..worker_count {
            let worker_state = state.clone();
            dfd_core::spawn::spawn_with_cancel(
                info_span!("worker", index),
                state.shutdown.clone(),
                async move { worker::run(index, worker_state).await },
            );

            let trigger = state.election_triggers[index].clone();
            let election_state = state.clone();
            dfd_core::spawn::spawn_with_cancel(
                info_span!("election", index),
                state.shutdown.clone(),
                async move { election::run(index, election_state, trigger).await },
            );
        }

        while !state.workers.all_published() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let worker_ports: Vec<u16> = (0..worker_count).map(|i| state.workers.port(i)).collect();
        info!(client_port, ?worker_ports, "listening");

        let supervisor_state = state.clone();
        dfd_core::spawn::spawn_with_cancel(
            info_span!("worker_supervisor"),
            state.shutdown.clone(),
            async move { supervisor::run(supervisor_state).await },
        );

        let dispatcher_state = state.clone();
        dfd_core::spawn::spawn_with_cancel(
            info_span!("dispatcher"),
            dispatcher_state.shutdown.clone(),
            async move { dispatcher::run(listener, dispatcher_state).await },
        );

        Ok(Self { state, client_port })
    }
}
