//! Worker restart supervisor (spec §4.6): polls for dead workers and
//! respawns them under the election lock, so a restart never races a
//! concurrent election.

use std::sync::Arc;

use dfd_catalog::Catalog;
use dfd_core::constants::WORKER_SUPERVISOR_INTERVAL;
use tracing::{info, info_span};

use crate::election;
use crate::state::ServerState;
use crate::worker;

pub async fn run<C: Catalog + 'static>(state: Arc<ServerState<C>>) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(WORKER_SUPERVISOR_INTERVAL) => {}
        }

        let _guard = state.election_lock.lock().await;
        for index in 0..state.workers.len() {
            if state.workers.is_alive(index) {
                continue;
            }
            info!("supervisor: restarting dead worker {index}");
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
    }
}
