//! Client loop command.
//!
//! Each loop marks an update and reads the last update back, concurrently,
//! then waits one interval and goes again. Failures are logged and the loop
//! carries on; the store never retries on its own.

use super::{CliResult, StoreArgs};
use boundkv_core::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Runs the client loops until every loop finishes or the process is
/// interrupted.
pub async fn run(
    args: &StoreArgs,
    loops: usize,
    iterations: Option<usize>,
    interval_ms: u64,
) -> CliResult<()> {
    let store = Arc::new(args.open()?);
    let interval = Duration::from_millis(interval_ms);
    tracing::info!(loops, ?iterations, interval_ms, "starting client loops");

    let mut tasks = JoinSet::new();
    for id in 0..loops {
        tasks.spawn(client_loop(Arc::clone(&store), id, iterations, interval));
    }

    tokio::select! {
        () = drain(&mut tasks) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, stopping loops");
            tasks.abort_all();
        }
    }

    let stats = store.stats();
    tracing::info!(
        completed = stats.transactions_completed,
        failed = stats.transactions_failed,
        timed_out = stats.transactions_timed_out,
        open_attempts = stats.open_attempts,
        "client loops finished"
    );
    Ok(())
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "client loop panicked");
        }
    }
}

/// One client loop; `None` iterations means forever.
async fn client_loop(store: Arc<Store>, id: usize, iterations: Option<usize>, interval: Duration) {
    let mut done = 0usize;
    while !iterations.is_some_and(|limit| done >= limit) {
        let (marked, last) = tokio::join!(store.mark_update(), store.get_last_update());

        if let Err(err) = marked {
            tracing::warn!(loop_id = id, error = %err, "mark update failed");
        }
        match last {
            Ok(value) => tracing::info!(loop_id = id, last_update = ?value, "last update"),
            Err(err) => tracing::warn!(loop_id = id, error = %err, "read last update failed"),
        }

        done += 1;
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::memory_args;

    #[tokio::test]
    async fn bounded_loops_finish() {
        let store = Arc::new(memory_args().open().unwrap());

        let mut tasks = JoinSet::new();
        for id in 0..4 {
            tasks.spawn(client_loop(
                Arc::clone(&store),
                id,
                Some(2),
                Duration::from_millis(1),
            ));
        }
        drain(&mut tasks).await;

        let stats = store.stats();
        assert_eq!(stats.operations_settled(), 16);
        assert_eq!(stats.transactions_completed, 16);
        assert!(store.get_last_update().await.unwrap().is_some());
    }
}
