use tokio::sync::watch;

use crate::engine::processor;
use crate::state::SharedState;

/// Start the periodic queue scheduler on a dedicated OS thread with its own
/// runtime, so a slow processing cycle never starves the HTTP server.
pub fn run(state: SharedState, shutdown: watch::Receiver<bool>) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("queue-scheduler".into())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to build scheduler runtime");

            runtime.block_on(run_loop(state, shutdown));
        })
        .expect("Failed to spawn scheduler thread")
}

async fn run_loop(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let interval = std::time::Duration::from_secs(state.config.process_interval_secs);
    tracing::info!("Queue scheduler started (interval {interval:?})");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match processor::run_cycle(&state).await {
            Ok(report) if report.skipped => {}
            Ok(report) => {
                tracing::debug!(
                    submitted = report.submitted,
                    failed = report.failed,
                    "Scheduled cycle done"
                );
            }
            Err(e) => {
                tracing::error!("Scheduled processing cycle failed: {e}");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }

    tracing::info!("Queue scheduler stopped");
}
