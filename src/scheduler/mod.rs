use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::execute_post;
use crate::state::AppState;

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The polling scheduler, held as an explicit resource so callers can start,
/// stop and manually trigger it. One instance owns at most one worker task.
pub struct PublishScheduler {
    state: AppState,
    worker: Mutex<Option<Worker>>,
}

impl PublishScheduler {
    pub fn new(state: AppState) -> Self {
        PublishScheduler {
            state,
            worker: Mutex::new(None),
        }
    }

    /// Spawns the timer loop. Calling start on an already-running scheduler
    /// warns and leaves the existing worker untouched.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            warn!("Publish scheduler is already running; ignoring start");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let state = self.state.clone();
        let poll_interval = state.config.scheduler.poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => run_tick(&state).await,
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("Publish scheduler worker exited");
        });

        *worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });
        info!(poll_interval = ?poll_interval, "Publish scheduler started");
    }

    /// Signals the worker to shut down and waits for the in-flight tick, if
    /// any, to finish.
    pub async fn stop(&self) {
        let worker = self.worker.lock().await.take();
        let Some(worker) = worker else {
            warn!("Publish scheduler is not running; ignoring stop");
            return;
        };

        let _ = worker.shutdown.send(true);
        if let Err(err) = worker.handle.await {
            error!(?err, "Publish scheduler worker ended abnormally");
        }
        info!("Publish scheduler stopped");
    }

    /// Runs one tick inline, outside the timer. Used for administrative
    /// re-runs; safe alongside a running worker because every post execution
    /// guards on current state.
    pub async fn trigger_now(&self) {
        info!("Manual scheduler tick requested");
        run_tick(&self.state).await;
    }
}

/// One poll-and-dispatch cycle. Never fails: a discovery error is logged and
/// the next timer firing retries, and each item's outcome is settled
/// independently so one failure cannot abort its siblings.
async fn run_tick(state: &AppState) {
    let settings = &state.config.scheduler;
    let now = time::OffsetDateTime::now_utc();

    let due = match state
        .scheduled_posts
        .list_due(
            now,
            settings.min_retry_delay.as_secs() as i64,
            settings.tick_batch_limit,
        )
        .await
    {
        Ok(due) => due,
        Err(err) => {
            error!(?err, "Failed to query due scheduled posts");
            return;
        }
    };

    if due.is_empty() {
        return;
    }

    info!(count = due.len(), "Dispatching due scheduled posts");

    // Sub-batches bound concurrent calls into the content store and the
    // generation service. Each batch settles fully before the next starts.
    for batch in due.chunks(settings.publish_concurrency) {
        let handles: Vec<_> = batch
            .iter()
            .map(|post| {
                let state = state.clone();
                let post_id = post.id;
                (post_id, tokio::spawn(execute_post(state, post_id)))
            })
            .collect();

        for (post_id, handle) in handles {
            match handle.await {
                Ok(Ok(())) => debug!(%post_id, "Post execution settled"),
                Ok(Err(err)) => {
                    warn!(%post_id, ?err, "Post execution failed to persist its outcome")
                }
                Err(err) => error!(%post_id, ?err, "Post execution task panicked"),
            }
        }
    }
}
