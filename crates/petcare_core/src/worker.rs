//! Background reminder worker.
//!
//! Spawns a tokio task that runs one [`ReminderDispatcher::sweep`] per tick
//! until its cancellation token fires. The first sweep runs immediately on
//! start; later ones follow the configured period.

use crate::dispatcher::{ReminderDispatcher, SweepReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct ReminderWorker {
    dispatcher: Arc<ReminderDispatcher>,
    period: Duration,
    cancel: CancellationToken,
    report_tx: Option<mpsc::UnboundedSender<SweepReport>>,
}

/// Owns the running worker task.
pub struct ReminderWorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ReminderWorker {
    pub fn new(dispatcher: Arc<ReminderDispatcher>, period: Duration) -> Self {
        Self {
            dispatcher,
            period,
            cancel: CancellationToken::new(),
            report_tx: None,
        }
    }

    /// Stop the worker together with a parent token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Forward each sweep report to `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<SweepReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    /// Spawns the sweep loop on the current tokio runtime.
    pub fn start(self) -> ReminderWorkerHandle {
        let cancel = self.cancel.clone();
        let join = tokio::spawn(self.run());
        ReminderWorkerHandle { cancel, join }
    }

    async fn run(self) {
        info!(period_secs = self.period.as_secs(), "reminder worker started");
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("reminder worker stopped");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        let dispatcher = Arc::clone(&self.dispatcher);
        match tokio::task::spawn_blocking(move || dispatcher.sweep()).await {
            Ok(Ok(report)) => {
                if let Some(tx) = self.report_tx.as_ref() {
                    let _ = tx.send(report);
                }
            }
            Ok(Err(err)) => error!(error = %err, "reminder sweep failed"),
            Err(err) => error!(error = %err, "reminder sweep panicked"),
        }
    }
}

impl ReminderWorkerHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the worker and waits for the in-flight sweep to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.join.await {
            error!(error = %err, "reminder worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ReminderWorker;
    use crate::clock::FixedClock;
    use crate::dispatcher::ReminderDispatcher;
    use crate::error::AppError;
    use crate::model::{PushTarget, Reminder};
    use crate::notify::LogGateway;
    use crate::storage::json_store::load_state;
    use crate::storage::{JsonStore, PushTargetStore, ReminderStore, Stores};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use time::macros::datetime;
    use tokio::sync::mpsc;

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("petcare-{nanos}-{file_name}"))
    }

    struct FlakyReminders {
        calls: AtomicUsize,
    }

    impl ReminderStore for FlakyReminders {
        fn insert(&self, _reminder: Reminder) -> Result<(), AppError> {
            Ok(())
        }

        fn query_unsent(&self) -> Result<Vec<Reminder>, AppError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(AppError::io("store busy"));
            }
            Ok(Vec::new())
        }

        fn mark_sent(&self, _id: &str) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_sweeps_on_start_and_stops_on_shutdown() {
        let path = temp_path("worker.json");
        let store = Arc::new(JsonStore::new(&path));
        let now = datetime!(2024-03-10 09:00:00 UTC);
        store
            .register(PushTarget {
                owner_id: "user-1".to_string(),
                target: "token-1".to_string(),
                updated_at: now,
            })
            .unwrap();
        ReminderStore::insert(
            store.as_ref(),
            Reminder {
                id: "reminder-1".to_string(),
                task_id: "task-1".to_string(),
                owner_id: "user-1".to_string(),
                reminder_time: now,
                message: "deworming today".to_string(),
                sent: false,
                created_at: now,
            },
        )
        .unwrap();
        let dispatcher = Arc::new(ReminderDispatcher::from_stores(
            &Stores::json(store.clone()),
            Arc::new(LogGateway),
            Arc::new(FixedClock::new(now)),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = ReminderWorker::new(dispatcher, Duration::from_secs(3600))
            .with_reports(tx)
            .start();
        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("first sweep")
            .expect("report");
        handle.shutdown().await;
        let state = load_state(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(report.delivered, 1);
        assert!(state.reminders[0].sent);
    }

    #[tokio::test]
    async fn failed_sweep_is_retried_on_next_tick() {
        let path = temp_path("flaky.json");
        let reminders = Arc::new(FlakyReminders {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Arc::new(ReminderDispatcher::new(
            reminders.clone(),
            Arc::new(JsonStore::new(&path)),
            Arc::new(LogGateway),
            Arc::new(FixedClock::new(datetime!(2024-03-10 09:00:00 UTC))),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = ReminderWorker::new(dispatcher, Duration::from_millis(20))
            .with_reports(tx)
            .start();
        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("sweep after failure")
            .expect("report");
        handle.shutdown().await;

        assert_eq!(report.examined, 0);
        assert!(reminders.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn parent_token_cancels_worker() {
        let path = temp_path("cancel.json");
        let dispatcher = Arc::new(ReminderDispatcher::from_stores(
            &Stores::json(Arc::new(JsonStore::new(&path))),
            Arc::new(LogGateway),
            Arc::new(FixedClock::new(datetime!(2024-03-10 09:00:00 UTC))),
        ));
        let parent = tokio_util::sync::CancellationToken::new();

        let handle = ReminderWorker::new(dispatcher, Duration::from_secs(3600))
            .with_cancellation(parent.child_token())
            .start();
        parent.cancel();
        let token = handle.cancellation_token();
        handle.shutdown().await;

        assert!(token.is_cancelled());
    }
}
