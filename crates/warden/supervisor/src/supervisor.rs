//! Bounded worker pool with lifecycle tracking
//!
//! Every submission becomes a tokio task that first waits for one of
//! `workers` permits, then runs the operation. The operation's result is
//! captured as the task's terminal state and handed to the submitter through
//! its [`TaskHandle`]; nothing an operation does can fail the pool itself.

use crate::cancel::{CancelCause, CancelToken};
use crate::error::{Result, SupervisorError, TaskError};
use crate::task::{TaskId, TaskInfo, TaskState};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn};

type BoxedOperation<T> = Pin<Box<dyn Future<Output = std::result::Result<T, TaskError>> + Send>>;

/// Supervisor sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Maximum number of tasks running at once
    pub workers: usize,
    /// Finished tasks kept visible in listings
    pub retained_terminal: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retained_terminal: 16,
        }
    }
}

/// Conflict rules for a submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Resource the task touches; `None` means process-wide
    pub resource: Option<String>,
    /// Refuse to start while conflicting tasks are pending, and keep others
    /// out while this one is pending
    pub exclusive: bool,
}

impl SubmitOptions {
    pub fn on(resource: impl Into<String>) -> Self {
        Self {
            resource: Some(resource.into()),
            exclusive: false,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Whether a pending task with `other` options conflicts with this one.
    fn conflicts_with(&self, other: &SubmitOptions) -> bool {
        let same_resource = match (&self.resource, &other.resource) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        (self.exclusive || other.exclusive) && same_resource
    }
}

struct TaskRecord {
    info: TaskInfo,
    options: SubmitOptions,
    cancel: CancelToken,
    sequence: u64,
}

#[derive(Default)]
struct TaskTable {
    records: HashMap<TaskId, TaskRecord>,
    next_sequence: u64,
}

impl TaskTable {
    fn pending_conflicts(&self, options: &SubmitOptions) -> usize {
        self.records
            .values()
            .filter(|r| !r.info.state.is_terminal() && options.conflicts_with(&r.options))
            .count()
    }

    fn transition(&mut self, id: TaskId, next: TaskState, error: Option<String>) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        if !record.info.state.can_become(next) {
            return false;
        }
        let now = Utc::now();
        record.info.state = next;
        if next == TaskState::Running {
            record.info.started_at = Some(now);
        }
        if next.is_terminal() {
            record.info.finished_at = Some(now);
            record.info.error = error;
        }
        true
    }

    /// Drop the oldest finished tasks beyond `keep`.
    fn prune(&mut self, keep: usize) {
        let mut finished: Vec<(chrono::DateTime<Utc>, u64, TaskId)> = self
            .records
            .values()
            .filter(|r| r.info.state.is_terminal())
            .map(|r| (r.info.finished_at.unwrap_or(r.info.submitted_at), r.sequence, r.info.id))
            .collect();
        if finished.len() <= keep {
            return;
        }
        finished.sort();
        let excess = finished.len() - keep;
        for (_, _, id) in finished.into_iter().take(excess) {
            self.records.remove(&id);
        }
    }
}

struct Inner {
    config: SupervisorConfig,
    runtime: Handle,
    permits: Arc<Semaphore>,
    table: Mutex<TaskTable>,
    shut_down: AtomicBool,
}

impl Inner {
    fn finish(&self, id: TaskId, outcome: &std::result::Result<(), TaskError>) {
        let (state, reason) = match outcome {
            Ok(()) => (TaskState::Succeeded, None),
            Err(TaskError::Cancelled) => (TaskState::Cancelled, None),
            Err(e) => (TaskState::Failed, Some(e.to_string())),
        };
        let mut table = self.table.lock();
        table.transition(id, state, reason);
        table.prune(self.config.retained_terminal);
    }
}

/// Task execution service
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.inner.config)
            .field("tracked", &self.inner.table.lock().records.len())
            .finish()
    }
}

impl Supervisor {
    /// Create a supervisor on the current tokio runtime.
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|e| SupervisorError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Create a supervisor that spawns onto `runtime`.
    pub fn with_runtime(config: SupervisorConfig, runtime: Handle) -> Self {
        let workers = config.workers.max(1);
        info!(workers, retained = config.retained_terminal, "Supervisor started");
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(workers)),
                config,
                runtime,
                table: Mutex::new(TaskTable::default()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Submit an async operation. Never waits; the work starts once a
    /// worker permit is free.
    pub fn submit<T, F, Fut>(
        &self,
        description: impl Into<String>,
        owner: impl Into<String>,
        options: SubmitOptions,
        operation: F,
    ) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, TaskError>> + Send + 'static,
    {
        self.launch(description.into(), owner.into(), options, move |token| {
            Box::pin(operation(token)) as BoxedOperation<T>
        })
    }

    /// Submit a blocking operation; it runs on tokio's blocking pool while
    /// holding a worker permit.
    pub fn submit_blocking<T, F>(
        &self,
        description: impl Into<String>,
        owner: impl Into<String>,
        options: SubmitOptions,
        operation: F,
    ) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> std::result::Result<T, TaskError> + Send + 'static,
    {
        self.launch(description.into(), owner.into(), options, move |token| {
            Box::pin(async move {
                tokio::task::spawn_blocking(move || operation(&token))
                    .await
                    .unwrap_or_else(|e| Err(join_failure(e)))
            }) as BoxedOperation<T>
        })
    }

    #[instrument(skip(self, make), fields(resource = ?options.resource, exclusive = options.exclusive))]
    fn launch<T>(
        &self,
        description: String,
        owner: String,
        options: SubmitOptions,
        make: impl FnOnce(CancelToken) -> BoxedOperation<T>,
    ) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
    {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(SupervisorError::ShutDown);
        }
        let id = TaskId::generate();
        let cancel = CancelToken::new();
        {
            let mut table = self.inner.table.lock();
            let count = table.pending_conflicts(&options);
            if count > 0 {
                debug!(count, "Refusing submission with pending conflicts");
                return Err(SupervisorError::PendingTasks { count });
            }
            let sequence = table.next_sequence;
            table.next_sequence += 1;
            let info = TaskInfo {
                id,
                description,
                owner,
                state: TaskState::Queued,
                resource: options.resource.clone(),
                exclusive: options.exclusive,
                submitted_at: Utc::now(),
                started_at: None,
                finished_at: None,
                error: None,
            };
            table.records.insert(
                id,
                TaskRecord {
                    info,
                    options,
                    cancel: cancel.clone(),
                    sequence,
                },
            );
        }

        let operation = make(cancel.clone());
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let result = run_task(&inner, id, cancel, operation).await;
            let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
            inner.finish(id, &outcome);
            match &outcome {
                Ok(()) => debug!(task_id = %id, "Task succeeded"),
                Err(TaskError::Cancelled) => info!(task_id = %id, "Task cancelled"),
                Err(TaskError::Panicked(reason)) => error!(task_id = %id, %reason, "Task panicked"),
                Err(e) => warn!(task_id = %id, error = %e, "Task failed"),
            }
            // The submitter may have dropped its handle.
            let _ = tx.send(result);
        });

        debug!(task_id = %id, "Task queued");
        Ok(TaskHandle {
            id,
            supervisor: self.clone(),
            result: rx,
        })
    }

    /// Snapshot of tracked tasks: running, then queued, then finished, each
    /// in submission order.
    pub fn list(&self) -> Vec<TaskInfo> {
        let table = self.inner.table.lock();
        let mut records: Vec<&TaskRecord> = table.records.values().collect();
        records.sort_by_key(|r| (r.info.state.rank(), r.info.submitted_at, r.sequence));
        records.into_iter().map(|r| r.info.clone()).collect()
    }

    pub fn info(&self, id: TaskId) -> Option<TaskInfo> {
        self.inner.table.lock().records.get(&id).map(|r| r.info.clone())
    }

    /// Number of queued or running tasks.
    pub fn pending(&self) -> usize {
        self.inner
            .table
            .lock()
            .records
            .values()
            .filter(|r| !r.info.state.is_terminal())
            .count()
    }

    /// Fail fast if anything would conflict with an exclusive process-wide
    /// operation.
    pub fn ensure_idle(&self) -> Result<()> {
        match self.pending() {
            0 => Ok(()),
            count => Err(SupervisorError::PendingTasks { count }),
        }
    }

    /// Fail if a pending task conflicts with work described by `options`.
    ///
    /// For work done on the caller's thread rather than submitted as a task.
    pub fn check_conflicts(&self, options: &SubmitOptions) -> Result<()> {
        match self.inner.table.lock().pending_conflicts(options) {
            0 => Ok(()),
            count => Err(SupervisorError::PendingTasks { count }),
        }
    }

    /// Request cancellation. Returns `false` if the task already finished.
    #[instrument(skip(self), fields(task_id = %id))]
    pub fn cancel(&self, id: TaskId) -> Result<bool> {
        let table = self.inner.table.lock();
        let record = table
            .records
            .get(&id)
            .ok_or(SupervisorError::TaskNotFound(id))?;
        if record.info.state.is_terminal() {
            return Ok(false);
        }
        record.cancel.cancel(CancelCause::User);
        info!("Cancellation requested");
        Ok(true)
    }

    /// Stop accepting work and cancel everything still pending.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let table = self.inner.table.lock();
        let mut cancelled = 0;
        for record in table.records.values() {
            if !record.info.state.is_terminal() {
                record.cancel.cancel(CancelCause::Shutdown);
                cancelled += 1;
            }
        }
        info!(cancelled, "Supervisor shutting down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }
}

async fn run_task<T: Send + 'static>(
    inner: &Inner,
    id: TaskId,
    cancel: CancelToken,
    operation: BoxedOperation<T>,
) -> std::result::Result<T, TaskError> {
    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TaskError::Cancelled),
        permit = Arc::clone(&inner.permits).acquire_owned() => {
            permit.map_err(|_| TaskError::Cancelled)?
        }
    };
    if cancel.is_cancelled() || !inner.table.lock().transition(id, TaskState::Running, None) {
        return Err(TaskError::Cancelled);
    }
    debug!(task_id = %id, "Task running");
    // A separate task so a panic in the operation is contained.
    let joined = tokio::spawn(operation).await;
    drop(permit);
    joined.unwrap_or_else(|e| Err(join_failure(e)))
}

fn join_failure(e: JoinError) -> TaskError {
    if e.is_panic() {
        let payload = e.into_panic();
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        TaskError::Panicked(reason)
    } else {
        TaskError::Cancelled
    }
}

/// Live handle to a submitted task
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    supervisor: Supervisor,
    result: oneshot::Receiver<std::result::Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current metadata, `None` once pruned from the listing.
    pub fn info(&self) -> Option<TaskInfo> {
        self.supervisor.info(self.id)
    }

    pub fn state(&self) -> Option<TaskState> {
        self.info().map(|i| i.state)
    }

    /// Request cancellation; a no-op once the task is finished.
    pub fn cancel(&self) -> bool {
        self.supervisor.cancel(self.id).unwrap_or(false)
    }

    /// Wait for the task's outcome.
    pub async fn join(self) -> std::result::Result<T, TaskError> {
        self.result
            .await
            .unwrap_or_else(|_| Err(TaskError::Failed("task result was lost".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn supervisor(workers: usize) -> Supervisor {
        Supervisor::new(SupervisorConfig {
            workers,
            retained_terminal: 16,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_and_failure_are_captured() {
        let sup = supervisor(2);
        let ok = sup
            .submit("ok", "tester", SubmitOptions::default(), |_| async { Ok(7) })
            .unwrap();
        let bad = sup
            .submit("bad", "tester", SubmitOptions::default(), |_| async {
                Err::<(), _>(TaskError::failed("disk full"))
            })
            .unwrap();
        let (ok_id, bad_id) = (ok.id(), bad.id());
        assert_eq!(ok.join().await, Ok(7));
        assert_eq!(bad.join().await, Err(TaskError::Failed("disk full".into())));
        assert_eq!(sup.info(ok_id).unwrap().state, TaskState::Succeeded);
        let failed = sup.info(bad_id).unwrap();
        assert_eq!(failed.state, TaskState::Failed);
        assert_eq!(failed.error.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_panics_do_not_escape() {
        let sup = supervisor(1);
        let handle = sup
            .submit_blocking("boom", "tester", SubmitOptions::default(), |_| -> std::result::Result<(), TaskError> {
                panic!("kaboom")
            })
            .unwrap();
        assert_eq!(handle.join().await, Err(TaskError::Panicked("kaboom".into())));
        let next = sup
            .submit("after", "tester", SubmitOptions::default(), |_| async { Ok(1) })
            .unwrap();
        assert_eq!(next.join().await, Ok(1));
    }

    #[tokio::test]
    async fn test_exclusive_refuses_while_pending() {
        let sup = supervisor(2);
        let (release, wait) = oneshot::channel::<()>();
        let save = sup
            .submit("save world", "tester", SubmitOptions::on("world"), |_| async move {
                let _ = wait.await;
                Ok(())
            })
            .unwrap();
        let err = sup
            .submit("reload", "tester", SubmitOptions::default().exclusive(), |_| async { Ok(()) })
            .unwrap_err();
        assert_eq!(err, SupervisorError::PendingTasks { count: 1 });
        assert!(sup.ensure_idle().is_err());
        // Other worlds are unaffected by a non-exclusive task.
        let other = sup
            .submit("save nether", "tester", SubmitOptions::on("nether").exclusive(), |_| async { Ok(()) })
            .unwrap();
        other.join().await.unwrap();
        release.send(()).unwrap();
        save.join().await.unwrap();
        assert!(sup.ensure_idle().is_ok());
    }

    #[tokio::test]
    async fn test_pending_exclusive_blocks_same_resource() {
        let sup = supervisor(2);
        let (release, wait) = oneshot::channel::<()>();
        let migrate = sup
            .submit("migrate", "tester", SubmitOptions::on("world").exclusive(), |_| async move {
                let _ = wait.await;
                Ok(())
            })
            .unwrap();
        assert!(sup
            .submit("save", "tester", SubmitOptions::on("world"), |_| async { Ok(()) })
            .is_err());
        assert!(sup
            .submit("save", "tester", SubmitOptions::on("nether"), |_| async { Ok(()) })
            .is_ok());
        release.send(()).unwrap();
        migrate.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_conflict_check_without_submitting() {
        let sup = supervisor(2);
        let (release, wait) = oneshot::channel::<()>();
        let reload = sup
            .submit("reload", "tester", SubmitOptions::default().exclusive(), |_| async move {
                let _ = wait.await;
                Ok(())
            })
            .unwrap();
        assert_eq!(
            sup.check_conflicts(&SubmitOptions::on("world")),
            Err(SupervisorError::PendingTasks { count: 1 })
        );
        assert_eq!(sup.pending(), 1);
        release.send(()).unwrap();
        reload.join().await.unwrap();
        assert!(sup.check_conflicts(&SubmitOptions::on("world")).is_ok());

        let listing = sup
            .submit("list", "tester", SubmitOptions::on("world:query"), |cancel| async move {
                cancel.cancelled().await;
                Err::<(), _>(TaskError::Cancelled)
            })
            .unwrap();
        assert!(sup.check_conflicts(&SubmitOptions::on("world")).is_ok());
        listing.cancel();
        listing.join().await.unwrap_err();
    }

    #[tokio::test]
    async fn test_cancel_running_is_cooperative() {
        let sup = supervisor(1);
        let (started_tx, started_rx) = oneshot::channel();
        let handle = sup
            .submit("loop", "tester", SubmitOptions::default(), |token| async move {
                let _ = started_tx.send(());
                token.cancelled().await;
                Err::<(), _>(TaskError::Cancelled)
            })
            .unwrap();
        started_rx.await.unwrap();
        assert_eq!(handle.state(), Some(TaskState::Running));
        assert!(handle.cancel());
        let id = handle.id();
        assert_eq!(handle.join().await, Err(TaskError::Cancelled));
        assert_eq!(sup.info(id).unwrap().state, TaskState::Cancelled);
        assert_eq!(sup.cancel(id), Ok(false));
    }

    #[tokio::test]
    async fn test_queued_task_cancels_without_running() {
        let sup = supervisor(1);
        let (release, wait) = oneshot::channel::<()>();
        let blocker = sup
            .submit("blocker", "tester", SubmitOptions::default(), |_| async move {
                let _ = wait.await;
                Ok(())
            })
            .unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let queued = sup
            .submit("queued", "tester", SubmitOptions::default(), move |_| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queued.state(), Some(TaskState::Queued));
        assert!(queued.cancel());
        assert_eq!(queued.join().await, Err(TaskError::Cancelled));
        release.send(()).unwrap();
        blocker.join().await.unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_list_orders_active_first_and_prunes() {
        let sup = Supervisor::new(SupervisorConfig {
            workers: 1,
            retained_terminal: 2,
        })
        .unwrap();
        for i in 0..4 {
            sup.submit(format!("done {i}"), "tester", SubmitOptions::default(), |_| async { Ok(()) })
                .unwrap()
                .join()
                .await
                .unwrap();
        }
        let (release, wait) = oneshot::channel::<()>();
        let running = sup
            .submit("running", "tester", SubmitOptions::default(), |_| async move {
                let _ = wait.await;
                Ok(())
            })
            .unwrap();
        let queued = sup
            .submit("queued", "tester", SubmitOptions::default(), |_| async { Ok(()) })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let listed: Vec<_> = sup.list().into_iter().map(|t| t.description).collect();
        assert_eq!(listed, vec!["running", "queued", "done 2", "done 3"]);
        release.send(()).unwrap();
        running.join().await.unwrap();
        queued.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_refuses_and_cancels() {
        let sup = supervisor(1);
        let handle = sup
            .submit("wait", "tester", SubmitOptions::default(), |token| async move {
                token.cancelled().await;
                Err::<(), _>(TaskError::Cancelled)
            })
            .unwrap();
        sup.shutdown();
        assert_eq!(handle.join().await, Err(TaskError::Cancelled));
        assert!(matches!(
            sup.submit("late", "tester", SubmitOptions::default(), |_| async { Ok(()) }),
            Err(SupervisorError::ShutDown)
        ));
    }
}
