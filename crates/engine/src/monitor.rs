//! Execution task monitor.
//!
//! Drives one submitted task from its initial snapshot to a terminal
//! state, reconciling updates from the push channel and a polling
//! fallback. Both sources feed a single sequential handler, so terminal
//! callbacks fire exactly once; every incoming snapshot is authoritative
//! for its moment in time and the last one observed wins. Each monitor
//! owns exactly one task's lifecycle and is cancelled through the
//! explicit [`MonitorHandle`] it returns -- there is no shared tracker
//! keyed by task id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pixelgraph_core::types::TaskId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::EngineApiError;
use crate::client::PushClient;
use crate::task::{ProgressUpdate, TaskSnapshot, TaskStatus};

/// Poll cadence against the status endpoint.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Pause between the final 100% progress update and `on_complete`, so a
/// progress bar is seen full before it disappears.
pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_millis(100);

/// Where the monitor polls task status from.
///
/// [`crate::api::SceneTasks`] is the production implementation; tests
/// drive the loop with a scripted source.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn task_status(&self, task_id: TaskId) -> Result<TaskSnapshot, EngineApiError>;
}

/// Caller-supplied lifecycle callbacks.
///
/// `on_progress` may fire many times; `on_complete` and `on_error` fire
/// at most once each, and never after cancellation.
pub struct TaskCallbacks {
    on_progress: Box<dyn Fn(ProgressUpdate) + Send + Sync>,
    on_complete: Box<dyn Fn(TaskSnapshot) + Send + Sync>,
    on_error: Box<dyn Fn(String) + Send + Sync>,
}

impl TaskCallbacks {
    pub fn new(
        on_progress: impl Fn(ProgressUpdate) + Send + Sync + 'static,
        on_complete: impl Fn(TaskSnapshot) + Send + Sync + 'static,
        on_error: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_progress: Box::new(on_progress),
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        }
    }
}

/// Tunables for the monitor loop.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    pub completion_delay: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            completion_delay: DEFAULT_COMPLETION_DELAY,
        }
    }
}

/// Cancellation handle for a running monitor.
///
/// [`cancel`](Self::cancel) is synchronous and idempotent: calling it
/// twice, or after a terminal callback already fired, does nothing. The
/// token is checked before every callback, so no callback fires after
/// cancellation even for a response that was already in flight.
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop polling, drop the push subscription, and silence all
    /// further callbacks.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the monitor was cancelled or has reached a terminal
    /// state.
    pub fn is_finished(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .task
                .as_ref()
                .map_or(true, |task| task.is_finished())
    }

    /// Wait for the monitor task to wind down. Useful for deterministic
    /// shutdown and in tests.
    pub async fn join(self) {
        if let Some(task) = self.task {
            let _ = task.await;
        }
    }
}

/// Spawns monitors for submitted tasks.
pub struct TaskMonitor;

impl TaskMonitor {
    /// Start monitoring a task from its initial snapshot.
    ///
    /// * initial `FAILED`: `on_error` is invoked synchronously, before
    ///   this returns; nothing is spawned.
    /// * initial `COMPLETED`: one synthetic progress callback at ~50%
    ///   (so the bar does not jump straight to done), a short delay,
    ///   then `on_complete`; no polling or subscription is started.
    /// * otherwise: the initial snapshot runs through the regular
    ///   update handler, then the poll loop (and push subscription when
    ///   `push` is supplied) takes over until a terminal status or
    ///   cancellation.
    pub fn spawn(
        source: Arc<dyn StatusSource>,
        push: Option<PushClient>,
        task_id: TaskId,
        initial: TaskSnapshot,
        callbacks: TaskCallbacks,
        options: MonitorOptions,
    ) -> MonitorHandle {
        let cancel = CancellationToken::new();

        match initial.status {
            TaskStatus::Failed => {
                tracing::info!(task_id, "Task already failed at submission");
                (callbacks.on_error)(initial.error_message_or_default());
                return MonitorHandle { cancel, task: None };
            }
            TaskStatus::Completed => {
                tracing::info!(task_id, "Task already completed at submission");
                let token = cancel.clone();
                let delay = options.completion_delay;
                let task = tokio::spawn(async move {
                    let total = initial.total_nodes.unwrap_or(1).max(1);
                    if token.is_cancelled() {
                        return;
                    }
                    (callbacks.on_progress)(ProgressUpdate::clamped(total / 2, total));
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    (callbacks.on_complete)(initial);
                });
                return MonitorHandle {
                    cancel,
                    task: Some(task),
                };
            }
            _ => {}
        }

        let token = cancel.clone();
        let task = tokio::spawn(run_monitor(
            source, push, task_id, initial, callbacks, options, token,
        ));
        MonitorHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Outcome of handling one snapshot.
enum Flow {
    Continue,
    Finished,
}

/// Poll/push loop for a task that was non-terminal at submission.
async fn run_monitor(
    source: Arc<dyn StatusSource>,
    push: Option<PushClient>,
    task_id: TaskId,
    initial: TaskSnapshot,
    callbacks: TaskCallbacks,
    options: MonitorOptions,
    cancel: CancellationToken,
) {
    // The initial snapshot is just the first observation.
    if let Flow::Finished =
        handle_snapshot(&cancel, &callbacks, options.completion_delay, initial).await
    {
        return;
    }

    // Push updates arrive on a channel fed by a reader task, so the
    // main loop can select over both sources uniformly.
    let (push_tx, mut push_rx) = mpsc::channel::<TaskSnapshot>(16);
    let push_task = push.map(|client| {
        let token = cancel.clone();
        tokio::spawn(forward_push_updates(client, task_id, push_tx, token))
    });
    let mut push_open = push_task.is_some();

    let mut interval = tokio::time::interval(options.poll_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = push_rx.recv(), if push_open => {
                match received {
                    Some(snapshot) => {
                        if let Flow::Finished = handle_snapshot(
                            &cancel,
                            &callbacks,
                            options.completion_delay,
                            snapshot,
                        )
                        .await
                        {
                            break;
                        }
                    }
                    None => {
                        // Push channel gone; polling carries on alone.
                        push_open = false;
                    }
                }
            }
            _ = interval.tick() => {
                let polled = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = source.task_status(task_id) => result,
                };
                match polled {
                    Ok(snapshot) => {
                        if let Flow::Finished = handle_snapshot(
                            &cancel,
                            &callbacks,
                            options.completion_delay,
                            snapshot,
                        )
                        .await
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(task_id, error = %e, "Status poll failed, retrying");
                    }
                }
            }
        }
    }

    // Terminal or cancelled either way: tear down the push reader.
    cancel.cancel();
    if let Some(task) = push_task {
        let _ = task.await;
    }
    tracing::debug!(task_id, "Monitor stopped");
}

/// Read push updates and forward them as snapshots until the channel or
/// the monitor goes away.
async fn forward_push_updates(
    client: PushClient,
    task_id: TaskId,
    tx: mpsc::Sender<TaskSnapshot>,
    cancel: CancellationToken,
) {
    let mut subscription = tokio::select! {
        _ = cancel.cancelled() => return,
        connected = client.subscribe(task_id) => match connected {
            Ok(sub) => sub,
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Push subscription failed, polling only");
                return;
            }
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            update = subscription.next_update() => match update {
                Some(update) => {
                    if tx.send(update.into_snapshot(task_id)).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }
}

/// Apply one status snapshot: the shared state machine step for both
/// sources. The cancellation token is checked before every callback.
async fn handle_snapshot(
    cancel: &CancellationToken,
    callbacks: &TaskCallbacks,
    completion_delay: Duration,
    snapshot: TaskSnapshot,
) -> Flow {
    if cancel.is_cancelled() {
        return Flow::Finished;
    }

    match snapshot.status {
        TaskStatus::Processing => {
            (callbacks.on_progress)(snapshot.progress());
            Flow::Continue
        }
        TaskStatus::Completed => {
            // Show the bar full, give it a beat, then complete.
            (callbacks.on_progress)(ProgressUpdate::finished(
                snapshot.total_nodes.unwrap_or(1),
            ));
            tokio::select! {
                _ = cancel.cancelled() => return Flow::Finished,
                _ = tokio::time::sleep(completion_delay) => {}
            }
            (callbacks.on_complete)(snapshot);
            Flow::Finished
        }
        TaskStatus::Failed => {
            (callbacks.on_error)(snapshot.error_message_or_default());
            Flow::Finished
        }
        // QUEUED and anything unrecognised: keep watching silently.
        TaskStatus::Queued | TaskStatus::Unknown => Flow::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns scripted snapshots in order; repeats QUEUED once the
    /// script runs out. Counts how many polls were made.
    struct ScriptedSource {
        script: Mutex<VecDeque<TaskSnapshot>>,
        polls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<TaskSnapshot>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                polls: AtomicUsize::new(0),
            })
        }

        fn poll_count(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn task_status(&self, _task_id: TaskId) -> Result<TaskSnapshot, EngineApiError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| snapshot(TaskStatus::Queued, None, None)))
        }
    }

    #[derive(Default)]
    struct Recorded {
        progress: Vec<ProgressUpdate>,
        completions: usize,
        errors: Vec<String>,
    }

    fn recording_callbacks() -> (Arc<Mutex<Recorded>>, TaskCallbacks) {
        let record = Arc::new(Mutex::new(Recorded::default()));
        let progress = Arc::clone(&record);
        let complete = Arc::clone(&record);
        let error = Arc::clone(&record);
        let callbacks = TaskCallbacks::new(
            move |update| progress.lock().unwrap().progress.push(update),
            move |_snapshot| complete.lock().unwrap().completions += 1,
            move |message| error.lock().unwrap().errors.push(message),
        );
        (record, callbacks)
    }

    fn snapshot(status: TaskStatus, processed: Option<i64>, total: Option<i64>) -> TaskSnapshot {
        TaskSnapshot {
            id: Some(1),
            status,
            processed_nodes: processed,
            total_nodes: total,
            error_message: None,
            message: None,
            timestamp: None,
            processed_by: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completed_initial_snapshot_skips_polling() {
        let source = ScriptedSource::new(vec![]);
        let (record, callbacks) = recording_callbacks();

        let handle = TaskMonitor::spawn(
            Arc::clone(&source) as Arc<dyn StatusSource>,
            None,
            1,
            snapshot(TaskStatus::Completed, Some(10), Some(10)),
            callbacks,
            MonitorOptions::default(),
        );
        handle.join().await;

        let record = record.lock().unwrap();
        assert_eq!(record.completions, 1);
        assert!(record.errors.is_empty());
        // One synthetic intermediate update at ~50%.
        assert_eq!(record.progress.len(), 1);
        assert_eq!(record.progress[0].percent, 50);
        assert_eq!(source.poll_count(), 0);
    }

    #[tokio::test]
    async fn failed_initial_snapshot_reports_synchronously() {
        let source = ScriptedSource::new(vec![]);
        let (record, callbacks) = recording_callbacks();

        let mut initial = snapshot(TaskStatus::Failed, None, None);
        initial.error_message = Some("boom".to_string());

        let handle = TaskMonitor::spawn(
            Arc::clone(&source) as Arc<dyn StatusSource>,
            None,
            1,
            initial,
            callbacks,
            MonitorOptions::default(),
        );

        // on_error already fired before spawn returned.
        {
            let record = record.lock().unwrap();
            assert_eq!(record.errors, vec!["boom".to_string()]);
            assert_eq!(record.completions, 0);
        }

        handle.join().await;
        assert_eq!(source.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_sequence_reports_progress_then_completes_once() {
        let source = ScriptedSource::new(vec![
            snapshot(TaskStatus::Processing, Some(2), Some(10)),
            snapshot(TaskStatus::Processing, Some(7), Some(10)),
            snapshot(TaskStatus::Completed, Some(10), Some(10)),
        ]);
        let (record, callbacks) = recording_callbacks();

        let handle = TaskMonitor::spawn(
            Arc::clone(&source) as Arc<dyn StatusSource>,
            None,
            1,
            snapshot(TaskStatus::Queued, None, None),
            callbacks,
            MonitorOptions::default(),
        );
        handle.join().await;

        let record = record.lock().unwrap();
        let percents: Vec<u8> = record.progress.iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![20, 70, 100]);
        assert_eq!(record.completions, 1);
        assert!(record.errors.is_empty());
        assert_eq!(source.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_reports_error_once_and_stops() {
        let mut failed = snapshot(TaskStatus::Failed, None, None);
        failed.error_message = Some("node 2 exploded".to_string());
        let source = ScriptedSource::new(vec![
            snapshot(TaskStatus::Processing, Some(1), Some(4)),
            failed,
        ]);
        let (record, callbacks) = recording_callbacks();

        let handle = TaskMonitor::spawn(
            Arc::clone(&source) as Arc<dyn StatusSource>,
            None,
            1,
            snapshot(TaskStatus::Queued, None, None),
            callbacks,
            MonitorOptions::default(),
        );
        handle.join().await;

        let record = record.lock().unwrap();
        assert_eq!(record.errors, vec!["node 2 exploded".to_string()]);
        assert_eq!(record.completions, 0);
        assert_eq!(source.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_statuses_keep_polling_without_callbacks() {
        let source = ScriptedSource::new(vec![
            snapshot(TaskStatus::Queued, None, None),
            snapshot(TaskStatus::Unknown, None, None),
            snapshot(TaskStatus::Completed, Some(3), Some(3)),
        ]);
        let (record, callbacks) = recording_callbacks();

        let handle = TaskMonitor::spawn(
            Arc::clone(&source) as Arc<dyn StatusSource>,
            None,
            1,
            snapshot(TaskStatus::Queued, None, None),
            callbacks,
            MonitorOptions::default(),
        );
        handle.join().await;

        let record = record.lock().unwrap();
        // Only the clamped 100% update from the terminal snapshot.
        let percents: Vec<u8> = record.progress.iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![100]);
        assert_eq!(record.completions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_silences_all_callbacks() {
        let source = ScriptedSource::new(vec![
            snapshot(TaskStatus::Processing, Some(1), Some(10)),
            snapshot(TaskStatus::Completed, Some(10), Some(10)),
        ]);
        let (record, callbacks) = recording_callbacks();

        let handle = TaskMonitor::spawn(
            Arc::clone(&source) as Arc<dyn StatusSource>,
            None,
            1,
            snapshot(TaskStatus::Queued, None, None),
            callbacks,
            MonitorOptions::default(),
        );

        // Cancel before the spawned task ever runs; the first poll
        // response is effectively in flight and must be swallowed.
        handle.cancel();
        handle.cancel(); // idempotent
        handle.join().await;

        let record = record.lock().unwrap();
        assert!(record.progress.is_empty());
        assert_eq!(record.completions, 0);
        assert!(record.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_terminal_state_is_a_noop() {
        let source = ScriptedSource::new(vec![snapshot(
            TaskStatus::Completed,
            Some(2),
            Some(2),
        )]);
        let (record, callbacks) = recording_callbacks();

        let handle = TaskMonitor::spawn(
            Arc::clone(&source) as Arc<dyn StatusSource>,
            None,
            1,
            snapshot(TaskStatus::Queued, None, None),
            callbacks,
            MonitorOptions::default(),
        );

        // Let the monitor run to completion, then cancel.
        tokio::task::yield_now().await;
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        handle.cancel();

        let record = record.lock().unwrap();
        assert_eq!(record.completions, 1);
        assert!(record.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_errors_are_retried() {
        struct FlakySource {
            polls: AtomicUsize,
        }

        #[async_trait]
        impl StatusSource for FlakySource {
            async fn task_status(
                &self,
                _task_id: TaskId,
            ) -> Result<TaskSnapshot, EngineApiError> {
                let n = self.polls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(EngineApiError::Api {
                        status: 503,
                        body: "unavailable".to_string(),
                    })
                } else {
                    Ok(snapshot(TaskStatus::Completed, Some(1), Some(1)))
                }
            }
        }

        let source = Arc::new(FlakySource {
            polls: AtomicUsize::new(0),
        });
        let (record, callbacks) = recording_callbacks();

        let handle = TaskMonitor::spawn(
            Arc::clone(&source) as Arc<dyn StatusSource>,
            None,
            1,
            snapshot(TaskStatus::Queued, None, None),
            callbacks,
            MonitorOptions::default(),
        );
        handle.join().await;

        let record = record.lock().unwrap();
        assert_eq!(record.completions, 1);
        assert!(record.errors.is_empty());
        assert_eq!(source.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_processing_snapshot_fires_progress_before_polling() {
        let source = ScriptedSource::new(vec![snapshot(
            TaskStatus::Completed,
            Some(6),
            Some(6),
        )]);
        let (record, callbacks) = recording_callbacks();

        let handle = TaskMonitor::spawn(
            Arc::clone(&source) as Arc<dyn StatusSource>,
            None,
            1,
            snapshot(TaskStatus::Processing, Some(3), Some(6)),
            callbacks,
            MonitorOptions::default(),
        );
        handle.join().await;

        let record = record.lock().unwrap();
        let percents: Vec<u8> = record.progress.iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![50, 100]);
        assert_eq!(record.completions, 1);
    }
}
