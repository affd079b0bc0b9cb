// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded-concurrency in-memory work queues.
//!
//! Each named queue starts tasks in FIFO order with at most `concurrency`
//! running at once; every task runs through
//! [`ExternalDispatcher::run_with_retry`]. Completion order is unordered.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use cowork_config::QueueConfig;
use cowork_core::CoworkError;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, warn};

use crate::dispatcher::{ExternalDispatcher, RetryOptions};

type Job<T> = Box<dyn FnMut() -> BoxFuture<'static, Result<T, CoworkError>> + Send>;

/// A deferred unit of work.
pub struct QueueTask<T> {
    label: String,
    circuit_id: String,
    job: Job<T>,
    max_retries: Option<u32>,
    backoff_base: Option<Duration>,
    timeout: Option<Duration>,
}

impl<T: Send + 'static> QueueTask<T> {
    /// `job` is called once per attempt.
    pub fn new<F, Fut>(label: impl Into<String>, circuit_id: impl Into<String>, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CoworkError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            circuit_id: circuit_id.into(),
            job: Box::new(move || Box::pin(job()) as BoxFuture<'static, _>),
            max_retries: None,
            backoff_base: None,
            timeout: None,
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = Some(backoff_base);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn retry_options(&self, dispatcher: &ExternalDispatcher) -> RetryOptions {
        let mut options = dispatcher.retry_options(self.circuit_id.clone());
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        if let Some(backoff_base) = self.backoff_base {
            options.backoff_base = backoff_base;
        }
        if let Some(timeout) = self.timeout {
            options.timeout = timeout;
        }
        options
    }
}

impl<T> std::fmt::Debug for QueueTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTask")
            .field("label", &self.label)
            .field("circuit_id", &self.circuit_id)
            .finish_non_exhaustive()
    }
}

/// Resolves once the task and all of its retries have settled.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    label: String,
    rx: oneshot::Receiver<Result<T, CoworkError>>,
}

impl<T> TaskHandle<T> {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, CoworkError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CoworkError::Internal(format!(
                "task `{}` ended without reporting a result",
                self.label
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Per-queue counters for health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub pending: usize,
    pub running: usize,
    pub concurrency: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<BoxFuture<'static, ()>>,
    running: usize,
}

struct QueueInner {
    name: String,
    concurrency: usize,
    dispatcher: Arc<ExternalDispatcher>,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// A named FIFO queue with a concurrency cap. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.inner.name)
            .field("concurrency", &self.inner.concurrency)
            .finish_non_exhaustive()
    }
}

/// Frees a running slot when a task finishes (or panics) and starts the next.
struct SlotGuard(Arc<QueueInner>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut state = self.0.lock();
            state.running = state.running.saturating_sub(1);
        }
        QueueInner::pump(&self.0);
    }
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pump(this: &Arc<Self>) {
        // no runtime during shutdown; whatever is left stays queued
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        loop {
            let next = {
                let mut state = this.lock();
                if state.running >= this.concurrency {
                    return;
                }
                match state.pending.pop_front() {
                    Some(task) => {
                        state.running += 1;
                        task
                    }
                    None => {
                        if state.running == 0 {
                            this.idle.notify_waiters();
                        }
                        return;
                    }
                }
            };
            let guard = SlotGuard(Arc::clone(this));
            runtime.spawn(async move {
                next.await;
                drop(guard);
            });
        }
    }
}

impl TaskQueue {
    pub fn new(
        name: impl Into<String>,
        concurrency: usize,
        dispatcher: Arc<ExternalDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                concurrency: concurrency.max(1),
                dispatcher,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queues a task and returns a handle to its eventual result.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue<T: Send + 'static>(&self, task: QueueTask<T>) -> TaskHandle<T> {
        let (tx, rx) = oneshot::channel();
        let options = task.retry_options(&self.inner.dispatcher);
        let dispatcher = Arc::clone(&self.inner.dispatcher);
        let queue = self.inner.name.clone();
        let QueueTask { label, job, .. } = task;
        let handle_label = label.clone();

        let run: BoxFuture<'static, ()> = Box::pin(async move {
            debug!(queue = %queue, task = %label, "task started");
            let result = dispatcher.run_with_retry(&label, job, options).await;
            if let Err(e) = &result {
                warn!(queue = %queue, task = %label, error = %e, "task failed");
            }
            // receiver may be gone; the task still ran
            let _ = tx.send(result);
        });

        {
            let mut state = self.inner.lock();
            state.pending.push_back(run);
        }
        QueueInner::pump(&self.inner);

        TaskHandle {
            label: handle_label,
            rx,
        }
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock();
        QueueStats {
            name: self.inner.name.clone(),
            pending: state.pending.len(),
            running: state.running,
            concurrency: self.inner.concurrency,
        }
    }

    /// Waits until nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.inner.lock();
                if state.running == 0 && state.pending.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}

/// Named queues created on first use.
#[derive(Debug)]
pub struct TaskQueueRegistry {
    dispatcher: Arc<ExternalDispatcher>,
    default_concurrency: usize,
    overrides: HashMap<String, usize>,
    queues: DashMap<String, TaskQueue>,
}

impl TaskQueueRegistry {
    pub fn new(dispatcher: Arc<ExternalDispatcher>, config: &QueueConfig) -> Self {
        Self {
            dispatcher,
            default_concurrency: config.concurrency.max(1),
            overrides: config.overrides.clone(),
            queues: DashMap::new(),
        }
    }

    /// The queue called `name`, created with its configured concurrency.
    pub fn queue(&self, name: &str) -> TaskQueue {
        if let Some(existing) = self.queues.get(name) {
            return existing.clone();
        }
        let concurrency = self
            .overrides
            .get(name)
            .copied()
            .unwrap_or(self.default_concurrency);
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| TaskQueue::new(name, concurrency, Arc::clone(&self.dispatcher)))
            .clone()
    }

    /// Stats for every queue, sorted by name.
    pub fn stats(&self) -> Vec<QueueStats> {
        let mut stats: Vec<_> = self.queues.iter().map(|q| q.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Waits for every queue created so far to drain.
    pub async fn wait_idle(&self) {
        let queues: Vec<TaskQueue> = self.queues.iter().map(|q| q.clone()).collect();
        for queue in queues {
            queue.wait_idle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cowork_config::DispatcherConfig;

    use crate::registry::CircuitBreakerRegistry;

    fn dispatcher() -> Arc<ExternalDispatcher> {
        Arc::new(
            ExternalDispatcher::new(
                Arc::new(CircuitBreakerRegistry::default()),
                DispatcherConfig::default(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn handle_resolves_with_task_result() {
        let queue = TaskQueue::new("notifications", 2, dispatcher());
        let handle = queue.enqueue(QueueTask::new("greet", "email", || async { Ok(42) }));
        assert_eq!(handle.label(), "greet");
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency_and_starts_fifo() {
        let queue = TaskQueue::new("calendar", 2, dispatcher());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let (running, peak, order) = (running.clone(), peak.clone(), order.clone());
                queue.enqueue(QueueTask::new(format!("task-{i}"), "calendar", move || {
                    let (running, peak, order) = (running.clone(), peak.clone(), order.clone());
                    async move {
                        order.lock().unwrap().push(i);
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(i)
                    }
                }))
            })
            .collect();

        let stats = queue.stats();
        assert_eq!(stats.running, 2);
        assert_eq!(stats.pending, 4);
        assert_eq!(stats.concurrency, 2);

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i);
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);

        queue.wait_idle().await;
        assert_eq!(queue.stats().running, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_reports_error_and_frees_slot() {
        let queue = TaskQueue::new("email", 1, dispatcher());
        let failing = queue.enqueue(
            QueueTask::new("bounce", "email", || async {
                Err::<(), _>(CoworkError::TransientIntegration {
                    integration: "email".into(),
                    message: "smtp 451".into(),
                })
            })
            .max_retries(1)
            .backoff_base(Duration::from_millis(10)),
        );
        let next = queue.enqueue(QueueTask::new("ok", "email", || async { Ok("done") }));

        assert!(matches!(
            failing.await,
            Err(CoworkError::TransientIntegration { .. })
        ));
        assert_eq!(next.await.unwrap(), "done");
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let queue = TaskQueue::new("messaging", 1, dispatcher());
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        drop(queue.enqueue(QueueTask::new("fire-and-forget", "messaging", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })));
        queue.wait_idle().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registry_applies_overrides() {
        let mut config = QueueConfig::default();
        config.overrides.insert("notifications".into(), 4);
        let registry = TaskQueueRegistry::new(dispatcher(), &config);

        assert_eq!(registry.queue("notifications").stats().concurrency, 4);
        assert_eq!(registry.queue("reports").stats().concurrency, 2);
        let names: Vec<_> = registry.stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["notifications", "reports"]);
    }
}
