//! Task queues: the execution contexts that slots and method calls bind to.
//!
//! A [`TaskQueue`] is a logical single-consumer execution context: posted
//! closures run in FIFO order on one dedicated thread, with no preemption
//! within the queue. The dispatch layers in this crate ([`Signal`],
//! [`Observable`], [`MethodCall`]) only ever talk to the narrow trait;
//! [`TaskRunner`] is the concrete implementation shipped with the crate.
//!
//! # Example
//!
//! ```
//! use crossqueue::queue::{TaskQueue, TaskRunner};
//!
//! let runner = TaskRunner::spawn("io");
//! assert!(!runner.is_current());
//!
//! runner.blocking_call(Box::new(|| {
//!     // runs on the "io" thread
//! }));
//!
//! runner.stop_and_join();
//! ```
//!
//! [`Signal`]: crate::signal::Signal
//! [`Observable`]: crate::observable::Observable
//! [`MethodCall`]: crate::method_call::MethodCall

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;

use crate::completion::completion_pair;
use crate::error::QueueError;

/// A unit of work posted to a queue.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A shared handle to any task queue.
pub type QueueHandle = Arc<dyn TaskQueue>;

/// The execution-context interface consumed by the dispatch layers.
///
/// Implementations must drain posted tasks in FIFO order on a single
/// consumer thread. `is_current()` is the thread-affinity probe that the
/// `Auto` dispatch mode and the marshaler use to decide between inline and
/// queued execution.
pub trait TaskQueue: Send + Sync {
    /// Schedule a task for asynchronous execution on this queue.
    ///
    /// Tasks posted from one thread run in posting order. A task posted to
    /// a stopped queue is dropped; implementations log the drop rather than
    /// panic.
    fn post(&self, task: Task);

    /// Schedule a task to run no earlier than `delay` from now.
    fn post_delayed(&self, task: Task, delay: Duration);

    /// True iff the calling thread is the one draining this queue.
    fn is_current(&self) -> bool;

    /// The queue's name, for logging.
    fn name(&self) -> &str {
        "unnamed"
    }

    /// Post `task` and block the caller until it has run.
    ///
    /// Runs inline when called from the queue's own thread. The wait has no
    /// timeout: calling this on a queue that can never drain (stopped, or
    /// itself blocked on the caller) deadlocks, and avoiding that is the
    /// caller's responsibility.
    fn blocking_call(&self, task: Task) {
        if self.is_current() {
            task();
            return;
        }
        let (handle, waiter) = completion_pair();
        self.post(Box::new(move || {
            task();
            handle.signal();
        }));
        waiter.wait();
    }
}

/// Default capacity for a runner's task channel.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Poll interval used to notice a stop request while the channel is idle.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Configuration for creating a [`TaskRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Name for the runner thread.
    pub name: String,
    /// Stack size for the runner thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
    /// Capacity of the task channel.
    pub queue_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: "crossqueue-runner".to_string(),
            stack_size: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl RunnerConfig {
    /// Create a configuration with the given thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

enum RunnerMessage {
    Run(Task),
    RunAt(Instant, Task),
    Stop,
}

/// A delayed task ordered by due time (min-heap entry).
struct DelayedTask {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for DelayedTask {}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse order for min-heap; seq keeps equal deadlines FIFO.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Shared state between the runner handle and its thread.
#[derive(Debug)]
struct RunnerState {
    running: AtomicBool,
    pending: AtomicUsize,
}

/// A dedicated worker thread draining a FIFO task channel.
///
/// `TaskRunner` is the crate's reference [`TaskQueue`] implementation: one
/// named OS thread, a bounded channel for immediate tasks, and a binary
/// heap for delayed ones. Tasks run to completion in order; there is no
/// work stealing and no preemption.
///
/// # Shutdown
///
/// [`stop`](Self::stop) is non-blocking: it rejects new tasks and asks the
/// thread to exit after draining already-queued immediate tasks. Delayed
/// tasks that are not yet due when the runner stops are dropped.
/// [`join`](Self::join) waits for the thread to finish.
#[derive(Debug)]
pub struct TaskRunner {
    sender: Sender<RunnerMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    state: Arc<RunnerState>,
    name: String,
}

impl TaskRunner {
    /// Create a runner with default configuration.
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a runner with custom configuration.
    pub fn with_config(config: RunnerConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);
        let state = Arc::new(RunnerState {
            running: AtomicBool::new(true),
            pending: AtomicUsize::new(0),
        });

        let thread_state = state.clone();
        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder
            .spawn(move || runner_loop(receiver, thread_state))
            .expect("failed to spawn task runner thread");

        Self {
            sender,
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
            state,
            name: config.name,
        }
    }

    /// Spawn a named runner behind a shared handle.
    pub fn spawn(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::with_config(RunnerConfig::with_name(name)))
    }

    /// Whether the runner still accepts tasks.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Number of tasks posted but not yet executed.
    pub fn pending_tasks(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Post a task, reporting failure instead of dropping silently.
    pub fn try_post(&self, task: Task) -> Result<(), QueueError> {
        self.try_send(RunnerMessage::Run(task))
    }

    /// Post a delayed task, reporting failure instead of dropping silently.
    pub fn try_post_delayed(&self, task: Task, delay: Duration) -> Result<(), QueueError> {
        self.try_send(RunnerMessage::RunAt(Instant::now() + delay, task))
    }

    fn try_send(&self, message: RunnerMessage) -> Result<(), QueueError> {
        if !self.is_running() {
            return Err(QueueError::Stopped);
        }
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.state.pending.fetch_sub(1, Ordering::AcqRel);
                Err(QueueError::Full)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.state.pending.fetch_sub(1, Ordering::AcqRel);
                Err(QueueError::Stopped)
            }
        }
    }

    /// Request shutdown after draining queued immediate tasks.
    ///
    /// Non-blocking; new tasks are rejected immediately.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::Release);
        let _ = self.sender.try_send(RunnerMessage::Stop);
    }

    /// Wait for the runner thread to finish.
    ///
    /// Returns `true` if the thread was joined, `false` if it was already
    /// joined or panicked.
    pub fn join(&self) -> bool {
        let mut handle = self.handle.lock();
        if let Some(h) = handle.take() {
            h.join().is_ok()
        } else {
            false
        }
    }

    /// `stop()` followed by `join()`.
    pub fn stop_and_join(&self) -> bool {
        self.stop();
        self.join()
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        // Request shutdown only; never block in drop.
        self.stop();
    }
}

impl TaskQueue for TaskRunner {
    fn post(&self, task: Task) {
        if let Err(err) = self.try_post(task) {
            tracing::warn!(
                target: "crossqueue::queue",
                runner = %self.name,
                %err,
                "dropping posted task"
            );
        }
    }

    fn post_delayed(&self, task: Task, delay: Duration) {
        if let Err(err) = self.try_post_delayed(task, delay) {
            tracing::warn!(
                target: "crossqueue::queue",
                runner = %self.name,
                %err,
                "dropping delayed task"
            );
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn runner_loop(receiver: Receiver<RunnerMessage>, state: Arc<RunnerState>) {
    let mut delayed: BinaryHeap<DelayedTask> = BinaryHeap::new();
    let mut next_seq: u64 = 0;

    loop {
        // Run everything that has come due.
        let now = Instant::now();
        while delayed.peek().is_some_and(|d| d.due <= now) {
            let entry = delayed.pop().expect("peeked entry");
            (entry.task)();
            state.pending.fetch_sub(1, Ordering::AcqRel);
        }

        let timeout = delayed
            .peek()
            .map(|d| d.due.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL);

        match receiver.recv_timeout(timeout) {
            Ok(RunnerMessage::Run(task)) => {
                task();
                state.pending.fetch_sub(1, Ordering::AcqRel);
            }
            Ok(RunnerMessage::RunAt(due, task)) => {
                delayed.push(DelayedTask {
                    due,
                    seq: next_seq,
                    task,
                });
                next_seq += 1;
            }
            Ok(RunnerMessage::Stop) => {
                drain_remaining(&receiver, &state);
                drop_delayed(delayed, &state);
                return;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if !state.running.load(Ordering::Acquire) && receiver.is_empty() {
                    drop_delayed(delayed, &state);
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                drop_delayed(delayed, &state);
                return;
            }
        }
    }
}

/// Process already-queued immediate tasks after a stop request.
fn drain_remaining(receiver: &Receiver<RunnerMessage>, state: &RunnerState) {
    while let Ok(message) = receiver.try_recv() {
        match message {
            RunnerMessage::Run(task) => {
                task();
                state.pending.fetch_sub(1, Ordering::AcqRel);
            }
            RunnerMessage::RunAt(_, _) => {
                // Not-yet-due work does not survive shutdown.
                state.pending.fetch_sub(1, Ordering::AcqRel);
            }
            RunnerMessage::Stop => {}
        }
    }
}

fn drop_delayed(delayed: BinaryHeap<DelayedTask>, state: &RunnerState) {
    let dropped = delayed.len();
    if dropped > 0 {
        state.pending.fetch_sub(dropped, Ordering::AcqRel);
        tracing::warn!(
            target: "crossqueue::queue",
            dropped,
            "discarding delayed tasks at shutdown"
        );
    }
}
