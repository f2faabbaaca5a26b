//! Blocking cross-queue method invocation.
//!
//! A [`MethodCall`] carries one method body to a target object's home
//! queue, runs it there, and hands the return value back to the calling
//! thread. The caller blocks until the body has run, so from its point of
//! view the call behaves like a plain synchronous method, just on another
//! thread.
//!
//! [`QueueBound`] packages the common case: an object permanently paired
//! with its home queue, invoked through [`call`](QueueBound::call)
//! (blocking, with a result) or [`post`](QueueBound::post)
//! (fire-and-forget).
//!
//! # Deadlock
//!
//! The wait has no timeout. Two queues blocking on each other, or a call
//! into a stopped queue, will hang forever; keeping call graphs acyclic is
//! the caller's responsibility.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::completion::completion_pair;
use crate::queue::TaskQueue;

/// A one-shot invocation of a method body against a target object.
///
/// Arguments are captured by value inside the body closure; the body
/// borrows only the target. Consumed by [`marshal`](Self::marshal).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crossqueue::method_call::MethodCall;
/// use crossqueue::queue::TaskRunner;
///
/// struct Doubler;
/// impl Doubler {
///     fn double(&self, value: i32) -> i32 {
///         value * 2
///     }
/// }
///
/// let runner = TaskRunner::spawn("doubler");
/// let target = Arc::new(Doubler);
///
/// let result = MethodCall::new(target, |d| d.double(21)).marshal(runner.as_ref());
/// assert_eq!(result, 42);
///
/// runner.stop_and_join();
/// ```
pub struct MethodCall<T, R> {
    target: Arc<T>,
    body: Box<dyn FnOnce(&T) -> R + Send>,
}

impl<T, R> MethodCall<T, R>
where
    T: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Package `body` for invocation against `target`.
    pub fn new(target: Arc<T>, body: impl FnOnce(&T) -> R + Send + 'static) -> Self {
        Self {
            target,
            body: Box::new(body),
        }
    }

    /// Run the body on `queue` and return its result.
    ///
    /// Invokes inline when called from the queue's own thread; otherwise
    /// posts the body and blocks until the queue has run it.
    pub fn marshal(self, queue: &dyn TaskQueue) -> R {
        if queue.is_current() {
            return (self.body)(&self.target);
        }

        tracing::trace!(
            target: "crossqueue::method_call",
            queue = queue.name(),
            "marshaling blocking call"
        );

        let result: Arc<Mutex<Option<R>>> = Arc::new(Mutex::new(None));
        let (handle, waiter) = completion_pair();

        let target = self.target;
        let body = self.body;
        let result_slot = result.clone();
        queue.post(Box::new(move || {
            *result_slot.lock() = Some(body(&target));
            handle.signal();
        }));

        waiter.wait();
        result
            .lock()
            .take()
            .expect("completion signaled without a result")
    }
}

/// An object paired with the queue all its method calls must run on.
///
/// The Rust rendition of a thread-affine proxy: consumers hold a
/// `QueueBound<T>` instead of the raw `Arc<T>` and go through
/// [`call`](Self::call) or [`post`](Self::post), so every touch of the
/// target happens on its home queue.
pub struct QueueBound<T> {
    target: Arc<T>,
    queue: Arc<dyn TaskQueue>,
}

impl<T: Send + Sync + 'static> QueueBound<T> {
    pub fn new(target: Arc<T>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { target, queue }
    }

    /// Run `body` on the home queue, blocking for its result.
    pub fn call<R: Send + 'static>(&self, body: impl FnOnce(&T) -> R + Send + 'static) -> R {
        MethodCall::new(self.target.clone(), body).marshal(self.queue.as_ref())
    }

    /// Run `body` on the home queue without waiting.
    pub fn post(&self, body: impl FnOnce(&T) + Send + 'static) {
        let target = self.target.clone();
        self.queue.post(Box::new(move || body(&target)));
    }

    /// The home queue of the target.
    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Whether the calling thread is the target's home queue thread.
    pub fn is_current(&self) -> bool {
        self.queue.is_current()
    }
}

impl<T> Clone for QueueBound<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            queue: self.queue.clone(),
        }
    }
}

static_assertions::assert_impl_all!(QueueBound<String>: Send, Sync);
