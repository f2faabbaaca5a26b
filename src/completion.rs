//! One-shot completion signaling for blocking cross-queue calls.
//!
//! Every blocking path in this crate (blocking-queued slot delivery,
//! [`MethodCall::marshal`](crate::method_call::MethodCall::marshal), the
//! default [`TaskQueue::blocking_call`](crate::queue::TaskQueue::blocking_call))
//! synchronizes through the same primitive: a handle/waiter pair where the
//! target queue signals the handle once the posted closure has run and the
//! calling thread blocks on the waiter with no timeout.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct CompletionState {
    done: Mutex<bool>,
    condvar: Condvar,
}

/// The signaling side of a completion pair.
///
/// Consumed by `signal()`; dropping the handle without signaling leaves the
/// waiter blocked forever, which is why every posted closure must signal on
/// all paths, including the disconnected-slot no-op path.
pub struct CompletionHandle {
    inner: Arc<CompletionState>,
}

impl CompletionHandle {
    /// Mark the operation complete and wake the waiter.
    pub fn signal(self) {
        let mut done = self.inner.done.lock();
        *done = true;
        self.inner.condvar.notify_all();
    }
}

/// The blocking side of a completion pair.
pub struct CompletionWaiter {
    inner: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Block the current thread until the handle is signaled.
    ///
    /// There is no timeout. If the target queue never runs the posted
    /// closure (destroyed queue, reciprocal blocking) this call hangs; that
    /// is a caller precondition, not a recoverable state.
    pub fn wait(self) {
        let mut done = self.inner.done.lock();
        while !*done {
            self.inner.condvar.wait(&mut done);
        }
    }

    /// Block until signaled or until `timeout` elapses.
    ///
    /// Returns `true` if the operation completed, `false` on timeout.
    pub fn wait_timeout(self, timeout: Duration) -> bool {
        let mut done = self.inner.done.lock();
        if *done {
            return true;
        }
        let result = self.inner.condvar.wait_for(&mut done, timeout);
        *done || !result.timed_out()
    }
}

/// Create a connected handle/waiter pair.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState {
        done: Mutex::new(false),
        condvar: Condvar::new(),
    });

    (
        CompletionHandle {
            inner: state.clone(),
        },
        CompletionWaiter { inner: state },
    )
}
