//! Named task-runner registry.
//!
//! A [`RunnerRegistry`] owns a set of [`TaskRunner`]s addressed by name, so
//! subsystems can share execution contexts ("io", "render", "audio")
//! without passing handles around. It is an ordinary value: applications
//! create one where they need it and decide its lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{QueueError, Result};
use crate::queue::{RunnerConfig, Task, TaskQueue, TaskRunner};

/// A collection of named task runners.
pub struct RunnerRegistry {
    runners: Mutex<HashMap<String, Arc<TaskRunner>>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a runner under `name`. Fails without spawning anything when
    /// the name is taken.
    pub fn create(&self, name: &str) -> Result<Arc<TaskRunner>> {
        let mut runners = self.runners.lock();
        if runners.contains_key(name) {
            return Err(QueueError::AlreadyRegistered(name.to_string()));
        }
        let runner = TaskRunner::spawn(name);
        runners.insert(name.to_string(), runner.clone());
        tracing::debug!(target: "crossqueue::registry", name, "runner created");
        Ok(runner)
    }

    /// Spawn a runner with explicit configuration, registered under its
    /// configured name.
    pub fn create_with_config(&self, config: RunnerConfig) -> Result<Arc<TaskRunner>> {
        let mut runners = self.runners.lock();
        if runners.contains_key(&config.name) {
            return Err(QueueError::AlreadyRegistered(config.name));
        }
        let name = config.name.clone();
        let runner = Arc::new(TaskRunner::with_config(config));
        runners.insert(name, runner.clone());
        Ok(runner)
    }

    /// Look up a runner by name.
    pub fn get(&self, name: &str) -> Option<Arc<TaskRunner>> {
        self.runners.lock().get(name).cloned()
    }

    /// Unregister `name` and shut its runner down, waiting for queued tasks
    /// to drain. Returns `false` for unknown names.
    pub fn remove(&self, name: &str) -> bool {
        let Some(runner) = self.runners.lock().remove(name) else {
            return false;
        };
        runner.stop_and_join();
        tracing::debug!(target: "crossqueue::registry", name, "runner removed");
        true
    }

    /// Names of all registered runners, unordered.
    pub fn names(&self) -> Vec<String> {
        self.runners.lock().keys().cloned().collect()
    }

    /// Post `task` to the runner named `name`.
    pub fn dispatch(&self, name: &str, task: Task) -> Result<()> {
        self.with_runner(name, |runner| runner.try_post(task))
    }

    /// Post `task` to run on `name` after `delay`.
    pub fn dispatch_after(&self, name: &str, task: Task, delay: Duration) -> Result<()> {
        self.with_runner(name, |runner| runner.try_post_delayed(task, delay))
    }

    /// Run `task` on `name` and block until it finishes.
    pub fn blocking_call(&self, name: &str, task: Task) -> Result<()> {
        self.with_runner(name, |runner| {
            runner.blocking_call(task);
            Ok(())
        })
    }

    /// Whether the calling thread belongs to the runner named `name`.
    pub fn is_current(&self, name: &str) -> bool {
        self.get(name).is_some_and(|runner| runner.is_current())
    }

    /// Stop and join every registered runner, leaving the registry empty.
    pub fn shutdown(&self) {
        let runners: Vec<_> = self.runners.lock().drain().collect();
        for (_, runner) in &runners {
            runner.stop();
        }
        for (name, runner) in runners {
            runner.join();
            tracing::debug!(target: "crossqueue::registry", name, "runner stopped");
        }
    }

    fn with_runner<R>(&self, name: &str, f: impl FnOnce(&TaskRunner) -> Result<R>) -> Result<R> {
        let Some(runner) = self.get(name) else {
            return Err(QueueError::UnknownRunner(name.to_string()));
        };
        f(&runner)
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RunnerRegistry {
    fn drop(&mut self) {
        // Request shutdown without blocking; joining in drop could hang a
        // panicking thread's unwind.
        for runner in self.runners.lock().values() {
            runner.stop();
        }
    }
}

static_assertions::assert_impl_all!(RunnerRegistry: Send, Sync);
