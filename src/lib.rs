//! Thread-affine event dispatch and cross-queue method invocation.
//!
//! crossqueue is the communication layer for applications built out of
//! single-threaded execution contexts: each subsystem owns a task queue,
//! and everything that crosses a queue boundary goes through one of the
//! primitives here.
//!
//! # Components
//!
//! - [`Signal<Args>`](signal::Signal): grouped signal/slot dispatch with
//!   per-slot direct, queued, blocking-queued, or auto delivery.
//! - [`Connection`](connection::Connection) /
//!   [`ScopedConnection`](connection::ScopedConnection) /
//!   [`ConnectionBlocker`](connection::ConnectionBlocker): slot lifecycle
//!   handles.
//! - [`Observable<T>`](observable::Observable): priority-ordered observer
//!   registry with weak or strong retention and panic isolation.
//! - [`MethodCall<T, R>`](method_call::MethodCall) /
//!   [`QueueBound<T>`](method_call::QueueBound): blocking invocation of a
//!   method body on another queue's thread.
//! - [`TaskQueue`](queue::TaskQueue) / [`TaskRunner`](queue::TaskRunner):
//!   the execution-context abstraction and its dedicated-thread
//!   implementation.
//! - [`RunnerRegistry`](registry::RunnerRegistry): named runners shared by
//!   name across subsystems.
//!
//! # Example
//!
//! ```
//! use crossqueue::{ConnectOptions, Signal, TaskRunner};
//!
//! let audio = TaskRunner::spawn("audio");
//! let volume_changed = Signal::<f32>::new();
//!
//! // Deliveries run on the audio thread, emitters do not wait.
//! volume_changed.connect_with(
//!     |volume| println!("volume set to {volume}"),
//!     ConnectOptions::default().queued(audio.clone()),
//! );
//!
//! volume_changed.emit(0.8);
//! audio.stop_and_join();
//! ```

pub mod completion;
pub mod connection;
pub mod error;
pub mod method_call;
pub mod observable;
pub mod queue;
pub mod registry;
pub mod signal;

pub use completion::{CompletionHandle, CompletionWaiter, completion_pair};
pub use connection::{
    ConnectOptions, Connection, ConnectionBlocker, DispatchMode, GroupId, ScopedConnection,
};
pub use error::{QueueError, Result};
pub use method_call::{MethodCall, QueueBound};
pub use observable::{
    NotifyOptions, NotifyPair, Observable, ObserverErrorHandler, ObserverPriority, ObserverRef,
    ObserverToken,
};
pub use queue::{QueueHandle, RunnerConfig, Task, TaskQueue, TaskRunner};
pub use registry::RunnerRegistry;
pub use signal::Signal;
