//! Priority-ordered multi-subscriber notification.
//!
//! An [`Observable<T>`] maintains a list of observer objects and applies a
//! caller-supplied callback to each of them on
//! [`notify`](Observable::notify). Unlike [`Signal`](crate::signal::Signal),
//! where slots are closures, observers here are objects: the observable
//! holds them strongly or weakly, orders them by [`ObserverPriority`], and
//! optionally routes each one's callback to a bound queue.
//!
//! Expired weak observers are skipped during notification and physically
//! purged every Nth notify (the cleanup frequency, default every time).
//! A panicking observer never aborts the rest of the pass: panics are
//! caught and handed to an error handler, which by default logs them.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use crossqueue::observable::Observable;
//!
//! struct Listener { name: &'static str }
//!
//! let observers: Observable<Listener> = Observable::new();
//! observers.add_observer(Arc::new(Listener { name: "primary" }));
//!
//! observers.notify(|listener| {
//!     println!("notifying {}", listener.name);
//! });
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::queue::TaskQueue;

/// How strongly the observable holds an observer.
pub enum ObserverRef<T> {
    /// Keeps the observer alive for as long as it stays registered.
    Strong(Arc<T>),
    /// Observes without extending the observer's lifetime; expired entries
    /// are skipped and eventually purged.
    Weak(Weak<T>),
}

impl<T> ObserverRef<T> {
    fn upgrade(&self) -> Option<Arc<T>> {
        match self {
            ObserverRef::Strong(arc) => Some(arc.clone()),
            ObserverRef::Weak(weak) => weak.upgrade(),
        }
    }

    fn is_expired(&self) -> bool {
        match self {
            ObserverRef::Strong(_) => false,
            ObserverRef::Weak(weak) => weak.strong_count() == 0,
        }
    }

    fn points_to(&self, target: &Arc<T>) -> bool {
        match self {
            ObserverRef::Strong(arc) => Arc::ptr_eq(arc, target),
            ObserverRef::Weak(weak) => std::ptr::eq(weak.as_ptr(), Arc::as_ptr(target)),
        }
    }
}

impl<T> Clone for ObserverRef<T> {
    fn clone(&self) -> Self {
        match self {
            ObserverRef::Strong(arc) => ObserverRef::Strong(arc.clone()),
            ObserverRef::Weak(weak) => ObserverRef::Weak(weak.clone()),
        }
    }
}

/// Notification order tier. Higher tiers are notified first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObserverPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl ObserverPriority {
    fn rank(self) -> u8 {
        match self {
            ObserverPriority::High => 2,
            ObserverPriority::Normal => 1,
            ObserverPriority::Low => 0,
        }
    }
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for one registration.
///
/// Tokens never collide and are never reused; id 0 is reserved to mean
/// "no registration".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

impl ObserverToken {
    /// The reserved token that matches nothing.
    pub const NONE: ObserverToken = ObserverToken(0);

    fn next() -> Self {
        ObserverToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether this is the reserved no-registration token.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

struct Entry<T> {
    observer: ObserverRef<T>,
    queue: Option<Arc<dyn TaskQueue>>,
    priority: ObserverPriority,
    token: ObserverToken,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            observer: self.observer.clone(),
            queue: self.queue.clone(),
            priority: self.priority,
            token: self.token,
        }
    }
}

/// Handler invoked with `(context, message)` when an observer panics.
pub type ObserverErrorHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// One predicate/callback pair for [`Observable::notify_batch`].
pub struct NotifyPair<T> {
    predicate: Option<Predicate<T>>,
    callback: Callback<T>,
}

impl<T> NotifyPair<T> {
    /// A pair that applies to every observer.
    pub fn new(callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self {
            predicate: None,
            callback: Arc::new(callback),
        }
    }

    /// A pair that applies only where `predicate` holds.
    pub fn filtered(
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Some(Arc::new(predicate)),
            callback: Arc::new(callback),
        }
    }
}

/// Per-notification options.
#[derive(Clone, Default)]
pub struct NotifyOptions {
    /// Skip the periodic expired-entry purge for this call.
    pub skip_cleanup: bool,
    /// Deliver in stored registration order instead of re-sorting by
    /// priority.
    pub preserve_order: bool,
    /// Override for the panic handler; `None` uses the default, which logs
    /// the panic and continues.
    pub error_handler: Option<ObserverErrorHandler>,
}

fn default_error_handler() -> ObserverErrorHandler {
    Arc::new(|context, message| {
        tracing::error!(
            target: "crossqueue::observable",
            context,
            message,
            "observer panicked during notification"
        );
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn guarded(handler: &ObserverErrorHandler, context: &str, f: impl FnOnce()) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        handler(context, &panic_message(payload.as_ref()));
    }
}

/// A registry of observer objects notified through caller-supplied
/// callbacks.
pub struct Observable<T> {
    entries: RwLock<Vec<Entry<T>>>,
    /// Purge expired weak entries every Nth notify. Minimum 1.
    cleanup_frequency: AtomicUsize,
    notify_counter: AtomicUsize,
}

impl<T: Send + Sync + 'static> Observable<T> {
    /// Create an observable with no observers and cleanup on every notify.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            cleanup_frequency: AtomicUsize::new(1),
            notify_counter: AtomicUsize::new(0),
        }
    }

    /// Register a strongly-held observer at normal priority.
    pub fn add_observer(&self, observer: Arc<T>) -> ObserverToken {
        self.add_observer_with(observer, ObserverPriority::Normal, None)
    }

    /// Register a strongly-held observer with explicit priority and
    /// optional bound queue.
    pub fn add_observer_with(
        &self,
        observer: Arc<T>,
        priority: ObserverPriority,
        queue: Option<Arc<dyn TaskQueue>>,
    ) -> ObserverToken {
        self.insert(ObserverRef::Strong(observer), priority, queue)
    }

    /// Register a weakly-held observer at normal priority.
    pub fn add_observer_weak(&self, observer: &Arc<T>) -> ObserverToken {
        self.add_observer_weak_with(observer, ObserverPriority::Normal, None)
    }

    /// Register a weakly-held observer with explicit priority and optional
    /// bound queue.
    pub fn add_observer_weak_with(
        &self,
        observer: &Arc<T>,
        priority: ObserverPriority,
        queue: Option<Arc<dyn TaskQueue>>,
    ) -> ObserverToken {
        self.insert(ObserverRef::Weak(Arc::downgrade(observer)), priority, queue)
    }

    /// Register a batch of strongly-held observers at normal priority.
    pub fn add_observers(&self, observers: impl IntoIterator<Item = Arc<T>>) -> Vec<ObserverToken> {
        observers
            .into_iter()
            .map(|observer| self.add_observer(observer))
            .collect()
    }

    /// Register a batch of weakly-held observers at normal priority.
    pub fn add_observers_weak(&self, observers: &[Arc<T>]) -> Vec<ObserverToken> {
        observers
            .iter()
            .map(|observer| self.add_observer_weak(observer))
            .collect()
    }

    fn insert(
        &self,
        observer: ObserverRef<T>,
        priority: ObserverPriority,
        queue: Option<Arc<dyn TaskQueue>>,
    ) -> ObserverToken {
        let token = ObserverToken::next();
        let entry = Entry {
            observer,
            queue,
            priority,
            token,
        };

        let mut entries = self.entries.write();
        // Stable priority insertion: after all existing entries of equal or
        // higher priority.
        let pos = entries
            .iter()
            .position(|e| e.priority.rank() < priority.rank())
            .unwrap_or(entries.len());
        entries.insert(pos, entry);
        token
    }

    /// Remove every registration of `observer`. Returns `true` if any was
    /// removed.
    pub fn remove_observer(&self, observer: &Arc<T>) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !e.observer.points_to(observer));
        entries.len() != before
    }

    /// Remove the registration identified by `token`. No-op for unknown or
    /// already-removed tokens.
    pub fn remove_by_token(&self, token: ObserverToken) -> bool {
        if token.is_none() {
            return false;
        }
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.token != token);
        entries.len() != before
    }

    /// Change the priority of one registration and re-sort.
    pub fn set_priority(&self, token: ObserverToken, priority: ObserverPriority) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.iter_mut().find(|e| e.token == token) else {
            return false;
        };
        entry.priority = priority;
        entries.sort_by_key(|e| std::cmp::Reverse(e.priority.rank()));
        true
    }

    /// Rebind one registration to a different queue (or to none).
    pub fn set_observer_queue(
        &self,
        token: ObserverToken,
        queue: Option<Arc<dyn TaskQueue>>,
    ) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.iter_mut().find(|e| e.token == token) else {
            return false;
        };
        entry.queue = queue;
        true
    }

    /// Whether `observer` currently has a registration.
    pub fn has_observer(&self, observer: &Arc<T>) -> bool {
        self.entries
            .read()
            .iter()
            .any(|e| e.observer.points_to(observer))
    }

    /// Number of live registrations. Expired weak entries do not count even
    /// before they are purged.
    pub fn observer_count(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| !e.observer.is_expired())
            .count()
    }

    /// Whether there are no live registrations.
    pub fn is_empty(&self) -> bool {
        self.observer_count() == 0
    }

    /// Remove every registration.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Purge expired weak entries every `frequency` notifications. Values
    /// below 1 are clamped to 1.
    pub fn set_cleanup_frequency(&self, frequency: usize) {
        self.cleanup_frequency
            .store(frequency.max(1), Ordering::Release);
    }

    pub fn cleanup_frequency(&self) -> usize {
        self.cleanup_frequency.load(Ordering::Acquire)
    }

    /// Purge expired weak entries now. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !e.observer.is_expired());
        before - entries.len()
    }

    /// Whether any registered weak observer has expired.
    pub fn has_expired(&self) -> bool {
        self.entries.read().iter().any(|e| e.observer.is_expired())
    }

    /// Apply `callback` to every live observer, priority order.
    pub fn notify(&self, callback: impl Fn(&T) + Send + Sync + 'static) {
        self.notify_with(callback, NotifyOptions::default());
    }

    /// [`notify`](Self::notify) with explicit options.
    pub fn notify_with(
        &self,
        callback: impl Fn(&T) + Send + Sync + 'static,
        opts: NotifyOptions,
    ) {
        self.dispatch(None, Arc::new(callback), opts);
    }

    /// Apply `callback` only to observers for which `predicate` holds.
    ///
    /// For queue-bound observers the predicate runs on the bound queue,
    /// next to the callback.
    pub fn notify_filtered(
        &self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
        callback: impl Fn(&T) + Send + Sync + 'static,
        opts: NotifyOptions,
    ) {
        self.dispatch(Some(Arc::new(predicate)), Arc::new(callback), opts);
    }

    /// Apply several predicate/callback pairs against one shared snapshot.
    ///
    /// The entry list is snapshotted (and the cleanup cadence consumed)
    /// exactly once, so observers added or removed between pairs do not
    /// change which objects the batch sees.
    pub fn notify_batch(
        &self,
        pairs: impl IntoIterator<Item = NotifyPair<T>>,
        opts: NotifyOptions,
    ) {
        let snapshot = self.ordered_snapshot(&opts);
        let handler = opts.error_handler.unwrap_or_else(default_error_handler);
        for pair in pairs {
            Self::deliver(&snapshot, pair.predicate.as_ref(), &pair.callback, &handler);
        }
    }

    fn dispatch(
        &self,
        predicate: Option<Predicate<T>>,
        callback: Callback<T>,
        opts: NotifyOptions,
    ) {
        let snapshot = self.ordered_snapshot(&opts);
        let handler = opts.error_handler.unwrap_or_else(default_error_handler);
        Self::deliver(&snapshot, predicate.as_ref(), &callback, &handler);
    }

    fn deliver(
        snapshot: &[Entry<T>],
        predicate: Option<&Predicate<T>>,
        callback: &Callback<T>,
        handler: &ObserverErrorHandler,
    ) {
        for entry in snapshot {
            let Some(observer) = entry.observer.upgrade() else {
                continue;
            };

            match &entry.queue {
                Some(queue) if !queue.is_current() => {
                    let predicate = predicate.cloned();
                    let callback = callback.clone();
                    let handler = handler.clone();
                    queue.post(Box::new(move || {
                        guarded(&handler, "queued notify", || {
                            if predicate.as_ref().is_none_or(|p| p(&observer)) {
                                callback(&observer);
                            }
                        });
                    }));
                }
                _ => {
                    guarded(handler, "notify", || {
                        if predicate.is_none_or(|p| p(&observer)) {
                            callback(&observer);
                        }
                    });
                }
            }
        }
    }

    fn ordered_snapshot(&self, opts: &NotifyOptions) -> Vec<Entry<T>> {
        let mut snapshot = self.snapshot(opts.skip_cleanup);
        if !opts.preserve_order {
            snapshot.sort_by_key(|e| std::cmp::Reverse(e.priority.rank()));
        }
        snapshot
    }

    /// Take a snapshot of the entry list, purging expired weak entries
    /// first when the cleanup counter comes due. Skipped-cleanup calls do
    /// not consume the cadence.
    fn snapshot(&self, skip_cleanup: bool) -> Vec<Entry<T>> {
        if skip_cleanup {
            return self.entries.read().clone();
        }

        let count = self.notify_counter.fetch_add(1, Ordering::AcqRel) + 1;
        let frequency = self.cleanup_frequency.load(Ordering::Acquire);
        if count % frequency == 0 {
            let mut entries = self.entries.write();
            entries.retain(|e| !e.observer.is_expired());
            entries.clone()
        } else {
            self.entries.read().clone()
        }
    }
}

impl<T: Send + Sync + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(Observable<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskRunner;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicI32};
    use std::time::Duration;

    struct Listener {
        id: i32,
        hits: AtomicI32,
    }

    impl Listener {
        fn new(id: i32) -> Arc<Self> {
            Arc::new(Self {
                id,
                hits: AtomicI32::new(0),
            })
        }
    }

    #[test]
    fn notify_reaches_every_observer() {
        let observable = Observable::new();
        let a = Listener::new(1);
        let b = Listener::new(2);
        observable.add_observer(a.clone());
        observable.add_observer(b.clone());

        observable.notify(|listener| {
            listener.hits.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(a.hits.load(Ordering::SeqCst), 1);
        assert_eq!(b.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn priority_order_high_first() {
        let observable = Observable::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        observable.add_observer_with(Listener::new(3), ObserverPriority::Low, None);
        observable.add_observer_with(Listener::new(1), ObserverPriority::High, None);
        observable.add_observer_with(Listener::new(2), ObserverPriority::Normal, None);

        let order_clone = order.clone();
        observable.notify(move |listener| {
            order_clone.lock().push(listener.id);
        });

        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let observable = Observable::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 1..=4 {
            observable.add_observer(Listener::new(id));
        }

        let order_clone = order.clone();
        observable.notify(move |listener| {
            order_clone.lock().push(listener.id);
        });

        assert_eq!(*order.lock(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn weak_observer_expires_and_is_purged() {
        let observable = Observable::new();
        let strong = Listener::new(1);
        let weak_target = Listener::new(2);

        observable.add_observer(strong.clone());
        observable.add_observer_weak(&weak_target);
        assert_eq!(observable.observer_count(), 2);

        drop(weak_target);
        assert_eq!(observable.observer_count(), 1);
        assert!(observable.has_expired());

        // Cleanup frequency 1: the next notify purges the expired entry.
        observable.notify(|_| {});
        assert!(!observable.has_expired());
        assert_eq!(observable.cleanup_expired(), 0);
    }

    #[test]
    fn cleanup_frequency_defers_purge() {
        let observable = Observable::new();
        observable.set_cleanup_frequency(3);

        let target = Listener::new(1);
        observable.add_observer_weak(&target);
        drop(target);

        observable.notify(|_| {});
        observable.notify(|_| {});
        assert!(observable.has_expired());

        observable.notify(|_| {});
        assert!(!observable.has_expired());
    }

    #[test]
    fn skipped_cleanup_does_not_consume_the_cadence() {
        let observable = Observable::new();
        observable.set_cleanup_frequency(2);

        let target = Listener::new(1);
        observable.add_observer_weak(&target);
        drop(target);

        let skip = NotifyOptions {
            skip_cleanup: true,
            ..NotifyOptions::default()
        };
        observable.notify_with(|_| {}, skip.clone());
        observable.notify_with(|_| {}, skip);
        assert!(observable.has_expired());

        // Only counted notifies advance the purge schedule.
        observable.notify(|_| {});
        assert!(observable.has_expired());
        observable.notify(|_| {});
        assert!(!observable.has_expired());
    }

    #[test]
    fn notify_batch_shares_one_snapshot() {
        let observable = Observable::new();
        observable.set_cleanup_frequency(2);
        let odd = Listener::new(1);
        let even = Listener::new(2);
        observable.add_observer(odd.clone());
        observable.add_observer(even.clone());

        let expired = Listener::new(3);
        observable.add_observer_weak(&expired);
        drop(expired);

        observable.notify_batch(
            [
                NotifyPair::new(|listener: &Listener| {
                    listener.hits.fetch_add(1, Ordering::SeqCst);
                }),
                NotifyPair::filtered(
                    |listener: &Listener| listener.id % 2 == 0,
                    |listener: &Listener| {
                        listener.hits.fetch_add(10, Ordering::SeqCst);
                    },
                ),
            ],
            NotifyOptions::default(),
        );

        assert_eq!(odd.hits.load(Ordering::SeqCst), 1);
        assert_eq!(even.hits.load(Ordering::SeqCst), 11);

        // Two pairs, one snapshot: the cleanup counter advanced once, so
        // the frequency-2 purge has not come due yet.
        assert!(observable.has_expired());
        observable.notify(|_| {});
        assert!(!observable.has_expired());
    }

    #[test]
    fn add_observers_weak_registers_each() {
        let observable = Observable::new();
        let listeners: Vec<_> = (1..=3).map(Listener::new).collect();

        let tokens = observable.add_observers_weak(&listeners);
        assert_eq!(tokens.len(), 3);
        assert_eq!(observable.observer_count(), 3);

        drop(listeners);
        assert_eq!(observable.observer_count(), 0);
    }

    #[test]
    fn cleanup_expired_reports_count() {
        let observable = Observable::new();
        let a = Listener::new(1);
        let b = Listener::new(2);
        observable.add_observer_weak(&a);
        observable.add_observer_weak(&b);

        drop(a);
        drop(b);
        assert_eq!(observable.cleanup_expired(), 2);
        assert!(observable.is_empty());
    }

    #[test]
    fn remove_by_token_and_by_identity() {
        let observable = Observable::new();
        let a = Listener::new(1);
        let b = Listener::new(2);

        let token = observable.add_observer(a.clone());
        observable.add_observer(b.clone());

        assert!(observable.remove_by_token(token));
        assert!(!observable.remove_by_token(token));
        assert!(!observable.remove_by_token(ObserverToken::NONE));
        assert!(!observable.has_observer(&a));

        assert!(observable.remove_observer(&b));
        assert!(observable.is_empty());
    }

    #[test]
    fn set_priority_reorders() {
        let observable = Observable::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        observable.add_observer(Listener::new(1));
        let token = observable.add_observer(Listener::new(2));

        assert!(observable.set_priority(token, ObserverPriority::High));

        let order_clone = order.clone();
        observable.notify(move |listener| {
            order_clone.lock().push(listener.id);
        });

        assert_eq!(*order.lock(), vec![2, 1]);
    }

    #[test]
    fn panicking_observer_does_not_stop_the_pass() {
        let observable = Observable::new();
        observable.add_observer_with(Listener::new(13), ObserverPriority::High, None);
        let survivor = Listener::new(1);
        observable.add_observer(survivor.clone());

        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = captured.clone();
        let opts = NotifyOptions {
            error_handler: Some(Arc::new(move |_context, message| {
                captured_clone.lock().push(message.to_string());
            })),
            ..NotifyOptions::default()
        };

        observable.notify_with(
            |listener| {
                if listener.id == 13 {
                    panic!("unlucky observer");
                }
                listener.hits.fetch_add(1, Ordering::SeqCst);
            },
            opts,
        );

        assert_eq!(survivor.hits.load(Ordering::SeqCst), 1);
        assert_eq!(*captured.lock(), vec!["unlucky observer".to_string()]);
    }

    #[test]
    fn notify_filtered_applies_predicate() {
        let observable = Observable::new();
        let odd = Listener::new(1);
        let even = Listener::new(2);
        observable.add_observer(odd.clone());
        observable.add_observer(even.clone());

        observable.notify_filtered(
            |listener| listener.id % 2 == 0,
            |listener| {
                listener.hits.fetch_add(1, Ordering::SeqCst);
            },
            NotifyOptions::default(),
        );

        assert_eq!(odd.hits.load(Ordering::SeqCst), 0);
        assert_eq!(even.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queued_observer_runs_on_bound_queue() {
        let runner = TaskRunner::spawn("observable-queued");
        let observable = Observable::new();
        let listener = Listener::new(1);
        let on_queue = Arc::new(AtomicBool::new(false));

        observable.add_observer_with(
            listener.clone(),
            ObserverPriority::Normal,
            Some(runner.clone()),
        );

        let on_queue_clone = on_queue.clone();
        let runner_probe = runner.clone();
        observable.notify(move |listener| {
            listener.hits.fetch_add(1, Ordering::SeqCst);
            on_queue_clone.store(runner_probe.is_current(), Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
        assert!(on_queue.load(Ordering::SeqCst));

        runner.stop_and_join();
    }

    #[test]
    fn set_observer_queue_rebinds() {
        let runner = TaskRunner::spawn("observable-rebind");
        let observable = Observable::new();
        let listener = Listener::new(1);
        let token = observable.add_observer(listener.clone());

        assert!(observable.set_observer_queue(token, Some(runner.clone())));

        observable.notify(|listener| {
            listener.hits.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);

        assert!(observable.set_observer_queue(token, None));
        runner.stop_and_join();
    }
}
