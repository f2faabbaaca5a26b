//! Connection handles and per-slot state.
//!
//! A [`Connection`] is a cheap, cloneable handle to one slot inside a
//! [`Signal`](crate::signal::Signal). It observes and controls the slot's
//! lifecycle (connected, blocked) without owning it: dropping every
//! `Connection` copy leaves the slot installed. [`ScopedConnection`] adds
//! RAII disconnection, [`ConnectionBlocker`] adds RAII blocking.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crate::queue::TaskQueue;

/// Group identifier for ordered slot execution. Lower groups run first.
pub type GroupId = i32;

/// How a slot's callable runs relative to the emitting thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Run inline on the emitting thread.
    #[default]
    Direct,
    /// Post to the slot's bound queue; emitter does not wait.
    Queued,
    /// Post to the slot's bound queue and block the emitter until done.
    BlockingQueued,
    /// Resolved per emission: `Direct` when the emitter is already on the
    /// bound queue's thread, `Queued` otherwise.
    Auto,
}

/// Options controlling how a slot is installed.
///
/// ```
/// use crossqueue::connection::ConnectOptions;
///
/// let opts = ConnectOptions::default().group(-10).single_shot();
/// ```
#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub(crate) mode: DispatchMode,
    pub(crate) queue: Option<Arc<dyn TaskQueue>>,
    pub(crate) group: GroupId,
    pub(crate) unique: bool,
    pub(crate) single_shot: bool,
}

impl ConnectOptions {
    /// Direct-mode options in group 0. Same as `default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queued dispatch on `queue`.
    pub fn queued(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.mode = DispatchMode::Queued;
        self.queue = Some(queue);
        self
    }

    /// Blocking-queued dispatch on `queue`.
    pub fn blocking(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.mode = DispatchMode::BlockingQueued;
        self.queue = Some(queue);
        self
    }

    /// Auto dispatch on `queue`: inline when emitted from the queue's own
    /// thread, posted otherwise.
    pub fn auto(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.mode = DispatchMode::Auto;
        self.queue = Some(queue);
        self
    }

    /// Place the slot in `group`. Lower groups run first; default is 0.
    pub fn group(mut self, group: GroupId) -> Self {
        self.group = group;
        self
    }

    /// Refuse the connection if an equal-identity unique slot exists.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Disconnect the slot after its first delivery.
    pub fn single_shot(mut self) -> Self {
        self.single_shot = true;
        self
    }
}

/// Removes a disconnected slot from its owner's storage.
pub(crate) trait Cleanable: Send + Sync {
    fn clean(&self, state: &SlotState);
}

/// Shared lifecycle state of one installed slot.
///
/// Owned by the slot (strongly) and by every `Connection` copy (weakly).
/// `connected` is monotonic: once false it never becomes true again.
pub(crate) struct SlotState {
    /// Position inside the group's slot vector, kept accurate by
    /// swap-remove fixups so disconnection stays O(1).
    pub(crate) index: AtomicUsize,
    pub(crate) group: GroupId,
    connected: AtomicBool,
    blocked: AtomicBool,
    /// Back-reference to the owning signal core for storage removal.
    cleaner: Weak<dyn Cleanable>,
    /// Optional owner-liveness probe for tracked slots. When it reports
    /// false the slot counts as disconnected even before the flag flips.
    liveness: OnceLock<Box<dyn Fn() -> bool + Send + Sync>>,
}

impl SlotState {
    pub(crate) fn new(index: usize, group: GroupId, cleaner: Weak<dyn Cleanable>) -> Self {
        Self {
            index: AtomicUsize::new(index),
            group,
            connected: AtomicBool::new(true),
            blocked: AtomicBool::new(false),
            cleaner,
            liveness: OnceLock::new(),
        }
    }

    /// Install the owner-liveness probe. At most once, before the slot is
    /// published.
    pub(crate) fn set_liveness(&self, probe: Box<dyn Fn() -> bool + Send + Sync>) {
        let _ = self.liveness.set(probe);
    }

    pub(crate) fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && self.owner_alive()
    }

    pub(crate) fn owner_alive(&self) -> bool {
        self.liveness.get().is_none_or(|probe| probe())
    }

    /// Disconnect and remove the slot from its signal's storage.
    ///
    /// Returns `true` only for the copy that actually performed the
    /// transition. Must not be called while the signal's structural lock is
    /// held; use [`mark_disconnected`](Self::mark_disconnected) there.
    pub(crate) fn disconnect(&self) -> bool {
        if !self.mark_disconnected() {
            return false;
        }
        if let Some(cleaner) = self.cleaner.upgrade() {
            cleaner.clean(self);
        }
        true
    }

    /// Flip the connected flag without touching storage.
    pub(crate) fn mark_disconnected(&self) -> bool {
        self.connected.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    pub(crate) fn set_blocked(&self, blocked: bool) -> bool {
        self.blocked.swap(blocked, Ordering::AcqRel)
    }
}

/// Handle to one slot of a signal.
///
/// Cloning shares the same slot; dropping has no effect on it. All methods
/// degrade to `false`/no-op once the slot is gone, none panic.
#[derive(Clone, Default)]
pub struct Connection {
    state: Weak<SlotState>,
}

impl Connection {
    pub(crate) fn new(state: &Arc<SlotState>) -> Self {
        Self {
            state: Arc::downgrade(state),
        }
    }

    /// A handle that was never attached to a slot, or whose slot is gone.
    ///
    /// Returned by unique-refused connects. `valid()` and `connected()`
    /// report `false`.
    pub fn dropped() -> Self {
        Self { state: Weak::new() }
    }

    /// Whether the underlying slot still exists at all, connected or not.
    pub fn valid(&self) -> bool {
        self.state.strong_count() > 0
    }

    /// Whether the slot is still installed and its tracked owner (if any)
    /// is still alive.
    pub fn connected(&self) -> bool {
        self.state.upgrade().is_some_and(|s| s.connected())
    }

    /// Permanently disconnect the slot.
    ///
    /// Idempotent: returns `true` only for the call that performed the
    /// disconnection.
    pub fn disconnect(&self) -> bool {
        self.state.upgrade().is_some_and(|s| s.disconnect())
    }

    /// Whether deliveries to this slot are currently suppressed.
    pub fn blocked(&self) -> bool {
        self.state.upgrade().is_some_and(|s| s.blocked())
    }

    /// Suppress deliveries. Returns the previous blocked state.
    pub fn block(&self) -> bool {
        self.state.upgrade().is_some_and(|s| s.set_blocked(true))
    }

    /// Resume deliveries. Returns the previous blocked state.
    pub fn unblock(&self) -> bool {
        self.state.upgrade().is_some_and(|s| s.set_blocked(false))
    }

    /// Block the slot for the lifetime of the returned guard.
    pub fn blocker(&self) -> ConnectionBlocker {
        ConnectionBlocker::new(self.clone())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("valid", &self.valid())
            .field("connected", &self.connected())
            .finish()
    }
}

/// A connection that disconnects its slot when dropped.
///
/// ```
/// use crossqueue::signal::Signal;
///
/// let signal: Signal<i32> = Signal::new();
/// {
///     let _scoped = signal.connect_scoped(|_| {});
///     assert_eq!(signal.slot_count(), 1);
/// }
/// assert_eq!(signal.slot_count(), 0);
/// ```
pub struct ScopedConnection {
    connection: Connection,
}

impl ScopedConnection {
    /// Detach without disconnecting, returning the plain handle.
    pub fn release(mut self) -> Connection {
        std::mem::replace(&mut self.connection, Connection::dropped())
    }
}

impl From<Connection> for ScopedConnection {
    fn from(connection: Connection) -> Self {
        Self { connection }
    }
}

impl std::ops::Deref for ScopedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

/// RAII guard suppressing deliveries to one slot.
///
/// Restores the slot's previous blocked state on drop, so nested blockers
/// compose.
pub struct ConnectionBlocker {
    connection: Connection,
    was_blocked: bool,
}

impl ConnectionBlocker {
    /// Block `connection`'s slot until the guard is dropped.
    pub fn new(connection: Connection) -> Self {
        let was_blocked = connection.block();
        Self {
            connection,
            was_blocked,
        }
    }
}

impl Drop for ConnectionBlocker {
    fn drop(&mut self) {
        if !self.was_blocked {
            self.connection.unblock();
        }
    }
}

/// Identity key for unique-connection and disconnect-by-callable matching.
///
/// Capture-stateful closures are `Anonymous` and cannot be matched; only
/// plain function pointers and tracked owners carry identity.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotIdent {
    Anonymous,
    /// Function pointer address.
    Func(usize),
    /// Tracked owner `Arc` data address.
    Owner(usize),
    /// Tracked owner plus method function pointer.
    Method { owner: usize, func: usize },
}

impl SlotIdent {
    pub(crate) fn func_addr(&self) -> Option<usize> {
        match self {
            SlotIdent::Func(addr) => Some(*addr),
            SlotIdent::Method { func, .. } => Some(*func),
            _ => None,
        }
    }

    pub(crate) fn owner_addr(&self) -> Option<usize> {
        match self {
            SlotIdent::Owner(addr) => Some(*addr),
            SlotIdent::Method { owner, .. } => Some(*owner),
            _ => None,
        }
    }

    /// Whether two identities collide for unique-connection purposes.
    pub(crate) fn matches(&self, other: &SlotIdent) -> bool {
        !matches!(self, SlotIdent::Anonymous) && self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopCleaner;

    impl Cleanable for NoopCleaner {
        fn clean(&self, _state: &SlotState) {}
    }

    fn detached_state() -> Arc<SlotState> {
        let cleaner: Weak<dyn Cleanable> = Weak::<NoopCleaner>::new();
        Arc::new(SlotState::new(0, 0, cleaner))
    }

    #[test]
    fn dropped_connection_reports_invalid() {
        let conn = Connection::dropped();
        assert!(!conn.valid());
        assert!(!conn.connected());
        assert!(!conn.disconnect());
        assert!(!conn.block());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let state = detached_state();
        let conn = Connection::new(&state);

        assert!(conn.connected());
        assert!(conn.disconnect());
        assert!(!conn.disconnect());
        assert!(!conn.connected());
        assert!(conn.valid());
    }

    #[test]
    fn clones_share_the_slot() {
        let state = detached_state();
        let a = Connection::new(&state);
        let b = a.clone();

        assert!(b.connected());
        a.disconnect();
        assert!(!b.connected());
    }

    #[test]
    fn block_toggles_without_disconnecting() {
        let state = detached_state();
        let conn = Connection::new(&state);

        assert!(!conn.blocked());
        assert!(!conn.block());
        assert!(conn.blocked());
        assert!(conn.connected());
        assert!(conn.unblock());
        assert!(!conn.blocked());
    }

    #[test]
    fn blocker_restores_previous_state() {
        let state = detached_state();
        let conn = Connection::new(&state);

        {
            let _outer = conn.blocker();
            assert!(conn.blocked());
            {
                let _inner = conn.blocker();
                assert!(conn.blocked());
            }
            // Inner guard must not unblock while the outer one lives.
            assert!(conn.blocked());
        }
        assert!(!conn.blocked());
    }

    #[test]
    fn scoped_release_keeps_slot_connected() {
        let state = detached_state();
        let conn = Connection::new(&state);

        let scoped = ScopedConnection::from(conn.clone());
        let released = scoped.release();
        assert!(released.connected());
        assert!(conn.connected());
    }

    #[test]
    fn ident_matching() {
        let a = SlotIdent::Func(0x1000);
        let b = SlotIdent::Func(0x1000);
        let c = SlotIdent::Func(0x2000);

        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!(!SlotIdent::Anonymous.matches(&SlotIdent::Anonymous));

        let m = SlotIdent::Method {
            owner: 0xA0,
            func: 0xB0,
        };
        assert_eq!(m.owner_addr(), Some(0xA0));
        assert_eq!(m.func_addr(), Some(0xB0));
    }
}
