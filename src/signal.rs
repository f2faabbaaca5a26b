//! Grouped, thread-affine signal/slot dispatch.
//!
//! A [`Signal<Args>`] notifies an ordered set of slots whenever it is
//! emitted. Slots are organized into integer groups (lower groups run
//! first), carry their own [`DispatchMode`] and optional bound queue, and
//! are controlled through [`Connection`] handles.
//!
//! # Dispatch modes
//!
//! - **Direct**: the slot runs inline on the emitting thread.
//! - **Queued**: the slot is posted to its bound queue; the emitter moves on.
//! - **BlockingQueued**: posted, and the emitter blocks until the slot ran.
//! - **Auto**: Direct when emitting from the bound queue's thread, Queued
//!   otherwise.
//!
//! # Snapshot emission
//!
//! Emission walks a refcounted snapshot of the slot list taken at entry.
//! Connects and disconnects performed while an emission is in flight
//! (including from inside a slot) never alter that pass; they take effect
//! on the next one. A slot disconnected mid-pass is still skipped, because
//! every delivery re-checks the slot's connected flag first. The structural
//! lock is never held while user callbacks run.
//!
//! # Example
//!
//! ```
//! use crossqueue::signal::Signal;
//!
//! let value_changed = Signal::<i32>::new();
//!
//! let conn = value_changed.connect(|value| {
//!     println!("value is now {value}");
//! });
//!
//! value_changed.emit(42);
//! conn.disconnect();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::completion::completion_pair;
use crate::connection::{
    Cleanable, ConnectOptions, Connection, DispatchMode, GroupId, ScopedConnection, SlotIdent,
    SlotState,
};
use crate::queue::TaskQueue;

/// What a configured [`DispatchMode`] boils down to for one emission.
enum Delivery {
    Inline,
    Posted,
    PostedBlocking,
}

/// The call strategy installed for one slot.
enum SlotKind<Args> {
    /// Ordinary callable.
    Plain(Box<dyn Fn(&Args) + Send + Sync>),
    /// Callable that receives its own connection, so it can disconnect or
    /// block itself from inside the body.
    Extended {
        call: Box<dyn Fn(&Connection, &Args) + Send + Sync>,
        conn: Connection,
    },
}

/// One installed slot: strategy plus per-slot dispatch policy.
struct Slot<Args: 'static> {
    state: Arc<SlotState>,
    kind: SlotKind<Args>,
    mode: DispatchMode,
    queue: Option<Arc<dyn TaskQueue>>,
    single_shot: bool,
    emitted: AtomicBool,
    unique: bool,
    ident: SlotIdent,
}

impl<Args: Clone + Send + 'static> Slot<Args> {
    fn run(&self, args: &Args) {
        match &self.kind {
            SlotKind::Plain(f) => f(args),
            SlotKind::Extended { call, conn } => call(conn, args),
        }
    }

    /// Post-delivery bookkeeping. Single-shot slots disconnect after their
    /// first completed delivery.
    fn finish(&self) {
        if self.single_shot {
            self.state.disconnect();
        }
    }

    /// Collapse the configured mode into what actually happens for this
    /// emission. Auto resolves against the bound queue's thread here.
    fn delivery(&self) -> Delivery {
        match self.mode {
            DispatchMode::Direct => Delivery::Inline,
            DispatchMode::Queued => Delivery::Posted,
            DispatchMode::BlockingQueued => Delivery::PostedBlocking,
            DispatchMode::Auto => match &self.queue {
                Some(queue) if !queue.is_current() => Delivery::Posted,
                _ => Delivery::Inline,
            },
        }
    }

    fn invoke(self: &Arc<Self>, args: &Args) {
        if !self.state.owner_alive() {
            // Tracked owner is gone; retire the slot instead of delivering.
            self.state.disconnect();
            return;
        }
        if !self.state.connected() || self.state.blocked() {
            return;
        }
        // Single-shot wins the race at reservation time, not delivery time:
        // concurrent emitters agree on exactly one delivery.
        if self.single_shot && self.emitted.swap(true, Ordering::AcqRel) {
            return;
        }

        match self.delivery() {
            Delivery::Inline => {
                self.run(args);
                self.finish();
            }
            Delivery::Posted => match &self.queue {
                Some(queue) => {
                    let weak = Arc::downgrade(self);
                    let args = args.clone();
                    queue.post(Box::new(move || {
                        if let Some(slot) = weak.upgrade()
                            && slot.state.connected()
                            && !slot.state.blocked()
                        {
                            slot.run(&args);
                            slot.finish();
                        }
                    }));
                }
                None => self.degraded_inline(args),
            },
            Delivery::PostedBlocking => match &self.queue {
                Some(queue) => {
                    let weak = Arc::downgrade(self);
                    let args = args.clone();
                    let (handle, waiter) = completion_pair();
                    queue.post(Box::new(move || {
                        if let Some(slot) = weak.upgrade()
                            && slot.state.connected()
                            && !slot.state.blocked()
                        {
                            slot.run(&args);
                            slot.finish();
                        }
                        handle.signal();
                    }));
                    waiter.wait();
                }
                None => self.degraded_inline(args),
            },
        }
    }

    /// Fallback when a queued-mode slot has no live queue to run on.
    fn degraded_inline(&self, args: &Args) {
        tracing::warn!(
            target: "crossqueue::signal",
            "queued slot has no bound queue, invoking inline"
        );
        self.run(args);
        self.finish();
    }
}

/// Slots sharing one group id. The group list stays sorted ascending.
struct Group<Args: 'static> {
    gid: GroupId,
    slots: Vec<Arc<Slot<Args>>>,
}

impl<Args> Clone for Group<Args> {
    fn clone(&self) -> Self {
        Self {
            gid: self.gid,
            slots: self.slots.clone(),
        }
    }
}

/// Shared core behind a signal: the group list and the global block flag.
///
/// The group list sits behind a refcounted snapshot pointer. Mutation
/// clones the vector and swaps the `Arc`; emission clones only the `Arc`,
/// so in-flight emissions keep reading a consistent list.
pub(crate) struct SignalCore<Args: 'static> {
    groups: Mutex<Arc<Vec<Group<Args>>>>,
    blocked: AtomicBool,
}

impl<Args: 'static> SignalCore<Args> {
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Group<Args>>) -> R) -> R {
        let mut guard = self.groups.lock();
        let mut groups = guard.as_ref().clone();
        let result = f(&mut groups);
        *guard = Arc::new(groups);
        result
    }
}

impl<Args: 'static> Cleanable for SignalCore<Args> {
    fn clean(&self, state: &SlotState) {
        let mut guard = self.groups.lock();
        let mut groups = guard.as_ref().clone();

        let Ok(gpos) = groups.binary_search_by_key(&state.group, |g| g.gid) else {
            return;
        };
        let idx = state.index.load(Ordering::Acquire);
        let slots = &mut groups[gpos].slots;
        if idx >= slots.len() || !std::ptr::eq(Arc::as_ptr(&slots[idx].state), state) {
            // Stale index: the slot was already removed by a bulk disconnect.
            return;
        }
        slots.swap_remove(idx);
        if let Some(moved) = slots.get(idx) {
            moved.state.index.store(idx, Ordering::Release);
        }
        if slots.is_empty() {
            groups.remove(gpos);
        }
        *guard = Arc::new(groups);
    }
}

/// A multi-slot notification source.
///
/// `Args` is the payload type passed to every slot by reference. It must be
/// `Clone + Send` so queued deliveries can carry their own copy across
/// threads; use a tuple for multi-argument signals.
///
/// Dropping the signal disconnects every remaining slot, so outstanding
/// [`Connection`] handles and already-posted queued deliveries degrade to
/// no-ops.
pub struct Signal<Args: 'static> {
    core: Arc<SignalCore<Args>>,
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a signal with no slots.
    pub fn new() -> Self {
        Self {
            core: Arc::new(SignalCore {
                groups: Mutex::new(Arc::new(Vec::new())),
                blocked: AtomicBool::new(false),
            }),
        }
    }

    /// Connect a callable with default options: Direct mode, group 0.
    pub fn connect(&self, f: impl Fn(&Args) + Send + Sync + 'static) -> Connection {
        self.connect_with(f, ConnectOptions::default())
    }

    /// Connect a callable with explicit options.
    ///
    /// Capture-stateful closures carry no identity: they cannot be matched
    /// by the unique flag or the disconnect-by-callable forms. Use
    /// [`connect_fn`](Self::connect_fn), [`connect_tracked`](Self::connect_tracked)
    /// or [`connect_method`](Self::connect_method) when identity matters.
    pub fn connect_with(
        &self,
        f: impl Fn(&Args) + Send + Sync + 'static,
        opts: ConnectOptions,
    ) -> Connection {
        self.install(opts, SlotIdent::Anonymous, None, |_| {
            SlotKind::Plain(Box::new(f))
        })
    }

    /// Connect a plain function pointer, keyed by its address.
    ///
    /// Function-pointer slots participate in unique matching and can be
    /// removed with [`disconnect_fn`](Self::disconnect_fn).
    pub fn connect_fn(&self, f: fn(&Args), opts: ConnectOptions) -> Connection {
        self.install(opts, SlotIdent::Func(f as usize), None, |_| {
            SlotKind::Plain(Box::new(f))
        })
    }

    /// Connect a callable that receives its own [`Connection`] alongside
    /// the payload, so it can disconnect or block itself mid-delivery.
    pub fn connect_extended(
        &self,
        f: impl Fn(&Connection, &Args) + Send + Sync + 'static,
        opts: ConnectOptions,
    ) -> Connection {
        self.install(opts, SlotIdent::Anonymous, None, |conn| SlotKind::Extended {
            call: Box::new(f),
            conn,
        })
    }

    /// Connect a closure whose lifetime follows `owner`.
    ///
    /// The slot holds only a `Weak` reference. Once the last strong `Arc`
    /// to `owner` is dropped the slot is skipped and retires itself on the
    /// next emission, and its connections report `connected() == false`
    /// immediately.
    pub fn connect_tracked<T: Send + Sync + 'static>(
        &self,
        owner: &Arc<T>,
        f: impl Fn(&T, &Args) + Send + Sync + 'static,
        opts: ConnectOptions,
    ) -> Connection {
        let ident = SlotIdent::Owner(Arc::as_ptr(owner) as usize);
        let weak = Arc::downgrade(owner);
        let probe = weak.clone();
        self.install(
            opts,
            ident,
            Some(Box::new(move || probe.strong_count() > 0)),
            move |_| {
                SlotKind::Plain(Box::new(move |args| {
                    if let Some(owner) = weak.upgrade() {
                        f(&owner, args);
                    }
                }))
            },
        )
    }

    /// Connect an owner/method pair, keyed by both addresses.
    ///
    /// Like [`connect_tracked`](Self::connect_tracked), but the method
    /// pointer gives the slot a full identity: it matches the unique flag
    /// and every disconnect form, including
    /// [`disconnect_method`](Self::disconnect_method).
    pub fn connect_method<T: Send + Sync + 'static>(
        &self,
        owner: &Arc<T>,
        method: fn(&T, &Args),
        opts: ConnectOptions,
    ) -> Connection {
        let ident = SlotIdent::Method {
            owner: Arc::as_ptr(owner) as usize,
            func: method as usize,
        };
        let weak = Arc::downgrade(owner);
        let probe = weak.clone();
        self.install(
            opts,
            ident,
            Some(Box::new(move || probe.strong_count() > 0)),
            move |_| {
                SlotKind::Plain(Box::new(move |args| {
                    if let Some(owner) = weak.upgrade() {
                        method(&owner, args);
                    }
                }))
            },
        )
    }

    /// Connect with default options behind an RAII guard that disconnects
    /// on drop.
    pub fn connect_scoped(
        &self,
        f: impl Fn(&Args) + Send + Sync + 'static,
    ) -> ScopedConnection {
        ScopedConnection::from(self.connect(f))
    }

    fn install(
        &self,
        opts: ConnectOptions,
        ident: SlotIdent,
        liveness: Option<Box<dyn Fn() -> bool + Send + Sync>>,
        make_kind: impl FnOnce(Connection) -> SlotKind<Args>,
    ) -> Connection {
        let weak_core = Arc::downgrade(&self.core);
        let cleaner: Weak<dyn Cleanable> = weak_core;
        self.core.mutate(|groups| {
            // Unique refusal: an installed slot blocks equal-identity
            // connects only if it asked for uniqueness itself.
            for group in groups.iter() {
                for slot in &group.slots {
                    if slot.ident.matches(&ident) && slot.unique && slot.state.connected() {
                        return Connection::dropped();
                    }
                }
            }

            let gpos = match groups.binary_search_by_key(&opts.group, |g| g.gid) {
                Ok(pos) => pos,
                Err(pos) => {
                    groups.insert(
                        pos,
                        Group {
                            gid: opts.group,
                            slots: Vec::new(),
                        },
                    );
                    pos
                }
            };

            let index = groups[gpos].slots.len();
            let state = Arc::new(SlotState::new(index, opts.group, cleaner));
            if let Some(probe) = liveness {
                state.set_liveness(probe);
            }
            let connection = Connection::new(&state);
            let kind = make_kind(connection.clone());
            groups[gpos].slots.push(Arc::new(Slot {
                state,
                kind,
                mode: opts.mode,
                queue: opts.queue,
                single_shot: opts.single_shot,
                emitted: AtomicBool::new(false),
                unique: opts.unique,
                ident,
            }));
            connection
        })
    }

    /// Deliver `args` to every eligible slot, groups ascending.
    ///
    /// Runs against a snapshot of the slot list taken at entry; structural
    /// changes made during the pass affect only later emissions. Does
    /// nothing while the signal is [blocked](Self::block).
    #[tracing::instrument(skip_all, target = "crossqueue::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        if self.core.blocked.load(Ordering::Acquire) {
            return;
        }
        let snapshot = self.core.groups.lock().clone();
        for group in snapshot.iter() {
            for slot in &group.slots {
                slot.invoke(&args);
            }
        }
    }

    /// Disconnect every slot installed for the function pointer `f`.
    /// Returns the number of slots disconnected.
    pub fn disconnect_fn(&self, f: fn(&Args)) -> usize {
        let addr = f as usize;
        self.remove_matching(|slot| slot.ident == SlotIdent::Func(addr))
    }

    /// Disconnect every tracked or method slot bound to `owner`.
    pub fn disconnect_owner<T>(&self, owner: &Arc<T>) -> usize {
        let addr = Arc::as_ptr(owner) as usize;
        self.remove_matching(|slot| slot.ident.owner_addr() == Some(addr))
    }

    /// Disconnect the slots installed for exactly this owner/method pair.
    pub fn disconnect_method<T>(&self, owner: &Arc<T>, method: fn(&T, &Args)) -> usize {
        let ident = SlotIdent::Method {
            owner: Arc::as_ptr(owner) as usize,
            func: method as usize,
        };
        self.remove_matching(|slot| slot.ident == ident)
    }

    /// Disconnect every slot in `group`.
    pub fn disconnect_group(&self, group: GroupId) -> usize {
        self.core.mutate(|groups| {
            let Ok(gpos) = groups.binary_search_by_key(&group, |g| g.gid) else {
                return 0;
            };
            let removed = groups.remove(gpos);
            removed
                .slots
                .iter()
                .filter(|slot| slot.state.mark_disconnected())
                .count()
        })
    }

    /// Disconnect every slot.
    pub fn disconnect_all(&self) -> usize {
        self.core.mutate(|groups| {
            let mut disconnected = 0;
            for group in groups.iter() {
                for slot in &group.slots {
                    if slot.state.mark_disconnected() {
                        disconnected += 1;
                    }
                }
            }
            groups.clear();
            disconnected
        })
    }

    fn remove_matching(&self, pred: impl Fn(&Slot<Args>) -> bool) -> usize {
        self.core.mutate(|groups| {
            let mut disconnected = 0;
            groups.retain_mut(|group| {
                let mut i = 0;
                while i < group.slots.len() {
                    if pred(&group.slots[i]) {
                        let slot = group.slots.swap_remove(i);
                        if slot.state.mark_disconnected() {
                            disconnected += 1;
                        }
                    } else {
                        i += 1;
                    }
                }
                for (idx, slot) in group.slots.iter().enumerate() {
                    slot.state.index.store(idx, Ordering::Release);
                }
                !group.slots.is_empty()
            });
            disconnected
        })
    }

    /// Number of currently connected slots.
    pub fn slot_count(&self) -> usize {
        let snapshot = self.core.groups.lock().clone();
        snapshot
            .iter()
            .flat_map(|g| g.slots.iter())
            .filter(|slot| slot.state.connected())
            .count()
    }

    /// Suppress all emissions until [`unblock`](Self::unblock). Returns the
    /// previous blocked state.
    pub fn block(&self) -> bool {
        self.core.blocked.swap(true, Ordering::AcqRel)
    }

    /// Resume emissions. Returns the previous blocked state.
    pub fn unblock(&self) -> bool {
        self.core.blocked.swap(false, Ordering::AcqRel)
    }

    /// Whether the whole signal is currently blocked.
    pub fn blocked(&self) -> bool {
        self.core.blocked.load(Ordering::Acquire)
    }
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Drop for Signal<Args> {
    fn drop(&mut self) {
        // Outstanding connections and in-flight queued deliveries must see
        // the disconnect, not just lose the storage.
        self.core.mutate(|groups| {
            for group in groups.iter() {
                for slot in &group.slots {
                    slot.state.mark_disconnected();
                }
            }
            groups.clear();
        });
    }
}

static_assertions::assert_impl_all!(Signal<i32>: Send, Sync);
static_assertions::assert_impl_all!(Signal<(String, u64)>: Send, Sync);
