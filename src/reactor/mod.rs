//! Reactor core: descriptor table, readiness dispatch and loop drivers.
//!
//! The reactor multiplexes readiness notifications for a dynamically
//! changing set of descriptors and drives the software timer facility.
//! It is shared by reference between two independently scheduled
//! threads:
//!
//! - the readiness loop, blocking on the kernel queue and dispatching
//!   per-descriptor callbacks,
//! - the timer loop, firing one timer pass per wall-clock second.
//!
//! The table lock is never held across the kernel wait or across a
//! callback invocation: callbacks run arbitrary protocol logic,
//! including re-entrant calls back into the table for the very
//! descriptor being dispatched.

pub mod item;
pub mod timer;

mod poller;

use crate::clock::{self, Clock};
use crate::error::RegistrationError;
use crate::reactor::item::{IoCallback, Item, ItemState, Owner};
use crate::reactor::poller::Poller;
use crate::reactor::poller::common::{EVENT_BATCH, Filter, Interest};
use crate::reactor::timer::{TimerFn, Timers};
use crate::shutdown::Shutdown;

use parking_lot::Mutex;
use std::io;
use std::os::fd::RawFd;
use std::process;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// Kernel wait bound used by [`Reactor::run_poll_loop`]. Shutdown is
/// observed within this interval even when no descriptor is active.
const POLL_WAIT: Duration = Duration::from_millis(100);

/// Longest single sleep in the timer loop, for the same reason.
const TICK_SLEEP_CAP_MICROS: u64 = 100_000;

type Slots = Vec<Option<Arc<ItemState>>>;

/// The poller at the heart of the relay daemon.
///
/// Owns the kernel readiness queue, the descriptor table and the timer
/// lists. All methods take `&self`; the reactor is meant to be shared
/// between the readiness thread, the timer thread and every protocol
/// thread that registers descriptors or timers.
pub struct Reactor {
    queue: Poller,

    /// Descriptor table, indexed by descriptor. Grows on demand and is
    /// never shrunk; a removed registration leaves an empty slot.
    slots: Mutex<Slots>,

    timers: Timers,

    clock: Clock,
}

impl Reactor {
    /// Create a reactor with an empty descriptor table.
    ///
    /// The wall-clock cache is primed here so collaborators can read it
    /// before either loop runs.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            queue: Poller::new()?,
            slots: Mutex::new(Vec::new()),
            timers: Timers::new(),
            clock: Clock::new(),
        })
    }

    /// The process-wide cached wall clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    fn validate(item: &Item) -> Result<(), RegistrationError> {
        if item.fd < 0 {
            return Err(RegistrationError::InvalidFd);
        }
        if item.readable.is_none() && item.writable.is_none() {
            return Err(RegistrationError::NoInterest);
        }
        if item.closed.is_none() {
            return Err(RegistrationError::MissingClosedCallback);
        }

        Ok(())
    }

    /// Register a descriptor.
    ///
    /// Fails without mutating anything if the registration is invalid
    /// or the descriptor already has a live registration. A `timer`
    /// capability additionally registers a timer entry pinned to this
    /// registration, fired once per timer pass until the descriptor is
    /// removed.
    pub fn add(&self, item: Item) -> Result<(), RegistrationError> {
        Self::validate(&item)?;

        let mut slots = self.slots.lock();
        let state = self.install(&mut slots, item)?;
        drop(slots);

        self.arm_item_timer(state);

        Ok(())
    }

    /// Install a validated item. The table lock must be held; the
    /// caller arms the item timer after releasing it.
    fn install(
        &self,
        slots: &mut Slots,
        item: Item,
    ) -> Result<Option<Arc<ItemState>>, RegistrationError> {
        let fd = item.fd;
        let index = fd as usize;

        if slots.get(index).is_some_and(|slot| slot.is_some()) {
            return Err(RegistrationError::AlreadyRegistered(fd));
        }

        let has_timer = item.timer.is_some();
        let state = Arc::new(ItemState::new(item));

        self.subscribe(fd, state.interest());

        if index >= slots.len() {
            slots.resize_with(index + 1, || None);
        }
        slots[index] = Some(state.clone());

        debug!(fd, "descriptor registered");

        Ok(has_timer.then_some(state))
    }

    fn arm_item_timer(&self, state: Option<Arc<ItemState>>) {
        if let Some(state) = state {
            let target: Owner = state;
            self.timers.add(item_timer, Some(target));
        }
    }

    /// Re-register a descriptor in place.
    ///
    /// Behaves as [`add`](Self::add) when the descriptor has no live
    /// registration. Otherwise the owner reference, tag and capability
    /// callbacks are replaced; the old owner reference is released.
    /// The timer capability of a live registration cannot be changed,
    /// delete and re-add instead.
    pub fn update(&self, item: Item) -> Result<(), RegistrationError> {
        Self::validate(&item)?;

        let fd = item.fd;
        let mut slots = self.slots.lock();

        let Some(state) = slots.get(fd as usize).and_then(|slot| slot.clone()) else {
            let state = self.install(&mut slots, item)?;
            drop(slots);
            self.arm_item_timer(state);
            return Ok(());
        };

        {
            let mut current = state.item.lock();
            current.owner = item.owner;
            current.tag = item.tag;
            current.readable = item.readable;
            current.writable = item.writable;
            current.closed = item.closed;
            // current.timer stays as registered.
        }

        // Capabilities may have changed; bring the filter set back in
        // line with them.
        self.resubscribe(fd, state.interest());

        Ok(())
    }

    /// Remove a descriptor's registration.
    ///
    /// The kernel subscription is removed, the slot is cleared and the
    /// item's timer entry, if any, is scheduled for deletion. The
    /// table's reference to the item is released after the lock is
    /// dropped, so an owner destructor never runs under it.
    pub fn remove(&self, fd: RawFd) -> Result<(), RegistrationError> {
        if fd < 0 {
            return Err(RegistrationError::InvalidFd);
        }

        let mut slots = self.slots.lock();

        // The slot's reference moves out with the take.
        let Some(state) = slots.get_mut(fd as usize).and_then(|slot| slot.take()) else {
            return Err(RegistrationError::NotRegistered(fd));
        };

        self.unsubscribe(fd);
        drop(slots);

        if state.item.lock().timer.is_some() {
            let target: Owner = state.clone();
            self.timers.del(item_timer, Some(target));
        }

        debug!(fd, "descriptor removed");

        Ok(())
    }

    /// Mark a descriptor as write-blocked.
    ///
    /// Called by the producer right after a write attempt that did not
    /// fully complete. Write readiness is requested from the kernel
    /// until the readiness loop observes it, clears the flag and
    /// invokes `writable`. A no-op for descriptors that are
    /// unregistered or have no write capability.
    pub fn set_blocked(&self, fd: RawFd) {
        let slots = self.slots.lock();

        let Some(state) = lookup(&slots, fd) else {
            return;
        };
        if state.item.lock().writable.is_none() {
            return;
        }

        state.blocked.store(true, Ordering::Release);
        self.resubscribe(fd, state.interest());
    }

    /// Mark a descriptor as fatally errored.
    ///
    /// One-way: the descriptor is treated as perpetually write-blocked,
    /// write readiness is never requested again, and the next event of
    /// any kind routes to `closed`. A no-op for descriptors that are
    /// unregistered or have no write capability.
    pub fn set_error(&self, fd: RawFd) {
        let slots = self.slots.lock();

        let Some(state) = lookup(&slots, fd) else {
            return;
        };
        if state.item.lock().writable.is_none() {
            return;
        }

        state.error.store(true, Ordering::Release);
        state.blocked.store(true, Ordering::Release);
    }

    /// The descriptor's blocked flag, or `None` if the descriptor is
    /// unregistered or has no write capability.
    pub fn is_blocked(&self, fd: RawFd) -> Option<bool> {
        let slots = self.slots.lock();

        let state = lookup(&slots, fd)?;
        if state.item.lock().writable.is_none() {
            return None;
        }

        Some(state.blocked.load(Ordering::Acquire))
    }

    /// One readiness pass.
    ///
    /// Blocks on the kernel queue for at most `timeout`, then
    /// dispatches every returned event in kernel order. Events for
    /// descriptors no longer in the table are skipped; they are the
    /// expected race between deletion and an in-flight kernel batch.
    /// Returns the number of kernel events in the batch, zero when the
    /// table is empty, the wait timed out or the wait was interrupted.
    pub fn poll(&self, timeout: Duration) -> usize {
        {
            let slots = self.slots.lock();
            if slots.is_empty() {
                return 0;
            }
        }

        let mut events = Vec::with_capacity(EVENT_BATCH);
        if let Err(err) = self.queue.wait(&mut events, timeout) {
            error!(error = %err, "kernel readiness wait failed");
            return 0;
        }
        if events.is_empty() {
            return 0;
        }

        let mut slots = self.slots.lock();
        self.clock.refresh();

        for ev in &events {
            let Some(state) = lookup(&slots, ev.fd).cloned() else {
                continue;
            };

            // Temporary reference for the duration of the dispatch;
            // concurrent deletion cannot free the item mid-callback.
            let item = state.snapshot();
            drop(slots);

            if state.error.load(Ordering::Acquire) || ev.eof {
                invoke(item.closed, &item);
            } else {
                match ev.filter {
                    Filter::Write => {
                        slots = self.slots.lock();
                        state.blocked.store(false, Ordering::Release);
                        self.resubscribe(ev.fd, state.interest());
                        drop(slots);

                        invoke(item.writable, &item);
                    }
                    Filter::Read => invoke(item.readable, &item),
                }
            }

            slots = self.slots.lock();
        }
        drop(slots);

        events.len()
    }

    /// Register a timer, fired once per timer pass until deleted.
    ///
    /// There is no handle: deletion is by the same (callback, target)
    /// pair. The target reference is retained until the entry is
    /// removed.
    pub fn add_timer(&self, func: TimerFn, target: Option<Owner>) {
        self.timers.add(func, target);
    }

    /// Delete a timer by (callback, target) identity.
    ///
    /// Deleting an entry that was staged but not yet promoted is
    /// tolerated; the deletion stays pending until a matching entry
    /// appears.
    pub fn del_timer(&self, func: TimerFn, target: Option<Owner>) {
        self.timers.del(func, target);
    }

    /// One timer pass: merge staged operations, fire every active
    /// timer once, merge again.
    pub fn run_timers(&self) {
        self.timers.run_pass();
    }

    /// Drive readiness passes until shutdown is signalled.
    pub fn run_poll_loop(&self, shutdown: &Shutdown) {
        info!("readiness loop running");

        while !shutdown.is_signalled() {
            self.poll(POLL_WAIT);
        }

        info!("readiness loop stopped");
    }

    /// Drive one timer pass per wall-clock second until shutdown is
    /// signalled.
    ///
    /// Sleeps toward the next second boundary in bounded steps so the
    /// shutdown flag is observed promptly, and refreshes the wall-clock
    /// cache before every pass. Must run on a thread distinct from the
    /// readiness loop; a slow protocol callback in one must not stall
    /// the other.
    pub fn run_timer_loop(&self, shutdown: &Shutdown) {
        info!("timer loop running");

        let mut last_tick = self.clock.now_secs();

        while !shutdown.is_signalled() {
            let now = clock::wall_micros();
            let secs = now / 1_000_000;

            if secs == last_tick {
                let to_boundary = 1_000_000 - now % 1_000_000;
                thread::sleep(Duration::from_micros(to_boundary.min(TICK_SLEEP_CAP_MICROS)));
                continue;
            }

            last_tick = secs;
            self.clock.refresh();
            self.timers.run_pass();
        }

        info!("timer loop stopped");
    }

    /// A failed kernel subscription means readiness for the descriptor
    /// could silently never be observed again; the table and the
    /// kernel's notification set would be out of sync from here on.
    fn subscribe(&self, fd: RawFd, interest: Interest) {
        if let Err(err) = self.queue.register(fd, interest) {
            error!(fd, error = %err, "kernel readiness registration failed");
            process::abort();
        }
    }

    fn resubscribe(&self, fd: RawFd, interest: Interest) {
        if let Err(err) = self.queue.reregister(fd, interest) {
            error!(fd, error = %err, "kernel readiness update failed");
            process::abort();
        }
    }

    fn unsubscribe(&self, fd: RawFd) {
        if let Err(err) = self.queue.deregister(fd) {
            error!(fd, error = %err, "kernel readiness removal failed");
            process::abort();
        }
    }
}

fn lookup(slots: &[Option<Arc<ItemState>>], fd: RawFd) -> Option<&Arc<ItemState>> {
    if fd < 0 {
        return None;
    }

    slots.get(fd as usize)?.as_ref()
}

fn invoke(callback: Option<IoCallback>, item: &Item) {
    if let Some(callback) = callback {
        callback(item.fd, &item.owner, item.tag);
    }
}

/// Timer trampoline for items registered with a timer capability. The
/// entry's target is the item state itself, which both pins the item
/// alive and serves as the deletion identity.
fn item_timer(target: Option<&Owner>) {
    let Some(state) = target.and_then(|owner| owner.downcast_ref::<ItemState>()) else {
        return;
    };

    let item = state.snapshot();
    if let Some(timer) = item.timer {
        timer(item.fd, &item.owner, item.tag);
    }
}
