//! Software timers driven by the timer loop.
//!
//! Timers are added and removed from arbitrary threads, including from
//! inside a running timer callback, while a pass may be iterating the
//! active list. All additions and deletions are therefore staged:
//!
//! - staging happens under the inner lock and is merged into the active
//!   list opportunistically when the outer lock is free,
//! - a pass holds the outer lock throughout, merging staged operations
//!   before and after the callbacks run.
//!
//! Lock order is fixed: the outer (active-list) lock is acquired before
//! the inner (staged-list) lock. Staging acquires them in the opposite
//! direction, which is only safe because the outer lock is merely
//! tried, never waited on.

use crate::reactor::item::Owner;

use parking_lot::Mutex;
use std::ptr;
use std::sync::Arc;
use tracing::debug;

/// A timer callback.
///
/// Invoked once per pass with the associated object given at
/// registration time, for as long as the entry stays registered.
pub type TimerFn = fn(target: Option<&Owner>);

/// An entry in the timer lists.
///
/// There is no handle type. Identity is structural: the callback
/// function plus the identity of the associated object. The associated
/// object doubles as a lifetime pin; it is retained until the entry is
/// removed.
pub(crate) struct TimerEntry {
    func: TimerFn,
    target: Option<Owner>,
}

impl TimerEntry {
    fn matches(&self, other: &TimerEntry) -> bool {
        if !ptr::fn_addr_eq(self.func, other.func) {
            return false;
        }

        match (&self.target, &other.target) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn fire(&self) {
        (self.func)(self.target.as_ref());
    }
}

#[derive(Default)]
struct Staged {
    add: Vec<TimerEntry>,
    del: Vec<TimerEntry>,
}

pub(crate) struct Timers {
    /// Outer lock. Held for the whole of a pass.
    active: Mutex<Vec<TimerEntry>>,

    /// Inner lock. Only ever held with the outer lock held or tried.
    staged: Mutex<Staged>,
}

impl Timers {
    pub(crate) fn new() -> Self {
        Self {
            active: Mutex::new(Vec::new()),
            staged: Mutex::new(Staged::default()),
        }
    }

    pub(crate) fn add(&self, func: TimerFn, target: Option<Owner>) {
        self.stage(TimerEntry { func, target }, false);
    }

    pub(crate) fn del(&self, func: TimerFn, target: Option<Owner>) {
        self.stage(TimerEntry { func, target }, true);
    }

    fn stage(&self, entry: TimerEntry, deletion: bool) {
        let mut staged = self.staged.lock();

        if deletion {
            staged.del.push(entry);
        } else {
            staged.add.push(entry);
        }

        // Merge immediately unless a pass is running, so timers staged
        // outside of timer callbacks are not delayed until the next
        // pass. Staging from inside a callback finds the outer lock
        // held and defers to the pass's closing reconcile.
        if let Some(mut active) = self.active.try_lock() {
            reconcile(&mut active, &mut staged);
        }
    }

    /// One full pass: merge staged operations, fire every active timer
    /// once, then merge again to absorb operations requested from
    /// within the callbacks.
    pub(crate) fn run_pass(&self) {
        let mut active = self.active.lock();

        {
            let mut staged = self.staged.lock();
            reconcile(&mut active, &mut staged);
        }

        for entry in active.iter() {
            entry.fire();
        }

        let mut staged = self.staged.lock();
        reconcile(&mut active, &mut staged);
    }
}

/// Merge staged additions and deletions into the active list. Both
/// locks must be held.
fn reconcile(active: &mut Vec<TimerEntry>, staged: &mut Staged) {
    if !staged.add.is_empty() {
        let mut merged = std::mem::take(&mut staged.add);
        merged.append(active);
        *active = merged;
    }

    staged.del.retain(|del| {
        match active.iter().position(|entry| entry.matches(del)) {
            Some(pos) => {
                active.remove(pos);
                false
            }
            None => {
                // Deleting a timer that was never promoted. Possible
                // race against a concurrent add, otherwise a bug; the
                // deletion stays staged until a matching add appears.
                debug!("timer deletion matched no active entry, leaving it staged");
                true
            }
        }
    });
}
