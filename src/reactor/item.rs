//! Descriptor registration records.
//!
//! An [`Item`] is what protocol code hands to the reactor: a descriptor,
//! the reference-counted object the registration belongs to, an opaque
//! tag, and up to four callback capabilities. Interest is presence: a
//! populated `readable` callback means read interest.

use crate::reactor::poller::common::Interest;

use parking_lot::Mutex;
use std::any::Any;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The reference-counted opaque object a registration is attached to.
///
/// The reactor keeps one strong reference for as long as the
/// registration (or a timer pinned to it) exists, and passes the exact
/// same reference back into every callback.
pub type Owner = Arc<dyn Any + Send + Sync>;

/// A readiness callback capability.
///
/// Invoked with the registered descriptor, the owner reference and the
/// opaque tag given at registration time.
pub type IoCallback = fn(fd: RawFd, owner: &Owner, tag: u64);

/// A descriptor registration.
///
/// Every registration must carry a `closed` callback and at least one
/// of `readable`/`writable`. The optional `timer` callback fires once
/// per timer pass for the lifetime of the registration.
#[derive(Clone)]
pub struct Item {
    pub fd: RawFd,
    pub owner: Owner,
    pub tag: u64,
    pub readable: Option<IoCallback>,
    pub writable: Option<IoCallback>,
    pub closed: Option<IoCallback>,
    pub timer: Option<IoCallback>,
}

impl Item {
    /// Create a registration with no capabilities set.
    pub fn new(fd: RawFd, owner: Owner, tag: u64) -> Self {
        Self {
            fd,
            owner,
            tag,
            readable: None,
            writable: None,
            closed: None,
            timer: None,
        }
    }

    pub fn on_readable(mut self, callback: IoCallback) -> Self {
        self.readable = Some(callback);
        self
    }

    pub fn on_writable(mut self, callback: IoCallback) -> Self {
        self.writable = Some(callback);
        self
    }

    pub fn on_closed(mut self, callback: IoCallback) -> Self {
        self.closed = Some(callback);
        self
    }

    pub fn on_timer(mut self, callback: IoCallback) -> Self {
        self.timer = Some(callback);
        self
    }
}

/// Table-side state of a live registration.
///
/// Shared as `Arc<ItemState>`: the table holds one strong reference
/// while the slot is occupied, the dispatcher clones a temporary one
/// around each callback, and an item-level timer entry holds another,
/// pinning the item for as long as the timer is active.
pub(crate) struct ItemState {
    /// The registration record. Structural mutation happens under the
    /// table lock; the inner mutex lets dispatch snapshot the record
    /// without racing an in-place update.
    pub(crate) item: Mutex<Item>,

    /// The last write attempt did not fully complete; write readiness
    /// is of interest only while this holds.
    pub(crate) blocked: AtomicBool,

    /// The descriptor entered a fatal state; every further event routes
    /// to `closed`.
    pub(crate) error: AtomicBool,
}

impl ItemState {
    pub(crate) fn new(item: Item) -> Self {
        Self {
            item: Mutex::new(item),
            blocked: AtomicBool::new(false),
            error: AtomicBool::new(false),
        }
    }

    pub(crate) fn snapshot(&self) -> Item {
        self.item.lock().clone()
    }

    /// The kernel filter set this registration currently wants.
    ///
    /// Write readiness is requested only while a write is known to be
    /// incomplete. An errored descriptor never returns to write
    /// interest.
    pub(crate) fn interest(&self) -> Interest {
        let item = self.item.lock();

        Interest {
            read: item.readable.is_some(),
            write: item.writable.is_some()
                && self.blocked.load(Ordering::Acquire)
                && !self.error.load(Ordering::Acquire),
        }
    }
}
