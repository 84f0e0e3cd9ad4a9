//! Linux `epoll`-based backend.
//!
//! Functionally equivalent to the macOS `kqueue` backend and exposes
//! the same interface to the reactor. Filters are registered with
//! `EPOLLET`, so readiness is delivered once per state transition,
//! including an initial edge when a filter is added while the condition
//! already holds.

use super::common::{EVENT_BATCH, Event, Filter, Interest};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLET, EPOLLHUP,
    EPOLLIN, EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;
use std::{mem, ptr};

/// Linux `epoll` readiness queue.
pub(crate) struct EpollPoller {
    epoll: RawFd,
}

impl EpollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { epoll })
    }

    fn flags(interest: Interest) -> u32 {
        let mut flags = EPOLLET as u32;

        if interest.read {
            flags |= EPOLLIN as u32;
        }
        if interest.write {
            flags |= EPOLLOUT as u32;
        }

        flags
    }

    fn ctl(&self, op: i32, fd: RawFd, interest: Option<Interest>) -> io::Result<()> {
        let rc = match interest {
            Some(interest) => {
                let mut event = epoll_event {
                    events: Self::flags(interest),
                    u64: fd as u64,
                };
                unsafe { epoll_ctl(self.epoll, op, fd, &mut event) }
            }
            None => unsafe { epoll_ctl(self.epoll, op, fd, ptr::null_mut()) },
        };

        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Install a descriptor's filters.
    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, Some(interest))
    }

    /// Update the filters of an already registered descriptor.
    pub(crate) fn reregister(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, Some(interest))
    }

    /// Remove a descriptor's filters.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        self.ctl(EPOLL_CTL_DEL, fd, None)
    }

    /// Wait for readiness events, for at most `timeout`.
    ///
    /// A wait interrupted by a signal produces zero events, not an
    /// error. At most one kernel event is translated per descriptor
    /// condition; an end-of-file/error indication yields a single
    /// `eof` event rather than one per filter.
    pub(crate) fn wait(&self, events: &mut Vec<Event>, timeout: Duration) -> io::Result<()> {
        let mut evs: [epoll_event; EVENT_BATCH] = unsafe { mem::zeroed() };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

        let n = unsafe { epoll_wait(self.epoll, evs.as_mut_ptr(), EVENT_BATCH as i32, timeout_ms) };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for ev in &evs[..n as usize] {
            let fd = ev.u64 as RawFd;
            let readable = ev.events & EPOLLIN as u32 != 0;
            let writable = ev.events & EPOLLOUT as u32 != 0;
            let eof = ev.events & (EPOLLERR | EPOLLHUP) as u32 != 0;

            if eof {
                let filter = if writable && !readable {
                    Filter::Write
                } else {
                    Filter::Read
                };
                events.push(Event {
                    fd,
                    filter,
                    eof: true,
                });
                continue;
            }

            if writable {
                events.push(Event {
                    fd,
                    filter: Filter::Write,
                    eof: false,
                });
            }
            if readable {
                events.push(Event {
                    fd,
                    filter: Filter::Read,
                    eof: false,
                });
            }
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}
