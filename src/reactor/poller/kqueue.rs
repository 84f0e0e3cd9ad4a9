//! macOS `kqueue`-based backend.
//!
//! Functionally equivalent to the Linux `epoll` backend and exposes
//! the same interface to the reactor. Filters are registered with
//! `EV_CLEAR`, so readiness is delivered once per state transition,
//! including an initial edge when a filter is added while the condition
//! already holds.

use super::common::{EVENT_BATCH, Event, Filter, Interest};

use libc::{EV_ADD, EV_CLEAR, EV_DELETE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_WRITE};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;
use std::{mem, ptr};

/// macOS `kqueue` readiness queue.
pub(crate) struct KqueuePoller {
    kq: RawFd,
}

impl KqueuePoller {
    pub(crate) fn new() -> io::Result<Self> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { kq })
    }

    /// Add or remove a single filter for a descriptor.
    ///
    /// Removing a filter that was never installed is not a failure;
    /// filter sets are recomputed wholesale and the write filter in
    /// particular comes and goes with the blocked flag.
    fn change(&self, fd: RawFd, filter: i16, enable: bool) -> io::Result<()> {
        let ev = libc::kevent {
            ident: fd as usize,
            filter,
            flags: if enable { EV_ADD | EV_CLEAR } else { EV_DELETE },
            fflags: 0,
            data: 0,
            udata: ptr::null_mut(),
        };

        let rc = unsafe { libc::kevent(self.kq, &ev, 1, ptr::null_mut(), 0, ptr::null()) };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if !enable && err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(());
            }
            return Err(err);
        }

        Ok(())
    }

    fn apply(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.change(fd, EVFILT_READ, interest.read)?;
        self.change(fd, EVFILT_WRITE, interest.write)?;
        Ok(())
    }

    /// Install a descriptor's filters.
    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.apply(fd, interest)
    }

    /// Update the filters of an already registered descriptor.
    pub(crate) fn reregister(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.apply(fd, interest)
    }

    /// Remove a descriptor's filters.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        self.apply(
            fd,
            Interest {
                read: false,
                write: false,
            },
        )
    }

    /// Wait for readiness events, for at most `timeout`.
    ///
    /// A wait interrupted by a signal produces zero events, not an
    /// error. Events with filters other than read or write are dropped
    /// at translation.
    pub(crate) fn wait(&self, events: &mut Vec<Event>, timeout: Duration) -> io::Result<()> {
        let mut evs: [libc::kevent; EVENT_BATCH] = unsafe { mem::zeroed() };
        let ts = libc::timespec {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as libc::c_long,
        };

        let n = unsafe {
            libc::kevent(
                self.kq,
                ptr::null(),
                0,
                evs.as_mut_ptr(),
                EVENT_BATCH as i32,
                &ts,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for ev in &evs[..n as usize] {
            let fd = ev.ident as RawFd;
            let eof = ev.flags & (EV_EOF | EV_ERROR) != 0;

            match ev.filter {
                EVFILT_READ => events.push(Event {
                    fd,
                    filter: Filter::Read,
                    eof,
                }),
                EVFILT_WRITE => events.push(Event {
                    fd,
                    filter: Filter::Write,
                    eof,
                }),
                _ => {}
            }
        }

        Ok(())
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}
