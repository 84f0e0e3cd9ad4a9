use std::os::fd::RawFd;

/// Largest number of kernel events consumed by a single wait.
pub(crate) const EVENT_BATCH: usize = 128;

#[derive(Clone, Copy)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Filter {
    Read,
    Write,
}

/// A readiness event translated out of the kernel queue.
///
/// `eof` carries the kernel's end-of-file/error indication for the
/// descriptor; the dispatcher routes such events to the `closed`
/// callback regardless of the filter.
#[derive(Clone, Copy)]
pub(crate) struct Event {
    pub(crate) fd: RawFd,
    pub(crate) filter: Filter,
    pub(crate) eof: bool,
}
