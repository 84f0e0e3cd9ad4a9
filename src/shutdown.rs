//! Cooperative shutdown signalling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A shared shutdown flag.
///
/// Both reactor loops poll the flag once per iteration and return when
/// it is raised; an in-flight callback is never interrupted. Clones
/// observe the same flag.
#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Idempotent.
    pub fn signal(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_signalled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
