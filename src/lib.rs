//! # Amnis Reactor
//!
//! **amnis-reactor** is the event-driven I/O core of the Amnis media
//! relay daemon: a descriptor poller and software timer facility built
//! directly on the kernel's readiness queue (epoll on Linux, kqueue on
//! macOS).
//!
//! Protocol code registers descriptors with callback capabilities and
//! the reactor dispatches them on readability, writability and
//! closure, while a parallel timer subsystem fires registered timers
//! once per wall-clock second. The two loops run on separate threads
//! and share the reactor by reference; shutdown is cooperative.
//!
//! The crate provides:
//!
//! - A **descriptor table** with add/update/remove registration calls
//!   and per-descriptor blocked/error tracking for write backpressure
//! - A **readiness loop** translating kernel events into the
//!   registered `readable`/`writable`/`closed` callbacks
//! - A **timer subsystem** safe to mutate from arbitrary threads,
//!   including from inside a running timer callback
//! - A **cached wall clock** refreshed once per readiness batch and
//!   once per timer tick, readable from anywhere in the daemon
//!
//! ## Quick Start
//!
//! ```no_run
//! use amnis_reactor::{Item, Owner, Reactor, Shutdown};
//! use std::os::fd::RawFd;
//! use std::sync::Arc;
//!
//! fn on_readable(fd: RawFd, _owner: &Owner, _tag: u64) {
//!     println!("descriptor {fd} is readable");
//! }
//!
//! fn on_closed(fd: RawFd, _owner: &Owner, _tag: u64) {
//!     println!("descriptor {fd} closed");
//! }
//!
//! fn main() -> std::io::Result<()> {
//!     let reactor = Reactor::new()?;
//!     let shutdown = Shutdown::new();
//!
//!     let session: Owner = Arc::new(());
//!     let item = Item::new(0, session, 7)
//!         .on_readable(on_readable)
//!         .on_closed(on_closed);
//!     reactor.add(item).expect("descriptor registration");
//!
//!     std::thread::scope(|scope| {
//!         scope.spawn(|| reactor.run_poll_loop(&shutdown));
//!         scope.spawn(|| reactor.run_timer_loop(&shutdown));
//!     });
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`reactor`] — the poller, descriptor table and timer subsystem
//! - [`clock`] — the process-wide cached wall clock
//! - [`shutdown`] — cooperative shutdown signalling

mod error;

pub mod clock;
pub mod reactor;
pub mod shutdown;

pub use error::RegistrationError;
pub use reactor::Reactor;
pub use reactor::item::{IoCallback, Item, Owner};
pub use reactor::timer::TimerFn;
pub use shutdown::Shutdown;
