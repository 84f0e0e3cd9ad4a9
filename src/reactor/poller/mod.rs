//! Platform-specific kernel readiness-queue backends.
//!
//! This module provides a unified interface over the kernel's readiness
//! notification mechanism (epoll on Linux, kqueue on macOS).
//!
//! A backend is responsible for:
//! - installing and updating a descriptor's read/write filters,
//! - removing a descriptor's filters,
//! - one bounded, interruptible wait per call, translating whatever the
//!   kernel returns into [`common::Event`]s.
//!
//! Both backends register filters edge-triggered, so a readiness
//! condition is reported once per state transition. The concrete
//! implementation is selected at compile time depending on the target
//! operating system.

pub(crate) mod common;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "macos")]
mod kqueue;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(target_os = "macos")]
pub(crate) type Poller = kqueue::KqueuePoller;
