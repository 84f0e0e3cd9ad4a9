use std::os::fd::RawFd;
use thiserror::Error;

/// Rejection of a registration call.
///
/// Validation failures mutate nothing; the call can be retried after
/// correcting the registration. Kernel-level subscription failures are
/// not represented here, they abort the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("descriptor is negative")]
    InvalidFd,

    #[error("registration declares neither read nor write interest")]
    NoInterest,

    #[error("registration is missing the closed callback")]
    MissingClosedCallback,

    #[error("descriptor {0} is already registered")]
    AlreadyRegistered(RawFd),

    #[error("descriptor {0} is not registered")]
    NotRegistered(RawFd),
}
