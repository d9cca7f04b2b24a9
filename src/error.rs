//! Typed return codes.
//!
//! Each operation returns small integer codes in C (`SUCCESS`, `RET_BUSY`,
//! `-ETIMEOUT`, ...); here, following `r3_kernel::error`/`r3_core::kernel::error`'s
//! per-operation typed errors, each operation instead gets its own small
//! `#[non_exhaustive]` enum, so a caller can't accidentally match on a
//! variant that operation can't produce. `r3_kernel` composes ~30 such enums
//! through a `define_suberror!` macro sharing one canonical `ResultCode`;
//! this kernel's error surface is small enough that hand-written enums are
//! clearer (see DESIGN.md).
use core::fmt;

/// `mutexLock` / `mutexLockTimeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MutexLockError {
    /// `RET_BUSY`: the mutex was locked and the caller asked not to wait.
    Busy,
    /// `RET_TIMEOUT`: the wait expired before the mutex became available.
    Timeout,
}

impl fmt::Display for MutexLockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("mutex is locked"),
            Self::Timeout => f.write_str("timed out waiting for mutex"),
        }
    }
}

/// `mutexUnlock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MutexUnlockError {
    /// `RET_NOTOWNER`: the caller does not own the mutex.
    NotOwner,
    /// `RET_NOTLOCKED`: the mutex is not currently locked.
    NotLocked,
}

impl fmt::Display for MutexUnlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOwner => f.write_str("caller does not own the mutex"),
            Self::NotLocked => f.write_str("mutex is not locked"),
        }
    }
}

/// `semaphoreTake`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SemaphoreTakeError {
    /// `RET_BUSY`: the count was zero and the caller asked not to wait.
    Busy,
    /// `RET_TIMEOUT`: the wait expired before the semaphore was given.
    Timeout,
}

impl fmt::Display for SemaphoreTakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("semaphore count is zero"),
            Self::Timeout => f.write_str("timed out waiting for semaphore"),
        }
    }
}

/// `semaphoreGive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SemaphoreGiveError {
    /// `RET_NOSEM`: the count is already at `maxCount`.
    NoSem,
}

impl fmt::Display for SemaphoreGiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSem => f.write_str("semaphore is already at its maximum count"),
        }
    }
}

/// `msgQueueSend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SendError {
    /// `-ENOSPACE`: the queue was full and the caller asked not to wait.
    NoSpace,
    /// `-ETIMEOUT`: the wait expired before space became available.
    Timeout,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpace => f.write_str("message queue is full"),
            Self::Timeout => f.write_str("timed out waiting for queue space"),
        }
    }
}

/// `msgQueueReceive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecvError {
    /// `-ENODATA`: the queue was empty and the caller asked not to wait.
    NoData,
    /// `-ETIMEOUT`: the wait expired before data became available.
    Timeout,
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => f.write_str("message queue is empty"),
            Self::Timeout => f.write_str("timed out waiting for queue data"),
        }
    }
}

#[cfg(feature = "std")]
mod std_impls {
    use super::*;
    extern crate std;

    impl std::error::Error for MutexLockError {}
    impl std::error::Error for MutexUnlockError {}
    impl std::error::Error for SemaphoreTakeError {}
    impl std::error::Error for SemaphoreGiveError {}
    impl std::error::Error for SendError {}
    impl std::error::Error for RecvError {}
}
