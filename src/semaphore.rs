//! Counting semaphore with direct handoff (§4.4).
//!
//! Grounded on `r3_kernel::semaphore`, adapted to this crate's single-`Port`
//! `Kernel` and its `WaitQueue`/`CpuLockCell` primitives. The direct-handoff
//! rule (`semaphoreGive` hands the token straight to a waiter instead of
//! incrementing `count` when a waiter exists) is load-bearing: without it a
//! binary semaphore (`maxCount == 1`) used as a lock could be given twice in
//! a row while a waiter is parked, breaking mutual exclusion (§4.4, §8).
use crate::boundary::Port;
use crate::config::{self, Ticks};
use crate::error::{SemaphoreGiveError, SemaphoreTakeError};
use crate::klock::{lock_cpu, CpuLockCell, CpuLockToken};
use crate::queue::WaitQueue;
use crate::scheduler::Kernel;
use crate::task::{BlockedReason, TaskCb, TaskStatus, WakeupReason};

struct SemaphoreSt {
    count: u32,
    max_count: u32,
}

/// A counting semaphore, statically allocated.
pub struct Semaphore<P: Port> {
    st: CpuLockCell<P, SemaphoreSt>,
    wait_queue: WaitQueue<P>,
}

impl<P: Port> Semaphore<P> {
    /// `initialCount` must not exceed `maxCount`.
    pub const fn new(initial_count: u32, max_count: u32) -> Self {
        Self {
            st: CpuLockCell::new(SemaphoreSt {
                count: initial_count,
                max_count,
            }),
            wait_queue: WaitQueue::new(),
        }
    }

    #[inline]
    pub fn count(&self, tok: &CpuLockToken<P>) -> u32 {
        self.st.with_ref(tok, |s| s.count)
    }

    /// `semaphoreTake`. Must not be called from ISR when `waitTicks != 0`.
    pub fn take(
        &self,
        kernel: &'static Kernel<P>,
        current: &'static TaskCb<P>,
        wait_ticks: Ticks,
    ) -> Result<(), SemaphoreTakeError> {
        {
            let mut guard = lock_cpu::<P>();
            let tok = guard.borrow_mut();

            let has_count = self.st.with_ref(tok, |s| s.count > 0);
            if has_count {
                self.st.with_mut(tok, |s| s.count -= 1);
                return Ok(());
            }

            if wait_ticks == config::TASK_NO_WAIT {
                return Err(SemaphoreTakeError::Busy);
            }

            self.wait_queue.push_back(tok, current);
        }
        kernel.block_current(current, BlockedReason::WaitForSemaphore, wait_ticks);

        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        if current.wakeup_reason(tok) == WakeupReason::SemaphoreTaken {
            Ok(())
        } else {
            self.wait_queue.remove(tok, current);
            Err(SemaphoreTakeError::Timeout)
        }
    }

    /// `semaphoreGive`. Safe to call from ISR context. Hands the token
    /// directly to the highest-priority waiter, if any, rather than
    /// incrementing `count` (§4.4).
    pub fn give(&self, kernel: &'static Kernel<P>) -> Result<(), SemaphoreGiveError> {
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();

        // Skip any waiter a tick timeout has already moved to READY ahead of
        // its own post-block recheck (§5); such an entry is stale and its
        // own wakeup path unlinks it from this wait queue.
        while let Some(waiter) = self.wait_queue.pop_highest_priority(tok) {
            if waiter.status(tok) != TaskStatus::Blocked {
                continue;
            }
            kernel.set_ready(tok, waiter, WakeupReason::SemaphoreTaken);
            return Ok(());
        }

        let at_max = self.st.with_ref(tok, |s| s.count == s.max_count);
        if at_max {
            return Err(SemaphoreGiveError::NoSem);
        }
        self.st.with_mut(tok, |s| s.count += 1);
        Ok(())
    }
}
