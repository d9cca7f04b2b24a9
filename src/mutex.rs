//! Mutex with priority inheritance (§4.3).
//!
//! Modelled after `r3_kernel::mutex`, but deliberately diverges from its
//! priority-*ceiling* protocol (a static per-mutex ceiling chosen ahead of
//! time) and implements the classic priority-*inheritance* protocol instead:
//! the owner's priority is boosted only when, and only as high as, an actual
//! blocked waiter requires (see DESIGN.md). `ownerTask`/`ownerDefaultPriority`
//! collapse to a single `Option`-typed field each, modelling an unlocked
//! mutex as owning no task (§9) — `locked` is not stored separately since
//! the invariant `locked ⇔ ownerTask ≠ null` makes it fully redundant.
use crate::boundary::Port;
use crate::config::{self, Priority, Ticks};
use crate::error::{MutexLockError, MutexUnlockError};
use crate::klock::{lock_cpu, CpuLockCell, CpuLockToken};
use crate::queue::WaitQueue;
use crate::scheduler::Kernel;
use crate::task::{BlockedReason, TaskCb, TaskStatus, WakeupReason};

#[derive(Clone, Copy)]
struct MutexSt<P: Port> {
    owner: Option<&'static TaskCb<P>>,
    /// The owner's priority before the first inheriting waiter boosted it.
    /// `None` means no boost is currently in effect. Only the first waiter
    /// to inherit saves this value; later, even-higher-priority waiters
    /// overwrite the owner's current priority but never this saved one
    /// (§4.3 step 1).
    owner_default_priority: Option<Priority>,
}

/// A mutex with priority inheritance.
pub struct Mutex<P: Port> {
    st: CpuLockCell<P, MutexSt<P>>,
    wait_queue: WaitQueue<P>,
}

impl<P: Port> Mutex<P> {
    pub const fn new() -> Self {
        Self {
            st: CpuLockCell::new(MutexSt {
                owner: None,
                owner_default_priority: None,
            }),
            wait_queue: WaitQueue::new(),
        }
    }

    #[inline]
    pub fn is_locked(&self, tok: &CpuLockToken<P>) -> bool {
        self.st.with_ref(tok, |s| s.owner.is_some())
    }

    #[inline]
    pub fn owner(&self, tok: &CpuLockToken<P>) -> Option<&'static TaskCb<P>> {
        self.st.with_ref(tok, |s| s.owner)
    }

    /// `mutexLock`. Must not be called from ISR context.
    pub fn lock(
        &self,
        kernel: &'static Kernel<P>,
        current: &'static TaskCb<P>,
        wait_ticks: Ticks,
    ) -> Result<(), MutexLockError> {
        {
            let mut guard = lock_cpu::<P>();
            let tok = guard.borrow_mut();

            if config::priority_inheritance_enabled() {
                if let Some(owner) = self.st.with_ref(tok, |s| s.owner) {
                    if current.priority(tok) < owner.priority(tok) {
                        if self.st.with_ref(tok, |s| s.owner_default_priority.is_none()) {
                            let owner_prio = owner.priority(tok);
                            self.st.with_mut(tok, |s| s.owner_default_priority = Some(owner_prio));
                        }
                        kernel.reprioritize(tok, owner, current.priority(tok));
                    }
                }
            }

            if self.st.with_ref(tok, |s| s.owner.is_none()) {
                self.st.with_mut(tok, |s| s.owner = Some(current));
                return Ok(());
            }

            if wait_ticks == config::TASK_NO_WAIT {
                return Err(MutexLockError::Busy);
            }

            self.wait_queue.push_back(tok, current);
        }
        // `block_current` acquires its own critical section; the one above
        // must already be closed before calling it (§5).
        kernel.block_current(current, BlockedReason::WaitForMutex, wait_ticks);

        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        let woken_by_owner = current.wakeup_reason(tok) == WakeupReason::MutexLocked
            && self.st.with_ref(tok, |s| s.owner.map_or(false, |o| core::ptr::eq(o, current)));
        if woken_by_owner {
            Ok(())
        } else {
            self.wait_queue.remove(tok, current);
            Err(MutexLockError::Timeout)
        }
    }

    /// `mutexUnlock`. Must not be called from ISR context.
    pub fn unlock(&self, kernel: &'static Kernel<P>, current: &'static TaskCb<P>) -> Result<(), MutexUnlockError> {
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();

        let is_owner = self.st.with_ref(tok, |s| s.owner.map_or(false, |o| core::ptr::eq(o, current)));
        if !is_owner {
            // A mutex with no owner can never equal `current` either, so the
            // separate NotLocked variant never actually arises here — it
            // remains a distinct error variant for API fidelity.
            return Err(MutexUnlockError::NotOwner);
        }

        if let Some(default_prio) = self.st.with_ref(tok, |s| s.owner_default_priority) {
            kernel.reprioritize(tok, current, default_prio);
            self.st.with_mut(tok, |s| s.owner_default_priority = None);
        }

        // A waiter popped here may already have been moved to READY by a
        // tick timeout that raced ahead of its own post-block recheck; such
        // an entry is stale (its own wakeup path will unlink it from this
        // wait queue) and must be skipped rather than handed the mutex or
        // passed to `set_ready`, which requires BLOCKED (§5).
        let should_yield = loop {
            match self.wait_queue.pop_highest_priority(tok) {
                Some(next) if next.status(tok) == TaskStatus::Blocked => {
                    self.st.with_mut(tok, |s| s.owner = Some(next));
                    kernel.set_ready(tok, next, WakeupReason::MutexLocked);
                    break next.priority(tok) <= current.priority(tok);
                }
                Some(_stale) => continue,
                None => {
                    self.st.with_mut(tok, |s| s.owner = None);
                    break false;
                }
            }
        };
        drop(guard);
        if should_yield {
            kernel.yield_now();
        }
        Ok(())
    }
}

impl<P: Port> Default for Mutex<P> {
    fn default() -> Self {
        Self::new()
    }
}
