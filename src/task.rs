//! Task control blocks.
//!
//! Adapted from `r3_kernel::task::TaskCb`: mutable TCB state lives behind
//! per-concern [`CpuLockCell`]s so it can only be touched with interrupts
//! disabled, and the queue-membership link is folded into the TCB itself
//! (§9's "intrusive doubly linked list field per TCB" design note) rather
//! than allocated as a separate node, since a task is a member of at most
//! one queue at any time.
use core::cell::UnsafeCell;
use core::fmt;

use crate::boundary::Port;
use crate::config::{Priority, Ticks};
use crate::klock::CpuLockCell;

/// A task's entry point: `fn(params)`. `params` is an opaque, caller-chosen
/// pointer; a raw pointer (rather than a `usize`) lets it address a
/// `'static` kernel object from a `const fn`-constructed task without an
/// integer-valued static initializer, which `const` evaluation cannot
/// express.
pub type TaskEntry = fn(*const ());

/// `status` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// In the ready queue, waiting to be dispatched.
    Ready,
    /// Currently executing on the CPU.
    Running,
    /// In the blocked queue and possibly a primitive's wait queue.
    Blocked,
    /// In neither scheduler queue. Also the state of a task that has not yet
    /// been started with [`taskStart`](crate::scheduler::Kernel::start_task):
    /// only four statuses exist, so "not yet started" is modelled as a
    /// degenerate case of SUSPENDED — `taskStart` is simply `taskResume`
    /// performed once, from this initial state.
    Suspended,
}

/// `blockedReason` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedReason {
    None,
    Sleep,
    WaitForSemaphore,
    WaitForMutex,
    WaitForMsgQueueData,
    WaitForMsgQueueSpace,
    WaitForCondVar,
    WaitForTimerTimeout,
}

/// `wakeupReason` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupReason {
    None,
    WaitTimeout,
    SleepTimeTimeout,
    SemaphoreTaken,
    MutexLocked,
    MsgQueueDataAvailable,
    MsgQueueSpaceAvailable,
    CondVarSignalled,
    TimerTimeout,
    Resume,
}

/// The mutable fields that change on every scheduling decision, grouped so a
/// single critical section can update several of them atomically.
struct TaskSt {
    status: TaskStatus,
    priority: Priority,
    base_priority: Priority,
    blocked_reason: BlockedReason,
    wakeup_reason: WakeupReason,
    remaining_sleep_ticks: Ticks,
}

/// Intrusive doubly linked list membership. At most one of {ready queue, a
/// primitive's wait queue} ever holds a given TCB, so one link field
/// suffices for all of them (§4.1).
pub(crate) struct TaskLink<P: Port> {
    pub(crate) next: Option<&'static TaskCb<P>>,
    pub(crate) prev: Option<&'static TaskCb<P>>,
}

impl<P: Port> TaskLink<P> {
    const fn new() -> Self {
        Self {
            next: None,
            prev: None,
        }
    }
}

/// A statically allocated task control block.
pub struct TaskCb<P: Port> {
    /// Diagnostic label only; carries no scheduling semantics (§10/§12).
    pub name: &'static str,
    entry: TaskEntry,
    param: *const (),
    /// Opaque saved stack pointer. Written only by the board integration's
    /// deferred-switch interrupt handler, never by portable kernel code, so
    /// it deliberately lives outside the `CpuLockCell` discipline used for
    /// everything else here.
    stack_pointer: UnsafeCell<*mut ()>,
    st: CpuLockCell<P, TaskSt>,
    pub(crate) link: CpuLockCell<P, TaskLink<P>>,
    /// Separate link used only by the scheduler's blocked queue (§4.2, §9).
    /// A task waiting on a primitive is linked into that primitive's wait
    /// queue through `link` *and*, simultaneously, into the blocked queue
    /// through this field — `taskBlock` enqueues onto the blocked queue in
    /// addition to whatever primitive-specific enqueue the caller already
    /// performed. A single link field cannot serve both, since the tick
    /// handler must be able to scan every blocked task's remaining-ticks
    /// counter regardless of which primitive (if any) it is waiting on.
    pub(crate) blocked_link: CpuLockCell<P, TaskLink<P>>,
}

// Safety: every field is either read-only after construction (`entry`,
// `param`, `name`) or only ever touched with interrupts disabled
// (`CpuLockCell` fields) or only by the board's own single-threaded ISR
// context (`stack_pointer`). On a single-core target there is no true data
// race, only the serialization the critical section already provides.
unsafe impl<P: Port> Sync for TaskCb<P> {}

impl<P: Port> TaskCb<P> {
    /// Construct a task control block in its initial, not-yet-started state.
    pub const fn new(name: &'static str, entry: TaskEntry, param: *const (), priority: Priority) -> Self {
        Self {
            name,
            entry,
            param,
            stack_pointer: UnsafeCell::new(core::ptr::null_mut()),
            st: CpuLockCell::new(TaskSt {
                status: TaskStatus::Suspended,
                priority,
                base_priority: priority,
                blocked_reason: BlockedReason::None,
                wakeup_reason: WakeupReason::None,
                remaining_sleep_ticks: 0,
            }),
            link: CpuLockCell::new(TaskLink::new()),
            blocked_link: CpuLockCell::new(TaskLink::new()),
        }
    }

    #[inline]
    pub fn entry(&self) -> TaskEntry {
        self.entry
    }

    #[inline]
    pub fn param(&self) -> *const () {
        self.param
    }

    /// # Safety
    /// Must only be called from the board integration's deferred-switch
    /// handler, never from portable kernel code.
    #[inline]
    pub unsafe fn stack_pointer_cell(&self) -> &UnsafeCell<*mut ()> {
        &self.stack_pointer
    }

    #[inline]
    pub fn status(&self, tok: &crate::klock::CpuLockToken<P>) -> TaskStatus {
        self.st.with_ref(tok, |st| st.status)
    }

    #[inline]
    pub fn set_status(&self, tok: &mut crate::klock::CpuLockToken<P>, status: TaskStatus) {
        self.st.with_mut(tok, |st| st.status = status);
    }

    #[inline]
    pub fn priority(&self, tok: &crate::klock::CpuLockToken<P>) -> Priority {
        self.st.with_ref(tok, |st| st.priority)
    }

    #[inline]
    pub fn set_priority(&self, tok: &mut crate::klock::CpuLockToken<P>, priority: Priority) {
        self.st.with_mut(tok, |st| st.priority = priority);
    }

    #[inline]
    pub fn base_priority(&self, tok: &crate::klock::CpuLockToken<P>) -> Priority {
        self.st.with_ref(tok, |st| st.base_priority)
    }

    #[inline]
    pub fn set_base_priority(&self, tok: &mut crate::klock::CpuLockToken<P>, priority: Priority) {
        self.st.with_mut(tok, |st| st.base_priority = priority);
    }

    #[inline]
    pub fn blocked_reason(&self, tok: &crate::klock::CpuLockToken<P>) -> BlockedReason {
        self.st.with_ref(tok, |st| st.blocked_reason)
    }

    #[inline]
    pub fn set_blocked_reason(&self, tok: &mut crate::klock::CpuLockToken<P>, reason: BlockedReason) {
        self.st.with_mut(tok, |st| st.blocked_reason = reason);
    }

    #[inline]
    pub fn wakeup_reason(&self, tok: &crate::klock::CpuLockToken<P>) -> WakeupReason {
        self.st.with_ref(tok, |st| st.wakeup_reason)
    }

    #[inline]
    pub fn set_wakeup_reason(&self, tok: &mut crate::klock::CpuLockToken<P>, reason: WakeupReason) {
        self.st.with_mut(tok, |st| st.wakeup_reason = reason);
    }

    #[inline]
    pub fn remaining_sleep_ticks(&self, tok: &crate::klock::CpuLockToken<P>) -> Ticks {
        self.st.with_ref(tok, |st| st.remaining_sleep_ticks)
    }

    #[inline]
    pub fn set_remaining_sleep_ticks(&self, tok: &mut crate::klock::CpuLockToken<P>, ticks: Ticks) {
        self.st.with_mut(tok, |st| st.remaining_sleep_ticks = ticks);
    }

    /// Decrement `remainingSleepTicks` by one tick, reporting whether this
    /// call is the one that reached zero. A value of `TASK_MAX_WAIT` is the
    /// "wait forever" sentinel and is never decremented (§4.2); a value of
    /// zero means no timeout is pending and the tick handler must never
    /// double-fire a timeout that already fired.
    pub(crate) fn tick_down(&self, tok: &mut crate::klock::CpuLockToken<P>) -> bool {
        self.st.with_mut(tok, |st| {
            if st.remaining_sleep_ticks == 0 || st.remaining_sleep_ticks == crate::config::TASK_MAX_WAIT {
                false
            } else {
                st.remaining_sleep_ticks -= 1;
                st.remaining_sleep_ticks == 0
            }
        })
    }
}

impl<P: Port> fmt::Debug for TaskCb<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCb").field("name", &self.name).finish_non_exhaustive()
    }
}
