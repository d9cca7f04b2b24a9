//! The scheduler: ready queue, blocked queue, current-task bookkeeping, the
//! tick handler, and the public task-lifecycle operations (§4.2).
//!
//! `Kernel<P>` is a single encapsulated state object in place of separate
//! `taskPool`, `timerList`, and `timeoutHandlerQueue` globals (§9 "Global
//! mutable state"). It is generic over one concrete [`Port`] rather than
//! `r3_kernel`'s const-generic `Traits: KernelTraits` family, since this
//! crate implements one fixed kernel, not a library of interchangeable
//! kernel configurations (see DESIGN.md).
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::blocked_queue::BlockedQueue;
use crate::boundary::Port;
use crate::config::{self, Priority, Ticks};
use crate::klock::{lock_cpu, CpuLockCell, CpuLockToken};
use crate::readyqueue::ReadyQueue;
use crate::task::{BlockedReason, TaskCb, TaskStatus, WakeupReason};
use crate::timer::TimerService;

pub struct Kernel<P: Port> {
    pub(crate) ready: ReadyQueue<P>,
    pub(crate) blocked: BlockedQueue<P>,
    current: CpuLockCell<P, Option<&'static TaskCb<P>>>,
    idle: &'static TaskCb<P>,
    pub(crate) timers: TimerService<P>,
}

impl<P: Port> Kernel<P> {
    /// Construct a kernel state object. `idle` and the timer task owned by
    /// `timers` must each be distinct, not-yet-started [`TaskCb`]s.
    pub fn new(idle: &'static TaskCb<P>, timers: TimerService<P>) -> Self {
        Self {
            ready: ReadyQueue::new(),
            blocked: BlockedQueue::new(),
            current: CpuLockCell::new(None),
            idle,
            timers,
        }
    }

    #[inline]
    pub fn current_task(&self, tok: &CpuLockToken<P>) -> Option<&'static TaskCb<P>> {
        self.current.get(tok)
    }

    /// `schedulerStart` (§4.2). Starts the idle task and the timer task,
    /// then picks the highest-priority ready task and dispatches it.
    /// Non-returning.
    pub fn start(&'static self) -> ! {
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        self.make_ready(tok, self.idle);
        self.make_ready(tok, self.timers.task);
        self.schedule_next_task(tok);
        let first = self
            .current
            .get(tok)
            .expect("the idle task guarantees the ready queue is never empty");
        drop(guard);
        P::dispatch_first_task(first)
    }

    fn make_ready(&self, tok: &mut CpuLockToken<P>, task: &'static TaskCb<P>) {
        debug_assert_eq!(task.status(tok), TaskStatus::Suspended);
        task.set_status(tok, TaskStatus::Ready);
        task.set_wakeup_reason(tok, WakeupReason::Resume);
        self.ready.push(tok, task);
    }

    /// `taskStart(task)`: a task in its initial suspended state becomes
    /// READY and is made eligible to preempt the caller immediately
    /// (§4.2).
    pub fn start_task(&'static self, task: &'static TaskCb<P>) {
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        self.make_ready(tok, task);
        self.schedule_next_task(tok);
    }

    /// `scheduleNextTask` (§4.2). Caller must already hold the CPU lock.
    pub(crate) fn schedule_next_task(&self, tok: &mut CpuLockToken<P>) {
        let Some(candidate) = self.ready.peek_highest(tok) else {
            return;
        };
        if let Some(current) = self.current.get(tok) {
            if current.status(tok) == TaskStatus::Running {
                if candidate.priority(tok) <= current.priority(tok) {
                    current.set_status(tok, TaskStatus::Ready);
                    self.ready.push(tok, current);
                } else {
                    return;
                }
            }
        }
        let next = self
            .ready
            .pop_highest(tok)
            .expect("just peeked this candidate under the same critical section");
        next.set_status(tok, TaskStatus::Running);
        self.current.set(tok, Some(next));
        P::request_context_switch();
    }

    /// `taskBlock(task, reason, ticks)` (§4.2). `task` must be the caller
    /// (`currentTask`) and currently RUNNING. Returns only after the
    /// scheduler next selects this task to run again.
    pub fn block_current(&'static self, task: &'static TaskCb<P>, reason: BlockedReason, ticks: Ticks) {
        {
            let mut guard = lock_cpu::<P>();
            let tok = guard.borrow_mut();
            debug_assert!(
                self.current.get(tok).map_or(false, |c| core::ptr::eq(c, task)),
                "taskBlock called on a task that is not currentTask"
            );
            task.set_status(tok, TaskStatus::Blocked);
            task.set_blocked_reason(tok, reason);
            task.set_remaining_sleep_ticks(tok, ticks);
            self.blocked.insert(tok, task);
            self.schedule_next_task(tok);
        }
        // Exit the critical section before yielding (§5): a direct switch
        // from inside a primitive's critical section is forbidden.
        P::suspend_current_task();
    }

    /// `taskSetReady(task, reason)` (§4.2). `task` must currently be
    /// BLOCKED. Does not itself run `scheduleNextTask` — the next tick or
    /// explicit yield decides.
    pub fn set_ready(&self, tok: &mut CpuLockToken<P>, task: &'static TaskCb<P>, reason: WakeupReason) {
        debug_assert_eq!(task.status(tok), TaskStatus::Blocked);
        self.blocked.remove(tok, task);
        task.set_status(tok, TaskStatus::Ready);
        task.set_wakeup_reason(tok, reason);
        task.set_remaining_sleep_ticks(tok, 0);
        self.ready.push(tok, task);
    }

    /// Change `task`'s priority, repositioning it in the ready queue if it
    /// is currently READY so the bitmap and buckets stay consistent with
    /// the new value (§4.1/§4.3). A non-READY task (RUNNING, BLOCKED,
    /// SUSPENDED) occupies no bucket, so its priority field is simply
    /// overwritten. Used by mutex priority inheritance to boost/restore an
    /// owner's priority without leaving it stranded in its old bucket.
    pub(crate) fn reprioritize(&self, tok: &mut CpuLockToken<P>, task: &'static TaskCb<P>, priority: Priority) {
        if task.status(tok) == TaskStatus::Ready {
            self.ready.remove(tok, task);
            task.set_priority(tok, priority);
            self.ready.push(tok, task);
        } else {
            task.set_priority(tok, priority);
        }
    }

    /// `taskSuspend(task)` (§4.2). Removes `task` from whatever scheduler
    /// queue holds it; subsequent signals targeting it are suppressed (see
    /// `condVarBroadcast`). Per §9's open question, the safest contract is
    /// also assumed here: callers signalling a primitive wait queue must
    /// check for SUSPENDED and skip it rather than relying on this call to
    /// have detached the task from that queue, since a BLOCKED task is
    /// simultaneously linked into the blocked queue and into exactly one
    /// primitive wait queue, and this method only owns the former.
    pub fn suspend_task(&'static self, task: &'static TaskCb<P>) {
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        match task.status(tok) {
            TaskStatus::Ready => self.ready.remove(tok, task),
            TaskStatus::Blocked => self.blocked.remove(tok, task),
            TaskStatus::Running | TaskStatus::Suspended => {}
        }
        let was_current = self.current.get(tok).map_or(false, |c| core::ptr::eq(c, task));
        task.set_status(tok, TaskStatus::Suspended);
        if was_current {
            self.schedule_next_task(tok);
        }
    }

    /// `taskResume(task)` (§4.2).
    pub fn resume_task(&'static self, task: &'static TaskCb<P>) {
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        debug_assert_eq!(task.status(tok), TaskStatus::Suspended);
        self.make_ready(tok, task);
        self.schedule_next_task(tok);
    }

    /// `taskYield()` (§4.2). From an unprivileged context this traps into
    /// the supervisor first when `tasks_run_priv` is enabled.
    pub fn yield_now(&self) {
        if config::tasks_run_priv() && !P::is_privileged() {
            P::request_privilege_trap();
            return;
        }
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        if let Some(current) = self.current.get(tok) {
            // A cooperative yield competes at its own priority: demote to
            // the back of its own bucket so an equal-priority peer gets a
            // turn, then let `scheduleNextTask` decide.
            current.set_status(tok, TaskStatus::Ready);
            self.ready.push(tok, current);
            self.current.set(tok, None);
        }
        self.schedule_next_task(tok);
    }

    /// The tick handler (§4.2): process timers, scan the blocked queue for
    /// expired waits, then reschedule. Runs with interrupts disabled.
    pub fn tick(&self) {
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        let timer_handlers_queued = self.timers.process_tick(tok);
        if timer_handlers_queued && self.timers.task.status(tok) == TaskStatus::Blocked {
            self.set_ready(tok, self.timers.task, WakeupReason::TimerTimeout);
        }
        self.blocked.tick(tok, |tok, task| {
            let reason = if task.blocked_reason(tok) == BlockedReason::Sleep {
                WakeupReason::SleepTimeTimeout
            } else {
                WakeupReason::WaitTimeout
            };
            task.set_status(tok, TaskStatus::Ready);
            task.set_wakeup_reason(tok, reason);
            task.set_remaining_sleep_ticks(tok, 0);
            self.ready.push(tok, task);
        });
        self.schedule_next_task(tok);
    }

    /// `taskSleepMS`/`taskSleepUS` collapse to this tick-denominated
    /// primitive; converting a millisecond/microsecond count to ticks
    /// depends on the board's configured tick frequency, which is a
    /// bring-up concern out of this crate's scope (§1, §6).
    pub fn sleep_current(&'static self, task: &'static TaskCb<P>, ticks: Ticks) {
        self.block_current(task, BlockedReason::Sleep, ticks);
    }
}

/// A `const`-constructible cell holding a [`Kernel`] that is actually built
/// at runtime.
///
/// `Kernel::new` cannot be `const` (the 256-bucket ready queue is built
/// with a runtime array initializer), yet a task's `param` pointer must
/// name the kernel from inside a `const fn`-constructed `static` (see
/// `task::TaskEntry`). `KernelCell` breaks the cycle the way embedded Rust
/// commonly does for late-initialized statics: the cell itself has a fixed
/// address from the moment the binary is linked, and its contents are
/// written in exactly once during board bring-up, before interrupts are
/// enabled and before any task can observe it.
pub struct KernelCell<P: Port> {
    inner: UnsafeCell<MaybeUninit<Kernel<P>>>,
    initialized: AtomicBool,
}

unsafe impl<P: Port> Sync for KernelCell<P> {}

impl<P: Port> KernelCell<P> {
    pub const fn uninit() -> Self {
        Self {
            inner: UnsafeCell::new(MaybeUninit::uninit()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Store `kernel` into the cell. Must be called exactly once, from
    /// single-threaded bring-up code, before `get` is ever called (in
    /// particular, before the idle or timer task can run).
    pub fn init(&self, kernel: Kernel<P>) -> &Kernel<P> {
        let already_initialized = self.initialized.swap(true, Ordering::AcqRel);
        assert!(!already_initialized, "KernelCell::init called more than once");
        unsafe {
            (*self.inner.get()).write(kernel);
            (*self.inner.get()).assume_init_ref()
        }
    }

    /// Borrow the kernel. Panics if `init` has not run yet.
    pub fn get(&self) -> &Kernel<P> {
        assert!(
            self.initialized.load(Ordering::Acquire),
            "KernelCell accessed before init"
        );
        unsafe { (*self.inner.get()).assume_init_ref() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::WakeupReason;
    use crate::tests::MockPort;
    use crate::timer::TimerService;

    static IDLE: TaskCb<MockPort> = TaskCb::new("idle", |_| {}, core::ptr::null(), 255);
    static TIMER: TaskCb<MockPort> = TaskCb::new("timer", |_| {}, core::ptr::null(), 0);
    static A: TaskCb<MockPort> = TaskCb::new("a", |_| {}, core::ptr::null(), 5);
    static B: TaskCb<MockPort> = TaskCb::new("b", |_| {}, core::ptr::null(), 10);

    fn new_kernel() -> Kernel<MockPort> {
        Kernel::new(&IDLE, TimerService::new(&TIMER))
    }

    #[test]
    fn higher_priority_task_preempts_on_start() {
        let _serial = crate::tests::serialize();
        let kernel = new_kernel();
        let mut guard = lock_cpu::<MockPort>();
        let tok = guard.borrow_mut();
        kernel.make_ready(tok, &IDLE);
        kernel.make_ready(tok, &TIMER);
        kernel.schedule_next_task(tok);
        assert!(core::ptr::eq(kernel.current_task(tok).unwrap(), &TIMER));

        kernel.make_ready(tok, &B);
        kernel.schedule_next_task(tok);
        assert!(core::ptr::eq(kernel.current_task(tok).unwrap(), &B));

        kernel.make_ready(tok, &A);
        kernel.schedule_next_task(tok);
        assert!(core::ptr::eq(kernel.current_task(tok).unwrap(), &A));
        assert_eq!(B.status(tok), TaskStatus::Ready);
    }

    #[test]
    fn lower_priority_ready_task_does_not_preempt() {
        let _serial = crate::tests::serialize();
        let kernel = new_kernel();
        let mut guard = lock_cpu::<MockPort>();
        let tok = guard.borrow_mut();
        kernel.make_ready(tok, &A);
        kernel.schedule_next_task(tok);
        assert!(core::ptr::eq(kernel.current_task(tok).unwrap(), &A));

        kernel.make_ready(tok, &B);
        kernel.schedule_next_task(tok);
        assert!(core::ptr::eq(kernel.current_task(tok).unwrap(), &A));
        assert_eq!(B.status(tok), TaskStatus::Ready);
    }

    #[test]
    fn tick_wakes_sleeping_task_after_exact_tick_count() {
        let _serial = crate::tests::serialize();
        let kernel = new_kernel();
        {
            let mut guard = lock_cpu::<MockPort>();
            let tok = guard.borrow_mut();
            kernel.make_ready(tok, &IDLE);
            kernel.schedule_next_task(tok);
            // A sleeps for 3 ticks without going through `block_current`
            // (which would call `Port::suspend_current_task` and never
            // return on this thread); bookkeeping-level tests drive the
            // transition directly instead.
            A.set_status(tok, TaskStatus::Blocked);
            A.set_blocked_reason(tok, BlockedReason::Sleep);
            A.set_remaining_sleep_ticks(tok, 3);
            kernel.blocked.insert(tok, &A);
        }

        kernel.tick();
        kernel.tick();
        {
            let mut guard = lock_cpu::<MockPort>();
            let tok = guard.borrow_mut();
            assert_eq!(A.status(tok), TaskStatus::Blocked);
        }
        kernel.tick();
        {
            let mut guard = lock_cpu::<MockPort>();
            let tok = guard.borrow_mut();
            assert_eq!(A.status(tok), TaskStatus::Ready);
            assert_eq!(A.wakeup_reason(tok), WakeupReason::SleepTimeTimeout);
        }
    }

    /// Scenario 1 (§8): A (prio 5) sleeps for 3 ticks while lower-priority B
    /// (prio 10) runs. At the tick where A's sleep expires, A preempts B.
    #[test]
    fn strict_priority_task_preempts_lower_priority_task_on_sleep_timeout() {
        let _serial = crate::tests::serialize();
        let kernel = new_kernel();
        {
            let mut guard = lock_cpu::<MockPort>();
            let tok = guard.borrow_mut();
            kernel.make_ready(tok, &IDLE);
            kernel.make_ready(tok, &B);
            kernel.schedule_next_task(tok);
            assert!(core::ptr::eq(kernel.current_task(tok).unwrap(), &B));

            A.set_status(tok, TaskStatus::Blocked);
            A.set_blocked_reason(tok, BlockedReason::Sleep);
            A.set_remaining_sleep_ticks(tok, 3);
            kernel.blocked.insert(tok, &A);
        }

        kernel.tick();
        kernel.tick();
        {
            let mut guard = lock_cpu::<MockPort>();
            let tok = guard.borrow_mut();
            assert!(core::ptr::eq(kernel.current_task(tok).unwrap(), &B), "B still runs exclusively before A's timeout");
        }
        kernel.tick();
        {
            let mut guard = lock_cpu::<MockPort>();
            let tok = guard.borrow_mut();
            assert_eq!(A.wakeup_reason(tok), WakeupReason::SleepTimeTimeout);
            assert!(core::ptr::eq(kernel.current_task(tok).unwrap(), &A), "A must preempt B once its sleep expires");
            assert_eq!(B.status(tok), TaskStatus::Ready);
        }
    }
}
