//! Condition variable (§4.5).
//!
//! `r3_kernel` exposes only mutexes, semaphores, and event groups, so this
//! module is built from the idioms `mutex.rs` and `semaphore.rs` already
//! establish in this crate: a `CpuLockCell`-protected wait queue,
//! block-then-recheck around `Kernel::block_current`, and `Kernel::set_ready`
//! to wake waiters. The associated mutex (`pMutex`) is a reference chosen by
//! the caller at construction time and held for the condition variable's
//! whole lifetime (§3).
use crate::boundary::Port;
use crate::config::{self, Ticks};
use crate::klock::lock_cpu;
use crate::mutex::Mutex;
use crate::queue::WaitQueue;
use crate::scheduler::Kernel;
use crate::task::{BlockedReason, TaskCb, TaskStatus, WakeupReason};

/// A condition variable associated with exactly one externally owned mutex.
pub struct CondVar<P: Port> {
    mutex: &'static Mutex<P>,
    wait_queue: WaitQueue<P>,
}

impl<P: Port> CondVar<P> {
    pub const fn new(mutex: &'static Mutex<P>) -> Self {
        Self {
            mutex,
            wait_queue: WaitQueue::new(),
        }
    }

    /// `condVarWait`. Precondition: `mutex` is currently held by `current`.
    /// Atomically (with respect to other kernel activity) releases it and
    /// blocks; re-acquires it (waiting forever) before returning. Returns
    /// whether the wakeup was a real signal rather than a timeout.
    pub fn wait(&self, kernel: &'static Kernel<P>, current: &'static TaskCb<P>, wait_ticks: Ticks) -> bool {
        self.mutex
            .unlock(kernel, current)
            .expect("condVarWait precondition: caller must hold the associated mutex");
        {
            let mut guard = lock_cpu::<P>();
            let tok = guard.borrow_mut();
            self.wait_queue.push_back(tok, current);
        }

        kernel.block_current(current, BlockedReason::WaitForCondVar, wait_ticks);

        let signalled = {
            let mut guard = lock_cpu::<P>();
            let tok = guard.borrow_mut();
            let reason = current.wakeup_reason(tok);
            if reason != WakeupReason::CondVarSignalled {
                self.wait_queue.remove(tok, current);
            }
            reason != WakeupReason::WaitTimeout
        };

        self.mutex
            .lock(kernel, current, config::TASK_MAX_WAIT)
            .expect("re-acquiring with an infinite wait cannot time out");
        signalled
    }

    /// `condVarSignal`: wakes the single highest-priority waiter, if any.
    /// Returns whether a waiter was signalled.
    pub fn signal(&self, kernel: &'static Kernel<P>) -> bool {
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        // Skip a waiter a tick timeout has already moved to READY ahead of
        // its own post-block recheck (§5); its own wakeup path unlinks it.
        while let Some(waiter) = self.wait_queue.pop_highest_priority(tok) {
            if waiter.status(tok) != TaskStatus::Blocked {
                continue;
            }
            kernel.set_ready(tok, waiter, WakeupReason::CondVarSignalled);
            return true;
        }
        false
    }

    /// `condVarBroadcast`: wakes every waiter. SUSPENDED tasks, and BLOCKED
    /// tasks a tick timeout already moved to READY ahead of their own
    /// post-block recheck (§5), are skipped rather than made ready:
    /// `taskSuspend` does not detach a task from a primitive's wait queue,
    /// and a timed-out waiter's own wakeup path is what unlinks it, so
    /// callers iterating a wait queue must check status themselves. Returns
    /// whether anything was signalled.
    pub fn broadcast(&self, kernel: &'static Kernel<P>) -> bool {
        let mut guard = lock_cpu::<P>();
        let tok = guard.borrow_mut();
        let mut any = false;
        loop {
            let Some(waiter) = self.wait_queue.peek_front(tok) else {
                break;
            };
            if waiter.status(tok) != TaskStatus::Blocked {
                self.wait_queue.remove(tok, waiter);
                continue;
            }
            self.wait_queue.remove(tok, waiter);
            kernel.set_ready(tok, waiter, WakeupReason::CondVarSignalled);
            any = true;
        }
        any
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::scheduler::{Kernel, KernelCell};
    use crate::task::TaskStatus;
    use crate::tests::{bind_current_thread_to_task, wake_task, MockPort};
    use crate::timer::TimerService;

    #[test]
    fn signal_on_empty_wait_queue_returns_false() {
        let _serial = crate::tests::serialize();
        static M: Mutex<MockPort> = Mutex::new();
        static CV: CondVar<MockPort> = CondVar::new(&M);
        static IDLE: TaskCb<MockPort> = TaskCb::new("idle", |_| {}, core::ptr::null(), 255);
        static TIMER: TaskCb<MockPort> = TaskCb::new("timer", |_| {}, core::ptr::null(), 254);
        static KERNEL_CELL: KernelCell<MockPort> = KernelCell::uninit();
        let kernel = KERNEL_CELL.init(Kernel::new(&IDLE, TimerService::new(&TIMER)));

        assert!(!CV.signal(kernel));
    }

    /// Scenario 3 (§8): producer holds the mutex, writes state, signals.
    /// The consumer, parked in `wait`, re-acquires the mutex before
    /// returning `true`.
    #[test]
    fn ping_pong_signal_wakes_waiter_which_reacquires_mutex() {
        let _serial = crate::tests::serialize();
        static M: Mutex<MockPort> = Mutex::new();
        static CV: CondVar<MockPort> = CondVar::new(&M);
        static IDLE: TaskCb<MockPort> = TaskCb::new("idle", |_| {}, core::ptr::null(), 255);
        static TIMER: TaskCb<MockPort> = TaskCb::new("timer", |_| {}, core::ptr::null(), 254);
        static PRODUCER: TaskCb<MockPort> = TaskCb::new("producer", |_| {}, core::ptr::null(), 10);
        static CONSUMER: TaskCb<MockPort> = TaskCb::new("consumer", |_| {}, core::ptr::null(), 10);
        static KERNEL_CELL: KernelCell<MockPort> = KernelCell::uninit();
        let kernel = KERNEL_CELL.init(Kernel::new(&IDLE, TimerService::new(&TIMER)));

        assert_eq!(M.lock(kernel, &CONSUMER, config::TASK_NO_WAIT), Ok(()));

        let handle = std::thread::spawn(move || {
            bind_current_thread_to_task(&CONSUMER);
            CV.wait(kernel, &CONSUMER, config::TASK_MAX_WAIT)
        });

        loop {
            let mut guard = lock_cpu::<MockPort>();
            let tok = guard.borrow_mut();
            if CONSUMER.status(tok) == TaskStatus::Blocked {
                break;
            }
            drop(guard);
            std::thread::yield_now();
        }

        // The consumer's `condVarWait` released the mutex before blocking.
        assert_eq!(M.lock(kernel, &PRODUCER, config::TASK_NO_WAIT), Ok(()));
        assert!(CV.signal(kernel));
        assert_eq!(M.unlock(kernel, &PRODUCER), Ok(()));
        wake_task(&CONSUMER);

        assert!(handle.join().unwrap());

        let mut guard = lock_cpu::<MockPort>();
        let tok = guard.borrow_mut();
        assert!(core::ptr::eq(M.owner(tok).unwrap(), &CONSUMER));
    }
}
