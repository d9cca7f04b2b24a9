//! Software timers: a list of running timers decremented every tick, a
//! fixed-capacity expired-handler dispatch queue, and the entry point run
//! by the dedicated timer-service task that drains it outside interrupt
//! context (§4.7). The running-timer list reuses the same intrusive
//! doubly-linked-list shape as [`crate::queue::TaskList`], adapted from
//! `r3_kernel`'s tick-driven deadline processing in `timeout.rs`; unlike
//! `r3_kernel`'s timeout list, this kernel also owns the handler dispatch
//! FIFO and a dedicated servicing task, since callbacks here must not run
//! directly in interrupt context.
use arrayvec::ArrayVec;

use crate::boundary::Port;
use crate::config::{Ticks, TIMER_DISPATCH_CAPACITY};
use crate::klock::{lock_cpu, CpuLockCell, CpuLockToken};
use crate::task::{BlockedReason, TaskCb};

/// A timer's expiry callback. Runs on the timer task, outside interrupt
/// context, never on the tick ISR's stack.
pub type TimerHandler = fn();

/// `mode` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    SingleShot,
    Periodic,
}

struct TimerLink<P: Port> {
    next: Option<&'static Timer<P>>,
    prev: Option<&'static Timer<P>>,
}

impl<P: Port> TimerLink<P> {
    const fn new() -> Self {
        Self {
            next: None,
            prev: None,
        }
    }
}

struct TimerSt {
    ticks_to_expire: Ticks,
    is_running: bool,
}

/// A statically allocated software timer.
pub struct Timer<P: Port> {
    pub name: &'static str,
    handler: TimerHandler,
    interval_ticks: Ticks,
    mode: TimerMode,
    st: CpuLockCell<P, TimerSt>,
    link: CpuLockCell<P, TimerLink<P>>,
}

unsafe impl<P: Port> Sync for Timer<P> {}

impl<P: Port> Timer<P> {
    pub const fn new(
        name: &'static str,
        handler: TimerHandler,
        interval_ticks: Ticks,
        mode: TimerMode,
    ) -> Self {
        Self {
            name,
            handler,
            interval_ticks,
            mode,
            st: CpuLockCell::new(TimerSt {
                ticks_to_expire: interval_ticks,
                is_running: false,
            }),
            link: CpuLockCell::new(TimerLink::new()),
        }
    }

    #[inline]
    pub fn is_running(&self, tok: &CpuLockToken<P>) -> bool {
        self.st.with_ref(tok, |s| s.is_running)
    }
}

/// The running-timer list, the expired-handler dispatch queue, and a
/// reference to the task that drains it.
pub struct TimerService<P: Port> {
    head: CpuLockCell<P, Option<&'static Timer<P>>>,
    tail: CpuLockCell<P, Option<&'static Timer<P>>>,
    dispatch: CpuLockCell<P, ArrayVec<TimerHandler, TIMER_DISPATCH_CAPACITY>>,
    dropped: CpuLockCell<P, u32>,
    pub(crate) task: &'static TaskCb<P>,
}

impl<P: Port> TimerService<P> {
    pub fn new(task: &'static TaskCb<P>) -> Self {
        Self {
            head: CpuLockCell::new(None),
            tail: CpuLockCell::new(None),
            dispatch: CpuLockCell::new(ArrayVec::new()),
            dropped: CpuLockCell::new(0),
            task,
        }
    }

    fn insert_running(&self, tok: &mut CpuLockToken<P>, timer: &'static Timer<P>) {
        let old_tail = self.tail.get(tok);
        timer.link.with_mut(tok, |l| {
            l.prev = old_tail;
            l.next = None;
        });
        match old_tail {
            Some(t) => t.link.with_mut(tok, |l| l.next = Some(timer)),
            None => self.head.set(tok, Some(timer)),
        }
        self.tail.set(tok, Some(timer));
    }

    fn remove_running(&self, tok: &mut CpuLockToken<P>, timer: &'static Timer<P>) {
        let (prev, next) = timer.link.with_ref(tok, |l| (l.prev, l.next));
        match prev {
            Some(p) => p.link.with_mut(tok, |l| l.next = next),
            None => self.head.set(tok, next),
        }
        match next {
            Some(n) => n.link.with_mut(tok, |l| l.prev = prev),
            None => self.tail.set(tok, prev),
        }
        timer.link.with_mut(tok, |l| {
            l.next = None;
            l.prev = None;
        });
    }

    /// `timerStart`. Starting an already-running timer restarts its
    /// countdown from `intervalTicks` rather than stacking a second entry.
    pub fn start(&self, tok: &mut CpuLockToken<P>, timer: &'static Timer<P>) {
        if timer.st.with_ref(tok, |s| s.is_running) {
            self.remove_running(tok, timer);
        }
        timer.st.with_mut(tok, |s| {
            s.is_running = true;
            s.ticks_to_expire = timer.interval_ticks;
        });
        self.insert_running(tok, timer);
    }

    /// `timerStop`.
    pub fn stop(&self, tok: &mut CpuLockToken<P>, timer: &'static Timer<P>) {
        if timer.st.with_ref(tok, |s| s.is_running) {
            self.remove_running(tok, timer);
            timer.st.with_mut(tok, |s| s.is_running = false);
        }
    }

    /// `processTimers` (§4.2 step 1, §4.7). The tick handler saves each
    /// node's `next` pointer before inspecting it, since a single-shot
    /// timer's own expiry unlinks it mid-traversal.
    ///
    /// Returns whether any handler was queued (the caller must then wake
    /// the timer task if it was blocked waiting for one).
    pub fn process_tick(&self, tok: &mut CpuLockToken<P>) -> bool {
        let mut queued_any = false;
        let mut cur = self.head.get(tok);
        while let Some(t) = cur {
            cur = t.link.with_ref(tok, |l| l.next);
            let expired = t.st.with_mut(tok, |s| {
                s.ticks_to_expire = s.ticks_to_expire.saturating_sub(1);
                s.ticks_to_expire == 0
            });
            if !expired {
                continue;
            }
            self.push_dispatch(tok, t.handler);
            queued_any = true;
            if t.mode == TimerMode::SingleShot {
                self.remove_running(tok, t);
                t.st.with_mut(tok, |s| s.is_running = false);
            } else {
                t.st.with_mut(tok, |s| s.ticks_to_expire = t.interval_ticks);
            }
        }
        queued_any
    }

    fn push_dispatch(&self, tok: &mut CpuLockToken<P>, handler: TimerHandler) {
        let overflowed = self.dispatch.with_mut(tok, |q| q.try_push(handler).is_err());
        if overflowed {
            self.dropped.with_mut(tok, |d| *d = d.saturating_add(1));
        }
    }

    /// Number of expired-handler dispatches dropped because the fixed
    /// capacity was exceeded (§4.7, §12). Diagnostic only.
    pub fn dropped_count(&self, tok: &CpuLockToken<P>) -> u32 {
        self.dropped.get(tok)
    }

    #[inline]
    pub fn dispatch_is_empty(&self, tok: &CpuLockToken<P>) -> bool {
        self.dispatch.with_ref(tok, |q| q.is_empty())
    }

    /// Pop the oldest pending handler. Precondition: non-empty (§9's
    /// documented `timeoutHandlerQueuePop` precondition) — callers check
    /// [`dispatch_is_empty`](Self::dispatch_is_empty) first.
    pub fn pop_dispatch(&self, tok: &mut CpuLockToken<P>) -> Option<TimerHandler> {
        self.dispatch.with_mut(tok, |q| {
            if q.is_empty() {
                None
            } else {
                Some(q.remove(0))
            }
        })
    }
}

/// The timer task's entry point. `kernel_cell` must be the address of the
/// [`crate::scheduler::KernelCell`] whose `Kernel` owns this
/// `TimerService`, smuggled through the opaque task parameter because a
/// `const fn`-constructed static task cannot otherwise name a `'static`
/// kernel object that is itself initialized at runtime (see
/// `scheduler::KernelCell`).
///
/// # Safety
/// `kernel_cell` must actually point to a
/// `KernelCell<P>` that has been [`init`](crate::scheduler::KernelCell::init)ed
/// by the time this task is first dispatched.
pub fn timer_task_entry<P: Port>(kernel_cell: *const ()) {
    let cell = unsafe { &*kernel_cell.cast::<crate::scheduler::KernelCell<P>>() };
    let kernel = cell.get();
    loop {
        let handler = {
            let mut guard = lock_cpu::<P>();
            let tok = guard.borrow_mut();
            kernel.timers.pop_dispatch(tok)
        };
        match handler {
            Some(handler) => handler(),
            None => kernel.block_current(kernel.timers.task, BlockedReason::WaitForTimerTimeout, 0),
        }
    }
}
