//! The scheduler's blocked queue.
//!
//! Every task with `status = BLOCKED` is linked into exactly one of this
//! queue (through `TaskCb::blocked_link`) *in addition to* whichever
//! primitive wait queue it sits in (through `TaskCb::link`). The split
//! mirrors `r3_kernel::timeout`'s separation of a deadline queue from
//! `r3_kernel::wait`'s wait queue: the tick handler must be able to
//! decrement every blocked task's remaining-ticks counter in one scan
//! without knowing which specific mutex, semaphore, condvar or message
//! queue (if any) it is also waiting on (§4.2, §9).
//!
//! Unlike the ready queue and primitive wait queues, membership here is not
//! priority-ordered: the tick handler visits every member once per tick
//! regardless of priority, exactly as §4.2 describes ("iterate decrementing
//! each remainingSleepTicks").
use crate::boundary::Port;
use crate::klock::{CpuLockCell, CpuLockToken};
use crate::task::TaskCb;

pub struct BlockedQueue<P: Port> {
    head: CpuLockCell<P, Option<&'static TaskCb<P>>>,
    tail: CpuLockCell<P, Option<&'static TaskCb<P>>>,
}

impl<P: Port> BlockedQueue<P> {
    pub const fn new() -> Self {
        Self {
            head: CpuLockCell::new(None),
            tail: CpuLockCell::new(None),
        }
    }

    #[inline]
    pub fn is_empty(&self, tok: &CpuLockToken<P>) -> bool {
        self.head.get(tok).is_none()
    }

    pub fn insert(&self, tok: &mut CpuLockToken<P>, task: &'static TaskCb<P>) {
        let old_tail = self.tail.get(tok);
        task.blocked_link.with_mut(tok, |l| {
            l.prev = old_tail;
            l.next = None;
        });
        match old_tail {
            Some(t) => t.blocked_link.with_mut(tok, |l| l.next = Some(task)),
            None => self.head.set(tok, Some(task)),
        }
        self.tail.set(tok, Some(task));
    }

    /// Unlink `task`. A no-op if it is not currently a member (e.g. a
    /// timeout and a primitive signal race and both try to remove it, §5).
    pub fn remove(&self, tok: &mut CpuLockToken<P>, task: &'static TaskCb<P>) {
        let (prev, next) = task.blocked_link.with_ref(tok, |l| (l.prev, l.next));
        let was_linked = prev.is_some() || next.is_some() || self.head.get(tok).map_or(false, |h| core::ptr::eq(h, task));
        if !was_linked {
            return;
        }
        match prev {
            Some(p) => p.blocked_link.with_mut(tok, |l| l.next = next),
            None => self.head.set(tok, next),
        }
        match next {
            Some(n) => n.blocked_link.with_mut(tok, |l| l.prev = prev),
            None => self.tail.set(tok, prev),
        }
        task.blocked_link.with_mut(tok, |l| {
            l.next = None;
            l.prev = None;
        });
    }

    /// Decrement every member's `remainingSleepTicks` by one tick, skipping
    /// members with an infinite wait (`remainingSleepTicks == 0`, meaning
    /// the counter was never armed — see `TASK_MAX_WAIT` handling in
    /// `Kernel::block_current`). Calls `on_expire` once per task whose
    /// counter reaches zero on this tick, after already unlinking it from
    /// this queue, so a single task is never double-fired (§4.2).
    pub fn tick(
        &self,
        tok: &mut CpuLockToken<P>,
        mut on_expire: impl FnMut(&mut CpuLockToken<P>, &'static TaskCb<P>),
    ) {
        let mut cur = self.head.get(tok);
        while let Some(t) = cur {
            cur = t.blocked_link.with_ref(tok, |l| l.next);
            if t.tick_down(tok) {
                self.remove(tok, t);
                on_expire(tok, t);
            }
        }
    }
}

impl<P: Port> Default for BlockedQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}
