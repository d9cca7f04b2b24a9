//! The ready queue: 256 per-priority FIFO buckets plus a hierarchical
//! priority bitmap, so `scheduleNextTask` finds the highest occupied
//! priority in `O(log 256)` words instead of scanning every bucket (§4.1,
//! §10). Adapted from `r3_kernel::task::readyqueue`, collapsed from its
//! const-generic bitmap depth to the fixed 256-level [`PriorityBitmap`].
use crate::boundary::Port;
use crate::config::NUM_PRIORITIES;
use crate::klock::{CpuLockCell, CpuLockToken};
use crate::queue::TaskList;
use crate::task::TaskCb;
use crate::utils::PriorityBitmap;

pub struct ReadyQueue<P: Port> {
    bitmap: CpuLockCell<P, PriorityBitmap>,
    buckets: [TaskList<P>; NUM_PRIORITIES],
}

impl<P: Port> ReadyQueue<P> {
    pub fn new() -> Self {
        Self {
            bitmap: CpuLockCell::new(PriorityBitmap::new()),
            buckets: core::array::from_fn(|_| TaskList::new()),
        }
    }

    #[inline]
    pub fn is_empty(&self, tok: &CpuLockToken<P>) -> bool {
        self.bitmap.get(tok).is_empty()
    }

    pub fn push(&self, tok: &mut CpuLockToken<P>, task: &'static TaskCb<P>) {
        let prio = task.priority(tok) as usize;
        self.buckets[prio].push_back(tok, task);
        self.bitmap.with_mut(tok, |b| b.set(prio));
    }

    pub fn peek_highest(&self, tok: &CpuLockToken<P>) -> Option<&'static TaskCb<P>> {
        let prio = self.bitmap.get(tok).find_highest()?;
        self.buckets[prio].peek_front(tok)
    }

    pub fn pop_highest(&self, tok: &mut CpuLockToken<P>) -> Option<&'static TaskCb<P>> {
        let prio = self.bitmap.get(tok).find_highest()?;
        let task = self.buckets[prio].pop_front(tok);
        if self.buckets[prio].is_empty(tok) {
            self.bitmap.with_mut(tok, |b| b.clear(prio));
        }
        task
    }

    /// Unlink a task that is currently ready but not at the head of its
    /// bucket (`taskSuspend` on a READY task, §4.2).
    pub fn remove(&self, tok: &mut CpuLockToken<P>, task: &'static TaskCb<P>) {
        let prio = task.priority(tok) as usize;
        self.buckets[prio].remove(tok, task);
        if self.buckets[prio].is_empty(tok) {
            self.bitmap.with_mut(tok, |b| b.clear(prio));
        }
    }
}

impl<P: Port> Default for ReadyQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}
