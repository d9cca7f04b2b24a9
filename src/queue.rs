//! Intrusive, linearly scanned task FIFO used by the blocked queue and every
//! primitive's wait queue (§4.1).
//!
//! Nodes are not separately allocated: each [`TaskCb`] carries its own link
//! field (see `task::TaskLink`), since a task is never linked into more than
//! one queue at a time (the exactly-once queue-membership invariant, §8).
//! Adapted from the shape of `r3_kernel::wait::WaitQueue`
//! without its const-generic wait-queue-discipline parameter, since every
//! queue in this kernel uses the same discipline (priority-ordered pop,
//! FIFO within a priority).
use crate::boundary::Port;
use crate::klock::{CpuLockCell, CpuLockToken};
use crate::task::TaskCb;

/// A FIFO of tasks, linearly scanned to find the highest-priority member.
/// Used directly as the blocked queue and as every primitive's wait queue.
pub struct TaskList<P: Port> {
    head: CpuLockCell<P, Option<&'static TaskCb<P>>>,
    tail: CpuLockCell<P, Option<&'static TaskCb<P>>>,
}

/// Every primitive's wait queue has the same shape as the plain task FIFO.
pub type WaitQueue<P> = TaskList<P>;

impl<P: Port> TaskList<P> {
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

    #[inline]
    pub fn peek_front(&self, tok: &CpuLockToken<P>) -> Option<&'static TaskCb<P>> {
        self.head.get(tok)
    }

    pub fn push_back(&self, tok: &mut CpuLockToken<P>, task: &'static TaskCb<P>) {
        let old_tail = self.tail.get(tok);
        task.link.with_mut(tok, |l| {
            l.prev = old_tail;
            l.next = None;
        });
        match old_tail {
            Some(t) => t.link.with_mut(tok, |l| l.next = Some(task)),
            None => self.head.set(tok, Some(task)),
        }
        self.tail.set(tok, Some(task));
    }

    pub fn pop_front(&self, tok: &mut CpuLockToken<P>) -> Option<&'static TaskCb<P>> {
        let head = self.head.get(tok)?;
        self.remove(tok, head);
        Some(head)
    }

    /// Unlink an arbitrary member. A no-op (aside from clearing stale link
    /// pointers) if `task` does not actually belong to this list; callers
    /// are expected to know which queue a task is in, following the
    /// exactly-once invariant (§8).
    pub fn remove(&self, tok: &mut CpuLockToken<P>, task: &'static TaskCb<P>) {
        let (prev, next) = task.link.with_ref(tok, |l| (l.prev, l.next));
        match prev {
            Some(p) => p.link.with_mut(tok, |l| l.next = next),
            None => self.head.set(tok, next),
        }
        match next {
            Some(n) => n.link.with_mut(tok, |l| l.prev = prev),
            None => self.tail.set(tok, prev),
        }
        task.link.with_mut(tok, |l| {
            l.next = None;
            l.prev = None;
        });
    }

    /// Remove and return the highest-priority member (lowest numeric
    /// priority value), ties broken by earliest insertion. The blocked queue
    /// and every primitive's wait queue are iterated linearly rather than
    /// kept sorted or popped by priority through a heap (§3).
    pub fn pop_highest_priority(&self, tok: &mut CpuLockToken<P>) -> Option<&'static TaskCb<P>> {
        let mut best: Option<&'static TaskCb<P>> = None;
        let mut cur = self.head.get(tok);
        while let Some(t) = cur {
            cur = t.link.with_ref(tok, |l| l.next);
            if best.map_or(true, |b| t.priority(tok) < b.priority(tok)) {
                best = Some(t);
            }
        }
        if let Some(t) = best {
            self.remove(tok, t);
        }
        best
    }

    /// Visit every currently-linked member in list order, reading each
    /// node's `next` pointer before calling `f` so that `f` may freely
    /// unlink the current node (from this list or another) without
    /// corrupting the traversal — the discipline §4.7 and §4.2 both require
    /// for timeout/timer scanning.
    pub fn for_each(
        &self,
        tok: &mut CpuLockToken<P>,
        mut f: impl FnMut(&mut CpuLockToken<P>, &'static TaskCb<P>),
    ) {
        let mut cur = self.head.get(tok);
        while let Some(t) = cur {
            cur = t.link.with_ref(tok, |l| l.next);
            f(tok, t);
        }
    }
}

impl<P: Port> Default for TaskList<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::MockPort;

    static A: TaskCb<MockPort> = TaskCb::new("a", |_| {}, 0, 5);
    static B: TaskCb<MockPort> = TaskCb::new("b", |_| {}, 0, 1);
    static C: TaskCb<MockPort> = TaskCb::new("c", |_| {}, 0, 5);

    #[test]
    fn fifo_order_preserved() {
        let _serial = crate::tests::serialize();
        let mut guard = crate::klock::lock_cpu::<MockPort>();
        let tok = guard.borrow_mut();
        let q: TaskList<MockPort> = TaskList::new();
        q.push_back(tok, &A);
        q.push_back(tok, &B);
        q.push_back(tok, &C);
        assert_eq!(q.pop_front(tok).unwrap().name, "a");
        assert_eq!(q.pop_front(tok).unwrap().name, "b");
        assert_eq!(q.pop_front(tok).unwrap().name, "c");
        assert!(q.is_empty(tok));
    }

    #[test]
    fn highest_priority_wins_ties_broken_by_fifo() {
        let _serial = crate::tests::serialize();
        let mut guard = crate::klock::lock_cpu::<MockPort>();
        let tok = guard.borrow_mut();
        let q: TaskList<MockPort> = TaskList::new();
        q.push_back(tok, &A); // prio 5, inserted first among the prio-5 pair
        q.push_back(tok, &B); // prio 1, highest priority
        q.push_back(tok, &C); // prio 5, inserted second
        assert_eq!(q.pop_highest_priority(tok).unwrap().name, "b");
        assert_eq!(q.pop_highest_priority(tok).unwrap().name, "a");
        assert_eq!(q.pop_highest_priority(tok).unwrap().name, "c");
    }

    #[test]
    fn remove_from_middle_relinks_neighbors() {
        let _serial = crate::tests::serialize();
        let mut guard = crate::klock::lock_cpu::<MockPort>();
        let tok = guard.borrow_mut();
        let q: TaskList<MockPort> = TaskList::new();
        q.push_back(tok, &A);
        q.push_back(tok, &B);
        q.push_back(tok, &C);
        q.remove(tok, &B);
        assert_eq!(q.pop_front(tok).unwrap().name, "a");
        assert_eq!(q.pop_front(tok).unwrap().name, "c");
        assert!(q.is_empty(tok));
    }
}
