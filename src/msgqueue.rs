//! Bounded FIFO message queue (§4.6).
//!
//! No direct analog among this kernel's other primitives; built the way
//! `semaphore.rs` structures a wait-then-retry primitive, generalized to a
//! fixed-capacity ring buffer of items. Rather than a raw byte buffer plus an
//! item-size field, this crate parameterizes over an item type `T: Copy` and
//! a `const N: usize` capacity, which is the idiomatic Rust shape for the
//! same "no heap, fixed slots" requirement (see DESIGN.md) —
//! `arrayvec`-style fixed-capacity collections are already the pattern this
//! crate uses elsewhere (`timer.rs`'s dispatch queue).
use crate::boundary::Port;
use crate::config::{self, Ticks};
use crate::error::{RecvError, SendError};
use crate::klock::{lock_cpu, CpuLockCell};
use crate::queue::WaitQueue;
use crate::scheduler::Kernel;
use crate::task::{BlockedReason, TaskCb, TaskStatus, WakeupReason};

struct MsgQueueSt<T, const N: usize> {
    buffer: [Option<T>; N],
    read_index: usize,
    write_index: usize,
    item_count: usize,
}

/// A bounded ring-buffer message queue of up to `N` items of type `T`.
pub struct MsgQueue<P: Port, T: Copy, const N: usize> {
    st: CpuLockCell<P, MsgQueueSt<T, N>>,
    producer_wait: WaitQueue<P>,
    consumer_wait: WaitQueue<P>,
}

impl<P: Port, T: Copy, const N: usize> MsgQueue<P, T, N> {
    pub const fn new() -> Self {
        Self {
            st: CpuLockCell::new(MsgQueueSt {
                buffer: [None; N],
                read_index: 0,
                write_index: 0,
                item_count: 0,
            }),
            producer_wait: WaitQueue::new(),
            consumer_wait: WaitQueue::new(),
        }
    }

    #[inline]
    pub fn len(&self, tok: &crate::klock::CpuLockToken<P>) -> usize {
        self.st.with_ref(tok, |s| s.item_count)
    }

    #[inline]
    pub fn is_empty(&self, tok: &crate::klock::CpuLockToken<P>) -> bool {
        self.len(tok) == 0
    }

    #[inline]
    pub fn is_full(&self, tok: &crate::klock::CpuLockToken<P>) -> bool {
        self.len(tok) == N
    }

    /// `msgQueueSend`. The non-blocking path (`waitTicks == TASK_NO_WAIT`) is
    /// safe to call from ISR context; the blocking path is not (§5).
    pub fn send(
        &self,
        kernel: &'static Kernel<P>,
        current: &'static TaskCb<P>,
        item: T,
        wait_ticks: Ticks,
    ) -> Result<(), SendError> {
        loop {
            {
                let mut guard = lock_cpu::<P>();
                let tok = guard.borrow_mut();
                let full = self.st.with_ref(tok, |s| s.item_count == N);
                if !full {
                    self.st.with_mut(tok, |s| {
                        s.buffer[s.write_index] = Some(item);
                        s.write_index = (s.write_index + 1) % N;
                        s.item_count += 1;
                    });
                    // Skip a waiter a tick timeout already moved to READY
                    // ahead of its own post-block recheck (§5); its own
                    // wakeup path is what unlinks it from this wait queue.
                    while let Some(waiter) = self.consumer_wait.pop_highest_priority(tok) {
                        if waiter.status(tok) != TaskStatus::Blocked {
                            continue;
                        }
                        kernel.set_ready(tok, waiter, WakeupReason::MsgQueueDataAvailable);
                        break;
                    }
                    return Ok(());
                }

                if wait_ticks == config::TASK_NO_WAIT {
                    return Err(SendError::NoSpace);
                }

                self.producer_wait.push_back(tok, current);
            }
            kernel.block_current(current, BlockedReason::WaitForMsgQueueSpace, wait_ticks);

            let mut guard = lock_cpu::<P>();
            let tok = guard.borrow_mut();
            if current.wakeup_reason(tok) != WakeupReason::MsgQueueSpaceAvailable {
                self.producer_wait.remove(tok, current);
                return Err(SendError::Timeout);
            }
            // Space was reported available; loop back and retry the write
            // under a fresh critical section (§4.6).
        }
    }

    /// `msgQueueReceive`. The non-blocking path is ISR-safe; the blocking
    /// path is not.
    pub fn receive(
        &self,
        kernel: &'static Kernel<P>,
        current: &'static TaskCb<P>,
        wait_ticks: Ticks,
    ) -> Result<T, RecvError> {
        loop {
            {
                let mut guard = lock_cpu::<P>();
                let tok = guard.borrow_mut();
                let has_data = self.st.with_ref(tok, |s| s.item_count > 0);
                if has_data {
                    let item = self.st.with_mut(tok, |s| {
                        let item = s.buffer[s.read_index].take().expect("item_count > 0 implies a populated slot");
                        s.read_index = (s.read_index + 1) % N;
                        s.item_count -= 1;
                        item
                    });
                    while let Some(waiter) = self.producer_wait.pop_highest_priority(tok) {
                        if waiter.status(tok) != TaskStatus::Blocked {
                            continue;
                        }
                        kernel.set_ready(tok, waiter, WakeupReason::MsgQueueSpaceAvailable);
                        break;
                    }
                    return Ok(item);
                }

                if wait_ticks == config::TASK_NO_WAIT {
                    return Err(RecvError::NoData);
                }

                self.consumer_wait.push_back(tok, current);
            }
            kernel.block_current(current, BlockedReason::WaitForMsgQueueData, wait_ticks);

            let mut guard = lock_cpu::<P>();
            let tok = guard.borrow_mut();
            if current.wakeup_reason(tok) != WakeupReason::MsgQueueDataAvailable {
                self.consumer_wait.remove(tok, current);
                return Err(RecvError::Timeout);
            }
        }
    }
}

impl<P: Port, T: Copy, const N: usize> Default for MsgQueue<P, T, N> {
    fn default() -> Self {
        Self::new()
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
    fn send_then_receive_preserves_fifo_order() {
        let _serial = crate::tests::serialize();
        static Q: MsgQueue<MockPort, u32, 4> = MsgQueue::new();
        static IDLE: TaskCb<MockPort> = TaskCb::new("idle", |_| {}, core::ptr::null(), 255);
        static TIMER: TaskCb<MockPort> = TaskCb::new("timer", |_| {}, core::ptr::null(), 254);
        static A: TaskCb<MockPort> = TaskCb::new("a", |_| {}, core::ptr::null(), 10);
        static KERNEL_CELL: KernelCell<MockPort> = KernelCell::uninit();
        let kernel = KERNEL_CELL.init(Kernel::new(&IDLE, TimerService::new(&TIMER)));

        assert_eq!(Q.send(kernel, &A, 1, config::TASK_NO_WAIT), Ok(()));
        assert_eq!(Q.send(kernel, &A, 2, config::TASK_NO_WAIT), Ok(()));
        assert_eq!(Q.receive(kernel, &A, config::TASK_NO_WAIT), Ok(1));
        assert_eq!(Q.receive(kernel, &A, config::TASK_NO_WAIT), Ok(2));
        assert_eq!(Q.receive(kernel, &A, config::TASK_NO_WAIT), Err(RecvError::NoData));
    }

    /// Scenario 4 (§8): capacity-2 queue, three sends back-to-back. The
    /// third blocks until a receive makes room, then completes.
    #[test]
    fn bounded_queue_backpressure() {
        let _serial = crate::tests::serialize();
        static Q: MsgQueue<MockPort, u32, 2> = MsgQueue::new();
        static IDLE: TaskCb<MockPort> = TaskCb::new("idle", |_| {}, core::ptr::null(), 255);
        static TIMER: TaskCb<MockPort> = TaskCb::new("timer", |_| {}, core::ptr::null(), 254);
        static PRODUCER: TaskCb<MockPort> = TaskCb::new("producer", |_| {}, core::ptr::null(), 10);
        static CONSUMER: TaskCb<MockPort> = TaskCb::new("consumer", |_| {}, core::ptr::null(), 10);
        static KERNEL_CELL: KernelCell<MockPort> = KernelCell::uninit();
        let kernel = KERNEL_CELL.init(Kernel::new(&IDLE, TimerService::new(&TIMER)));

        assert_eq!(Q.send(kernel, &PRODUCER, 1, config::TASK_NO_WAIT), Ok(()));
        assert_eq!(Q.send(kernel, &PRODUCER, 2, config::TASK_NO_WAIT), Ok(()));

        let handle = std::thread::spawn(move || {
            bind_current_thread_to_task(&PRODUCER);
            Q.send(kernel, &PRODUCER, 3, config::TASK_MAX_WAIT)
        });

        loop {
            let mut guard = lock_cpu::<MockPort>();
            let tok = guard.borrow_mut();
            if PRODUCER.status(tok) == TaskStatus::Blocked {
                break;
            }
            drop(guard);
            std::thread::yield_now();
        }

        assert_eq!(Q.receive(kernel, &CONSUMER, config::TASK_NO_WAIT), Ok(1));
        wake_task(&PRODUCER);
        assert_eq!(handle.join().unwrap(), Ok(()));

        let mut guard = lock_cpu::<MockPort>();
        let tok = guard.borrow_mut();
        assert_eq!(Q.len(tok), 2);
    }
}
