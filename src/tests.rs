//! Host-side `Port` used by this crate's own test suite.
//!
//! Most tests exercise the scheduler and primitives at the bookkeeping
//! level directly (no task ever needs to truly suspend the Rust call stack,
//! since `Kernel::*` transition functions are synchronous), so most of
//! `MockPort` is a bare-bones recorder. A handful of scenario tests need a
//! task to genuinely block and later resume; for those, `MockPort` stands
//! an OS thread in for the task (as `r3_port_std` does for real application
//! binaries) and parks it on a condvar gate. Unlike `r3_port_std`, nothing
//! here automates *when* a parked thread wakes — scenario tests call
//! [`wake_task`] explicitly at the point the scheduler would hand the CPU
//! back to it, which keeps the mock a simple, explicit stand-in rather than
//! a full preemption simulator.
#![cfg(test)]
extern crate std;

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use crate::boundary::Port;
use crate::task::TaskCb;

static IN_CRITICAL: AtomicBool = AtomicBool::new(false);

/// `MockPort`'s critical-section flag and gate registry are process-wide
/// (real hardware only has one interrupt-enable flag too), so tests that
/// use it must not run concurrently on Rust's multi-threaded test runner.
/// Every test takes this lock first.
static TEST_SERIAL: Mutex<()> = Mutex::new(());

pub fn serialize() -> std::sync::MutexGuard<'static, ()> {
    TEST_SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MockPort;

struct Gate {
    woken: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn park(&self) {
        let mut woken = self.woken.lock().unwrap();
        while !*woken {
            woken = self.cv.wait(woken).unwrap();
        }
        *woken = false;
    }

    fn release(&self) {
        let mut woken = self.woken.lock().unwrap();
        *woken = true;
        self.cv.notify_one();
    }
}

fn gate_registry() -> &'static Mutex<HashMap<usize, Arc<Gate>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<usize, Arc<Gate>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn gate_for(key: usize) -> Arc<Gate> {
    gate_registry()
        .lock()
        .unwrap()
        .entry(key)
        .or_insert_with(|| Arc::new(Gate::new()))
        .clone()
}

thread_local! {
    static CURRENT_TASK_KEY: Cell<Option<usize>> = Cell::new(None);
}

/// Associate the calling OS thread with `task`, so a later
/// `Port::suspend_current_task()` call on this thread parks on `task`'s
/// gate. Call once at the top of a scenario test's task-body closure.
pub fn bind_current_thread_to_task<P: Port>(task: &'static TaskCb<P>) {
    let key = task as *const TaskCb<P> as *const () as usize;
    CURRENT_TASK_KEY.with(|c| c.set(Some(key)));
}

/// Release the OS thread parked on `task`'s gate, standing in for the
/// scheduler having dispatched `task`.
pub fn wake_task<P: Port>(task: &'static TaskCb<P>) {
    let key = task as *const TaskCb<P> as *const () as usize;
    gate_for(key).release();
}

unsafe impl Port for MockPort {
    fn enter_critical_section() {
        let was_locked = IN_CRITICAL.swap(true, Ordering::AcqRel);
        assert!(!was_locked, "MockPort critical sections do not nest");
    }

    fn exit_critical_section() {
        let was_locked = IN_CRITICAL.swap(false, Ordering::AcqRel);
        assert!(was_locked, "exit_critical_section without a matching enter");
    }

    fn in_critical_section() -> bool {
        IN_CRITICAL.load(Ordering::Acquire)
    }

    fn request_context_switch() {
        // On real hardware this pends the tail interrupt that performs the
        // register swap. The mock has no equivalent asynchronous mechanism;
        // scenario tests instead call `wake_task` at the point dispatch
        // would happen.
    }

    fn request_privilege_trap() {}

    fn is_privileged() -> bool {
        true
    }

    fn suspend_current_task() {
        let key = CURRENT_TASK_KEY.with(|c| c.get());
        if let Some(key) = key {
            gate_for(key).park();
        }
        // A call from a thread never bound to a task (i.e. the test's main
        // thread driving bookkeeping-level assertions) is a no-op: nothing
        // is actually blocking the Rust call stack in that style of test.
    }

    fn dispatch_first_task(_task: &'static TaskCb<Self>) -> ! {
        unreachable!("MockPort-based tests never call Kernel::start")
    }
}
