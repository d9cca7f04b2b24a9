//! Compile-time configuration constants.
//!
//! `MUTEX_USE_PRIORITY_INHERITANCE` and `TASKS_RUN_PRIV` are Cargo features
//! (`priority_inheritance`, `tasks_run_priv`) rather than constants, the same
//! way `priority_boost` and `system_time` gate compile-time kernel
//! configuration elsewhere in this family of kernels.

/// A task priority. 0 is the highest priority, 255 the lowest.
pub type Priority = u8;

/// Number of distinct priority levels supported by the ready queue.
pub const NUM_PRIORITIES: usize = 256;

/// The lowest-priority (numerically greatest) level, reserved for the idle
/// task by convention; applications may also use it.
pub const LOWEST_PRIORITY: Priority = (NUM_PRIORITIES - 1) as Priority;

/// A duration expressed in ticks.
pub type Ticks = u32;

/// Wait forever. Disables the tick-based countdown for a blocked task.
pub const TASK_MAX_WAIT: Ticks = 0xFFFF_FFFF;

/// Return immediately instead of waiting.
pub const TASK_NO_WAIT: Ticks = 0;

/// Whether mutexes apply priority inheritance (§4.3). Compiled out entirely
/// when the `priority_inheritance` feature is disabled, turning a mutex into
/// a plain FIFO lock with no priority bookkeeping.
#[inline(always)]
pub const fn priority_inheritance_enabled() -> bool {
    cfg!(feature = "priority_inheritance")
}

/// Whether tasks execute unprivileged and must trap into the supervisor to
/// reach the scheduler (§6).
#[inline(always)]
pub const fn tasks_run_priv() -> bool {
    cfg!(feature = "tasks_run_priv")
}

/// Fixed capacity of the expired-timer-handler dispatch queue (§4.7, §12).
/// A `const` rather than a constructor argument since the kernel carries no
/// allocator; overflow saturates
/// [`crate::timer::TimerService::dropped_count`] instead of panicking or
/// blocking the tick handler.
pub const TIMER_DISPATCH_CAPACITY: usize = 16;
