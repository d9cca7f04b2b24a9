//! A small preemptive real-time kernel core for single-core ARM
//! Cortex-M-class microcontrollers.
//!
//! Fixed-priority preemptive scheduling of statically defined tasks, plus
//! the synchronization primitives used to coordinate them: a mutex with
//! priority inheritance, a counting semaphore with direct handoff, a
//! condition variable, a bounded FIFO message queue, and a software timer
//! subsystem serviced outside interrupt context.
//!
//! Everything CPU-specific — register save/restore, the tail-chained
//! context-switch interrupt, the supervisor trap, tick source configuration
//! — is named only at the [`boundary::Port`] seam. A board integration
//! implements [`boundary::Port`] once, in the application crate; this crate
//! never touches real hardware registers.
//!
//! The kernel itself never logs a scheduling or primitive decision (every
//! decision is made with interrupts disabled, and formatting is not
//! something a tick ISR should do). Enable `feature = "trace"` to pull in
//! the optional `log`-based facade used by an application integrator's own
//! `log::Log` sink for boot/assertion-failure visibility, or by this crate's
//! own test harness; no hot path calls into it.
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]

pub mod boundary;
pub mod config;
pub mod error;

mod blocked_queue;
mod klock;
mod queue;
mod readyqueue;
mod utils;

pub mod condvar;
pub mod msgqueue;
pub mod mutex;
pub mod scheduler;
pub mod semaphore;
pub mod task;
pub mod timer;

#[cfg(test)]
mod tests;

pub use boundary::Port;
pub use condvar::CondVar;
pub use config::{Priority, Ticks, TASK_MAX_WAIT, TASK_NO_WAIT};
pub use msgqueue::MsgQueue;
pub use mutex::Mutex;
pub use scheduler::{Kernel, KernelCell};
pub use semaphore::Semaphore;
pub use task::{BlockedReason, TaskCb, TaskEntry, TaskStatus, WakeupReason};
pub use timer::{Timer, TimerMode, TimerService};
