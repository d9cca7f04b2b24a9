//! The kernel's sole hardware-facing seam.
//!
//! Register save/restore, MSP/PSP manipulation, the tail-chained switch
//! interrupt, the supervisor trap, and system-tick configuration are all
//! represented here as a contract, not an implementation. A board
//! integration implements [`Port`] once, in the application crate, using
//! real Cortex-M assembly; this crate never does.
use crate::task::TaskCb;

/// Hooks a board integration supplies so the portable kernel core can drive a
/// real Cortex-M-class CPU.
///
/// # Safety
///
/// Implementors must guarantee:
/// - [`enter_critical_section`]/[`exit_critical_section`] form a matched,
///   non-nestable pair around each call the kernel makes into them (the
///   kernel never calls `enter_critical_section` again before a matching
///   `exit_critical_section`).
/// - [`dispatch_first_task`] never returns.
/// - [`request_context_switch`] does not itself perform the switch; it only
///   arranges for the tail-chained switch interrupt (`CONTEXT_SWITCH_REQUEST`)
///   to run once the current interrupt context (if any) unwinds.
///
/// [`enter_critical_section`]: Port::enter_critical_section
/// [`exit_critical_section`]: Port::exit_critical_section
/// [`dispatch_first_task`]: Port::dispatch_first_task
/// [`request_context_switch`]: Port::request_context_switch
pub unsafe trait Port: Sized + 'static {
    /// `ENTER_CRITICAL_SECTION`: globally disable interrupts.
    fn enter_critical_section();

    /// `EXIT_CRITICAL_SECTION`: globally reenable interrupts.
    fn exit_critical_section();

    /// Report whether the caller is currently inside a critical section.
    /// Used only by diagnostics (`Debug` impls); never on a kernel hot path.
    fn in_critical_section() -> bool;

    /// `CONTEXT_SWITCH_REQUEST`: pend the tail-chained, lowest-priority
    /// interrupt that performs the actual register-file save/restore. Must be
    /// callable from within a critical section or from any interrupt
    /// context; the kernel always calls it after leaving its own critical
    /// section (§5).
    fn request_context_switch();

    /// `PRIVILEGE_TRAP`: issue the supervisor call that lets an unprivileged
    /// task reach [`crate::scheduler::Kernel::yield_now`]'s privileged body.
    /// Only called when [`tasks_run_priv`](crate) is enabled and
    /// [`is_privileged`](Port::is_privileged) reports `false`.
    fn request_privilege_trap();

    /// Whether the calling context already executes with kernel privileges.
    fn is_privileged() -> bool;

    /// Suspend the calling task until the kernel next selects it to run
    /// again. On real hardware this has no implementation of its own: the
    /// tail-chained switch interrupt swaps `stackPointer` out from under the
    /// caller, so the call simply never returns to this point until the
    /// task's own stack is restored. A host-side test harness instead blocks
    /// the underlying OS thread standing in for the task.
    fn suspend_current_task();

    /// The non-returning jump performed once by
    /// [`crate::scheduler::Kernel::start`]: switch the CPU onto `task`'s
    /// stack and branch to its entry point.
    fn dispatch_first_task(task: &'static TaskCb<Self>) -> !;
}
