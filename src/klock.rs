//! Kernel state locking mechanism.
//!
//! Every piece of mutable kernel state (task control blocks, wait queues,
//! primitive scalars) lives inside a [`CpuLockCell`]. The cell can only be
//! read or written while holding a [`CpuLockToken`], which can only be
//! obtained by actually disabling interrupts on the target ([`lock_cpu`]).
//! This turns "touched kernel state outside a critical section" from a
//! runtime race into a borrow-checker error.
use core::{fmt, marker::PhantomData, ops};
use tokenlock::UnsyncTokenLock;

use crate::boundary::Port;

/// Per-`Port` tag type so that two different `Port` implementations never
/// share a token type (and thus never alias their `CpuLockCell`s).
pub struct CpuLockTag<P>(PhantomData<P>);

/// The key that "unlocks" [`CpuLockCell`].
pub type CpuLockToken<P> = tokenlock::UnsyncSingletonToken<CpuLockTag<P>>;

/// The keyhole type used by [`UnsyncTokenLock`] to pair with [`CpuLockToken`].
pub type CpuLockKeyhole<P> = tokenlock::SingletonTokenId<CpuLockTag<P>>;

/// A cell that can only be accessed through a [`CpuLockToken`], i.e. while
/// interrupts are disabled on the target.
pub struct CpuLockCell<P, T: ?Sized>(UnsyncTokenLock<T, CpuLockKeyhole<P>>);

impl<P, T> CpuLockCell<P, T> {
    pub const fn new(x: T) -> Self {
        Self(UnsyncTokenLock::new(CpuLockKeyhole::INIT, x))
    }
}

impl<P, T: Copy> CpuLockCell<P, T> {
    #[inline]
    pub fn get(&self, token: &CpuLockToken<P>) -> T {
        *self.0.read(token)
    }

    #[inline]
    pub fn set(&self, token: &mut CpuLockToken<P>, value: T) {
        *self.0.write(token) = value;
    }

    #[inline]
    pub fn replace(&self, token: &mut CpuLockToken<P>, value: T) -> T {
        core::mem::replace(self.0.write(token), value)
    }
}

impl<P, T> CpuLockCell<P, T> {
    #[inline]
    pub fn with_ref<'a, R>(&'a self, token: &'a CpuLockToken<P>, f: impl FnOnce(&'a T) -> R) -> R {
        f(self.0.read(token))
    }

    #[inline]
    pub fn with_mut<'a, R>(
        &'a self,
        token: &'a mut CpuLockToken<P>,
        f: impl FnOnce(&'a mut T) -> R,
    ) -> R {
        f(self.0.write(token))
    }
}

impl<P, T: ?Sized> ops::Deref for CpuLockCell<P, T> {
    type Target = UnsyncTokenLock<T, CpuLockKeyhole<P>>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<P, T: fmt::Debug + Copy> fmt::Debug for CpuLockCell<P, T>
where
    P: Port,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(lock) = try_lock_cpu::<P>() {
            self.0.read(&lock).fmt(f)
        } else {
            f.write_str("CpuLockCell(<locked>)")
        }
    }
}

/// RAII guard representing an active critical section. Dropping it reenables
/// interrupts (invokes [`Port::exit_critical_section`]).
///
/// Each public kernel entry point acquires exactly one `CpuLockGuard`; nested
/// critical sections are expressed by passing the existing guard (or a
/// reborrow of its token) to helper functions rather than locking again. This
/// matches the one-singleton-token-per-critical-section discipline required
/// by `tokenlock`.
pub struct CpuLockGuard<P: Port> {
    token: CpuLockToken<P>,
}

impl<P: Port> CpuLockGuard<P> {
    #[inline]
    pub fn borrow_mut(&mut self) -> &mut CpuLockToken<P> {
        &mut self.token
    }
}

impl<P: Port> ops::Deref for CpuLockGuard<P> {
    type Target = CpuLockToken<P>;
    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

impl<P: Port> ops::DerefMut for CpuLockGuard<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.token
    }
}

impl<P: Port> Drop for CpuLockGuard<P> {
    fn drop(&mut self) {
        P::exit_critical_section();
    }
}

/// Disable interrupts and return an RAII guard that reenables them on drop.
///
/// Callers must never call this again while a guard obtained from a previous
/// call is still alive on the same call stack (see the module docs); doing so
/// would construct two live instances of a type that is required to be a
/// singleton, which is unsound. The kernel's own code never does this.
#[inline]
pub fn lock_cpu<P: Port>() -> CpuLockGuard<P> {
    P::enter_critical_section();
    // Safety: we just disabled interrupts, and by the discipline described
    // above this is the only live `CpuLockToken<P>` in existence.
    CpuLockGuard {
        token: unsafe { CpuLockToken::new_unchecked() },
    }
}

/// Like [`lock_cpu`], but only for use from `Debug` impls that may be called
/// while a critical section is already active (in which case we must not
/// recurse into the target's interrupt-disable primitive).
fn try_lock_cpu<P: Port>() -> Option<CpuLockGuard<P>> {
    if P::in_critical_section() {
        None
    } else {
        Some(lock_cpu())
    }
}
