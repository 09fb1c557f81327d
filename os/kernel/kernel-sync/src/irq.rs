//! Local interrupt masking.
//!
//! A lock shared with interrupt handlers must be taken with interrupts
//! masked on the current core; otherwise a handler that fires while the
//! lock is held spins on it forever. [`IrqGuard`] masks interrupts and
//! restores the previous state on drop, and [`SpinLock::lock_irq`] pairs
//! it with the lock.
//!
//! # Platform
//!
//! On bare-metal x86_64 this uses `pushfq/pop`, `cli` and `sti`, which are
//! only legal in ring 0. Hosted builds (unit tests, host tools) track a
//! software interrupt-enable flag instead, so the save/restore pairing can be
//! exercised without privileges.

use crate::{SpinLock, SpinLockGuard};
use core::ops::{Deref, DerefMut};

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod arch {
    /// `IF`, bit 9 of `RFLAGS`.
    const INTERRUPT_FLAG: u64 = 1 << 9;

    #[inline]
    pub fn interrupts_enabled() -> bool {
        let rflags: u64;
        unsafe {
            core::arch::asm!("pushfq; pop {}", out(reg) rflags, options(nostack, preserves_flags));
        }
        rflags & INTERRUPT_FLAG != 0
    }

    #[inline]
    pub fn disable() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enable() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod arch {
    use core::sync::atomic::{AtomicBool, Ordering};

    static ENABLED: AtomicBool = AtomicBool::new(true);

    #[inline]
    pub fn interrupts_enabled() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn disable() {
        ENABLED.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub fn enable() {
        ENABLED.store(true, Ordering::SeqCst);
    }
}

/// Whether interrupts are currently enabled on this core.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::interrupts_enabled()
}

/// Mask interrupts on this core (`cli`).
#[inline]
pub fn disable_interrupts() {
    arch::disable();
}

/// Unmask interrupts on this core (`sti`).
#[inline]
pub fn enable_interrupts() {
    arch::enable();
}

/// RAII guard that masks interrupts on creation and restores them on drop.
///
/// Interrupts are re-enabled on drop **only** if they were enabled when the
/// guard was created, so nested guards unwind to the outermost state.
#[must_use = "interrupts are restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct IrqGuard {
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    pub fn new() -> Self {
        let were_enabled = interrupts_enabled();
        if were_enabled {
            disable_interrupts();
        }
        Self { were_enabled }
    }

    /// Interrupt state this guard restores on drop.
    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            enable_interrupts();
        }
    }
}

/// A [`SpinLockGuard`] taken with interrupts masked.
///
/// Drops the lock first, then restores the interrupt state.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct IrqSpinLockGuard<'a, T> {
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard,
}

impl<T> SpinLock<T> {
    /// Mask interrupts, then spin until the lock is acquired.
    #[inline]
    pub fn lock_irq(&self) -> IrqSpinLockGuard<'_, T> {
        let irq = IrqGuard::new();
        IrqSpinLockGuard {
            guard: self.lock(),
            _irq: irq,
        }
    }

    /// [`with_lock`](Self::with_lock) with interrupts masked for the duration.
    #[inline]
    pub fn with_lock_irq<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock_irq();
        f(&mut guard)
    }
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
