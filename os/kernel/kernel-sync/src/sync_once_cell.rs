use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

const UNINIT: u8 = 0;
const INITING: u8 = 1;
const READY: u8 = 2;

/// A cell written at most once and readable from any core afterwards.
///
/// Used to publish process-wide singletons (such as the installed page
/// allocator) without a heap and without `static mut`.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Returns `Some(&T)` if already initialized.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY is only stored after the value was written.
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Claim the cell for writing; `false` if someone else already did.
    #[inline]
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(UNINIT, INITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Write `value` and publish it to other cores.
    ///
    /// # Safety
    /// The caller must have won [`claim`](Self::claim).
    unsafe fn publish(&self, value: T) -> &T {
        let slot = unsafe { &mut *self.value.get() };
        let value = slot.write(value);
        self.state.store(READY, Ordering::Release);
        value
    }

    fn wait_ready(&self) -> &T {
        loop {
            if let Some(value) = self.get() {
                return value;
            }
            spin_loop();
        }
    }

    /// Initialize with `value`, or hand it back if the cell was already
    /// initialized (or is being initialized concurrently).
    ///
    /// # Errors
    /// Returns `Err(value)` when the cell is not empty.
    pub fn set(&self, value: T) -> Result<&T, T> {
        if self.claim() {
            // SAFETY: we won the claim.
            Ok(unsafe { self.publish(value) })
        } else {
            Err(value)
        }
    }

    /// Initialize at most once and return `&T`.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(v) = self.get() {
            return v;
        }

        if self.claim() {
            // SAFETY: we won the claim.
            return unsafe { self.publish(init()) };
        }

        self.wait_ready()
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // SAFETY: READY means the value is initialized and we have exclusive access.
            unsafe { self.value.get_mut().assume_init_drop() }
        }
    }
}

// Safety: shared after READY; initialization is single-writer.
unsafe impl<T: Sync + Send> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}
