use crate::diagnostics::InvariantViolation;
use crate::error::{AllocError, FreeError};
use crate::frame_alloc::{PageAllocStats, PageFrameAllocator};
use crate::phys_mapper::PhysMapper;
use core::fmt;
use core::mem::ManuallyDrop;
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};
use kernel_sync::SpinLock;
use log::warn;

/// A [`PageFrameAllocator`] shared between cores and interrupt handlers.
///
/// Every call holds one [`SpinLock`] for its whole duration, so no caller
/// ever observes a half-finished allocate or free. The lock is taken with
/// local interrupts masked; a handler can only run once the interrupted
/// call has released it.
pub struct LockedPageAllocator<'a, S: PageSize = Size4K> {
    inner: SpinLock<PageFrameAllocator<'a, S>>,
}

impl<'a, S: PageSize> LockedPageAllocator<'a, S> {
    #[must_use]
    pub const fn new(allocator: PageFrameAllocator<'a, S>) -> Self {
        Self {
            inner: SpinLock::new(allocator),
        }
    }

    /// See [`PageFrameAllocator::allocate`].
    ///
    /// # Errors
    /// As [`PageFrameAllocator::allocate`].
    pub fn allocate(&self, pages: usize) -> Result<PhysicalAddress, AllocError> {
        self.inner.with_lock_irq(|alloc| alloc.allocate(pages))
    }

    /// Allocate `pages` pages and fill them with zeros through `mapper`.
    ///
    /// The pages are cleared after the lock is released; they already belong
    /// to the caller at that point.
    ///
    /// # Errors
    /// As [`PageFrameAllocator::allocate`].
    ///
    /// # Safety
    /// `mapper` must map every page this allocator manages writable.
    pub unsafe fn allocate_zeroed<M: PhysMapper>(
        &self,
        pages: usize,
        mapper: &M,
    ) -> Result<PhysicalAddress, AllocError> {
        let addr = self.allocate(pages)?;
        unsafe { zero_pages::<S, M>(mapper, addr, pages) };
        Ok(addr)
    }

    /// See [`PageFrameAllocator::free`].
    ///
    /// # Errors
    /// As [`PageFrameAllocator::free`].
    pub fn free(&self, addr: PhysicalAddress) -> Result<usize, FreeError> {
        self.inner.with_lock_irq(|alloc| alloc.free(addr))
    }

    #[must_use]
    pub fn stats(&self) -> PageAllocStats {
        self.inner.with_lock_irq(|alloc| alloc.stats())
    }

    /// See [`PageFrameAllocator::check`].
    ///
    /// # Errors
    /// The first broken invariant.
    pub fn check(&self) -> Result<(), InvariantViolation> {
        self.inner.with_lock_irq(|alloc| alloc.check())
    }

    /// Run `f` with the lock held, for sequences that must not interleave
    /// with other callers.
    pub fn with<R>(&self, f: impl FnOnce(&mut PageFrameAllocator<'a, S>) -> R) -> R {
        self.inner.with_lock_irq(f)
    }

    /// Allocate `pages` pages that are freed again when the returned
    /// [`PageBlock`] is dropped.
    ///
    /// # Errors
    /// As [`PageFrameAllocator::allocate`].
    pub fn allocate_block(&self, pages: usize) -> Result<PageBlock<'_, 'a, S>, AllocError> {
        let addr = self.allocate(pages)?;
        Ok(PageBlock {
            owner: self,
            addr,
            pages,
        })
    }

    /// [`allocate_block`](Self::allocate_block) with the pages zero-filled.
    ///
    /// # Errors
    /// As [`PageFrameAllocator::allocate`].
    ///
    /// # Safety
    /// As [`allocate_zeroed`](Self::allocate_zeroed).
    pub unsafe fn allocate_block_zeroed<M: PhysMapper>(
        &self,
        pages: usize,
        mapper: &M,
    ) -> Result<PageBlock<'_, 'a, S>, AllocError> {
        let block = self.allocate_block(pages)?;
        unsafe { zero_pages::<S, M>(mapper, block.addr, pages) };
        Ok(block)
    }

    #[must_use]
    pub fn into_inner(self) -> PageFrameAllocator<'a, S> {
        self.inner.into_inner()
    }
}

impl<S: PageSize> fmt::Debug for LockedPageAllocator<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Some(alloc) => fmt::Debug::fmt(&*alloc, f),
            None => f.write_str("LockedPageAllocator { <locked> }"),
        }
    }
}

/// Clear `pages` pages of size `S` starting at `addr`, one page at a time.
///
/// # Safety
/// `mapper` must map each of the pages writable and nothing else may be
/// accessing them.
#[allow(clippy::cast_possible_truncation)]
unsafe fn zero_pages<S: PageSize, M: PhysMapper>(
    mapper: &M,
    addr: PhysicalAddress,
    pages: usize,
) {
    for page in 0..pages as u64 {
        unsafe {
            let ptr = mapper.phys_to_mut_ptr(addr + page * S::SIZE);
            core::ptr::write_bytes(ptr, 0, S::SIZE as usize);
        }
    }
}

/// Pages owned by the holder and returned to their allocator on drop.
///
/// The block is identified by its base address only. Passing
/// [`addr`](Self::addr) to [`LockedPageAllocator::free`] by hand and then
/// dropping the block is a double free; if the base was handed out again in
/// between, the drop would release the new owner's pages. Drop therefore
/// only frees while the base still heads a live block of exactly
/// [`pages`](Self::pages) pages, and logs a warning otherwise. Use
/// [`leak`](Self::leak) to take over the pages instead.
#[must_use = "dropping a PageBlock frees its pages immediately"]
pub struct PageBlock<'l, 'a, S: PageSize = Size4K> {
    owner: &'l LockedPageAllocator<'a, S>,
    addr: PhysicalAddress,
    pages: usize,
}

impl<S: PageSize> PageBlock<'_, '_, S> {
    #[inline]
    #[must_use]
    pub const fn addr(&self) -> PhysicalAddress {
        self.addr
    }

    #[inline]
    #[must_use]
    pub const fn pages(&self) -> usize {
        self.pages
    }

    #[inline]
    #[must_use]
    pub const fn len_bytes(&self) -> u64 {
        self.pages as u64 * S::SIZE
    }

    /// Give up ownership and return the base address; the pages stay allocated
    /// until someone passes it to [`LockedPageAllocator::free`].
    #[must_use = "the leaked address is the only way to free the pages"]
    pub fn leak(self) -> PhysicalAddress {
        ManuallyDrop::new(self).addr
    }
}

impl<S: PageSize> Drop for PageBlock<'_, '_, S> {
    fn drop(&mut self) {
        let (addr, pages) = (self.addr, self.pages);
        self.owner.with(|alloc| {
            if alloc.block_len(addr) == Some(pages) {
                // Cannot fail: the block was just found live.
                let _ = alloc.free(addr);
            } else {
                warn!("page block {addr} ({pages} pages) is no longer live; not freeing");
            }
        });
    }
}

impl<S: PageSize> fmt::Debug for PageBlock<'_, '_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBlock")
            .field("addr", &self.addr)
            .field("pages", &self.pages)
            .finish()
    }
}
