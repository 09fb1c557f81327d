//! The kernel-wide page allocator behind `page_alloc` / `page_free`.
//!
//! Boot code builds one allocator (usually through
//! [`bootstrap::init_from_memory_map`](crate::bootstrap::init_from_memory_map))
//! and installs it exactly once; every later caller goes through the
//! installed [`LockedPageAllocator`].

use crate::error::{AllocError, FreeError};
use crate::frame_alloc::PageFrameAllocator;
use crate::locked::LockedPageAllocator;
use core::fmt;
use kernel_memory_addresses::PhysicalAddress;
use kernel_sync::SyncOnceCell;

static PAGE_ALLOCATOR: SyncOnceCell<LockedPageAllocator<'static>> = SyncOnceCell::new();

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GlobalError {
    #[error("no page allocator installed")]
    NotInstalled,
    #[error("a page allocator is already installed")]
    AlreadyInstalled,
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Free(#[from] FreeError),
}

/// Publish `allocator` as the kernel's page allocator.
///
/// # Errors
/// [`GlobalError::AlreadyInstalled`] on every call after the first.
pub fn install(
    allocator: PageFrameAllocator<'static>,
) -> Result<&'static LockedPageAllocator<'static>, GlobalError> {
    PAGE_ALLOCATOR
        .set(LockedPageAllocator::new(allocator))
        .map_err(|_| GlobalError::AlreadyInstalled)
}

/// Install the outcome of allocator initialization, halting the kernel if
/// initialization failed.
///
/// # Panics
/// If `init` is an error or an allocator is already installed.
#[must_use]
pub fn install_or_panic<E: fmt::Display>(
    init: Result<PageFrameAllocator<'static>, E>,
) -> &'static LockedPageAllocator<'static> {
    match init.map(install) {
        Ok(Ok(installed)) => installed,
        Ok(Err(err)) => panic!("page allocator: {err}"),
        Err(err) => panic!("page allocator initialization failed: {err}"),
    }
}

/// The installed allocator, if any.
#[must_use]
pub fn allocator() -> Option<&'static LockedPageAllocator<'static>> {
    PAGE_ALLOCATOR.get()
}

/// Allocate `npages` contiguous pages from the installed allocator.
///
/// # Errors
/// [`GlobalError::NotInstalled`] before [`install`], otherwise the
/// allocator's [`AllocError`].
pub fn page_alloc(npages: usize) -> Result<PhysicalAddress, GlobalError> {
    let allocator = allocator().ok_or(GlobalError::NotInstalled)?;
    Ok(allocator.allocate(npages)?)
}

/// Free the block starting at `addr`; returns its page count.
///
/// # Errors
/// [`GlobalError::NotInstalled`] before [`install`], otherwise the
/// allocator's [`FreeError`].
pub fn page_free(addr: PhysicalAddress) -> Result<usize, GlobalError> {
    let allocator = allocator().ok_or(GlobalError::NotInstalled)?;
    Ok(allocator.free(addr)?)
}
