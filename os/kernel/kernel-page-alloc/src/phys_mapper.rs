//! # Physical Memory Access
//!
//! The allocator's own metadata lives in physical memory carved out during
//! [bootstrap](crate::bootstrap). Code can only dereference virtual
//! addresses, so a [`PhysMapper`] tells the bootstrap, and the zero-filling
//! allocation paths of [`LockedPageAllocator`](crate::LockedPageAllocator),
//! where a physical address is visible in the current address space.
//!
//! - In the kernel, [`HhdmPhysMapper`] uses the higher-half direct map: every
//!   physical address `pa` is mapped at `HHDM_BASE + pa`.
//! - In tests, an [`OffsetPhysMapper`] points "physical" addresses into a
//!   host buffer.

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;

/// Translate physical addresses into pointers usable by the running code.
pub trait PhysMapper {
    /// Pointer through which the byte at `pa` can be accessed.
    ///
    /// # Safety
    /// The mapping must cover `pa`; dereferencing the result is only valid
    /// for memory that is actually mapped and writable.
    unsafe fn phys_to_mut_ptr(&self, pa: PhysicalAddress) -> *mut u8;

    /// View `len` values of `T` starting at `pa` as a mutable slice.
    ///
    /// # Safety
    /// In addition to [`phys_to_mut_ptr`](Self::phys_to_mut_ptr): the whole
    /// range must be mapped, aligned for `T`, hold valid `T` values, and not
    /// be aliased for `'a`.
    unsafe fn phys_to_mut_slice<'a, T>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [T] {
        let ptr = unsafe { self.phys_to_mut_ptr(pa) }.cast::<T>();
        unsafe { core::slice::from_raw_parts_mut(ptr, len) }
    }
}

/// [`PhysMapper`] for kernels with a higher-half direct map.
#[derive(Debug, Default, Copy, Clone)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_mut_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        (HHDM_BASE + pa.as_u64()) as *mut u8
    }
}

/// [`PhysMapper`] that adds a fixed (wrapping) offset to every physical address.
#[derive(Debug, Copy, Clone)]
pub struct OffsetPhysMapper {
    offset: u64,
}

impl OffsetPhysMapper {
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    /// Map physical address `phys_base` onto the host pointer `virt_base`.
    #[must_use]
    pub fn between(phys_base: PhysicalAddress, virt_base: *mut u8) -> Self {
        Self::new((virt_base as u64).wrapping_sub(phys_base.as_u64()))
    }
}

impl PhysMapper for OffsetPhysMapper {
    unsafe fn phys_to_mut_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        pa.as_u64().wrapping_add(self.offset) as *mut u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hhdm_adds_the_direct_map_base() {
        let ptr = unsafe { HhdmPhysMapper.phys_to_mut_ptr(PhysicalAddress::new(0x1234_5000)) };
        assert_eq!(ptr as u64, HHDM_BASE + 0x1234_5000);
    }

    #[test]
    fn offset_mapper_reaches_a_host_buffer() {
        let mut buffer = [0u64; 4];
        let phys = PhysicalAddress::new(0x20_0000);
        let mapper = OffsetPhysMapper::between(phys, buffer.as_mut_ptr().cast());

        let words: &mut [u64] = unsafe { mapper.phys_to_mut_slice(phys + 8, 2) };
        words.fill(7);
        assert_eq!(buffer, [0, 7, 7, 0]);
    }
}
