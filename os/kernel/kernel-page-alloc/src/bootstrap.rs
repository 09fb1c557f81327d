//! # Boot-time Bootstrap
//!
//! Builds the kernel's page allocator straight from the bootloader's memory
//! map, before any heap exists. The frame table and the free-run index need
//! storage proportional to the managed span; that storage is carved from
//! the first usable range large enough to hold it and removed from the pages
//! the allocator hands out.
//!
//! ```text
//!  usable ranges      ┌──────────┐   ┌──────────────────────────┐
//!                     │    A     │   │            B             │
//!                     └──────────┘   └──────────────────────────┘
//!  after carving      ┌───┬──────┐   ┌──────────────────────────┐
//!                     │ M │  A'  │   │            B             │
//!                     └───┴──────┘   └──────────────────────────┘
//!                      └─ frame table ++ free-run slots (reserved)
//! ```

use crate::error::InitError;
use crate::frame::FrameRecord;
use crate::frame_alloc::PageFrameAllocator;
use crate::free_list::{FreeRun, max_free_runs};
use crate::phys_mapper::PhysMapper;
use core::mem::{align_of, size_of};
use kernel_info::memory::LOW_MEMORY_END;
use kernel_info::memory_map::{MemoryMap, MemoryMapError};
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalAddressRange, Size4K};
use log::info;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    MemoryMap(#[from] MemoryMapError),
    #[error(transparent)]
    Init(#[from] InitError),
    #[error("no usable range can hold {bytes} bytes of allocator metadata")]
    NoRoomForMetadata { bytes: usize },
    #[error("physical mapping does not preserve frame table alignment")]
    MisalignedMapping,
}

/// An allocator built by [`init_from_memory_map`], and where its metadata lives.
#[derive(Debug)]
pub struct BootAllocator<'a> {
    pub allocator: PageFrameAllocator<'a>,
    /// Physical pages holding the frame table and the free-run index.
    pub metadata: PhysicalAddressRange,
}

/// Bytes of frame table plus free-run index for a span of `frames` frames.
#[must_use]
pub const fn metadata_bytes(frames: usize) -> usize {
    frames * size_of::<FrameRecord>() + max_free_runs(frames) * size_of::<FreeRun>()
}

/// Build the allocator over the usable memory described by `map`.
///
/// Memory below [`LOW_MEMORY_END`] is never managed, whatever the map says.
///
/// `scratch` receives the usable ranges; it bounds how fragmented the map
/// may be (see [`kernel_info::memory::MAX_USABLE_RANGES`]).
///
/// # Errors
/// A [`BootstrapError`]; the kernel cannot continue without an allocator.
///
/// # Safety
/// Every usable range in `map` must be unused RAM that `mapper` maps
/// writable for `'a`, and nothing else may access it for `'a`.
pub unsafe fn init_from_memory_map<'a, M: PhysMapper>(
    map: &MemoryMap<'_>,
    mapper: &M,
    scratch: &mut [PhysicalAddressRange],
) -> Result<BootAllocator<'a>, BootstrapError> {
    let count = map.usable_ranges::<Size4K>(scratch)?;
    let count = clip_low_memory(&mut scratch[..count]);
    let ranges = &mut scratch[..count];
    let (Some(first), Some(last)) = (ranges.first(), ranges.last()) else {
        return Err(InitError::NoMemory.into());
    };

    let span = PhysicalAddressRange::new(first.start, last.end);
    let frames =
        usize::try_from(span.page_count::<Size4K>()).map_err(|_| InitError::AddressOverflow)?;
    let bytes = metadata_bytes(frames);
    let metadata_len = (bytes as u64).next_multiple_of(Size4K::SIZE);

    let slot = ranges
        .iter()
        .position(|r| r.len() >= metadata_len)
        .ok_or(BootstrapError::NoRoomForMetadata { bytes })?;
    let metadata = PhysicalAddressRange::from_len(ranges[slot].start, metadata_len)
        .ok_or(InitError::AddressOverflow)?;

    ranges[slot].start = metadata.end;
    let count = if ranges[slot].is_empty() {
        ranges.copy_within(slot + 1.., slot);
        count - 1
    } else {
        count
    };

    let base = unsafe { mapper.phys_to_mut_ptr(metadata.start) };
    if base.align_offset(align_of::<FreeRun>()) != 0 {
        return Err(BootstrapError::MisalignedMapping);
    }

    // All-zero records are free frames and all-zero runs are empty slots.
    unsafe { core::ptr::write_bytes(base, 0, bytes) };
    let table_bytes = (frames * size_of::<FrameRecord>()) as u64;
    let frame_table: &'a mut [FrameRecord] =
        unsafe { mapper.phys_to_mut_slice(metadata.start, frames) };
    let run_slots: &'a mut [FreeRun] =
        unsafe { mapper.phys_to_mut_slice(metadata.start + table_bytes, max_free_runs(frames)) };

    let allocator = PageFrameAllocator::new(&ranges[..count], frame_table, run_slots)?;
    info!("page allocator metadata: {bytes} bytes at {metadata}");
    Ok(BootAllocator {
        allocator,
        metadata,
    })
}

/// Drop everything below [`LOW_MEMORY_END`] from the sorted `ranges`; returns the new count.
fn clip_low_memory(ranges: &mut [PhysicalAddressRange]) -> usize {
    let floor = PhysicalAddress::new(LOW_MEMORY_END);
    let mut kept = 0;
    for i in 0..ranges.len() {
        let mut range = ranges[i];
        range.start = range.start.max(floor);
        if !range.is_empty() {
            ranges[kept] = range;
            kept += 1;
        }
    }
    kept
}
