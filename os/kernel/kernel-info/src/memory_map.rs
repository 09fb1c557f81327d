//! # Boot Memory Map
//!
//! The bootloader hands the kernel a list of physical regions tagged with
//! their type. The page frame allocator only consumes the usable part of
//! it, trimmed to whole pages and with every other region cut out as a
//! hole. [`MemoryMap::usable_ranges`] performs that reduction without a heap.

use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalAddressRange};

/// What a region of the boot memory map contains.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemoryRegionKind {
    /// General purpose RAM free for the kernel to manage.
    Usable = 0,
    /// Reserved by the platform; never touch.
    Reserved = 1,
    /// Firmware code/data that must survive (ACPI NVS, runtime services).
    Firmware = 2,
    /// The loaded kernel image.
    KernelImage = 3,
    /// Memory-mapped device registers.
    Mmio = 4,
    /// Bootloader data still referenced during early boot.
    Bootloader = 5,
}

impl MemoryRegionKind {
    #[inline]
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Usable)
    }
}

/// One entry of the boot memory map.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub range: PhysicalAddressRange,
    pub kind: MemoryRegionKind,
}

impl MemoryRegion {
    #[must_use]
    pub const fn new(start: u64, end: u64, kind: MemoryRegionKind) -> Self {
        Self {
            range: PhysicalAddressRange::new(PhysicalAddress::new(start), PhysicalAddress::new(end)),
            kind,
        }
    }

    #[must_use]
    pub const fn usable(start: u64, end: u64) -> Self {
        Self::new(start, end, MemoryRegionKind::Usable)
    }

    #[must_use]
    pub const fn reserved(start: u64, end: u64) -> Self {
        Self::new(start, end, MemoryRegionKind::Reserved)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryMapError {
    #[error("memory map yields more than {capacity} usable ranges")]
    TooManyRanges { capacity: usize },
}

/// Borrowed view of the bootloader's memory map.
///
/// Entries may come in any order and usable entries may overlap each other
/// or overlap non-usable ones; non-usable entries always win.
#[derive(Debug, Copy, Clone)]
pub struct MemoryMap<'a> {
    regions: &'a [MemoryRegion],
}

impl<'a> MemoryMap<'a> {
    #[must_use]
    pub const fn new(regions: &'a [MemoryRegion]) -> Self {
        Self { regions }
    }

    /// Write the page-aligned usable ranges into `out` and return how many
    /// were written.
    ///
    /// Usable entries are shrunk inward to `S` boundaries, non-usable entries
    /// are widened outward to `S` boundaries and cut out. The result is sorted
    /// by address, free of empty ranges, and touching or overlapping pieces
    /// are merged.
    ///
    /// # Errors
    /// [`MemoryMapError::TooManyRanges`] if the pieces do not fit into `out`.
    pub fn usable_ranges<S: PageSize>(
        &self,
        out: &mut [PhysicalAddressRange],
    ) -> Result<usize, MemoryMapError> {
        let mut count = 0;
        for region in self.regions.iter().filter(|r| r.kind.is_usable()) {
            if let Some(range) = region.range.shrink_to_pages::<S>() {
                push(out, &mut count, range)?;
            }
        }

        for hole in self.regions.iter().filter(|r| !r.kind.is_usable()) {
            let hole = hole.range.expand_to_pages::<S>();
            if hole.is_empty() {
                continue;
            }

            // Pieces pushed while cutting lie outside `hole`, so revisiting them is harmless.
            let mut i = 0;
            while i < count {
                match out[i].split_around(&hole) {
                    (Some(below), Some(above)) => {
                        out[i] = below;
                        push(out, &mut count, above)?;
                        i += 1;
                    }
                    (Some(piece), None) | (None, Some(piece)) => {
                        out[i] = piece;
                        i += 1;
                    }
                    (None, None) => {
                        count -= 1;
                        out[i] = out[count];
                    }
                }
            }
        }

        let ranges = &mut out[..count];
        ranges.sort_unstable_by_key(|r| r.start);

        let mut merged = 0;
        for i in 0..count {
            let next = ranges[i];
            if merged > 0 && next.start <= ranges[merged - 1].end {
                let last = &mut ranges[merged - 1];
                last.end = last.end.max(next.end);
            } else {
                ranges[merged] = next;
                merged += 1;
            }
        }
        Ok(merged)
    }
}

fn push(
    out: &mut [PhysicalAddressRange],
    count: &mut usize,
    range: PhysicalAddressRange,
) -> Result<(), MemoryMapError> {
    let capacity = out.len();
    let slot = out
        .get_mut(*count)
        .ok_or(MemoryMapError::TooManyRanges { capacity })?;
    *slot = range;
    *count += 1;
    Ok(())
}
