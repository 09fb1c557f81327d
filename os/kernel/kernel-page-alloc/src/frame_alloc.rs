//! # Page Frame Allocator
//!
//! Hands out runs of `n` contiguous, page-aligned physical pages and takes
//! them back, coalescing freed blocks with their free neighbors.
//!
//! ```text
//!          allocate(n)                          free(addr)
//!              │                                    │
//!   FreeRunIndex::find ── none ──► OutOfMemory      ├─ FrameTable lookup ── bad ──► InvalidFree
//!              │                                    │
//!   FreeRunIndex::carve                     FrameTable::mark_free
//!   FrameTable::mark_allocated              FreeRunIndex::insert (coalesce)
//! ```
//!
//! The frame table is the authority on every frame's state; the free-run
//! index mirrors its free frames as maximal runs ordered by address. Both
//! live in caller-provided storage, so the allocator needs no heap.
//!
//! Failed calls leave both structures untouched.

use crate::error::{AllocError, FreeError, InitError, InvalidFreeReason};
use crate::frame::{FrameIndex, FrameRecord};
use crate::frame_table::FrameTable;
use crate::free_list::{FreeRun, FreeRunIndex, Placement, max_free_runs};
use core::fmt;
use core::marker::PhantomData;
use kernel_memory_addresses::{
    PageSize, PhysicalAddress, PhysicalAddressRange, PhysicalPage, Size4K,
};
use log::{error, info, trace, warn};

/// Point-in-time counters of a [`PageFrameAllocator`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PageAllocStats {
    /// Pages the allocator can hand out (free plus allocated).
    pub total_pages: usize,
    pub free_pages: usize,
    pub allocated_pages: usize,
    /// Frames inside the managed span that are holes in the memory map.
    pub reserved_pages: usize,
    pub free_runs: usize,
    pub largest_free_run: usize,
}

impl fmt::Display for PageAllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} pages free, {} allocated, {} reserved, {} free runs (largest {})",
            self.free_pages,
            self.total_pages,
            self.allocated_pages,
            self.reserved_pages,
            self.free_runs,
            self.largest_free_run
        )
    }
}

/// Physical page allocator over one span of frames.
///
/// The span runs from the lowest to the highest usable page handed to
/// [`new`](Self::new); frames between usable ranges are reserved and never
/// handed out.
pub struct PageFrameAllocator<'a, S: PageSize = Size4K> {
    base: PhysicalAddress,
    pub(crate) table: FrameTable<'a>,
    pub(crate) index: FreeRunIndex<'a>,
    placement: Placement,
    total_pages: usize,
    free_pages: usize,
    _size: PhantomData<S>,
}

impl<'a> PageFrameAllocator<'a, Size4K> {
    /// Build a first-fit allocator of 4 KiB pages over `ranges`.
    ///
    /// `ranges` must be non-empty, page-aligned, sorted by address and
    /// non-overlapping. `frames` must hold one record per frame of the span
    /// and `runs` at least [`max_free_runs`] of that. Both slices may be
    /// longer than needed; [`crate::bootstrap::metadata_bytes`] gives the
    /// exact sizes.
    ///
    /// # Errors
    /// An [`InitError`] describing the first problem with the input.
    pub fn new(
        ranges: &[PhysicalAddressRange],
        frames: &'a mut [FrameRecord],
        runs: &'a mut [FreeRun],
    ) -> Result<Self, InitError> {
        Self::with_placement(ranges, frames, runs, Placement::FirstFit)
    }
}

impl<'a, S: PageSize> PageFrameAllocator<'a, S> {
    /// Like [`new`](PageFrameAllocator::new), for any page size and placement policy.
    ///
    /// # Errors
    /// An [`InitError`] describing the first problem with the input.
    pub fn with_placement(
        ranges: &[PhysicalAddressRange],
        frames: &'a mut [FrameRecord],
        runs: &'a mut [FreeRun],
        placement: Placement,
    ) -> Result<Self, InitError> {
        let span = validate_ranges::<S>(ranges)?;
        let frame_count = usize::try_from(span.len() >> S::SHIFT)
            .map_err(|_| InitError::AddressOverflow)?;

        if frames.len() < frame_count {
            return Err(InitError::FrameTableTooSmall {
                needed: frame_count,
                provided: frames.len(),
            });
        }
        let needed_runs = max_free_runs(frame_count);
        if runs.len() < needed_runs {
            return Err(InitError::RunIndexTooSmall {
                needed: needed_runs,
                provided: runs.len(),
            });
        }

        let mut table = FrameTable::new_reserved(&mut frames[..frame_count]);
        let mut index = FreeRunIndex::new(runs);
        let mut free_pages = 0;

        for range in ranges {
            let start = frame_offset::<S>(span.start, range.start);
            let len = range_frames::<S>(range)?;
            table.mark_free(start, len);
            index.push_back(FreeRun::new(start, len));
            free_pages += len;
        }

        let allocator = Self {
            base: span.start,
            table,
            index,
            placement,
            total_pages: free_pages,
            free_pages,
            _size: PhantomData,
        };

        info!(
            "managing {span} in {:#x} byte pages: {} usable, {} reserved, {} free runs",
            S::SIZE,
            allocator.total_pages,
            allocator.reserved_pages(),
            allocator.index.len()
        );
        allocator.verify();
        Ok(allocator)
    }

    /// Allocate `pages` contiguous pages and return the base address.
    ///
    /// The page contents are unspecified.
    ///
    /// # Errors
    /// [`AllocError::ZeroPages`] for `pages == 0`, [`AllocError::OutOfMemory`]
    /// when no free run is large enough. Nothing changes on failure.
    pub fn allocate(&mut self, pages: usize) -> Result<PhysicalAddress, AllocError> {
        if pages == 0 {
            return Err(AllocError::ZeroPages);
        }

        let Some(pos) = self.index.find(pages, self.placement) else {
            let largest_free_run = self.index.largest();
            warn!(
                "out of memory: {pages} pages requested, {} free, largest run {largest_free_run}",
                self.free_pages
            );
            return Err(AllocError::OutOfMemory {
                requested: pages,
                largest_free_run,
            });
        };

        let start = self.index.carve(pos, pages);
        self.table.mark_allocated(start, pages);
        self.free_pages -= pages;

        let page = self.frame_page(start);
        trace!("allocate({pages}) -> {page}");
        self.verify();
        Ok(page.base())
    }

    /// Return the block starting at `addr` and report how many pages it spanned.
    ///
    /// # Errors
    /// [`FreeError::InvalidFree`] unless `addr` is the base of a live block.
    /// Nothing changes on failure.
    pub fn free(&mut self, addr: PhysicalAddress) -> Result<usize, FreeError> {
        let (start, pages) = self.live_block(addr).map_err(|reason| {
            error!("rejected free of {addr}: {reason}");
            FreeError::InvalidFree { addr, reason }
        })?;

        self.table.mark_free(start, pages);
        self.index.insert(FreeRun::new(start, pages));
        self.free_pages += pages;

        trace!("free({addr}) -> {pages} pages");
        self.verify();
        Ok(pages)
    }

    /// Page count of the live block starting at `addr`.
    #[must_use]
    pub fn block_len(&self, addr: PhysicalAddress) -> Option<usize> {
        self.live_block(addr).ok().map(|(_, pages)| pages)
    }

    #[must_use]
    pub fn stats(&self) -> PageAllocStats {
        PageAllocStats {
            total_pages: self.total_pages,
            free_pages: self.free_pages,
            allocated_pages: self.total_pages - self.free_pages,
            reserved_pages: self.reserved_pages(),
            free_runs: self.index.len(),
            largest_free_run: self.index.largest(),
        }
    }

    /// Free runs in ascending address order.
    pub fn free_runs(&self) -> impl ExactSizeIterator<Item = FreeRun> + '_ {
        self.index.runs().iter().copied()
    }

    /// Base address and page count of every live block, in address order.
    pub fn live_blocks(&self) -> impl Iterator<Item = (PhysicalAddress, usize)> + '_ {
        self.table
            .records()
            .iter()
            .enumerate()
            .filter_map(|(i, record)| {
                record
                    .run_length()
                    .map(|pages| (self.frame_address(FrameIndex::new(i)), pages))
            })
    }

    /// The managed span, holes included.
    #[must_use]
    pub fn region(&self) -> PhysicalAddressRange {
        PhysicalAddressRange::new(self.base, self.frame_address(FrameIndex::new(self.table.len())))
    }

    #[must_use]
    pub const fn page_size(&self) -> u64 {
        S::SIZE
    }

    #[must_use]
    pub const fn placement(&self) -> Placement {
        self.placement
    }

    /// Index of the frame containing `addr`, if it lies in the managed span.
    #[must_use]
    pub fn frame_index(&self, addr: PhysicalAddress) -> Option<FrameIndex> {
        let offset = addr.page::<S>().base().offset_from(self.base)?;
        let frame = usize::try_from(offset >> S::SHIFT).ok()?;
        (frame < self.table.len()).then_some(FrameIndex::new(frame))
    }

    /// Page backing `frame`. The frame must lie within the managed span.
    #[must_use]
    pub fn frame_page(&self, frame: FrameIndex) -> PhysicalPage<S> {
        PhysicalPage::from_addr(self.base + ((frame.as_usize() as u64) << S::SHIFT))
    }

    #[must_use]
    pub fn frame_address(&self, frame: FrameIndex) -> PhysicalAddress {
        self.frame_page(frame).base()
    }

    /// Address range covered by `run`.
    #[must_use]
    pub fn run_range(&self, run: &FreeRun) -> PhysicalAddressRange {
        PhysicalAddressRange::new(self.frame_address(run.start), self.frame_address(run.end()))
    }

    pub(crate) fn reserved_pages(&self) -> usize {
        self.table.len() - self.total_pages
    }

    pub(crate) const fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub(crate) const fn free_pages(&self) -> usize {
        self.free_pages
    }

    fn live_block(&self, addr: PhysicalAddress) -> Result<(FrameIndex, usize), InvalidFreeReason> {
        use crate::frame::FrameState;

        let page =
            PhysicalPage::<S>::try_from_aligned(addr).ok_or(InvalidFreeReason::Misaligned)?;
        let frame = self
            .frame_index(page.base())
            .ok_or(InvalidFreeReason::OutOfRange)?;
        let record = self.table.get(frame).ok_or(InvalidFreeReason::OutOfRange)?;

        match (record.state(), record.run_length()) {
            (_, Some(pages)) => Ok((frame, pages)),
            (FrameState::BlockTail, _) => Err(InvalidFreeReason::NotBlockStart),
            (FrameState::Reserved, _) => Err(InvalidFreeReason::Reserved),
            _ => Err(InvalidFreeReason::NotAllocated),
        }
    }

    #[cfg(feature = "verify")]
    fn verify(&self) {
        if let Err(violation) = self.check() {
            panic!("page allocator corrupted: {violation}");
        }
    }

    #[cfg(not(feature = "verify"))]
    #[inline]
    #[allow(clippy::unused_self)]
    fn verify(&self) {}
}

impl<S: PageSize> fmt::Debug for PageFrameAllocator<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFrameAllocator")
            .field("region", &self.region())
            .field("page_size", &S::SIZE)
            .field("placement", &self.placement)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Check `ranges` and return the span from the first start to the last end.
fn validate_ranges<S: PageSize>(
    ranges: &[PhysicalAddressRange],
) -> Result<PhysicalAddressRange, InitError> {
    let (Some(first), Some(last)) = (ranges.first(), ranges.last()) else {
        return Err(InitError::NoMemory);
    };

    let mut previous_end: Option<PhysicalAddress> = None;
    for range in ranges {
        if range.is_empty() {
            return Err(InitError::EmptyRange);
        }
        if !range.is_page_aligned::<S>() {
            return Err(InitError::Misaligned);
        }
        if previous_end.is_some_and(|end| end > range.start) {
            return Err(InitError::UnsortedOrOverlapping);
        }
        previous_end = Some(range.end);
    }

    Ok(PhysicalAddressRange::new(first.start, last.end))
}

#[allow(clippy::cast_possible_truncation)]
fn frame_offset<S: PageSize>(base: PhysicalAddress, addr: PhysicalAddress) -> FrameIndex {
    let offset = addr.offset_from(base).unwrap_or_default();
    FrameIndex::new((offset >> S::SHIFT) as usize)
}

fn range_frames<S: PageSize>(range: &PhysicalAddressRange) -> Result<usize, InitError> {
    usize::try_from(range.page_count::<S>()).map_err(|_| InitError::AddressOverflow)
}
