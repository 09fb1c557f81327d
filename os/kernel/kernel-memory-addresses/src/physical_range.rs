use crate::{PageSize, PhysicalAddress};
use core::fmt;

/// A half-open span `[start, end)` of physical memory.
///
/// A range with `end <= start` is empty. Ranges are used by the boot memory
/// map to describe usable RAM and reserved holes, and by the page frame
/// allocator to describe the windows it manages.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct PhysicalAddressRange {
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
}

impl PhysicalAddressRange {
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self { start, end }
    }

    /// Range of `len` bytes starting at `start`, or `None` on address overflow.
    #[inline]
    #[must_use]
    pub const fn from_len(start: PhysicalAddress, len: u64) -> Option<Self> {
        match start.checked_add(len) {
            Some(end) => Some(Self::new(start, end)),
            None => None,
        }
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.as_u64().saturating_sub(self.start.as_u64())
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end.as_u64() <= self.start.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, addr: PhysicalAddress) -> bool {
        addr.as_u64() >= self.start.as_u64() && addr.as_u64() < self.end.as_u64()
    }

    /// Whether the two ranges share at least one byte.
    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start.as_u64() < other.end.as_u64()
            && other.start.as_u64() < self.end.as_u64()
    }

    /// Whether both bounds are aligned to `S`.
    #[inline]
    #[must_use]
    pub const fn is_page_aligned<S: PageSize>(&self) -> bool {
        self.start.is_aligned::<S>() && self.end.is_aligned::<S>()
    }

    /// The largest sub-range whose bounds are aligned to `S`, or `None` if
    /// no whole page fits.
    #[must_use]
    pub const fn shrink_to_pages<S: PageSize>(&self) -> Option<Self> {
        let Some(start) = self.start.align_up::<S>() else {
            return None;
        };
        let end = self.end.align_down::<S>();
        let range = Self::new(start, end);
        if range.is_empty() { None } else { Some(range) }
    }

    /// The smallest range with bounds aligned to `S` that covers this one.
    ///
    /// An end that cannot be aligned up without wrapping saturates at the
    /// highest page boundary.
    #[must_use]
    pub const fn expand_to_pages<S: PageSize>(&self) -> Self {
        let start = self.start.align_down::<S>();
        let end = match self.end.align_up::<S>() {
            Some(end) => end,
            None => PhysicalAddress::new(u64::MAX).align_down::<S>(),
        };
        Self::new(start, end)
    }

    /// Number of whole `S` pages in the range.
    #[inline]
    #[must_use]
    pub const fn page_count<S: PageSize>(&self) -> u64 {
        self.len() >> S::SHIFT
    }

    /// Cut `hole` out of this range, returning the parts left below and
    /// above it. Either part is `None` when it would be empty.
    #[must_use]
    pub const fn split_around(&self, hole: &Self) -> (Option<Self>, Option<Self>) {
        if !self.overlaps(hole) {
            return (Some(*self), None);
        }

        let below = Self::new(self.start, hole.start);
        let above = Self::new(hole.end, self.end);
        (
            if below.is_empty() { None } else { Some(below) },
            if above.is_empty() { None } else { Some(above) },
        )
    }
}

impl fmt::Debug for PhysicalAddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}..{:#x})", self.start.as_u64(), self.end.as_u64())
    }
}

impl fmt::Display for PhysicalAddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.start, self.end)
    }
}
