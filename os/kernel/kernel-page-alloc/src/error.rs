use core::fmt;
use kernel_memory_addresses::PhysicalAddress;

/// Why [`allocate`](crate::PageFrameAllocator::allocate) could not hand out pages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// A request for zero pages.
    #[error("requested zero pages")]
    ZeroPages,
    /// No free run holds `requested` contiguous pages.
    #[error("out of memory: no free run of {requested} pages (largest is {largest_free_run})")]
    OutOfMemory {
        requested: usize,
        largest_free_run: usize,
    },
}

/// Why an address handed to [`free`](crate::PageFrameAllocator::free) was rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvalidFreeReason {
    /// Not a multiple of the page size.
    Misaligned,
    /// Outside the managed span.
    OutOfRange,
    /// A frame the allocator never hands out.
    Reserved,
    /// Already free; usually a double free.
    NotAllocated,
    /// Inside a live block but not its first page.
    NotBlockStart,
}

impl fmt::Display for InvalidFreeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Misaligned => "address is not page-aligned",
            Self::OutOfRange => "address is outside the managed region",
            Self::Reserved => "frame is reserved",
            Self::NotAllocated => "frame is not allocated",
            Self::NotBlockStart => "address is not the start of a block",
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreeError {
    #[error("invalid free of {addr}: {reason}")]
    InvalidFree {
        addr: PhysicalAddress,
        reason: InvalidFreeReason,
    },
}

impl FreeError {
    #[must_use]
    pub const fn reason(&self) -> InvalidFreeReason {
        match self {
            Self::InvalidFree { reason, .. } => *reason,
        }
    }
}

/// Boot-time configuration errors. The kernel cannot continue after one of these.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("no usable memory")]
    NoMemory,
    #[error("usable range is empty")]
    EmptyRange,
    #[error("usable range is not page-aligned")]
    Misaligned,
    #[error("usable ranges are unsorted or overlap")]
    UnsortedOrOverlapping,
    #[error("frame table holds {provided} records, {needed} required")]
    FrameTableTooSmall { needed: usize, provided: usize },
    #[error("free-run index holds {provided} runs, {needed} required")]
    RunIndexTooSmall { needed: usize, provided: usize },
    #[error("managed span exceeds the addressable frame range")]
    AddressOverflow,
}
