//! # Physical Memory Layout

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Legacy low memory (BIOS data, VGA, option ROMs) that is never handed to
/// the page frame allocator, regardless of what the firmware map claims.
pub const LOW_MEMORY_END: u64 = 0x0010_0000;

/// Upper bound on the number of distinct usable ranges the boot path keeps
/// after punching reserved holes into the firmware map.
pub const MAX_USABLE_RANGES: usize = 64;

const _: () = {
    assert!(LOW_MEMORY_END.is_multiple_of(4096));
    assert!(MAX_USABLE_RANGES > 0);
};
