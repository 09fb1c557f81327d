//! # Kernel Configuration and Boot Memory Description
//!
//! This crate is the single source of truth for the physical memory layout
//! constants and for the description of physical memory the bootloader hands
//! to the kernel.
//!
//! ## Architecture
//!
//! ### Boot Memory Map ([`memory_map`])
//! * **Region Types**: usable RAM versus reserved, firmware, kernel image, MMIO
//! * **Hole Punching**: non-usable regions are cut out of usable ones
//! * **Page Trimming**: usable ranges shrink inward to whole pages
//! * **No Heap**: results are written into caller-provided storage
//!
//! ### Memory Layout ([`memory`])
//! * **Direct Mapping**: HHDM base used to touch physical memory
//! * **Low Memory**: the legacy first megabyte is never handed out
//!
//! ```text
//! Physical Memory Layout:
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1MiB)         │
//!             │  (BIOS, VGA, DMA buffers)       │
//! LOW_MEM_END ├─────────────────────────────────┤ 0x0010_0000 (1 MiB)
//!             │       Kernel Image              │
//!             ├─────────────────────────────────┤
//!             │    Available RAM                │
//!             │  (Managed by the page frame     │
//!             │   allocator)                    │
//!             └─────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kernel_info::memory_map::{MemoryMap, MemoryRegion, MemoryRegionKind};
//! use kernel_memory_addresses::{PhysicalAddressRange, Size4K};
//!
//! let regions = [
//!     MemoryRegion::usable(0x0010_0000, 0x0800_0000),
//!     MemoryRegion::new(0x0010_0000, 0x0030_0000, MemoryRegionKind::KernelImage),
//! ];
//! let mut ranges = [PhysicalAddressRange::default(); 8];
//! let n = MemoryMap::new(&regions).usable_ranges::<Size4K>(&mut ranges).unwrap();
//! assert_eq!(n, 1);
//! assert_eq!(ranges[0].start.as_u64(), 0x0030_0000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod memory_map;
