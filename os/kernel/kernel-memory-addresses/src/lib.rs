//! # Physical Memory Address Types
//!
//! Strongly typed wrappers for physical addresses, page bases and address
//! ranges used by the page frame allocator and the boot memory map.
//!
//! ## Overview
//!
//! | Type | Generic | Description |
//! |----------|----------|-------------|
//! | [`PhysicalAddress`] | – | A raw 64-bit physical address. |
//! | [`PhysicalPage<S>`] | [`S: PageSize`](PageSize) | A page-aligned base address of a page of size `S`. |
//! | [`PhysicalAddressRange`] | – | A half-open `[start, end)` span of physical memory. |
//!
//! ## Page Sizes
//!
//! Two page sizes are supported via marker types that implement [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages (base granularity, [`PAGE_SIZE`])
//! - [`Size2M`]: 2 MiB huge pages
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x8000_1234);
//! assert!(!pa.is_aligned::<Size4K>());
//! assert_eq!(pa.align_down::<Size4K>().as_u64(), 0x8000_1000);
//!
//! let ram = PhysicalAddressRange::new(PhysicalAddress::new(0x8000_0100), PhysicalAddress::new(0x8000_5000));
//! let pages = ram.shrink_to_pages::<Size4K>().unwrap();
//! assert_eq!(pages.page_count::<Size4K>(), 4);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` where they wrap a single value and
//!   implement `Copy`, `Eq`, `Ord`, and `Hash`.
//! - All alignment calculations are `const fn`.
//! - The phantom marker `S` enforces the page size at the type level.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_size;
mod physical_address;
mod physical_page;
mod physical_range;

pub use page_size::{PageSize, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use physical_range::PhysicalAddressRange;

/// Size of the base page in bytes.
pub const PAGE_SIZE: u64 = Size4K::SIZE;
