//! # Kernel Page Frame Allocator
//!
//! Physical memory management for the kernel's lowest layer: hands out runs
//! of contiguous, page-aligned physical pages to heap allocators, page-table
//! builders and process loaders, and takes them back.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │   global::page_alloc / global::page_free             │
//! │   LockedPageAllocator (one SpinLock, IRQs masked)    │
//! └─────────────────┬────────────────────────────────────┘
//!                   │
//! ┌─────────────────▼────────────────────────────────────┐
//! │   PageFrameAllocator                                 │
//! │    • first-fit (or best-fit) placement               │
//! │    • split on allocate, coalesce on free             │
//! │    • InvalidFree detection from the frame table      │
//! └─────────┬─────────────────────────┬──────────────────┘
//!           │                         │
//! ┌─────────▼──────────┐   ┌──────────▼──────────────────┐
//! │   FrameTable       │   │   FreeRunIndex              │
//! │   one u64 record   │   │   free runs sorted by       │
//! │   per frame        │   │   address, never adjacent   │
//! └────────────────────┘   └─────────────────────────────┘
//! ```
//!
//! Both structures live in storage the caller provides, so the allocator
//! works before any heap exists. At boot, [`bootstrap`] carves that storage
//! out of the memory map itself.
//!
//! ## Invariants
//!
//! After every public call:
//! * every frame is either free and part of exactly one free run, reserved,
//!   or part of exactly one live block;
//! * no two free runs touch;
//! * free plus allocated pages equal the total;
//! * returned addresses are page-aligned and inside the managed span;
//! * only the base address of a live block is accepted by `free`.
//!
//! [`PageFrameAllocator::check`] verifies these; the `verify` feature runs
//! it after every mutating call.
//!
//! ## Usage
//! ```rust
//! use kernel_memory_addresses::{PhysicalAddress, PhysicalAddressRange};
//! use kernel_page_alloc::{FrameRecord, FreeRun, PageFrameAllocator, max_free_runs};
//!
//! let ram = PhysicalAddressRange::new(
//!     PhysicalAddress::new(0x10_0000),
//!     PhysicalAddress::new(0x10_0000 + 16 * 4096),
//! );
//! let mut frames = [FrameRecord::FREE; 16];
//! let mut runs = [FreeRun::default(); max_free_runs(16)];
//! let mut pages = PageFrameAllocator::new(&[ram], &mut frames, &mut runs)?;
//!
//! let block = pages.allocate(4)?;
//! assert_eq!(block, PhysicalAddress::new(0x10_0000));
//! assert_eq!(pages.free(block)?, 4);
//! assert!(pages.free(block).is_err());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Logging
//!
//! The allocator emits [`log`] records only: `info` on initialization,
//! `debug` from [`PageFrameAllocator::dump`], `trace` per call, `warn` when
//! out of memory and `error` for rejected frees. It works the same with no
//! logger installed.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod bootstrap;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod frame_alloc;
pub mod frame_table;
pub mod free_list;
pub mod global;
pub mod locked;
pub mod phys_mapper;

pub use diagnostics::{InvariantViolation, SelfTestError, self_test};
pub use error::{AllocError, FreeError, InitError, InvalidFreeReason};
pub use frame::{FrameIndex, FrameRecord, FrameState};
pub use frame_alloc::{PageAllocStats, PageFrameAllocator};
pub use free_list::{FreeRun, Placement, max_free_runs};
pub use locked::{LockedPageAllocator, PageBlock};
