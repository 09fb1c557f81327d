//! # Kernel synchronization primitives
//!
//! The page frame allocator is a single process-wide resource. Every
//! mutating call is serialized by one coarse [`SpinLock`] held for the
//! duration of the call and taken with local interrupts masked
//! ([`irq::IrqGuard`]); the process-wide instance is published exactly once
//! through a [`SyncOnceCell`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::{IrqGuard, IrqSpinLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
