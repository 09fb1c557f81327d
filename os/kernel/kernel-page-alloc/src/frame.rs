//! # Frame Records
//!
//! One 64-bit record per page frame of the managed span:
//!
//! ```text
//!  63                                                   2 1   0
//! ┌───────────────────────────────────────────────────────┬─────┐
//! │ payload                                               │ tag │
//! └───────────────────────────────────────────────────────┴─────┘
//! ```
//!
//! | tag | state | payload |
//! |-----|-------|---------|
//! | 0 | [`FrameState::Free`] | 0 |
//! | 1 | [`FrameState::Reserved`] | 0 |
//! | 2 | [`FrameState::BlockHead`] | number of frames in the block |
//! | 3 | [`FrameState::BlockTail`] | index of the block's head frame |
//!
//! The all-zero record is a free frame, so zero-filled memory is a valid
//! (all free) table.

use bitfield_struct::bitfield;
use core::fmt;

/// Zero-based index of a page frame, counted from the start of the managed span.
#[repr(transparent)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameIndex(usize);

impl FrameIndex {
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// The frame `count` frames further up.
    #[inline]
    #[must_use]
    pub const fn add(self, count: usize) -> Self {
        Self(self.0 + count)
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocation state of a single frame.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameState {
    /// Member of exactly one free run.
    Free = 0,
    /// Inside the managed span but not usable RAM (firmware, kernel image, allocator metadata).
    Reserved = 1,
    /// First frame of a live allocation; carries the block length.
    BlockHead = 2,
    /// Any later frame of a live allocation; points back at the head.
    BlockTail = 3,
}

impl FrameState {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Free,
            1 => Self::Reserved,
            2 => Self::BlockHead,
            _ => Self::BlockTail,
        }
    }
}

/// Packed per-frame metadata; see the [module documentation](self).
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct FrameRecord {
    /// State tag (bits 0..1).
    #[bits(2, default = FrameState::Free, from = FrameState::from_bits, into = FrameState::into_bits)]
    tag: FrameState,
    /// Block length for heads, head index for tails (bits 2..63).
    #[bits(62)]
    payload: u64,
}

impl FrameRecord {
    /// A free frame.
    pub const FREE: Self = Self::new();

    /// A reserved frame.
    pub const RESERVED: Self = Self::new().with_tag(FrameState::Reserved);

    /// First frame of a block spanning `len` frames.
    #[inline]
    #[must_use]
    pub const fn head(len: usize) -> Self {
        Self::new()
            .with_tag(FrameState::BlockHead)
            .with_payload(len as u64)
    }

    /// Continuation frame of the block starting at `head`.
    #[inline]
    #[must_use]
    pub const fn tail(head: FrameIndex) -> Self {
        Self::new()
            .with_tag(FrameState::BlockTail)
            .with_payload(head.as_usize() as u64)
    }

    #[inline]
    #[must_use]
    pub const fn state(self) -> FrameState {
        self.tag()
    }

    /// Block length, if this frame starts a block.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn run_length(self) -> Option<usize> {
        match self.tag() {
            FrameState::BlockHead => Some(self.payload() as usize),
            _ => None,
        }
    }

    /// Head of the enclosing block, if this frame continues one.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn head_index(self) -> Option<FrameIndex> {
        match self.tag() {
            FrameState::BlockTail => Some(FrameIndex::new(self.payload() as usize)),
            _ => None,
        }
    }
}
