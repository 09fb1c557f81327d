//! # Free-Space Index
//!
//! The set of free runs, kept **sorted by start frame** in a caller-provided
//! slice so that neighbors of a freed block can be found and coalesced
//! without scanning the frame table.
//!
//! ```text
//!  slots: [ (0,4) | (9,2) | (20,12) | ── unused ── ]
//!           └─────── len = 3 ──────┘
//! ```
//!
//! # Invariants
//! - Runs are non-empty and ordered by `start`.
//! - No two runs touch or overlap: `runs[i].end() < runs[i + 1].start`.
//! - The slice holds at least [`max_free_runs`] slots for the managed span,
//!   so inserting a run can never run out of room.

use crate::frame::FrameIndex;

/// A maximal sequence of free frames.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FreeRun {
    pub start: FrameIndex,
    pub len: usize,
}

impl FreeRun {
    #[inline]
    #[must_use]
    pub const fn new(start: FrameIndex, len: usize) -> Self {
        Self { start, len }
    }

    /// First frame after the run.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> FrameIndex {
        self.start.add(self.len)
    }
}

/// Upper bound on the number of free runs a span of `frames` frames can hold.
///
/// Runs are separated by at least one non-free frame, so at most every
/// other frame can start one.
#[inline]
#[must_use]
pub const fn max_free_runs(frames: usize) -> usize {
    frames.div_ceil(2)
}

/// How [`FreeRunIndex::find`] picks among the runs large enough for a request.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum Placement {
    /// Lowest-addressed run that fits.
    #[default]
    FirstFit,
    /// Smallest run that fits; the lower address wins among equals.
    BestFit,
}

/// Address-ordered free runs over caller-provided storage.
pub struct FreeRunIndex<'a> {
    slots: &'a mut [FreeRun],
    len: usize,
}

impl<'a> FreeRunIndex<'a> {
    pub(crate) const fn new(slots: &'a mut [FreeRun]) -> Self {
        Self { slots, len: 0 }
    }

    #[inline]
    #[must_use]
    pub fn runs(&self) -> &[FreeRun] {
        &self.slots[..self.len]
    }

    /// Number of free runs.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Length of the largest run, 0 if there are none.
    #[must_use]
    pub fn largest(&self) -> usize {
        self.runs().iter().map(|r| r.len).max().unwrap_or(0)
    }

    /// Position of the run chosen by `placement` for a request of `len` frames.
    #[must_use]
    pub fn find(&self, len: usize, placement: Placement) -> Option<usize> {
        let mut fitting = self
            .runs()
            .iter()
            .enumerate()
            .filter(|(_, run)| run.len >= len);

        match placement {
            Placement::FirstFit => fitting.next().map(|(pos, _)| pos),
            Placement::BestFit => fitting
                .min_by_key(|(pos, run)| (run.len, *pos))
                .map(|(pos, _)| pos),
        }
    }

    /// Take the first `len` frames of the run at `pos` and return where they start.
    ///
    /// The run shrinks in place, or disappears if it is used up.
    pub(crate) fn carve(&mut self, pos: usize, len: usize) -> FrameIndex {
        let run = &mut self.slots[pos];
        debug_assert!(pos < self.len && run.len >= len);

        let start = run.start;
        if run.len == len {
            self.remove(pos);
        } else {
            run.start = run.start.add(len);
            run.len -= len;
        }
        start
    }

    /// Append a run during initialization; merges with the last run if they touch.
    pub(crate) fn push_back(&mut self, run: FreeRun) {
        if let Some(last) = self.slots[..self.len].last_mut() {
            debug_assert!(last.end() <= run.start);
            if last.end() == run.start {
                last.len += run.len;
                return;
            }
        }
        self.slots[self.len] = run;
        self.len += 1;
    }

    /// Insert a freed run, merging it with a run ending at `run.start` and a
    /// run starting at `run.end()`.
    ///
    /// The caller guarantees `run` overlaps no existing run.
    pub(crate) fn insert(&mut self, run: FreeRun) {
        let pos = self.runs().partition_point(|r| r.start < run.start);
        let joins_left = pos > 0 && self.slots[pos - 1].end() == run.start;
        let joins_right = pos < self.len && self.slots[pos].start == run.end();

        match (joins_left, joins_right) {
            (true, true) => {
                self.slots[pos - 1].len += run.len + self.slots[pos].len;
                self.remove(pos);
            }
            (true, false) => self.slots[pos - 1].len += run.len,
            (false, true) => {
                let right = &mut self.slots[pos];
                right.start = run.start;
                right.len += run.len;
            }
            (false, false) => {
                debug_assert!(self.len < self.slots.len(), "free-run index overflow");
                self.slots.copy_within(pos..self.len, pos + 1);
                self.slots[pos] = run;
                self.len += 1;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn runs_mut(&mut self) -> &mut [FreeRun] {
        &mut self.slots[..self.len]
    }

    fn remove(&mut self, pos: usize) {
        self.slots.copy_within(pos + 1..self.len, pos);
        self.len -= 1;
    }
}
