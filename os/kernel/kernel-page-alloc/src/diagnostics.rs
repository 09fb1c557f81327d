//! Consistency checks over the frame table and the free-run index.
//!
//! [`PageFrameAllocator::check`] walks both structures and reports the first
//! inconsistency. With the `verify` feature it runs after every mutating call.
//! [`self_test`] exercises a live allocator once at boot.

use crate::error::{AllocError, FreeError, InvalidFreeReason};
use crate::frame::{FrameIndex, FrameRecord, FrameState};
use crate::frame_alloc::PageFrameAllocator;
use kernel_memory_addresses::{PageSize, PhysicalAddress};
use log::{debug, info};

/// The first broken invariant found by [`PageFrameAllocator::check`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("free run {position} is empty")]
    EmptyRun { position: usize },
    #[error("free run {position} extends past the end of the frame table")]
    RunOutOfBounds { position: usize },
    #[error("free run {position} starts before the previous run ends")]
    RunsOutOfOrder { position: usize },
    #[error("free run {position} touches the previous run")]
    AdjacentRuns { position: usize },
    #[error("frame {frame} is listed as free but recorded as {state:?}")]
    RunFrameNotFree { frame: FrameIndex, state: FrameState },
    #[error("block at frame {frame} has zero length")]
    EmptyBlock { frame: FrameIndex },
    #[error("block at frame {frame} extends past the end of the frame table")]
    BlockOutOfBounds { frame: FrameIndex },
    #[error("frame {frame} should continue the block at {head}")]
    BrokenBlock { frame: FrameIndex, head: FrameIndex },
    #[error("frame {frame} continues no block")]
    OrphanTail { frame: FrameIndex },
    #[error("free frames disagree: table {table}, index {index}, counter {counter}")]
    FreeCountMismatch {
        table: usize,
        index: usize,
        counter: usize,
    },
    #[error("{free} free + {allocated} allocated pages != {total} total")]
    PagesNotConserved {
        free: usize,
        allocated: usize,
        total: usize,
    },
    #[error("{found} reserved frames, {expected} expected")]
    ReservedCountMismatch { expected: usize, found: usize },
}

impl<S: PageSize> PageFrameAllocator<'_, S> {
    /// Walk the frame table and the free-run index and verify that
    /// - runs are non-empty, in bounds, ordered and never adjacent,
    /// - every frame of every run is free and no free frame is missing from the index,
    /// - every block is one head followed by tails pointing back at it,
    /// - free and allocated pages add up to the total.
    ///
    /// # Errors
    /// The first [`InvariantViolation`] encountered.
    pub fn check(&self) -> Result<(), InvariantViolation> {
        let indexed = self.check_runs()?;
        let tally = self.check_table()?;

        if tally.free != indexed || tally.free != self.free_pages() {
            return Err(InvariantViolation::FreeCountMismatch {
                table: tally.free,
                index: indexed,
                counter: self.free_pages(),
            });
        }
        if tally.free + tally.allocated != self.total_pages() {
            return Err(InvariantViolation::PagesNotConserved {
                free: tally.free,
                allocated: tally.allocated,
                total: self.total_pages(),
            });
        }
        if tally.reserved != self.reserved_pages() {
            return Err(InvariantViolation::ReservedCountMismatch {
                expected: self.reserved_pages(),
                found: tally.reserved,
            });
        }
        Ok(())
    }

    /// Returns the number of frames covered by the index.
    fn check_runs(&self) -> Result<usize, InvariantViolation> {
        let records = self.table.records();
        let mut covered = 0;
        let mut previous_end: Option<FrameIndex> = None;

        for (position, run) in self.index.runs().iter().enumerate() {
            if run.len == 0 {
                return Err(InvariantViolation::EmptyRun { position });
            }
            if run.end().as_usize() > records.len() {
                return Err(InvariantViolation::RunOutOfBounds { position });
            }
            match previous_end {
                Some(end) if end > run.start => {
                    return Err(InvariantViolation::RunsOutOfOrder { position });
                }
                Some(end) if end == run.start => {
                    return Err(InvariantViolation::AdjacentRuns { position });
                }
                _ => {}
            }

            let frames = &records[run.start.as_usize()..run.end().as_usize()];
            if let Some((offset, record)) = frames
                .iter()
                .enumerate()
                .find(|(_, r)| r.state() != FrameState::Free)
            {
                return Err(InvariantViolation::RunFrameNotFree {
                    frame: run.start.add(offset),
                    state: record.state(),
                });
            }

            covered += run.len;
            previous_end = Some(run.end());
        }
        Ok(covered)
    }

    fn check_table(&self) -> Result<FrameTally, InvariantViolation> {
        let records = self.table.records();
        let mut tally = FrameTally::default();
        let mut i = 0;

        while i < records.len() {
            let frame = FrameIndex::new(i);
            match records[i].state() {
                FrameState::Free => tally.free += 1,
                FrameState::Reserved => tally.reserved += 1,
                FrameState::BlockTail => return Err(InvariantViolation::OrphanTail { frame }),
                FrameState::BlockHead => {
                    let len = records[i].run_length().unwrap_or_default();
                    check_block(records, frame, len)?;
                    tally.allocated += len;
                    i += len;
                    continue;
                }
            }
            i += 1;
        }
        Ok(tally)
    }

    /// Emit every free run and the counters at `debug` level.
    pub fn dump(&self) {
        debug!("page allocator {}: {}", self.region(), self.stats());
        for run in self.free_runs() {
            debug!(
                "  free {}..{} ({} pages) {}",
                run.start,
                run.end(),
                run.len,
                self.run_range(&run)
            );
        }
    }

    /// FNV-1a over the free runs; equal for identical indexes.
    fn fingerprint(&self) -> u64 {
        const PRIME: u64 = 0x0100_0000_01b3;
        self.free_runs()
            .flat_map(|run| [run.start.as_usize() as u64, run.len as u64])
            .fold(0xcbf2_9ce4_8422_2325, |hash, word| {
                (hash ^ word).wrapping_mul(PRIME)
            })
    }
}

fn check_block(
    records: &[FrameRecord],
    head: FrameIndex,
    len: usize,
) -> Result<(), InvariantViolation> {
    if len == 0 {
        return Err(InvariantViolation::EmptyBlock { frame: head });
    }
    let end = head.as_usize() + len;
    if end > records.len() {
        return Err(InvariantViolation::BlockOutOfBounds { frame: head });
    }

    let tail = FrameRecord::tail(head);
    (head.as_usize() + 1..end)
        .find(|&i| records[i] != tail)
        .map_or(Ok(()), |i| {
            Err(InvariantViolation::BrokenBlock {
                frame: FrameIndex::new(i),
                head,
            })
        })
}

#[derive(Default)]
struct FrameTally {
    free: usize,
    allocated: usize,
    reserved: usize,
}

/// Failure of [`self_test`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelfTestError {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Free(#[from] FreeError),
    #[error("a double free was accepted")]
    DoubleFreeAccepted,
    #[error("allocated blocks overlap")]
    Overlap,
    #[error("freeing every test block did not restore the free-run index")]
    NotRestored,
}

/// Block sizes exercised by [`self_test`]; freed middle first so that the
/// later frees coalesce on both sides.
const PATTERN: [usize; 3] = [1, 2, 1];

/// Allocate a small pattern of blocks, free them out of order, and verify
/// that the allocator ends up exactly where it started.
///
/// Skips the exercise and only runs [`PageFrameAllocator::check`] when
/// fewer than four pages are free in one run.
///
/// # Errors
/// A [`SelfTestError`] naming what went wrong.
pub fn self_test<S: PageSize>(allocator: &mut PageFrameAllocator<'_, S>) -> Result<(), SelfTestError> {
    allocator.check()?;
    let needed: usize = PATTERN.iter().sum();
    if allocator.stats().largest_free_run < needed {
        info!("page allocator self-test skipped: no run of {needed} free pages");
        return Ok(());
    }

    let before = (allocator.stats(), allocator.fingerprint());

    let mut blocks = [(PhysicalAddress::zero(), 0); PATTERN.len()];
    for (slot, &pages) in blocks.iter_mut().zip(&PATTERN) {
        *slot = (allocator.allocate(pages)?, pages);
        allocator.check()?;
    }
    for (i, &(a, a_len)) in blocks.iter().enumerate() {
        for &(b, b_len) in &blocks[i + 1..] {
            let a_end = a + a_len as u64 * S::SIZE;
            let b_end = b + b_len as u64 * S::SIZE;
            if a < b_end && b < a_end {
                return Err(SelfTestError::Overlap);
            }
        }
    }

    for &i in &[1, 0, 2] {
        allocator.free(blocks[i].0)?;
        allocator.check()?;
    }

    match allocator.free(blocks[1].0) {
        Err(err) if err.reason() == InvalidFreeReason::NotAllocated => {}
        Err(err) => return Err(err.into()),
        Ok(_) => return Err(SelfTestError::DoubleFreeAccepted),
    }

    if (allocator.stats(), allocator.fingerprint()) != before {
        return Err(SelfTestError::NotRestored);
    }
    info!("page allocator self-test passed");
    Ok(())
}
