use crate::frame::{FrameIndex, FrameRecord, FrameState};

/// The authoritative per-frame state of the managed span.
///
/// Backed by caller-provided storage; the table never grows.
pub struct FrameTable<'a> {
    records: &'a mut [FrameRecord],
}

impl<'a> FrameTable<'a> {
    /// Take `records` as the table, marking every frame reserved.
    pub(crate) fn new_reserved(records: &'a mut [FrameRecord]) -> Self {
        records.fill(FrameRecord::RESERVED);
        Self { records }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, frame: FrameIndex) -> Option<FrameRecord> {
        self.records.get(frame.as_usize()).copied()
    }

    #[inline]
    #[must_use]
    pub fn records(&self) -> &[FrameRecord] {
        self.records
    }

    pub(crate) fn mark_free(&mut self, start: FrameIndex, len: usize) {
        let start = start.as_usize();
        self.records[start..start + len].fill(FrameRecord::FREE);
    }

    /// Record a block of `len` frames at `start`: one head, `len - 1` tails.
    pub(crate) fn mark_allocated(&mut self, start: FrameIndex, len: usize) {
        debug_assert!(len > 0);
        let first = start.as_usize();
        self.records[first] = FrameRecord::head(len);
        self.records[first + 1..first + len].fill(FrameRecord::tail(start));
    }

    /// Number of frames in state `state`.
    #[must_use]
    pub fn count(&self, state: FrameState) -> usize {
        self.records.iter().filter(|r| r.state() == state).count()
    }
}
