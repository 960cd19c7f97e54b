//! Transaction windows: per-epoch records of write-conflict ranges,
//! queried by read-conflict ranges at commit time.

use std::collections::BTreeMap;
use std::time::Instant;

use vkv_bytes::Slice;

/// An ordered interval map from `[begin, end)` byte ranges to the highest
/// commit sequence that wrote anywhere in that range. Overlapping intervals
/// are fused on insert; the fused sequence is the max of its constituents.
#[derive(Default)]
struct IntervalMap {
    /// Keyed by interval start; each entry also carries its (exclusive) end
    /// and the sequence last written there.
    intervals: BTreeMap<Slice, (Slice, u64)>,
}

impl IntervalMap {
    fn new() -> Self {
        Self { intervals: BTreeMap::new() }
    }

    /// Merge `[begin, end)` in at `seq`, fusing with any existing interval it
    /// overlaps. Because the map's intervals are pairwise disjoint going in,
    /// a single pass bounded by the incoming range's own `[begin, end)` is
    /// enough to find every interval that needs to fuse — no entry outside
    /// that span can end up overlapping the fused result.
    fn merge(&mut self, begin: Slice, end: Slice, seq: u64) {
        let mut new_begin = begin;
        let mut new_end = end.clone();
        let mut new_seq = seq;

        let mut to_remove = Vec::new();
        for (b, (e, s)) in self.intervals.range(..end) {
            if *e > new_begin {
                to_remove.push(b.clone());
                if *b < new_begin {
                    new_begin = b.clone();
                }
                if *e > new_end {
                    new_end = e.clone();
                }
                if *s > new_seq {
                    new_seq = *s;
                }
            }
        }
        for b in to_remove {
            self.intervals.remove(&b);
        }
        self.intervals.insert(new_begin, (new_end, new_seq));
    }

    /// Does any interval with `sequence > read_seq` intersect `[rb, re)`?
    fn overlaps_newer(&self, rb: &Slice, re: &Slice, read_seq: u64) -> bool {
        self.intervals
            .range(..re.clone())
            .any(|(_, (e, s))| e > rb && *s > read_seq)
    }
}

/// A single epoch's worth of write-conflict ranges.
pub struct TransactionWindow {
    pub first_version: u64,
    pub last_version: u64,
    pub committed_count: u64,
    pub started_at: Instant,
    closed: bool,
    writes: IntervalMap,
}

impl TransactionWindow {
    pub fn new(seq: u64) -> Self {
        Self {
            first_version: seq,
            last_version: seq,
            committed_count: 0,
            started_at: Instant::now(),
            closed: false,
            writes: IntervalMap::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Merge this commit's write-conflict ranges into the window. Panics if
    /// the window is closed; callers must check `is_closed` (or rely on
    /// `WindowSet`, which never routes a commit into a closed window).
    pub fn merge_writes(&mut self, ranges: &[(Slice, Slice)], seq: u64) {
        debug_assert!(!self.closed, "merge_writes on a closed transaction window");
        for (begin, end) in ranges {
            self.writes.merge(begin.clone(), end.clone(), seq);
        }
        self.last_version = self.last_version.max(seq);
        self.committed_count += 1;
    }

    pub fn conflicts(&self, reads: &[(Slice, Slice)], read_seq: u64) -> bool {
        reads.iter().any(|(rb, re)| self.writes.overlaps_newer(rb, re, read_seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(b: &[u8]) -> Slice {
        Slice::from(b)
    }

    #[test]
    fn detects_overlapping_write_conflict() {
        let mut w = TransactionWindow::new(0);
        w.merge_writes(&[(s(b"x"), s(b"x\0"))], 6);
        assert!(w.conflicts(&[(s(b"x"), s(b"x\0"))], 5));
        assert!(!w.conflicts(&[(s(b"x"), s(b"x\0"))], 6));
    }

    #[test]
    fn non_overlapping_ranges_do_not_conflict() {
        let mut w = TransactionWindow::new(0);
        w.merge_writes(&[(s(b"a"), s(b"b"))], 6);
        assert!(!w.conflicts(&[(s(b"c"), s(b"d"))], 5));
    }

    #[test]
    fn merges_overlapping_intervals_keeping_max_seq() {
        let mut w = TransactionWindow::new(0);
        w.merge_writes(&[(s(b"a"), s(b"m"))], 3);
        w.merge_writes(&[(s(b"g"), s(b"z"))], 7);
        // the fused interval [a, z) should now report seq 7 everywhere.
        assert!(w.conflicts(&[(s(b"a"), s(b"b"))], 6));
        assert!(w.conflicts(&[(s(b"y"), s(b"z"))], 6));
    }
}
