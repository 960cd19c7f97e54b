use std::collections::VecDeque;

use vkv_bytes::Slice;

use crate::options::EngineOptions;
use crate::window::TransactionWindow;

/// The ordered sequence of transaction windows, oldest first.
/// Exactly one window is ever open for new writes; older ones are retained
/// read-only until retired.
pub struct WindowSet {
    windows: VecDeque<TransactionWindow>,
    rollover_age: std::time::Duration,
    rollover_cardinality: usize,
}

impl WindowSet {
    pub fn new(options: &EngineOptions, seq: u64) -> Self {
        let mut windows = VecDeque::new();
        windows.push_back(TransactionWindow::new(seq));
        Self {
            windows,
            rollover_age: options.window_rollover_age,
            rollover_cardinality: options.window_rollover_cardinality,
        }
    }

    fn maybe_rollover(&mut self, seq: u64) {
        let needs_rollover = {
            let active = self.windows.back().expect("at least one window always open");
            active.started_at.elapsed() > self.rollover_age
                || active.committed_count >= self.rollover_cardinality as u64
        };
        if needs_rollover {
            self.windows.back_mut().unwrap().close();
            self.windows.push_back(TransactionWindow::new(seq));
        }
    }

    /// Whether any window newer than `read_seq` has a write-conflict range
    /// intersecting one of `reads`.
    pub fn conflicts(&self, read_seq: u64, reads: &[(Slice, Slice)]) -> bool {
        if reads.is_empty() {
            return false;
        }
        self.windows
            .iter()
            .filter(|w| w.last_version > read_seq)
            .any(|w| w.conflicts(reads, read_seq))
    }

    /// Merge a successful commit's write-conflict ranges into the active
    /// window, rolling over first if the active window has aged out.
    pub fn record_commit(&mut self, writes: &[(Slice, Slice)], seq: u64) {
        self.maybe_rollover(seq);
        self.windows.back_mut().unwrap().merge_writes(writes, seq);
    }

    /// Drop closed windows that no live transaction can still need: every
    /// closed window whose `last_version` is at or below `horizon` is safe
    /// to retire, since no live read_seq could be older than it.
    pub fn retire_below(&mut self, horizon: u64) {
        while self.windows.len() > 1 {
            let oldest = self.windows.front().unwrap();
            if oldest.is_closed() && oldest.last_version <= horizon {
                self.windows.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// The oldest commit sequence any currently retained window can still
    /// validate read/write conflicts against. A transaction whose read
    /// version predates this cannot be safely checked for conflicts any
    /// more — the window that covered it has already been retired.
    pub fn oldest_retained_version(&self) -> u64 {
        self.windows.front().expect("at least one window always open").first_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(b: &[u8]) -> Slice {
        Slice::from(b)
    }

    #[test]
    fn commits_are_visible_to_conflict_checks() {
        let opts = EngineOptions::default();
        let mut ws = WindowSet::new(&opts, 0);
        ws.record_commit(&[(s(b"x"), s(b"x\0"))], 6);
        assert!(ws.conflicts(5, &[(s(b"x"), s(b"x\0"))]));
        assert!(!ws.conflicts(6, &[(s(b"x"), s(b"x\0"))]));
    }

    #[test]
    fn cardinality_rollover_opens_a_new_window() {
        let mut opts = EngineOptions::default();
        opts.window_rollover_cardinality = 1;
        let mut ws = WindowSet::new(&opts, 0);
        ws.record_commit(&[(s(b"a"), s(b"b"))], 1);
        ws.record_commit(&[(s(b"c"), s(b"d"))], 2);
        assert_eq!(ws.window_count(), 2);
    }

    #[test]
    fn retiring_a_closed_window_advances_the_oldest_retained_version() {
        let mut opts = EngineOptions::default();
        opts.window_rollover_cardinality = 1;
        let mut ws = WindowSet::new(&opts, 0);
        ws.record_commit(&[(s(b"a"), s(b"b"))], 1);
        ws.record_commit(&[(s(b"c"), s(b"d"))], 2);
        assert_eq!(ws.oldest_retained_version(), 0);
        ws.retire_below(1);
        assert_eq!(ws.oldest_retained_version(), 2);
    }
}
