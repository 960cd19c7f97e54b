use vkv_bytes::Slice;

use crate::atomic::AtomicKind;
use crate::cancel::CancellationToken;

/// A staged mutation against a single key, or a whole range.
pub enum Op {
    Set(Slice),
    Clear,
    ClearRange(Slice),
    Atomic(AtomicKind, Slice),
}

/// A transaction handle. Carries its own read/write conflict ranges and
/// staged operations; nothing here is visible to other transactions until
/// `Engine::commit` succeeds.
pub struct Transaction {
    pub(crate) id: u64,
    pub(crate) read_seq: Option<u64>,
    pub(crate) read_ranges: Vec<(Slice, Slice)>,
    pub(crate) write_ranges: Vec<(Slice, Slice)>,
    pub(crate) ops: Vec<(Slice, Op)>,
    pub(crate) cancel: CancellationToken,
    pub(crate) committed: bool,
}

impl Transaction {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            read_seq: None,
            read_ranges: Vec::new(),
            write_ranges: Vec::new(),
            ops: Vec::new(),
            cancel: CancellationToken::new(),
            committed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn reset_state(&mut self) {
        self.read_seq = None;
        self.read_ranges.clear();
        self.write_ranges.clear();
        self.ops.clear();
        self.cancel = CancellationToken::new();
        self.committed = false;
    }
}
