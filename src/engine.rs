//! The public engine surface: the single `Engine` context that owns
//! the heaps, index, transaction windows, and watch registry, and drives
//! the commit pipeline and background collector over them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use vkv_bytes::Slice;
use vkv_heap::flags::k;

use crate::atomic::{self, AtomicKind};
use crate::chain::{self, ReadResult};
use crate::collector::{self, CollectorStats};
use crate::error::{EngineError, Result};
use crate::heaps::Heaps;
use crate::index::KeyIndex;
use crate::options::EngineOptions;
use crate::selector::KeySelector;
use crate::snapshot::{self, SnapshotSink, SnapshotSource};
use crate::txn::{Op, Transaction};
use crate::watch::{WatchHandle, WatchRegistry};
use crate::windows::WindowSet;

const MAX_KEY_LEN: usize = 10_000;
const MAX_VALUE_LEN: usize = 100_000;

/// How eagerly `get_range` materializes results. With no network streaming
/// boundary in this core, `WantAll` and `Iterator` behave
/// identically; only `Exact` enforces a positive limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetRangeMode {
    WantAll,
    Iterator,
    Exact,
}

struct EngineState {
    heaps: Heaps,
    index: KeyIndex,
    windows: WindowSet,
    watches: WatchRegistry,
    last_commit_seq: u64,
}

/// The storage core. Cheap to share behind an `Arc`; internally locked so
/// many readers can run concurrently while commits and collector passes
/// serialize against each other.
pub struct Engine {
    state: RwLock<EngineState>,
    /// read_seq registered per live transaction, consulted by the collector
    /// to compute the reclamation horizon.
    active_reads: Mutex<BTreeMap<u64, u64>>,
    next_txn_id: AtomicU64,
    options: EngineOptions,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            state: RwLock::new(EngineState {
                heaps: Heaps::new(),
                index: KeyIndex::new(),
                windows: WindowSet::new(&options, 0),
                watches: WatchRegistry::new(),
                last_commit_seq: 0,
            }),
            active_reads: Mutex::new(BTreeMap::new()),
            next_txn_id: AtomicU64::new(1),
            options,
        })
    }

    pub fn begin_transaction(&self) -> Transaction {
        let id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        Transaction::new(id)
    }

    pub fn get_read_version(&self, txn: &mut Transaction) -> u64 {
        if let Some(seq) = txn.read_seq {
            return seq;
        }
        let seq = self.state.read().last_commit_seq;
        txn.read_seq = Some(seq);
        self.active_reads.lock().insert(txn.id, seq);
        seq
    }

    pub fn set_read_version(&self, txn: &mut Transaction, seq: u64) -> Result<()> {
        if seq < self.state.read().windows.oldest_retained_version() {
            return Err(EngineError::PastVersion);
        }
        txn.read_seq = Some(seq);
        self.active_reads.lock().insert(txn.id, seq);
        Ok(())
    }

    pub fn get(&self, txn: &mut Transaction, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>> {
        if txn.is_cancelled() {
            return Err(EngineError::TransactionCancelled);
        }
        let seq = self.get_read_version(txn);
        if !snapshot {
            let k = Slice::from(key);
            let end = k.successor();
            txn.read_ranges.push((k, end));
        }
        let state = self.state.read();
        read_key_at(&state, key, seq)
    }

    pub fn get_key(&self, txn: &mut Transaction, selector: &KeySelector, snapshot: bool) -> Result<Option<Vec<u8>>> {
        if txn.is_cancelled() {
            return Err(EngineError::TransactionCancelled);
        }
        let seq = self.get_read_version(txn);
        let state = self.state.read();
        let Some(resolved) = selector.resolve(&state.index) else {
            return Ok(None);
        };
        if !snapshot {
            let end = resolved.successor();
            txn.read_ranges.push((resolved.clone(), end));
        }
        read_key_at(&state, resolved.as_bytes(), seq)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_range(
        &self,
        txn: &mut Transaction,
        begin: &KeySelector,
        end: &KeySelector,
        limit: Option<usize>,
        reverse: bool,
        mode: GetRangeMode,
        snapshot: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if mode == GetRangeMode::Exact && !matches!(limit, Some(n) if n > 0) {
            return Err(EngineError::ExactModeWithoutLimits);
        }
        if txn.is_cancelled() {
            return Err(EngineError::TransactionCancelled);
        }
        let seq = self.get_read_version(txn);
        let state = self.state.read();

        let begin_key = begin.resolve(&state.index);
        let end_key = end.resolve(&state.index);
        let (begin_key, end_key) = match (begin_key, end_key) {
            (Some(b), Some(e)) => (b, e),
            _ => return Ok(Vec::new()),
        };
        if begin_key > end_key {
            return Err(EngineError::InvertedRange);
        }
        if begin_key == end_key {
            return Ok(Vec::new());
        }

        if !snapshot {
            txn.read_ranges.push((begin_key.clone(), end_key.clone()));
        }

        let mut out = Vec::new();
        for (key, handle) in state.index.range(begin_key.as_bytes(), end_key.as_bytes(), reverse) {
            if txn.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if let Some(limit) = limit {
                if out.len() >= limit {
                    break;
                }
            }
            let head = vkv_heap::krecord::read_header(state.heaps.keys.get(*handle)).head_value();
            if let ReadResult::Present(payload, _) = chain::read_at(&state.heaps.values, head, seq) {
                out.push((key.as_bytes().to_vec(), payload.to_vec()));
            }
        }
        Ok(out)
    }

    pub fn set(&self, txn: &mut Transaction, key: &[u8], value: &[u8]) -> Result<()> {
        check_key_len(key)?;
        check_value_len(value)?;
        if txn.is_cancelled() {
            return Ok(());
        }
        let k = Slice::from(key);
        let end = k.successor();
        txn.write_ranges.push((k.clone(), end));
        txn.ops.push((k, Op::Set(Slice::from(value))));
        Ok(())
    }

    pub fn clear(&self, txn: &mut Transaction, key: &[u8]) -> Result<()> {
        check_key_len(key)?;
        if txn.is_cancelled() {
            return Ok(());
        }
        let k = Slice::from(key);
        let end = k.successor();
        txn.write_ranges.push((k.clone(), end));
        txn.ops.push((k, Op::Clear));
        Ok(())
    }

    pub fn clear_range(&self, txn: &mut Transaction, begin: &[u8], end: &[u8]) -> Result<()> {
        if begin > end {
            return Err(EngineError::InvertedRange);
        }
        if txn.is_cancelled() {
            return Ok(());
        }
        if begin == end {
            return Ok(());
        }
        let b = Slice::from(begin);
        let e = Slice::from(end);
        txn.write_ranges.push((b.clone(), e.clone()));
        txn.ops.push((b, Op::ClearRange(e)));
        Ok(())
    }

    pub fn atomic(&self, txn: &mut Transaction, key: &[u8], kind: AtomicKind, operand: &[u8]) -> Result<()> {
        check_key_len(key)?;
        if txn.is_cancelled() {
            return Ok(());
        }
        let k = Slice::from(key);
        let end = k.successor();
        txn.write_ranges.push((k.clone(), end));
        txn.ops.push((k, Op::Atomic(kind, Slice::from(operand))));
        Ok(())
    }

    pub fn add_read_conflict_range(&self, txn: &mut Transaction, begin: &[u8], end: &[u8]) -> Result<()> {
        if begin > end {
            return Err(EngineError::InvertedRange);
        }
        txn.read_ranges.push((Slice::from(begin), Slice::from(end)));
        Ok(())
    }

    pub fn add_write_conflict_range(&self, txn: &mut Transaction, begin: &[u8], end: &[u8]) -> Result<()> {
        if begin > end {
            return Err(EngineError::InvertedRange);
        }
        txn.write_ranges.push((Slice::from(begin), Slice::from(end)));
        Ok(())
    }

    /// Drives the commit pipeline under the write lock, which doubles as
    /// the commit mutex.
    pub fn commit(&self, txn: &mut Transaction) -> Result<u64> {
        if txn.is_cancelled() {
            return Err(EngineError::TransactionCancelled);
        }
        let read_seq = self.get_read_version(txn);

        let commit_seq = {
            let mut state = self.state.write();

            // 1. conflict check
            if read_seq < state.windows.oldest_retained_version() {
                return Err(EngineError::PastVersion);
            }
            if state.windows.conflicts(read_seq, &txn.read_ranges) {
                return Err(EngineError::NotCommitted);
            }

            // 2. sequence assignment
            let commit_seq = state.last_commit_seq + 1;

            // 3. apply writes, in arrival order
            for (key, op) in std::mem::take(&mut txn.ops) {
                if txn.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                apply_op(&mut state, key.as_bytes(), op, commit_seq)?;
            }

            // 4. publish
            state.last_commit_seq = commit_seq;

            // 5. merge into the active window
            state.windows.record_commit(&txn.write_ranges, commit_seq);

            for (begin, end) in &txn.write_ranges {
                notify_touched_watches(&mut state, begin, end);
            }

            tracing::debug!(commit_seq, txn = txn.id, "commit published");
            commit_seq
        };

        self.active_reads.lock().remove(&txn.id);
        txn.committed = true;
        Ok(commit_seq)
    }

    pub fn on_error(&self, err: &EngineError) -> crate::error::OnError {
        err.on_error()
    }

    pub fn reset(&self, txn: &mut Transaction) {
        self.active_reads.lock().remove(&txn.id);
        txn.reset_state();
    }

    pub fn cancel(&self, txn: &Transaction) {
        txn.cancel.cancel();
    }

    pub fn watch(&self, key: &[u8]) -> WatchHandle {
        let mut state = self.state.write();
        let handle = state.watches.register(key, self.options.watch_queue_depth);
        if let Some(key_handle) = state.index.get(key) {
            let region = state.heaps.keys.get_mut(key_handle);
            let mut header = vkv_heap::krecord::read_header(region);
            header.flags |= k::HAS_WATCH;
            vkv_heap::krecord::write_header(region, &header);
        }
        handle
    }

    /// The oldest read sequence any live transaction could still observe;
    /// values strictly older than this and not at a chain head are
    /// reclaimable by the collector.
    pub fn horizon(&self) -> u64 {
        let active = self.active_reads.lock();
        let state = self.state.read();
        active.values().copied().min().unwrap_or(state.last_commit_seq)
    }

    /// Run one collector pass. Takes the write lock for the whole
    /// pass: a conservative simplification of the ideal of excluding commits
    /// only during each page's swap (see DESIGN.md).
    pub fn collect(&self) -> CollectorStats {
        let horizon = self.horizon();
        let mut state = self.state.write();
        let threshold = self.options.collector_free_ratio_threshold;
        let EngineState { heaps, index, watches, .. } = &mut *state;
        let stats = collector::run(heaps, index, watches, horizon, threshold);
        state.windows.retire_below(horizon);
        tracing::debug!(
            horizon,
            keys_reclaimed = stats.keys_reclaimed,
            values_reclaimed = stats.values_reclaimed,
            pages_swept = stats.pages_swept,
            "collector pass complete"
        );
        stats
    }

    /// Release every page backing both heaps and forget the index built
    /// over them. Intended for tearing an engine down; any transaction
    /// still holding a reference to data read before this call sees
    /// undefined results if it tries to read again.
    pub fn dispose(&self) {
        let mut state = self.state.write();
        state.heaps.dispose();
        state.index = KeyIndex::new();
    }

    pub fn export_snapshot(&self, seq: u64, sink: &mut dyn SnapshotSink) -> Result<()> {
        let state = self.state.read();
        for (key, handle) in state.index.iter() {
            let head = vkv_heap::krecord::read_header(state.heaps.keys.get(*handle)).head_value();
            if let ReadResult::Present(payload, observed_seq) = chain::read_at(&state.heaps.values, head, seq) {
                snapshot::write_entry(sink, key.as_bytes(), payload, observed_seq)
                    .map_err(|_| EngineError::Corrupted("snapshot sink write failed"))?;
            }
        }
        snapshot::write_sentinel(sink).map_err(|_| EngineError::Corrupted("snapshot sink write failed"))?;
        sink.flush().map_err(|_| EngineError::Corrupted("snapshot sink flush failed"))
    }

    pub fn import_snapshot(&self, source: &mut dyn SnapshotSource) -> Result<u64> {
        let mut state = self.state.write();
        let mut max_seq = state.last_commit_seq;
        loop {
            let key_len = snapshot::read_varint(source)
                .map_err(|_| EngineError::Corrupted("snapshot source read failed"))? as usize;
            if key_len == 0 {
                break;
            }
            let key = source.read_bytes(key_len).map_err(|_| EngineError::Corrupted("truncated snapshot"))?;
            let value_len = snapshot::read_varint(source)
                .map_err(|_| EngineError::Corrupted("snapshot source read failed"))? as usize;
            let value = source.read_bytes(value_len).map_err(|_| EngineError::Corrupted("truncated snapshot"))?;
            let seq_bytes = source.read_bytes(8).map_err(|_| EngineError::Corrupted("truncated snapshot"))?;
            let seq = u64::from_le_bytes(seq_bytes.try_into().map_err(|_| EngineError::Corrupted("bad sequence"))?);

            replay_set(&mut state, &key, &value, seq)?;
            max_seq = max_seq.max(seq);
        }
        state.last_commit_seq = max_seq;
        Ok(max_seq)
    }
}

fn check_key_len(key: &[u8]) -> Result<()> {
    if key.len() > MAX_KEY_LEN {
        return Err(EngineError::KeyTooLarge { len: key.len() });
    }
    Ok(())
}

fn check_value_len(value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_LEN {
        return Err(EngineError::ValueTooLarge { len: value.len() });
    }
    Ok(())
}

fn read_key_at(state: &EngineState, key: &[u8], seq: u64) -> Result<Option<Vec<u8>>> {
    let Some(handle) = state.index.get(key) else {
        return Ok(None);
    };
    let head = vkv_heap::krecord::read_header(state.heaps.keys.get(handle)).head_value();
    match chain::read_at(&state.heaps.values, head, seq) {
        ReadResult::Present(payload, _) => Ok(Some(payload.to_vec())),
        ReadResult::Deleted | ReadResult::Absent => Ok(None),
    }
}

fn notify_touched_watches(state: &mut EngineState, begin: &Slice, end: &Slice) {
    let touched: Vec<Slice> = state
        .index
        .range(begin.as_bytes(), end.as_bytes(), false)
        .map(|(k, _)| k.clone())
        .collect();
    for key in touched {
        state.watches.notify(key.as_bytes());
    }
}

/// Apply one staged operation during commit step 3. `ClearRange` is
/// resolved here, against the live index at commit time, into one
/// deletion per key currently in range — the number of keys it touches
/// isn't known until commit, unlike the other ops.
fn apply_op(state: &mut EngineState, key: &[u8], op: Op, commit_seq: u64) -> Result<()> {
    match op {
        Op::Set(value) => apply_set(state, key, &value, commit_seq),
        Op::Clear => apply_clear(state, key, commit_seq),
        Op::ClearRange(end) => {
            let keys: Vec<Vec<u8>> = state
                .index
                .range(key, end.as_bytes(), false)
                .map(|(k, _)| k.as_bytes().to_vec())
                .collect();
            for k in keys {
                apply_clear(state, &k, commit_seq)?;
            }
            Ok(())
        }
        Op::Atomic(kind, operand) => {
            let current = read_key_at(state, key, commit_seq.saturating_sub(1))?;
            let new_payload = atomic::apply(kind, current.as_deref().unwrap_or(&[]), &operand);
            apply_set(state, key, &new_payload, commit_seq)
        }
    }
}

fn apply_set(state: &mut EngineState, key: &[u8], value: &[u8], commit_seq: u64) -> Result<()> {
    let key_handle = find_or_alloc_key(state, key)?;
    let heaps = &mut state.heaps;
    let value_handle = heaps.alloc_value(commit_seq, value, 0)?;
    chain::prepend(&mut heaps.keys, &mut heaps.values, key_handle, value_handle);
    Ok(())
}

fn apply_clear(state: &mut EngineState, key: &[u8], commit_seq: u64) -> Result<()> {
    let key_handle = find_or_alloc_key(state, key)?;
    let heaps = &mut state.heaps;
    let value_handle = heaps.alloc_value(commit_seq, &[], vkv_heap::flags::v::DELETION)?;
    chain::prepend(&mut heaps.keys, &mut heaps.values, key_handle, value_handle);
    Ok(())
}

fn find_or_alloc_key(state: &mut EngineState, key: &[u8]) -> Result<vkv_heap::Handle> {
    let hash = xxhash_rust::xxh3::xxh3_64(key) as u32;
    let heaps = &mut state.heaps;
    state
        .index
        .get_or_try_insert_with(key, || heaps.alloc_key(key, hash, vkv_heap::flags::k::NEW))
}

fn replay_set(state: &mut EngineState, key: &[u8], value: &[u8], seq: u64) -> Result<()> {
    apply_set(state, key, value, seq)
}
