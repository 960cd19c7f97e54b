//! Background collector: marks value records no longer observable by
//! any live transaction, marks keys whose whole chain has become
//! reclaimable, then compacts pages whose free ratio clears the configured
//! threshold.
//!
//! Runs as a cooperative, single-threaded pass. Per the open question
//! recorded in DESIGN.md, buckets are always swept key-heap-then-value-heap
//! in ascending bucket-index order (a deterministic replacement for the
//! non-deterministic forward/backward scan policy the design notes flag),
//! logging each page it chooses to sweep.
//!
//! Relocation is computed in two stages so that fixups never race page
//! order: first every live record that will move is assigned its new
//! `Handle` (building complete old-handle -> new-handle maps for both
//! heaps, without touching any back-pointer yet); only once those maps are
//! complete do we patch every back/forward-pointer, writing into whichever
//! scratch page or still-live page currently owns that pointer's new home.

use std::collections::HashMap;

use vkv_heap::{align8, flags::k, flags::v, krecord, vrecord, Handle, Kind, Page};

use crate::heaps::Heaps;
use crate::index::KeyIndex;
use crate::watch::WatchRegistry;

#[derive(Debug, Default, Clone, Copy)]
pub struct CollectorStats {
    pub keys_reclaimed: u64,
    pub values_reclaimed: u64,
    pub pages_swept: u64,
}

struct PlannedMove {
    old: Handle,
    new: Handle,
    /// The bytes of the record as they stood before any move this pass.
    bytes: Vec<u8>,
}

/// Run one full mark-and-sweep pass. `horizon` is the oldest read sequence
/// still observable by any live transaction (see `Engine::horizon`).
pub fn run(
    heaps: &mut Heaps,
    index: &mut KeyIndex,
    watches: &mut WatchRegistry,
    horizon: u64,
    free_ratio_threshold: f32,
) -> CollectorStats {
    let mut stats = CollectorStats::default();
    let (dead_keys, dead_values, unreachable_keys) = mark(heaps, index, horizon);

    for key_bytes in &unreachable_keys {
        index.remove(key_bytes);
        watches.retire(key_bytes);
        stats.keys_reclaimed += 1;
    }
    for key_handle in &dead_keys {
        let region = heaps.keys.get_mut(*key_handle);
        let mut header = krecord::read_header(region);
        header.flags |= k::UNREACHABLE | k::DISPOSED;
        krecord::write_header(region, &header);
    }
    stats.values_reclaimed = dead_values.len() as u64;

    // Feed the free-ratio heuristic: every record mark decided is dead
    // weight in its page until that page is swept.
    for handle in &dead_values {
        let len = value_record_len(heaps.values.get(*handle));
        heaps.values.bucket_mut(handle.bucket()).page_mut(handle.page()).mark_disposed(len);
    }
    for handle in &dead_keys {
        let len = key_record_len(heaps.keys.get(*handle));
        heaps.keys.bucket_mut(handle.bucket()).page_mut(handle.page()).mark_disposed(len);
    }

    // --- plan relocations across both heaps before any fixup write ---
    let mut scratches: HashMap<(Kind, u8, u32), Page> = HashMap::new();
    let mut key_moves: Vec<PlannedMove> = Vec::new();
    let mut value_moves: Vec<PlannedMove> = Vec::new();

    for bucket_idx in 0..heaps.keys.bucket_count() as u8 {
        stats.pages_swept += plan_bucket(
            heaps.keys.bucket(bucket_idx),
            Kind::Key,
            bucket_idx,
            &dead_keys,
            free_ratio_threshold,
            key_record_len,
            &mut scratches,
            &mut key_moves,
        );
    }
    for bucket_idx in 0..heaps.values.bucket_count() as u8 {
        stats.pages_swept += plan_bucket(
            heaps.values.bucket(bucket_idx),
            Kind::Value,
            bucket_idx,
            &dead_values,
            free_ratio_threshold,
            value_record_len,
            &mut scratches,
            &mut value_moves,
        );
    }

    let key_map: HashMap<Handle, Handle> = key_moves.iter().map(|m| (m.old, m.new)).collect();
    let value_map: HashMap<Handle, Handle> = value_moves.iter().map(|m| (m.old, m.new)).collect();

    // --- fixups: for every relocated K, repoint its head V's parent ---
    for mv in &key_moves {
        let header = krecord::read_header(&mv.bytes);
        let key_bytes = krecord::key_bytes(&mv.bytes, &header).to_vec();
        index.relocate(&key_bytes, mv.new);

        let head = header.head_value();
        if head.is_none() {
            continue;
        }
        set_value_parent(&mut scratches, heaps, &value_map, head, mv.new);
    }

    // --- fixups: for every relocated V, repoint its referencer and child ---
    for mv in &value_moves {
        let header = vrecord::read_header(&mv.bytes);

        let referencer = header.parent();
        if !referencer.is_none() {
            match referencer.kind() {
                Kind::Key => {
                    let target = key_map.get(&referencer).copied().unwrap_or(referencer);
                    set_key_head(&mut scratches, heaps, &key_map, target, mv.new);
                }
                Kind::Value => {
                    let target = value_map.get(&referencer).copied().unwrap_or(referencer);
                    set_value_prev(&mut scratches, heaps, &value_map, target, mv.new);
                }
            }
        }

        let child = header.prev();
        if !child.is_none() {
            let target = value_map.get(&child).copied().unwrap_or(child);
            set_value_parent(&mut scratches, heaps, &value_map, target, mv.new);
        }
    }

    // --- install: swap every swept page for its finished scratch ---
    for ((kind, bucket_idx, page_idx), scratch) in scratches {
        match kind {
            Kind::Key => {
                heaps.keys.bucket_mut(bucket_idx).swap(page_idx, scratch);
            }
            Kind::Value => {
                heaps.values.bucket_mut(bucket_idx).swap(page_idx, scratch);
            }
        }
    }

    stats
}

/// Walk every chain once, deciding which V's and K's are reclaimable: a
/// non-head V older than `horizon` is reclaimable outright;
/// a chain whose head is itself a reclaimable deletion takes its whole
/// chain (and its K) down with it.
fn mark(
    heaps: &Heaps,
    index: &KeyIndex,
    horizon: u64,
) -> (std::collections::HashSet<Handle>, std::collections::HashSet<Handle>, Vec<Vec<u8>>) {
    let mut dead_keys = std::collections::HashSet::new();
    let mut unreachable = Vec::new();
    let mut dead_values = std::collections::HashSet::new();

    for (key_slice, key_handle) in index.iter() {
        let head = krecord::read_header(heaps.keys.get(*key_handle)).head_value();
        if head.is_none() {
            continue;
        }
        let mut chain = Vec::new();
        let mut cursor = head;
        while !cursor.is_none() {
            let header = vrecord::read_header(heaps.values.get(cursor));
            chain.push((cursor, header));
            cursor = header.prev();
        }

        for (i, (handle, header)) in chain.iter().enumerate() {
            if i > 0 && header.sequence < horizon {
                dead_values.insert(*handle);
            }
        }

        let (_, head_header) = chain[0];
        let head_is_reclaimable_deletion =
            head_header.flags & v::DELETION != 0 && head_header.sequence < horizon;
        if head_is_reclaimable_deletion {
            for (handle, _) in &chain {
                dead_values.insert(*handle);
            }
            dead_keys.insert(*key_handle);
            unreachable.push(key_slice.as_bytes().to_vec());
            tracing::debug!(key = ?key_slice, seq = head_header.sequence, "key chain fully reclaimable");
        }
    }

    (dead_keys, dead_values, unreachable)
}

fn key_record_len(region: &[u8]) -> usize {
    krecord::record_len(krecord::read_header(region).key_len as usize)
}

fn value_record_len(region: &[u8]) -> usize {
    vrecord::record_len(vrecord::read_header(region).size as usize)
}

/// Walk `bytes[..cursor]`, yielding `(offset, record_slice)` pairs. A
/// standalone copy of `Page::walk`'s logic over an owned buffer, since the
/// collector snapshots a page's bytes before it can start planning moves
/// out of it.
fn walk_records(bytes: &[u8], cursor: usize, len_of: impl Fn(&[u8]) -> usize) -> Vec<(u32, Vec<u8>)> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < cursor {
        let region = &bytes[offset..];
        let len = len_of(region);
        out.push((offset as u32, region[..len].to_vec()));
        offset += align8(len);
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn plan_bucket(
    bucket: &vkv_heap::Bucket,
    kind: Kind,
    bucket_idx: u8,
    dead: &std::collections::HashSet<Handle>,
    threshold: f32,
    len_of: impl Fn(&[u8]) -> usize,
    scratches: &mut HashMap<(Kind, u8, u32), Page>,
    moves: &mut Vec<PlannedMove>,
) -> u64 {
    let mut swept = 0u64;
    for page_idx in 0..bucket.page_count() as u32 {
        let page = bucket.page(page_idx);
        if page.free_ratio() < threshold || page.cursor() == 0 {
            continue;
        }
        let old_bytes = page.bytes().to_vec();
        let cursor = page.cursor();
        let capacity = page.capacity();
        tracing::debug!(?kind, bucket = bucket_idx, page = page_idx, "sweeping page");

        let mut scratch = Page::new(capacity);
        for (offset, record) in walk_records(&old_bytes, cursor, &len_of) {
            let old_handle = Handle::new(kind, bucket_idx, page_idx, offset);
            if dead.contains(&old_handle) {
                continue;
            }
            let new_offset = scratch.alloc(record.len()).expect("scratch page sized to fit all live records");
            scratch.bytes_mut()[new_offset as usize..new_offset as usize + record.len()]
                .copy_from_slice(&record);
            let new_handle = Handle::new(kind, bucket_idx, page_idx, new_offset);
            moves.push(PlannedMove { old: old_handle, new: new_handle, bytes: record });
        }
        scratches.insert((kind, bucket_idx, page_idx), scratch);
        swept += 1;
    }
    swept
}

/// Patch `key_handle`'s `head_value` field to `new_value`, writing into the
/// scratch page that will become its home if it was itself relocated this
/// pass, or directly into the still-live heap otherwise.
fn set_key_head(
    scratches: &mut HashMap<(Kind, u8, u32), Page>,
    heaps: &mut Heaps,
    key_map: &HashMap<Handle, Handle>,
    key_handle: Handle,
    new_value: Handle,
) {
    let resolved = key_map.get(&key_handle).copied().unwrap_or(key_handle);
    if let Some(page) = scratches.get_mut(&(Kind::Key, resolved.bucket(), resolved.page())) {
        let region = &mut page.bytes_mut()[resolved.offset() as usize..];
        let mut header = krecord::read_header(region);
        header.set_head_value(new_value);
        krecord::write_header(region, &header);
    } else {
        let region = heaps.keys.get_mut(resolved);
        let mut header = krecord::read_header(region);
        header.set_head_value(new_value);
        krecord::write_header(region, &header);
    }
}

fn set_value_prev(
    scratches: &mut HashMap<(Kind, u8, u32), Page>,
    heaps: &mut Heaps,
    value_map: &HashMap<Handle, Handle>,
    value_handle: Handle,
    new_prev: Handle,
) {
    let resolved = value_map.get(&value_handle).copied().unwrap_or(value_handle);
    if let Some(page) = scratches.get_mut(&(Kind::Value, resolved.bucket(), resolved.page())) {
        let region = &mut page.bytes_mut()[resolved.offset() as usize..];
        let mut header = vrecord::read_header(region);
        header.set_prev(new_prev);
        vrecord::write_header(region, &header);
    } else {
        let region = heaps.values.get_mut(resolved);
        let mut header = vrecord::read_header(region);
        header.set_prev(new_prev);
        vrecord::write_header(region, &header);
    }
}

fn set_value_parent(
    scratches: &mut HashMap<(Kind, u8, u32), Page>,
    heaps: &mut Heaps,
    value_map: &HashMap<Handle, Handle>,
    value_handle: Handle,
    new_parent: Handle,
) {
    let resolved = value_map.get(&value_handle).copied().unwrap_or(value_handle);
    if let Some(page) = scratches.get_mut(&(Kind::Value, resolved.bucket(), resolved.page())) {
        let region = &mut page.bytes_mut()[resolved.offset() as usize..];
        let mut header = vrecord::read_header(region);
        header.set_parent(new_parent);
        vrecord::write_header(region, &header);
    } else {
        let region = heaps.values.get_mut(resolved);
        let mut header = vrecord::read_header(region);
        header.set_parent(new_parent);
        vrecord::write_header(region, &header);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;

    fn seed(heaps: &mut Heaps, index: &mut KeyIndex, key: &[u8], payload: &[u8], seq: u64) {
        let hash = xxhash_rust::xxh3::xxh3_64(key) as u32;
        let handle = index.get_or_insert_with(key, || heaps.alloc_key(key, hash, 0).unwrap());
        let v = heaps.alloc_value(seq, payload, 0).unwrap();
        crate::chain::prepend(&mut heaps.keys, &mut heaps.values, handle, v);
    }

    #[test]
    fn old_non_head_versions_are_reclaimed() {
        let mut heaps = Heaps::new();
        let mut index = KeyIndex::new();
        seed(&mut heaps, &mut index, b"x", b"v1", 1);
        seed(&mut heaps, &mut index, b"x", b"v2", 2);

        let mut watches = WatchRegistry::new();
        let options = EngineOptions::default();
        let stats = run(&mut heaps, &mut index, &mut watches, 2, options.collector_free_ratio_threshold);
        assert_eq!(stats.values_reclaimed, 1);

        let handle = index.get(b"x").unwrap();
        let head = krecord::read_header(heaps.keys.get(handle)).head_value();
        match crate::chain::read_at(&heaps.values, head, 2) {
            crate::chain::ReadResult::Present(payload, _) => assert_eq!(payload, b"v2"),
            _ => panic!("expected v2 still reachable"),
        }
    }

    #[test]
    fn fully_deleted_chain_makes_key_unreachable() {
        let mut heaps = Heaps::new();
        let mut index = KeyIndex::new();
        seed(&mut heaps, &mut index, b"x", b"v1", 1);
        let handle = index.get(b"x").unwrap();
        let deletion = heaps.alloc_value(2, &[], vkv_heap::flags::v::DELETION).unwrap();
        crate::chain::prepend(&mut heaps.keys, &mut heaps.values, handle, deletion);

        let mut watches = WatchRegistry::new();
        let stats = run(&mut heaps, &mut index, &mut watches, 10, 0.0);
        assert_eq!(stats.keys_reclaimed, 1);
        assert!(index.get(b"x").is_none());
    }
}
