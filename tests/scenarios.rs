//! End-to-end scenarios against the public `Engine` surface.

use vkv_engine::{AtomicKind, Engine, EngineError, EngineOptions, GetRangeMode, KeySelector, Slice};

fn engine() -> Engine {
    Engine::new(EngineOptions::default()).unwrap()
}

#[test]
fn basic_snapshot_isolated_read_survives_a_concurrent_commit() {
    let e = engine();
    let mut seed = e.begin_transaction();
    e.set(&mut seed, b"a", b"1").unwrap();
    e.set(&mut seed, b"b", b"2").unwrap();
    e.commit(&mut seed).unwrap();

    let mut t = e.begin_transaction();
    assert_eq!(e.get(&mut t, b"a", false).unwrap(), Some(b"1".to_vec()));
    assert_eq!(e.get(&mut t, b"b", false).unwrap(), Some(b"2".to_vec()));

    let mut concurrent = e.begin_transaction();
    e.set(&mut concurrent, b"a", b"1p").unwrap();
    e.commit(&mut concurrent).unwrap();

    assert_eq!(e.get(&mut t, b"a", false).unwrap(), Some(b"1".to_vec()));
}

#[test]
fn overlapping_write_read_conflict_fails_commit() {
    let e = engine();
    let mut seed = e.begin_transaction();
    e.set(&mut seed, b"x", b"0").unwrap();
    e.commit(&mut seed).unwrap();

    let mut t1 = e.begin_transaction();
    e.get(&mut t1, b"x", false).unwrap();
    e.set(&mut t1, b"x", b"a").unwrap();

    let mut t2 = e.begin_transaction();
    e.set(&mut t2, b"x", b"b").unwrap();
    e.commit(&mut t2).unwrap();

    let err = e.commit(&mut t1).unwrap_err();
    assert!(matches!(err, EngineError::NotCommitted));
    assert_eq!(e.on_error(&err), vkv_engine::OnError::Retry);
}

#[test]
fn snapshot_read_never_conflicts() {
    let e = engine();
    let mut seed = e.begin_transaction();
    e.set(&mut seed, b"x", b"0").unwrap();
    e.commit(&mut seed).unwrap();

    let mut t1 = e.begin_transaction();
    e.get(&mut t1, b"x", true).unwrap();
    e.set(&mut t1, b"x", b"a").unwrap();

    let mut t2 = e.begin_transaction();
    e.set(&mut t2, b"x", b"b").unwrap();
    e.commit(&mut t2).unwrap();

    assert!(e.commit(&mut t1).is_ok());
}

#[test]
fn atomic_add_is_little_endian_with_carry() {
    let e = engine();
    let mut seed = e.begin_transaction();
    e.set(&mut seed, b"x", &[1, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    e.commit(&mut seed).unwrap();

    let mut t = e.begin_transaction();
    e.atomic(&mut t, b"x", AtomicKind::Add, &[2, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    e.commit(&mut t).unwrap();

    let mut r = e.begin_transaction();
    assert_eq!(e.get(&mut r, b"x", true).unwrap(), Some(vec![3, 0, 0, 0, 0, 0, 0, 0]));
}

#[test]
fn atomic_add_zero_is_a_noop_observable_as_a_new_version() {
    let e = engine();
    let mut seed = e.begin_transaction();
    e.set(&mut seed, b"x", &[5, 0, 0, 0]).unwrap();
    e.commit(&mut seed).unwrap();

    let mut t = e.begin_transaction();
    e.atomic(&mut t, b"x", AtomicKind::Add, &[0, 0, 0, 0]).unwrap();
    e.commit(&mut t).unwrap();

    let mut r = e.begin_transaction();
    assert_eq!(e.get(&mut r, b"x", true).unwrap(), Some(vec![5, 0, 0, 0]));
}

#[test]
fn reverse_range_with_limit_returns_newest_keys_first() {
    let e = engine();
    let mut t = e.begin_transaction();
    for i in 0..10 {
        e.set(&mut t, format!("k{:02}", i).as_bytes(), b"v").unwrap();
    }
    e.commit(&mut t).unwrap();

    let mut r = e.begin_transaction();
    let begin = KeySelector::first_greater_or_equal(Slice::from(b"k00".as_slice()));
    let end = KeySelector::first_greater_or_equal(Slice::from(b"k0z".as_slice()));
    let got = e.get_range(&mut r, &begin, &end, Some(3), true, GetRangeMode::WantAll, true).unwrap();
    let keys: Vec<Vec<u8>> = got.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![b"k09".to_vec(), b"k08".to_vec(), b"k07".to_vec()]);
}

#[test]
fn clear_range_removes_only_the_keys_in_range() {
    let e = engine();
    let mut t = e.begin_transaction();
    for k in [b"a", b"b", b"c", b"d"] {
        e.set(&mut t, k, b"v").unwrap();
    }
    e.commit(&mut t).unwrap();

    let mut c = e.begin_transaction();
    e.clear_range(&mut c, b"b", b"d").unwrap();
    e.commit(&mut c).unwrap();

    let mut r = e.begin_transaction();
    let begin = KeySelector::first_greater_or_equal(Slice::from(b"a".as_slice()));
    let end = KeySelector::first_greater_or_equal(Slice::from(b"z".as_slice()));
    let remaining = e.get_range(&mut r, &begin, &end, None, false, GetRangeMode::WantAll, true).unwrap();
    let keys: Vec<Vec<u8>> = remaining.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"d".to_vec()]);
}

#[test]
fn clear_then_get_is_absent_then_set_restores_it_within_one_transaction() {
    let e = engine();
    let mut seed = e.begin_transaction();
    e.set(&mut seed, b"k", b"v").unwrap();
    e.commit(&mut seed).unwrap();

    let mut t = e.begin_transaction();
    e.clear(&mut t, b"k").unwrap();
    assert_eq!(e.get(&mut t, b"k", true).unwrap(), None);
    e.set(&mut t, b"k", b"v2").unwrap();
    e.commit(&mut t).unwrap();

    let mut r = e.begin_transaction();
    assert_eq!(e.get(&mut r, b"k", true).unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn range_with_begin_equal_end_is_empty() {
    let e = engine();
    let mut t = e.begin_transaction();
    e.set(&mut t, b"a", b"1").unwrap();
    e.commit(&mut t).unwrap();

    let mut r = e.begin_transaction();
    let sel = KeySelector::first_greater_or_equal(Slice::from(b"a".as_slice()));
    let got = e.get_range(&mut r, &sel, &sel, None, false, GetRangeMode::WantAll, true).unwrap();
    assert!(got.is_empty());
}

#[test]
fn inverted_range_fails() {
    let e = engine();
    let mut t = e.begin_transaction();
    let begin = KeySelector::first_greater_or_equal(Slice::from(b"z".as_slice()));
    let end = KeySelector::first_greater_or_equal(Slice::from(b"a".as_slice()));
    let err = e.get_range(&mut t, &begin, &end, None, false, GetRangeMode::WantAll, true).unwrap_err();
    assert!(matches!(err, EngineError::InvertedRange));
}

#[test]
fn snapshot_export_then_import_reproduces_the_live_set() {
    let e = engine();
    let mut t = e.begin_transaction();
    e.set(&mut t, b"a", b"1").unwrap();
    e.set(&mut t, b"b", b"2").unwrap();
    e.set(&mut t, b"c", b"3").unwrap();
    let seq = e.commit(&mut t).unwrap();

    let mut buf: Vec<u8> = Vec::new();
    e.export_snapshot(seq, &mut buf).unwrap();

    let target = engine();
    let mut source = SliceSource { data: buf, pos: 0 };
    target.import_snapshot(&mut source).unwrap();

    let mut r = target.begin_transaction();
    assert_eq!(target.get(&mut r, b"a", true).unwrap(), Some(b"1".to_vec()));
    assert_eq!(target.get(&mut r, b"b", true).unwrap(), Some(b"2".to_vec()));
    assert_eq!(target.get(&mut r, b"c", true).unwrap(), Some(b"3".to_vec()));
}

#[test]
fn watch_fires_once_the_key_is_touched_by_a_commit() {
    let e = engine();
    let mut seed = e.begin_transaction();
    e.set(&mut seed, b"k", b"v0").unwrap();
    e.commit(&mut seed).unwrap();

    let handle = e.watch(b"k");
    assert!(!handle.is_ready());

    let mut t = e.begin_transaction();
    e.set(&mut t, b"k", b"v1").unwrap();
    e.commit(&mut t).unwrap();

    assert!(handle.is_ready());
}

#[test]
fn collector_reclaims_superseded_versions_without_losing_the_live_one() {
    let e = engine();
    let mut t1 = e.begin_transaction();
    e.set(&mut t1, b"k", b"v1").unwrap();
    e.commit(&mut t1).unwrap();

    let mut t2 = e.begin_transaction();
    e.set(&mut t2, b"k", b"v2").unwrap();
    e.commit(&mut t2).unwrap();

    e.collect();

    let mut r = e.begin_transaction();
    assert_eq!(e.get(&mut r, b"k", true).unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn setting_a_retired_read_version_fails_with_past_version() {
    let mut opts = EngineOptions::default();
    opts.window_rollover_cardinality = 1;
    let e = Engine::new(opts).unwrap();

    let mut stale = e.begin_transaction();
    let stale_seq = e.get_read_version(&mut stale);
    e.reset(&mut stale);

    for i in 0..5 {
        let mut t = e.begin_transaction();
        e.set(&mut t, format!("k{i}").as_bytes(), b"v").unwrap();
        e.commit(&mut t).unwrap();
        e.collect();
    }

    let mut late = e.begin_transaction();
    let err = e.set_read_version(&mut late, stale_seq).unwrap_err();
    assert!(matches!(err, EngineError::PastVersion));
    assert_eq!(e.on_error(&err), vkv_engine::OnError::Retry);
}

#[test]
fn dispose_releases_all_pages_and_forgets_the_index() {
    let e = engine();
    let mut t = e.begin_transaction();
    e.set(&mut t, b"a", b"1").unwrap();
    e.set(&mut t, b"b", b"2").unwrap();
    e.commit(&mut t).unwrap();

    e.dispose();

    let mut r = e.begin_transaction();
    assert_eq!(e.get(&mut r, b"a", true).unwrap(), None);
    assert_eq!(e.get(&mut r, b"b", true).unwrap(), None);
}

struct SliceSource {
    data: Vec<u8>,
    pos: usize,
}

impl vkv_engine::SnapshotSource for SliceSource {
    fn read_bytes(&mut self, len: usize) -> std::io::Result<Vec<u8>> {
        let out = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(out)
    }
}
