//! Property-based checks for the quantified invariants of the commit
//! pipeline and transaction windows: every commit either installs a fully
//! consistent new version or is rejected outright, and conflicting reads
//! are never silently accepted.

use proptest::prelude::*;
use vkv_engine::{Engine, EngineOptions};

fn small_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..4, 1..3)
}

fn small_value() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..8)
}

proptest! {
    /// A transaction that only read keys it never wrote, with no concurrent
    /// writer in between, always commits: read-only/no-overlap transactions
    /// never spuriously conflict with themselves.
    #[test]
    fn solo_writer_never_self_conflicts(writes in prop::collection::vec((small_key(), small_value()), 1..20)) {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        for (k, v) in &writes {
            let mut txn = engine.begin_transaction();
            engine.get(&mut txn, k, false).unwrap();
            engine.set(&mut txn, k, v).unwrap();
            prop_assert!(engine.commit(&mut txn).is_ok());
        }
    }

    /// After a sequence of sets, each key reads back its most recently
    /// written value — last-writer-wins along a single chain.
    #[test]
    fn last_write_wins_per_key(values in prop::collection::vec(small_value(), 1..10)) {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let key = b"the-key";
        for v in &values {
            let mut txn = engine.begin_transaction();
            engine.set(&mut txn, key, v).unwrap();
            engine.commit(&mut txn).unwrap();
        }
        let mut r = engine.begin_transaction();
        let got = engine.get(&mut r, key, true).unwrap();
        prop_assert_eq!(got, values.last().cloned());
    }

    /// A transaction that reads a key, then a concurrent writer commits a
    /// change to that exact key, must fail to commit if it also staged a
    /// write (conflicting), and must always see the pre-commit value.
    #[test]
    fn concurrent_overlapping_commit_forces_a_conflict(
        initial in small_value(),
        conflicting in small_value(),
        reader_write in small_value(),
    ) {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let key = b"k";
        let mut seed = engine.begin_transaction();
        engine.set(&mut seed, key, &initial).unwrap();
        engine.commit(&mut seed).unwrap();

        let mut t1 = engine.begin_transaction();
        let seen = engine.get(&mut t1, key, false).unwrap();
        prop_assert_eq!(seen, Some(initial));
        engine.set(&mut t1, key, &reader_write).unwrap();

        let mut t2 = engine.begin_transaction();
        engine.set(&mut t2, key, &conflicting).unwrap();
        engine.commit(&mut t2).unwrap();

        prop_assert!(engine.commit(&mut t1).is_err());
    }

    /// Collector passes interleaved with commits never change what a fresh
    /// read observes for the latest committed value.
    #[test]
    fn collector_passes_are_read_transparent(values in prop::collection::vec(small_value(), 2..12)) {
        let engine = Engine::new(EngineOptions::default()).unwrap();
        let key = b"gc-key";
        for v in &values {
            let mut txn = engine.begin_transaction();
            engine.set(&mut txn, key, v).unwrap();
            engine.commit(&mut txn).unwrap();
            engine.collect();
        }
        let mut r = engine.begin_transaction();
        let got = engine.get(&mut r, key, true).unwrap();
        prop_assert_eq!(got, values.last().cloned());
    }
}
