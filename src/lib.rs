//! In-memory, multi-version, snapshot-isolated ordered key-value storage
//! core. Keys and values live in bucketed page heaps (`vkv_heap`); a
//! `BTreeMap` index orders keys and points at per-key version chains;
//! commits are validated against a rolling sequence of transaction windows
//! and a background collector reclaims versions no live transaction can
//! still observe.

mod atomic;
mod cancel;
mod chain;
mod collector;
mod engine;
mod error;
mod heaps;
mod index;
mod options;
mod selector;
mod snapshot;
mod txn;
mod watch;
mod window;
mod windows;

pub use atomic::AtomicKind;
pub use cancel::CancellationToken;
pub use collector::CollectorStats;
pub use engine::{Engine, GetRangeMode};
pub use error::{EngineError, OnError, Result};
pub use options::EngineOptions;
pub use selector::KeySelector;
pub use snapshot::{SnapshotSink, SnapshotSource};
pub use txn::Transaction;
pub use vkv_bytes::Slice;
pub use watch::WatchHandle;
