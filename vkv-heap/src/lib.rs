#![no_std]

//! Bucketed page heaps for the versioned key/value store's in-memory arenas.
//!
//! This crate owns the bump-allocating, size-classed storage primitives (the
//! "bucketed page heap" of the engine design) and the in-place record headers
//! for key and value records. It knows nothing about ordering, MVCC, or
//! transactions; those live one layer up, in the engine crate. Everything
//! here is addressed by `Handle`, a packed offset into an owning `Heap`
//! rather than a pointer, so none of it needs `unsafe` to stay memory safe.

extern crate alloc;

pub mod bucket;
pub mod error;
pub mod flags;
pub mod handle;
pub mod krecord;
pub mod page;
pub mod vrecord;

pub use bucket::{Bucket, BucketConfig, Heap, KEY_BUCKETS, VALUE_BUCKETS};
pub use error::HeapError;
pub use flags::{KFlags, VFlags};
pub use handle::{Handle, Kind};
pub use krecord::KHeader;
pub use page::{align8, Page};
pub use vrecord::VHeader;
