//! Owned, reference-counted byte slices with lexicographic ordering.
//!
//! This is the "byte-slice abstraction" component of the engine: a thin
//! wrapper that lets keys and values be cheaply cloned and shared across the
//! index, version chains, and transaction windows without re-copying their
//! bytes, while still comparing and hashing the way raw byte strings do.

mod slice;

pub use slice::Slice;
