//! Hand-rolled error type for the heap layer, following the same pattern the
//! ancestor no_std crate used rather than pulling in `thiserror` (which the
//! higher, `std` engine crate uses instead).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HeapError {
    /// The record would not fit in any configured bucket.
    RecordTooLarge { len: usize, max: usize },
    /// A new page could not be allocated (the process allocator failed).
    OutOfMemory,
    /// A handle referred to a page or bucket that no longer exists.
    InvalidHandle,
}

impl core::fmt::Display for HeapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RecordTooLarge { len, max } => {
                write!(f, "record of {len} bytes exceeds the largest bucket ({max} bytes)")
            }
            Self::OutOfMemory => f.write_str("failed to allocate a new page"),
            Self::InvalidHandle => f.write_str("handle does not refer to a live record"),
        }
    }
}

impl core::error::Error for HeapError {}
