use thiserror::Error;

/// The taxonomy surfaced by the core: transient commit failures, argument
/// errors, resource errors, and internal invariant violations (the last of
/// which should never escape a correctly driven API).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// A concurrent commit invalidated one of this transaction's read
    /// ranges. Retry with a fresh read version.
    #[error("transaction conflicts with a concurrent commit")]
    NotCommitted,
    /// The transaction was cancelled before it could commit.
    #[error("transaction was cancelled")]
    TransactionCancelled,
    /// The requested read version is older than the oldest window the
    /// engine can still validate against.
    #[error("read version is older than the oldest retained transaction window")]
    PastVersion,
    /// A range's begin key sorted after its end key.
    #[error("range begin key is greater than its end key")]
    InvertedRange,
    /// `get_range` was called with `GetRangeMode::Exact` but no positive
    /// limit.
    #[error("exact range mode requires a positive limit")]
    ExactModeWithoutLimits,
    /// A key exceeded the 10,000 byte limit.
    #[error("key of {len} bytes exceeds the 10,000 byte limit")]
    KeyTooLarge { len: usize },
    /// A value exceeded the 100,000 byte limit.
    #[error("value of {len} bytes exceeds the 100,000 byte limit")]
    ValueTooLarge { len: usize },
    /// An `EngineOptions` field was out of its accepted range.
    #[error("invalid option value: {0}")]
    InvalidOptionValue(&'static str),
    /// A heap ran out of backing memory while applying a commit. The commit
    /// never published, so the engine remains consistent.
    #[error("allocator exhausted: {0}")]
    OutOfMemory(#[from] vkv_heap::HeapError),
    /// The operation's cancellation token was tripped mid-flight.
    #[error("operation was cancelled")]
    Cancelled,
    /// An internal invariant was violated. Should never be returned from a
    /// correctly driven API; exists so debug assertions have somewhere to
    /// report.
    #[error("internal invariant violation: {0}")]
    Corrupted(&'static str),
}

pub type Result<T> = core::result::Result<T, EngineError>;

/// What a client should do after seeing an [`EngineError`] from `commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    Retry,
    Fatal,
}

impl EngineError {
    /// Mirrors the client surface's `on_error(txn, code)`.
    pub fn on_error(&self) -> OnError {
        match self {
            EngineError::NotCommitted
            | EngineError::TransactionCancelled
            | EngineError::PastVersion => OnError::Retry,
            _ => OnError::Fatal,
        }
    }
}
