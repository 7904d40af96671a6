/// Errors returned by the shared and durable stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write lost a lock race (deadlock, lock wait timeout). Safe to
    /// retry.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// A counter key held something other than an unsigned integer, or
    /// could not be incremented any further.
    #[error("counter {namespace}/{key} cannot be incremented from {value:?}")]
    InvalidCounter {
        namespace: String,
        key: String,
        value: String,
    },

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// `true` for the retryable write-write conflict class.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}
