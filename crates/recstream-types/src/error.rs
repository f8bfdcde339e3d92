use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown digest type id: {0:#010x}")]
    UnknownDigestType(i32),

    #[error("timestamp out of range: {seconds}s {nanos}ns")]
    TimestampOutOfRange { seconds: i64, nanos: u32 },
}

/// Errors from waiting on a running-hash link.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The waiter's cancellation token fired before the hash was available.
    #[error("wait for running hash was cancelled")]
    Cancelled,

    /// The link was released without ever being resolved.
    #[error("running hash link was released before it resolved")]
    Released,
}
