use std::path::PathBuf;

use recstream_crypto::{ChainError, SignerError};
use recstream_types::TypeError;
use thiserror::Error;

/// Errors from encoding or decoding record and signature files.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated input at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("unknown section tag {tag:#04x} at offset {offset}")]
    UnknownTag { offset: usize, tag: u8 },

    #[error("negative length {length} at offset {offset}")]
    NegativeLength { offset: usize, length: i32 },

    #[error("hash length {actual} at offset {offset} does not match digest length {expected}")]
    HashLength {
        offset: usize,
        expected: usize,
        actual: usize,
    },

    #[error("unknown signature type id {0}")]
    UnknownSignatureType(i32),

    #[error("signature checksum mismatch: expected {expected}, found {actual}")]
    ChecksumMismatch { expected: i32, actual: i32 },

    #[error("{remaining} trailing bytes after end of file")]
    TrailingBytes { remaining: usize },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Errors from loading writer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the stream writer's public API.
///
/// Failures while assembling a file are absorbed by the writer (logged,
/// cancellation signalled, file abandoned), so callers only ever see the
/// conditions that make the call itself invalid.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("stream writer is stopped")]
    Stopped,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type WriterResult<T> = Result<T, WriterError>;

/// Reasons a persisted record/signature pair fails verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("{which} hash in signature file does not match the record file")]
    HashMismatch { which: &'static str },

    #[error("{which} signature rejected: {source}")]
    BadSignature {
        which: &'static str,
        #[source]
        source: SignerError,
    },

    #[error("unsupported signature type {0:?} for key verification")]
    UnsupportedSignatureType(recstream_crypto::SignatureType),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
