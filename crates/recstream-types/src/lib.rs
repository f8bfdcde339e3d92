//! Foundation types for the record stream.
//!
//! This crate provides the digest, time, alignment and hash-chain handle
//! types shared by the stream writer and its verifiers. Every other
//! `recstream` crate depends on `recstream-types`.
//!
//! # Key Types
//!
//! - [`Hash`]: SHA-384 digest used for running, file and metadata hashes
//! - [`ConsensusTimestamp`]: consensus time of a transaction
//! - [`StreamAlignment`]: block a record belongs to, or none
//! - [`RunningHashLink`]: blocking, cancellable handle to a running hash
//! - [`RecordStreamObject`]: one transaction and its execution record

pub mod alignment;
pub mod error;
pub mod hash;
pub mod link;
pub mod object;
pub mod timestamp;
pub mod version;

pub use alignment::{StreamAlignment, NO_ALIGNMENT};
pub use error::{LinkError, TypeError};
pub use hash::{DigestType, Hash, HASH_LENGTH};
pub use link::RunningHashLink;
pub use object::RecordStreamObject;
pub use timestamp::ConsensusTimestamp;
pub use tokio_util::sync::CancellationToken;
pub use version::SemanticVersion;
