//! Record stream writer for a ledger node.
//!
//! Turns the consensus-ordered, hash-chained stream of transaction records
//! into immutable record files and detached signature files that mirror
//! nodes and auditors can verify without re-running consensus.
//!
//! # Architecture
//!
//! - **Record file** (`.rcd`): header, start running hash, tagged items, end
//!   running hash and block number
//! - **Signature file** (`.rcd_sig`): signatures over the entire-file hash and
//!   the metadata hash
//! - **StreamWriter**: rolls files over on block or period boundaries and
//!   signs each completed file exactly twice
//! - **StreamStorage**: the filesystem seam; files are written under a
//!   `.part` name and renamed into place
//! - **verify**: the reader's side, checking signatures and chain continuity

pub mod config;
pub mod error;
pub mod naming;
pub mod period;
pub mod record_file;
pub mod signature_file;
pub mod storage;
pub mod verify;
pub mod writer;

mod wire;

#[cfg(test)]
mod test_support;

pub use config::{StreamType, WriterConfig, RECORD_STREAM_VERSION};
pub use error::{
    CodecError, CodecResult, ConfigError, VerifyError, VerifyResult, WriterError, WriterResult,
};
pub use naming::{in_progress_path, signature_file_path, stream_file_name, stream_file_path};
pub use period::{period_of, PeriodClock};
pub use record_file::{
    encode_header, entire_file_digest, metadata_digest, MetadataDigest, RecordFile,
    RecordFileEncoder, RecordItem,
};
pub use signature_file::{SignatureFile, SignatureObject};
pub use storage::{LocalDisk, StreamOutput, StreamStorage};
pub use verify::{chain_tip, verify_record_chain, verify_signature_file};
pub use writer::{DrainReason, StreamWriter, Window, WrittenFile};
