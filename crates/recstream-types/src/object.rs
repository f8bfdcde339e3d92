use std::fmt;

use crate::alignment::StreamAlignment;
use crate::link::RunningHashLink;
use crate::timestamp::ConsensusTimestamp;

/// One consensus transaction as it enters the record stream.
///
/// Carries the signed transaction bytes, the execution record bytes, the
/// consensus timestamp, the link to the running hash through this object,
/// and the block the object is aligned to. The payload is opaque to the
/// stream; only its position in the hash chain matters.
#[derive(Clone)]
pub struct RecordStreamObject {
    transaction: Vec<u8>,
    record: Vec<u8>,
    consensus_timestamp: ConsensusTimestamp,
    running_hash: RunningHashLink,
    alignment: StreamAlignment,
}

impl RecordStreamObject {
    /// Create an unaligned object with a pending running hash.
    pub fn new(
        transaction: impl Into<Vec<u8>>,
        record: impl Into<Vec<u8>>,
        consensus_timestamp: ConsensusTimestamp,
    ) -> Self {
        Self {
            transaction: transaction.into(),
            record: record.into(),
            consensus_timestamp,
            running_hash: RunningHashLink::pending(),
            alignment: StreamAlignment::Unaligned,
        }
    }

    /// Tag the object with the block it belongs to.
    pub fn with_alignment(mut self, alignment: impl Into<StreamAlignment>) -> Self {
        self.alignment = alignment.into();
        self
    }

    /// Share an existing running-hash link instead of a fresh pending one.
    pub fn with_running_hash(mut self, link: RunningHashLink) -> Self {
        self.running_hash = link;
        self
    }

    pub fn transaction(&self) -> &[u8] {
        &self.transaction
    }

    pub fn record(&self) -> &[u8] {
        &self.record
    }

    pub fn consensus_timestamp(&self) -> ConsensusTimestamp {
        self.consensus_timestamp
    }

    pub fn running_hash(&self) -> &RunningHashLink {
        &self.running_hash
    }

    pub fn alignment(&self) -> StreamAlignment {
        self.alignment
    }
}

impl fmt::Debug for RecordStreamObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStreamObject")
            .field("consensus_timestamp", &self.consensus_timestamp)
            .field("alignment", &self.alignment)
            .field("transaction_len", &self.transaction.len())
            .field("record_len", &self.record.len())
            .field("running_hash", &self.running_hash)
            .finish()
    }
}
