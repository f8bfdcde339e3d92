use std::io::{self, Write};
use std::path::Path;

use recstream_crypto::{digest_reader, ChainError, ChainSegment, HashingWriter, RunningHashChain};
use recstream_types::{Hash, SemanticVersion, StreamAlignment};

use crate::error::{CodecError, CodecResult};
use crate::storage::StreamStorage;
use crate::wire::{self, ByteReader};

/// Tag preceding each `(transaction, record)` item.
pub const ITEM_TAG: u8 = 0x01;
/// Tag preceding the end running hash.
pub const END_TAG: u8 = 0x02;

/// Serialize the file header ints big-endian.
pub fn encode_header(header: &[i32]) -> Vec<u8> {
    header.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Streams the sections of a record file into `W`.
///
/// Sections must be written in file order: header, start hash, items, end
/// hash, block number.
///
/// ```text
/// [version:i32][hapiMajor:i32][hapiMinor:i32][hapiPatch:i32]
/// [startRunningHash]
/// ( [0x01][txLen:i32][tx][recLen:i32][rec] )*
/// [0x02][endRunningHash]
/// [blockNumber:i64]
/// ```
pub struct RecordFileEncoder<W> {
    inner: W,
}

impl<W: Write> RecordFileEncoder<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_header(&mut self, header: &[i32]) -> io::Result<()> {
        self.inner.write_all(&encode_header(header))
    }

    pub fn write_start_hash(&mut self, hash: &Hash) -> io::Result<()> {
        wire::write_hash(&mut self.inner, hash)
    }

    pub fn append_item(&mut self, transaction: &[u8], record: &[u8]) -> io::Result<()> {
        self.inner.write_all(&[ITEM_TAG])?;
        wire::write_bytes(&mut self.inner, transaction)?;
        wire::write_bytes(&mut self.inner, record)
    }

    pub fn write_end_hash(&mut self, hash: &Hash) -> io::Result<()> {
        self.inner.write_all(&[END_TAG])?;
        wire::write_hash(&mut self.inner, hash)
    }

    pub fn write_block_number(&mut self, block: i64) -> io::Result<()> {
        wire::write_i64(&mut self.inner, block)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Incremental metadata hash of a record file.
///
/// Covers the header ints, the raw start and end hash bytes and the block
/// number; item bytes are not included. The writer feeds it alongside the
/// record output so the hash is ready the moment the file closes.
pub struct MetadataDigest {
    hasher: HashingWriter,
}

impl MetadataDigest {
    pub fn new() -> Self {
        Self {
            hasher: HashingWriter::digest_only(),
        }
    }

    pub fn write_header(&mut self, header: &[i32]) -> io::Result<()> {
        self.hasher.write_all(&encode_header(header))
    }

    pub fn write_start_hash(&mut self, hash: &Hash) -> io::Result<()> {
        self.hasher.write_all(hash.as_bytes())
    }

    pub fn write_end_hash(&mut self, hash: &Hash) -> io::Result<()> {
        self.hasher.write_all(hash.as_bytes())
    }

    pub fn write_block_number(&mut self, block: i64) -> io::Result<()> {
        wire::write_i64(&mut self.hasher, block)
    }

    pub fn finish(self) -> Hash {
        self.hasher.finish().1
    }
}

impl Default for MetadataDigest {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot metadata hash.
pub fn metadata_digest(
    version: i32,
    hapi_version: SemanticVersion,
    start_running_hash: &Hash,
    end_running_hash: &Hash,
    block_number: i64,
) -> Hash {
    let mut image = encode_header(&[
        version,
        hapi_version.major,
        hapi_version.minor,
        hapi_version.patch,
    ]);
    image.extend_from_slice(start_running_hash.as_bytes());
    image.extend_from_slice(end_running_hash.as_bytes());
    image.extend_from_slice(&block_number.to_be_bytes());
    Hash::digest(&image)
}

/// SHA-384 of the full persisted bytes of the file at `path`.
pub fn entire_file_digest(storage: &dyn StreamStorage, path: &Path) -> io::Result<Hash> {
    digest_reader(storage.open_read(path)?)
}

/// One `(transaction, record)` pair as stored in a record file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordItem {
    pub transaction: Vec<u8>,
    pub record: Vec<u8>,
}

/// A decoded record file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordFile {
    pub version: i32,
    pub hapi_version: SemanticVersion,
    pub start_running_hash: Hash,
    pub items: Vec<RecordItem>,
    pub end_running_hash: Hash,
    pub block_number: i64,
}

impl RecordFile {
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut r = ByteReader::new(bytes);
        let version = r.read_i32()?;
        let hapi_version = SemanticVersion::new(r.read_i32()?, r.read_i32()?, r.read_i32()?);
        let start_running_hash = r.read_hash()?;

        let mut items = Vec::new();
        loop {
            let offset = r.offset();
            match r.read_u8()? {
                ITEM_TAG => {
                    let transaction = r.read_bytes()?;
                    let record = r.read_bytes()?;
                    items.push(RecordItem {
                        transaction,
                        record,
                    });
                }
                END_TAG => break,
                tag => return Err(CodecError::UnknownTag { offset, tag }),
            }
        }

        let end_running_hash = r.read_hash()?;
        let block_number = r.read_i64()?;
        r.finish()?;

        Ok(Self {
            version,
            hapi_version,
            start_running_hash,
            items,
            end_running_hash,
            block_number,
        })
    }

    pub fn read(path: &Path) -> CodecResult<Self> {
        Self::decode(&std::fs::read(path)?)
    }

    pub fn read_from(storage: &dyn StreamStorage, path: &Path) -> CodecResult<Self> {
        Self::decode(&storage.read(path)?)
    }

    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut enc = RecordFileEncoder::new(Vec::new());
        enc.write_header(&self.header())?;
        enc.write_start_hash(&self.start_running_hash)?;
        for item in &self.items {
            enc.append_item(&item.transaction, &item.record)?;
        }
        enc.write_end_hash(&self.end_running_hash)?;
        enc.write_block_number(self.block_number)?;
        Ok(enc.into_inner())
    }

    pub fn header(&self) -> [i32; 4] {
        [
            self.version,
            self.hapi_version.major,
            self.hapi_version.minor,
            self.hapi_version.patch,
        ]
    }

    pub fn alignment(&self) -> StreamAlignment {
        StreamAlignment::from_wire(self.block_number)
    }

    pub fn metadata_hash(&self) -> Hash {
        metadata_digest(
            self.version,
            self.hapi_version,
            &self.start_running_hash,
            &self.end_running_hash,
            self.block_number,
        )
    }

    /// Recompute the running hash over the items and compare with the end hash.
    pub fn verify_chain(&self) -> Result<(), ChainError> {
        RunningHashChain::verify(
            self.start_running_hash,
            self.items
                .iter()
                .map(|i| (i.transaction.as_slice(), i.record.as_slice())),
            self.end_running_hash,
        )
    }
}

impl ChainSegment for RecordFile {
    fn start_running_hash(&self) -> Hash {
        self.start_running_hash
    }

    fn end_running_hash(&self) -> Hash {
        self.end_running_hash
    }
}
