use std::io::{self, Write};
use std::path::Path;

use recstream_crypto::SignatureType;
use recstream_types::Hash;
use tracing::warn;

use crate::error::{CodecError, CodecResult};
use crate::naming::in_progress_path;
use crate::storage::StreamStorage;
use crate::wire::{self, ByteReader};

/// Legacy sanity value stored next to every signature.
const CHECKSUM_BASE: i32 = 101;

/// A hash and the signature over it.
///
/// ```text
/// [digestTypeId:i32][hashLen:i32][hash]
/// [sigType:i32][sigLen:i32][checksum:i32][sig]
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureObject {
    pub hash: Hash,
    pub signature_type: SignatureType,
    pub signature: Vec<u8>,
}

impl SignatureObject {
    pub fn new(hash: Hash, signature_type: SignatureType, signature: Vec<u8>) -> Self {
        Self {
            hash,
            signature_type,
            signature,
        }
    }

    /// `101 - signature length`.
    pub fn checksum(&self) -> i32 {
        CHECKSUM_BASE - self.signature.len() as i32
    }

    fn encode_into<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        wire::write_hash(w, &self.hash)?;
        wire::write_i32(w, self.signature_type.id())?;
        wire::write_bytes_with_checksum(w, &self.signature, self.checksum())
    }

    fn decode_from(r: &mut ByteReader<'_>) -> CodecResult<Self> {
        let hash = r.read_hash()?;
        let type_id = r.read_i32()?;
        let signature_type =
            SignatureType::from_id(type_id).ok_or(CodecError::UnknownSignatureType(type_id))?;
        let len = r.read_len()?;
        let checksum = r.read_i32()?;
        let expected = CHECKSUM_BASE - len as i32;
        if checksum != expected {
            return Err(CodecError::ChecksumMismatch {
                expected,
                actual: checksum,
            });
        }
        let signature = r.read_raw(len)?.to_vec();
        Ok(Self {
            hash,
            signature_type,
            signature,
        })
    }
}

/// A detached signature file: header bytes, then the signature over the
/// entire record file and the signature over its metadata hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureFile {
    pub header: Vec<u8>,
    pub file_signature: SignatureObject,
    pub metadata_signature: SignatureObject,
}

impl SignatureFile {
    /// Signature file format version (first header byte).
    pub fn version(&self) -> Option<u8> {
        self.header.first().copied()
    }

    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = self.header.clone();
        self.file_signature.encode_into(&mut buf)?;
        self.metadata_signature.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decode a file whose header is `header_len` bytes long.
    pub fn decode(bytes: &[u8], header_len: usize) -> CodecResult<Self> {
        let mut r = ByteReader::new(bytes);
        let header = r.read_raw(header_len)?.to_vec();
        let file_signature = SignatureObject::decode_from(&mut r)?;
        let metadata_signature = SignatureObject::decode_from(&mut r)?;
        r.finish()?;
        Ok(Self {
            header,
            file_signature,
            metadata_signature,
        })
    }

    pub fn read(path: &Path, header_len: usize) -> CodecResult<Self> {
        Self::decode(&std::fs::read(path)?, header_len)
    }

    /// Write to a temporary file next to `path`, then rename it into place.
    ///
    /// The temporary file is removed on failure.
    pub fn write(&self, storage: &dyn StreamStorage, path: &Path) -> io::Result<()> {
        let bytes = self.encode()?;
        let tmp = in_progress_path(path);
        let result = storage.create(&tmp).and_then(|mut out| {
            out.write_all(&bytes)?;
            out.close()?;
            storage.rename(&tmp, path)
        });
        if result.is_err() && storage.exists(&tmp) {
            if let Err(e) = storage.remove(&tmp) {
                warn!(file = %tmp.display(), error = %e, "failed to delete partial signature file");
            }
        }
        result
    }
}
