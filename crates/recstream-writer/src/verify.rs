//! Checks a mirror node or auditor runs against persisted stream files.

use std::path::Path;

use recstream_crypto::{ChainSegment, RunningHashChain, SignatureType, VerifyingKey};
use recstream_types::Hash;

use crate::error::{CodecError, VerifyError, VerifyResult};
use crate::record_file::{entire_file_digest, RecordFile};
use crate::signature_file::{SignatureFile, SignatureObject};
use crate::storage::LocalDisk;

/// Verify a record file against its signature file.
///
/// Recomputes the entire-file and metadata hashes, checks that both match
/// the signature file, replays the running-hash chain over the items and
/// verifies both Ed25519 signatures with `key`.
pub fn verify_signature_file(
    record_path: &Path,
    signature_path: &Path,
    signature_header_len: usize,
    key: &VerifyingKey,
) -> VerifyResult<(RecordFile, SignatureFile)> {
    let record = RecordFile::read_from(&LocalDisk, record_path)?;
    let signatures = SignatureFile::read(signature_path, signature_header_len)?;
    let entire_hash = entire_file_digest(&LocalDisk, record_path).map_err(CodecError::from)?;

    if signatures.file_signature.hash != entire_hash {
        return Err(VerifyError::HashMismatch {
            which: "entire file",
        });
    }
    if signatures.metadata_signature.hash != record.metadata_hash() {
        return Err(VerifyError::HashMismatch { which: "metadata" });
    }
    record.verify_chain()?;

    check_signature(key, &signatures.file_signature, "entire file")?;
    check_signature(key, &signatures.metadata_signature, "metadata")?;
    Ok((record, signatures))
}

fn check_signature(
    key: &VerifyingKey,
    object: &SignatureObject,
    which: &'static str,
) -> VerifyResult<()> {
    if object.signature_type != SignatureType::Ed25519 {
        return Err(VerifyError::UnsupportedSignatureType(object.signature_type));
    }
    key.verify(object.hash.as_bytes(), &object.signature)
        .map_err(|source| VerifyError::BadSignature { which, source })
}

/// Check every file's internal chain and that consecutive files link up.
pub fn verify_record_chain(files: &[RecordFile]) -> VerifyResult<()> {
    for file in files {
        file.verify_chain()?;
    }
    RunningHashChain::verify_continuity(files)?;
    Ok(())
}

/// Running hash after the last file, or `None` for an empty slice.
pub fn chain_tip(files: &[RecordFile]) -> Option<Hash> {
    files.last().map(ChainSegment::end_running_hash)
}
