use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use recstream_crypto::{RunningHashChain, Signer, SignerError};
use recstream_types::{ConsensusTimestamp, RecordStreamObject};

/// 2022-05-26T11:02:55Z
pub(crate) fn scenario_start() -> ConsensusTimestamp {
    Utc.with_ymd_and_hms(2022, 5, 26, 11, 2, 55).unwrap().into()
}

/// `n` objects for `block`, one microsecond apart from `start`, with their
/// running hashes already resolved through `chain`.
pub(crate) fn linked_objects(
    chain: &mut RunningHashChain,
    n: usize,
    block: i64,
    start: ConsensusTimestamp,
) -> Vec<RecordStreamObject> {
    (0..n)
        .map(|i| {
            let o = RecordStreamObject::new(
                format!("tx-{block}-{i}").into_bytes(),
                format!("record-{block}-{i}").into_bytes(),
                start.plus_nanos(i as u32 * 1_000),
            )
            .with_alignment(block);
            chain.link(&o);
            o
        })
        .collect()
}

/// Records every digest it is asked to sign and answers `sig-<n>`.
pub(crate) struct ScriptedSigner {
    calls: Mutex<Vec<Vec<u8>>>,
    fail: bool,
}

impl ScriptedSigner {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<u8>> {
        self.calls.lock().unwrap().clone()
    }
}

impl Signer for ScriptedSigner {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignerError> {
        if self.fail {
            return Err(SignerError::Failed("HSM unavailable".into()));
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(data.to_vec());
        Ok(format!("sig-{}", calls.len() - 1).into_bytes())
    }
}
