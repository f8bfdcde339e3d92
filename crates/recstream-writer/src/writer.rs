use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use recstream_crypto::Signer;
use recstream_types::{
    CancellationToken, ConsensusTimestamp, Hash, RecordStreamObject, RunningHashLink,
    StreamAlignment,
};
use tracing::{debug, error, info, trace, warn};

use crate::config::WriterConfig;
use crate::error::{WriterError, WriterResult};
use crate::naming::{in_progress_path, signature_file_path, stream_file_path};
use crate::period::PeriodClock;
use crate::record_file::{entire_file_digest, MetadataDigest, RecordFileEncoder};
use crate::signature_file::{SignatureFile, SignatureObject};
use crate::storage::{LocalDisk, StreamOutput, StreamStorage};

/// The set of objects that share one record file.
///
/// An object falls inside when it carries the same block number as the
/// window or was stamped in the same period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub period: i64,
    pub alignment: StreamAlignment,
}

impl Window {
    pub fn contains(&self, alignment: StreamAlignment, period: i64) -> bool {
        self.alignment.same_block(alignment) || self.period == period
    }
}

/// Why a window is consumed without being written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainReason {
    /// Waiting for the first period boundary.
    CompleteWindow,
    /// Opening the file failed or was cancelled.
    Aborted,
    /// The file for this window is already on disk.
    AlreadyExists,
}

/// A record file that has been renamed into place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrittenFile {
    pub record_path: PathBuf,
    /// `None` when signing or writing the signature file failed.
    pub signature_path: Option<PathBuf>,
    pub start_running_hash: Hash,
    pub end_running_hash: Hash,
    pub metadata_hash: Hash,
    pub block_number: i64,
    pub item_count: usize,
}

struct OpenFile {
    path: PathBuf,
    temp_path: PathBuf,
    record: RecordFileEncoder<Box<dyn StreamOutput>>,
    metadata: MetadataDigest,
    start_running_hash: Hash,
    last_link: RunningHashLink,
    window: Window,
    first_timestamp: ConsensusTimestamp,
    item_count: usize,
}

enum WriterState {
    Idle,
    Open(OpenFile),
    Draining { window: Window, reason: DrainReason },
}

/// Groups consensus-ordered objects into record files, one per block or
/// period, and signs each file once it is complete.
///
/// Every object's running hash is produced elsewhere and read through its
/// [`RunningHashLink`]. A file starts at the running hash of the object
/// before its first item and ends at the running hash of its last item, so
/// consecutive files form one unbroken chain.
///
/// Failures while producing a file never reach the caller. They are logged,
/// the writer's [`CancellationToken`] is cancelled so the supervisor can
/// react, the partial file is discarded and the rest of its window is
/// skipped.
pub struct StreamWriter {
    config: WriterConfig,
    clock: PeriodClock,
    signer: Arc<dyn Signer>,
    storage: Arc<dyn StreamStorage>,
    cancel: CancellationToken,
    running_hash: RunningHashLink,
    state: WriterState,
    start_write_at_complete_window: bool,
    last_period: Option<i64>,
    stopped: bool,
    last_written: Option<WrittenFile>,
}

impl StreamWriter {
    /// Writer on the local filesystem.
    pub fn new(config: WriterConfig, signer: Arc<dyn Signer>) -> WriterResult<Self> {
        Self::with_storage(config, signer, Arc::new(LocalDisk))
    }

    pub fn with_storage(
        config: WriterConfig,
        signer: Arc<dyn Signer>,
        storage: Arc<dyn StreamStorage>,
    ) -> WriterResult<Self> {
        config.validate()?;
        let clock = PeriodClock::new(config.period()?);
        debug!(
            export_dir = %config.export_dir.display(),
            period_ms = config.log_period_ms,
            stream = %config.stream_type.description,
            "stream writer created"
        );
        Ok(Self {
            start_write_at_complete_window: config.start_write_at_complete_window,
            config,
            clock,
            signer,
            storage,
            cancel: CancellationToken::new(),
            running_hash: RunningHashLink::pending(),
            state: WriterState::Idle,
            last_period: None,
            stopped: false,
            last_written: None,
        })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Running hash the first file will start from.
    pub fn set_running_hash(&mut self, hash: Hash) {
        self.running_hash = RunningHashLink::resolved(hash);
    }

    /// Forget the initial running hash. The next file waits until the
    /// cancellation token fires.
    pub fn clear_running_hash(&mut self) {
        self.running_hash = RunningHashLink::pending();
    }

    /// Skip objects until the next period boundary. The policy ends the
    /// first time the stream crosses a boundary, whatever the writer is
    /// doing at that moment.
    pub fn set_start_write_at_complete_window(&mut self, enabled: bool) {
        self.start_write_at_complete_window = enabled;
    }

    pub fn start_write_at_complete_window(&self) -> bool {
        self.start_write_at_complete_window
    }

    /// Token cancelled whenever the writer abandons a file. Cancelling it
    /// from outside aborts any pending running-hash wait.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replace a cancelled token with a fresh one. Returns `true` if the
    /// token had been cancelled.
    pub fn reset_cancellation(&mut self) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        self.cancel = CancellationToken::new();
        true
    }

    /// Returns `true` while a record file is open.
    pub fn is_writing(&self) -> bool {
        matches!(self.state, WriterState::Open(_))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// The most recent file renamed into place.
    pub fn last_written(&self) -> Option<&WrittenFile> {
        self.last_written.as_ref()
    }

    /// Feed the next object of the stream.
    pub fn add_object(&mut self, object: RecordStreamObject) -> WriterResult<()> {
        if self.stopped {
            return Err(WriterError::Stopped);
        }
        let alignment = object.alignment();
        let period = self.clock.period_of(&object.consensus_timestamp());
        if self.start_write_at_complete_window
            && self.last_period.is_some_and(|last| last != period)
        {
            debug!(period, "period boundary crossed, complete window starts");
            self.start_write_at_complete_window = false;
        }

        self.state = match std::mem::replace(&mut self.state, WriterState::Idle) {
            WriterState::Open(file) if file.window.contains(alignment, period) => {
                WriterState::Open(file)
            }
            WriterState::Open(file) => {
                self.close_file(file);
                WriterState::Idle
            }
            WriterState::Draining { window, reason } if window.contains(alignment, period) => {
                WriterState::Draining { window, reason }
            }
            WriterState::Draining { .. } => WriterState::Idle,
            WriterState::Idle => WriterState::Idle,
        };

        if matches!(self.state, WriterState::Idle) {
            let window = Window { period, alignment };
            self.state = if self.start_write_at_complete_window {
                debug!(period, "waiting for a complete window");
                WriterState::Draining {
                    window: Window {
                        period,
                        alignment: StreamAlignment::Unaligned,
                    },
                    reason: DrainReason::CompleteWindow,
                }
            } else {
                self.begin_new(&object, window)
            };
        }

        match std::mem::replace(&mut self.state, WriterState::Idle) {
            WriterState::Open(file) => self.append(file, &object),
            WriterState::Draining { window, reason } => {
                trace!(?reason, timestamp = %object.consensus_timestamp(), "object skipped");
                self.state = WriterState::Draining { window, reason };
            }
            WriterState::Idle => {}
        }

        self.running_hash = object.running_hash().clone();
        self.last_period = Some(period);
        Ok(())
    }

    /// Finish and sign the open file, if any. The writer stays usable.
    pub fn close_and_sign(&mut self) {
        if let WriterState::Open(file) = std::mem::replace(&mut self.state, WriterState::Idle) {
            self.close_file(file);
        }
    }

    /// Drop the open file without signing it.
    pub fn clear(&mut self) {
        if let WriterState::Open(file) = std::mem::replace(&mut self.state, WriterState::Idle) {
            if let Err(e) = file.record.into_inner().close() {
                warn!(file = %file.temp_path.display(), error = %e, "StreamWriter::clear Exception in closing record stream");
            }
            if let Err(e) = self.storage.remove(&file.temp_path) {
                warn!(file = %file.temp_path.display(), error = %e, "StreamWriter::clear failed to delete partial file");
            }
        }
        debug!("StreamWriter::clear executed.");
    }

    /// Finish and sign the open file and refuse further objects.
    pub fn close(&mut self) {
        self.close_and_sign();
        self.stopped = true;
        debug!("StreamWriter finished writing the last object, is stopped");
    }

    fn drain(&self, window: Window, reason: DrainReason) -> WriterState {
        WriterState::Draining { window, reason }
    }

    fn abort(&self, window: Window) -> WriterState {
        self.cancel.cancel();
        self.drain(window, DrainReason::Aborted)
    }

    fn begin_new(&mut self, object: &RecordStreamObject, window: Window) -> WriterState {
        let first_timestamp = object.consensus_timestamp();
        let path = match stream_file_path(
            &self.config.export_dir,
            &first_timestamp,
            &self.config.stream_type,
        ) {
            Ok(path) => path,
            Err(e) => {
                error!(timestamp = ?first_timestamp, error = %e, "beginNew :: cannot name stream file");
                return self.abort(window);
            }
        };

        if self.storage.exists(&path) {
            info!(file = %path.display(), "Stream file already exists");
            return self.drain(window, DrainReason::AlreadyExists);
        }

        let start_running_hash = match self.running_hash.value(&self.cancel) {
            Ok(hash) => hash,
            Err(e) => {
                error!(file = %path.display(), error = %e, "beginNew :: Exception when getting startRunningHash for writing to metadata stream");
                return self.abort(window);
            }
        };

        let temp_path = in_progress_path(&path);
        if self.storage.exists(&temp_path) {
            warn!(file = %temp_path.display(), "removing stale partial file");
            if let Err(e) = self.storage.remove(&temp_path) {
                error!(file = %temp_path.display(), error = %e, "beginNew :: failed to remove stale partial file");
                return self.abort(window);
            }
        }

        let output = match self.storage.create(&temp_path) {
            Ok(output) => output,
            Err(e) => {
                error!(file = %path.display(), error = %e, "beginNew :: failed to create stream file");
                return self.abort(window);
            }
        };
        debug!(file = %path.display(), "Stream file created");

        let mut record = RecordFileEncoder::new(output);
        let mut metadata = MetadataDigest::new();
        let header = &self.config.stream_type.file_header;
        let started = record
            .write_header(header)
            .and_then(|()| metadata.write_header(header))
            .and_then(|()| record.write_start_hash(&start_running_hash))
            .and_then(|()| metadata.write_start_hash(&start_running_hash));
        if let Err(e) = started {
            error!(file = %path.display(), error = %e, "beginNew :: Got IOException when writing startRunningHash");
            self.discard(record.into_inner(), &temp_path);
            return self.abort(window);
        }
        debug!(hash = %start_running_hash.short_hex(), "beginNew :: write startRunningHash to metadata");

        WriterState::Open(OpenFile {
            path,
            temp_path,
            record,
            metadata,
            start_running_hash,
            last_link: self.running_hash.clone(),
            window,
            first_timestamp,
            item_count: 0,
        })
    }

    fn append(&mut self, mut file: OpenFile, object: &RecordStreamObject) {
        if let Err(e) = file
            .record
            .append_item(object.transaction(), object.record())
        {
            error!(file = %file.path.display(), error = %e, "failed to write object to stream file");
            self.discard(file.record.into_inner(), &file.temp_path);
            self.state = self.abort(file.window);
            return;
        }
        file.item_count += 1;
        file.last_link = object.running_hash().clone();
        self.state = WriterState::Open(file);
    }

    fn close_file(&mut self, file: OpenFile) {
        let OpenFile {
            path,
            temp_path,
            mut record,
            mut metadata,
            start_running_hash,
            last_link,
            window,
            first_timestamp,
            item_count,
        } = file;

        let end_running_hash = match last_link.value(&self.cancel) {
            Ok(hash) => hash,
            Err(e) => {
                error!(file = %path.display(), error = %e, "closeCurrentAndSign :: failed when getting endRunningHash");
                self.cancel.cancel();
                self.discard(record.into_inner(), &temp_path);
                return;
            }
        };
        debug!(hash = %end_running_hash.short_hex(), "closeCurrentAndSign :: write endRunningHash");

        let block_number = window.alignment.to_wire();
        let finished = record
            .write_end_hash(&end_running_hash)
            .and_then(|()| record.write_block_number(block_number))
            .and_then(|()| metadata.write_end_hash(&end_running_hash))
            .and_then(|()| metadata.write_block_number(block_number));
        if let Err(e) = finished {
            warn!(file = %path.display(), error = %e, "closeCurrentAndSign :: IOException when serializing endRunningHash and block number");
            self.cancel.cancel();
            self.discard(record.into_inner(), &temp_path);
            return;
        }
        debug!(block_number, "closeCurrentAndSign :: write block number");

        if let Err(e) = record.into_inner().close() {
            error!(file = %path.display(), error = %e, "closeCurrentAndSign :: failed to close stream file");
            self.cancel.cancel();
            self.remove_partial(&temp_path);
            return;
        }
        let metadata_hash = metadata.finish();

        if self.storage.exists(&path) {
            info!(file = %path.display(), "Stream file already exists");
            self.remove_partial(&temp_path);
            return;
        }
        if let Err(e) = self.storage.rename(&temp_path, &path) {
            error!(file = %path.display(), error = %e, "closeCurrentAndSign :: failed to move stream file into place");
            self.cancel.cancel();
            self.remove_partial(&temp_path);
            return;
        }
        debug!(file = %path.display(), items = item_count, first = %first_timestamp, "Stream file written successfully");

        let signature_path = self.sign(&path, metadata_hash);
        self.last_written = Some(WrittenFile {
            record_path: path,
            signature_path,
            start_running_hash,
            end_running_hash,
            metadata_hash,
            block_number,
            item_count,
        });
    }

    /// Sign the entire file hash, then the metadata hash, and write the
    /// signature file. Returns its path on success.
    fn sign(&self, path: &Path, metadata_hash: Hash) -> Option<PathBuf> {
        let entire_hash = match entire_file_digest(self.storage.as_ref(), path) {
            Ok(hash) => hash,
            Err(e) => {
                error!(file = %path.display(), error = %e, "closeCurrentAndSign :: failed to compute entire file hash");
                self.cancel.cancel();
                return None;
            }
        };

        let file_signature = self.sign_hash(path, "entire file", entire_hash)?;
        let metadata_signature = self.sign_hash(path, "metadata", metadata_hash)?;

        let signature_file = SignatureFile {
            header: self.config.stream_type.sig_file_header.clone(),
            file_signature,
            metadata_signature,
        };
        let sig_path = signature_file_path(path, &self.config.stream_type.sig_extension);
        if let Err(e) = signature_file.write(self.storage.as_ref(), &sig_path) {
            error!(file = %sig_path.display(), error = %e, "closeCurrentAndSign :: Fail to generate signature file");
            self.cancel.cancel();
            return None;
        }
        info!(file = %sig_path.display(), "signature file saved");
        Some(sig_path)
    }

    fn sign_hash(&self, path: &Path, which: &str, hash: Hash) -> Option<SignatureObject> {
        match self.signer.sign(hash.as_bytes()) {
            Ok(signature) => Some(SignatureObject::new(
                hash,
                self.signer.signature_type(),
                signature,
            )),
            Err(e) => {
                error!(file = %path.display(), which, error = %e, "closeCurrentAndSign :: failed to sign hash");
                self.cancel.cancel();
                None
            }
        }
    }

    fn discard(&self, output: Box<dyn StreamOutput>, temp_path: &Path) {
        if let Err(e) = output.close() {
            warn!(file = %temp_path.display(), error = %e, "failed to close abandoned stream file");
        }
        self.remove_partial(temp_path);
    }

    fn remove_partial(&self, temp_path: &Path) {
        match self.storage.remove(temp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %temp_path.display(), error = %e, "failed to delete partial file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use recstream_crypto::{RunningHashChain, SigningKey};
    use recstream_types::NO_ALIGNMENT;
    use tracing_test::traced_test;

    use super::*;
    use crate::record_file::RecordFile;
    use crate::test_support::{linked_objects, scenario_start, ScriptedSigner};
    use crate::verify::verify_signature_file;

    fn config(dir: &Path) -> WriterConfig {
        WriterConfig::new(dir)
    }

    fn writer(dir: &Path, signer: Arc<dyn Signer>) -> StreamWriter {
        StreamWriter::new(config(dir), signer).unwrap()
    }

    fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(suffix))
            .collect();
        out.sort();
        out
    }

    /// Wraps [`LocalDisk`] and fails selected operations on demand.
    #[derive(Default)]
    struct FaultyStorage {
        fail_create: AtomicBool,
        fail_writes: Arc<AtomicBool>,
        fail_close: Arc<AtomicBool>,
        fail_signature_create: AtomicBool,
    }

    struct FaultyOutput {
        inner: Box<dyn StreamOutput>,
        fail_writes: Arc<AtomicBool>,
        fail_close: Arc<AtomicBool>,
    }

    fn injected() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "injected failure")
    }

    impl Write for FaultyOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(injected());
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl StreamOutput for FaultyOutput {
        fn close(self: Box<Self>) -> io::Result<()> {
            let this = *self;
            this.inner.close()?;
            if this.fail_close.load(Ordering::SeqCst) {
                return Err(injected());
            }
            Ok(())
        }
    }

    impl StreamStorage for FaultyStorage {
        fn exists(&self, path: &Path) -> bool {
            LocalDisk.exists(path)
        }

        fn create(&self, path: &Path) -> io::Result<Box<dyn StreamOutput>> {
            let is_signature = path.to_string_lossy().ends_with(".rcd_sig.part");
            if self.fail_create.load(Ordering::SeqCst)
                || (is_signature && self.fail_signature_create.load(Ordering::SeqCst))
            {
                return Err(injected());
            }
            Ok(Box::new(FaultyOutput {
                inner: LocalDisk.create(path)?,
                fail_writes: Arc::clone(&self.fail_writes),
                fail_close: Arc::clone(&self.fail_close),
            }))
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            LocalDisk.rename(from, to)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            LocalDisk.remove(path)
        }

        fn open_read(&self, path: &Path) -> io::Result<Box<dyn io::Read + Send>> {
            LocalDisk.open_read(path)
        }
    }

    fn faulty_writer(dir: &Path, signer: Arc<dyn Signer>) -> (StreamWriter, Arc<FaultyStorage>) {
        let storage = Arc::new(FaultyStorage::default());
        let w = StreamWriter::with_storage(config(dir), signer, storage.clone()).unwrap();
        (w, storage)
    }

    #[test]
    fn rejects_invalid_config() {
        let mut c = WriterConfig::new("x");
        c.log_period_ms = 0;
        assert!(matches!(
            StreamWriter::new(c, Arc::new(ScriptedSigner::new())),
            Err(WriterError::Config(_))
        ));
    }

    #[test]
    fn window_membership() {
        let w = Window {
            period: 10,
            alignment: StreamAlignment::Block(3),
        };
        assert!(w.contains(StreamAlignment::Block(3), 99));
        assert!(w.contains(StreamAlignment::Block(4), 10));
        assert!(w.contains(StreamAlignment::Unaligned, 10));
        assert!(!w.contains(StreamAlignment::Block(4), 11));
        let u = Window {
            period: 10,
            alignment: StreamAlignment::Unaligned,
        };
        assert!(!u.contains(StreamAlignment::Unaligned, 11));
    }

    #[traced_test]
    #[test]
    fn blocks_become_signed_files_with_chained_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let signer = Arc::new(ScriptedSigner::new());
        let mut w = writer(dir.path(), signer.clone());
        let initial = Hash::digest(b"initial running hash");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        let t = scenario_start();

        for o in linked_objects(&mut chain, 4, 1, t) {
            w.add_object(o).unwrap();
        }
        let end_of_block_1 = chain.current();
        for o in linked_objects(&mut chain, 8, 2, t.plus_seconds(2)) {
            w.add_object(o).unwrap();
        }
        let end_of_block_2 = chain.current();
        for o in linked_objects(&mut chain, 1, 3, t.plus_seconds(4)) {
            w.add_object(o).unwrap();
        }

        let records = files_with_suffix(dir.path(), ".rcd");
        assert_eq!(
            records,
            vec![
                dir.path().join("2022-05-26T11_02_55Z.rcd"),
                dir.path().join("2022-05-26T11_02_57Z.rcd"),
            ]
        );
        assert_eq!(files_with_suffix(dir.path(), ".rcd_sig").len(), 2);
        assert!(w.is_writing());
        assert_eq!(files_with_suffix(dir.path(), ".part").len(), 1);

        let first = RecordFile::read(&records[0]).unwrap();
        let second = RecordFile::read(&records[1]).unwrap();
        assert_eq!(first.items.len(), 4);
        assert_eq!(second.items.len(), 8);
        assert_eq!(first.block_number, 1);
        assert_eq!(second.block_number, 2);
        assert_eq!(first.start_running_hash, initial);
        assert_eq!(first.end_running_hash, end_of_block_1);
        assert_eq!(second.start_running_hash, end_of_block_1);
        assert_eq!(second.end_running_hash, end_of_block_2);
        assert!(RunningHashChain::verify_continuity(&[first.clone(), second.clone()]).is_ok());

        let calls = signer.calls();
        assert_eq!(calls.len(), 4);
        let first_bytes = std::fs::read(&records[0]).unwrap();
        let second_bytes = std::fs::read(&records[1]).unwrap();
        assert_eq!(calls[0], Hash::digest(&first_bytes).as_bytes().to_vec());
        assert_eq!(calls[1], first.metadata_hash().as_bytes().to_vec());
        assert_eq!(calls[2], Hash::digest(&second_bytes).as_bytes().to_vec());
        assert_eq!(calls[3], second.metadata_hash().as_bytes().to_vec());

        let sig = SignatureFile::read(&records[1].with_extension("rcd_sig"), 1).unwrap();
        assert_eq!(sig.header, vec![6]);
        assert_eq!(sig.file_signature.signature, b"sig-2".to_vec());
        assert_eq!(sig.metadata_signature.signature, b"sig-3".to_vec());

        let last = w.last_written().unwrap();
        assert_eq!(last.record_path, records[1]);
        assert_eq!(last.item_count, 8);
        assert_eq!(last.end_running_hash, end_of_block_2);

        assert!(logs_contain("Stream file created"));
        assert!(logs_contain("Stream file written successfully"));
        assert!(logs_contain("signature file saved"));
    }

    #[test]
    fn block_spanning_periods_stays_in_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        let t = scenario_start();
        for offset in [0, 2, 4] {
            for o in linked_objects(&mut chain, 1, 5, t.plus_seconds(offset)) {
                w.add_object(o).unwrap();
            }
        }
        w.close();

        let records = files_with_suffix(dir.path(), ".rcd");
        assert_eq!(records.len(), 1);
        let file = RecordFile::read(&records[0]).unwrap();
        assert_eq!(file.items.len(), 3);
        assert_eq!(file.block_number, 5);
        assert!(file.verify_chain().is_ok());
    }

    #[test]
    fn unaligned_objects_split_on_period_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        let t = scenario_start();
        // 11:02:55 and 11:02:55.5 share a period; 11:02:56 starts the next one.
        for ts in [t, t.plus_nanos(500_000_000), t.plus_seconds(1)] {
            for o in linked_objects(&mut chain, 1, NO_ALIGNMENT, ts) {
                assert_eq!(o.alignment(), StreamAlignment::Unaligned);
                w.add_object(o).unwrap();
            }
        }
        w.close();

        let records = files_with_suffix(dir.path(), ".rcd");
        assert_eq!(records.len(), 2);
        let first = RecordFile::read(&records[0]).unwrap();
        let second = RecordFile::read(&records[1]).unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(second.items.len(), 1);
        assert_eq!(first.block_number, NO_ALIGNMENT);
        assert_eq!(second.block_number, NO_ALIGNMENT);
        assert_eq!(second.start_running_hash, first.end_running_hash);
    }

    #[test]
    fn complete_window_policy_skips_the_first_partial_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        w.set_start_write_at_complete_window(true);
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        let t = scenario_start();

        for o in linked_objects(&mut chain, 3, 1, t) {
            w.add_object(o).unwrap();
        }
        assert!(!w.is_writing());
        let skipped_through = chain.current();
        for o in linked_objects(&mut chain, 2, 2, t.plus_seconds(2)) {
            w.add_object(o).unwrap();
        }
        assert!(!w.start_write_at_complete_window());
        w.close();

        let records = files_with_suffix(dir.path(), ".rcd");
        assert_eq!(records, vec![dir.path().join("2022-05-26T11_02_57Z.rcd")]);
        let file = RecordFile::read(&records[0]).unwrap();
        assert_eq!(file.start_running_hash, skipped_through);
        assert_eq!(file.items.len(), 2);
    }

    #[test]
    fn complete_window_policy_enabled_mid_stream_starts_at_next_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        let t = scenario_start();

        for o in linked_objects(&mut chain, 2, 1, t) {
            w.add_object(o).unwrap();
        }
        assert!(w.is_writing());
        w.set_start_write_at_complete_window(true);
        for o in linked_objects(&mut chain, 1, 1, t.plus_nanos(200_000_000)) {
            w.add_object(o).unwrap();
        }
        assert!(w.start_write_at_complete_window());
        assert!(w.is_writing());

        // The next boundary ends the policy, so block 2 is the complete window.
        for o in linked_objects(&mut chain, 2, 2, t.plus_seconds(2)) {
            w.add_object(o).unwrap();
        }
        assert!(!w.start_write_at_complete_window());
        assert!(w.is_writing());
        for o in linked_objects(&mut chain, 1, 3, t.plus_seconds(4)) {
            w.add_object(o).unwrap();
        }
        w.close();

        let records = files_with_suffix(dir.path(), ".rcd");
        assert_eq!(
            records,
            vec![
                dir.path().join("2022-05-26T11_02_55Z.rcd"),
                dir.path().join("2022-05-26T11_02_57Z.rcd"),
                dir.path().join("2022-05-26T11_02_59Z.rcd"),
            ]
        );
        let files: Vec<RecordFile> = records.iter().map(|p| RecordFile::read(p).unwrap()).collect();
        assert_eq!(files[0].items.len(), 3);
        assert_eq!(files[1].items.len(), 2);
        assert_eq!(files[2].items.len(), 1);
        assert!(RunningHashChain::verify_continuity(&files).is_ok());
    }

    #[test]
    fn complete_window_policy_enabled_while_idle_skips_rest_of_period() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        let t = scenario_start();

        for o in linked_objects(&mut chain, 1, 1, t) {
            w.add_object(o).unwrap();
        }
        w.close_and_sign();
        w.set_start_write_at_complete_window(true);
        for o in linked_objects(&mut chain, 1, 2, t.plus_nanos(500_000_000)) {
            w.add_object(o).unwrap();
        }
        assert!(!w.is_writing());
        for o in linked_objects(&mut chain, 1, 3, t.plus_seconds(2)) {
            w.add_object(o).unwrap();
        }
        assert!(w.is_writing());
        w.close();

        assert_eq!(
            files_with_suffix(dir.path(), ".rcd"),
            vec![
                dir.path().join("2022-05-26T11_02_55Z.rcd"),
                dir.path().join("2022-05-26T11_02_57Z.rcd"),
            ]
        );
    }

    #[traced_test]
    #[test]
    fn restart_over_existing_files_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let initial = Hash::digest(b"h");
        let t = scenario_start();
        let run = |signer: Arc<ScriptedSigner>| {
            let mut w = writer(dir.path(), signer);
            w.set_running_hash(initial);
            let mut chain = RunningHashChain::new(initial);
            for o in linked_objects(&mut chain, 2, 1, t) {
                w.add_object(o).unwrap();
            }
            for o in linked_objects(&mut chain, 2, 2, t.plus_seconds(2)) {
                w.add_object(o).unwrap();
            }
            w.close();
        };

        run(Arc::new(ScriptedSigner::new()));
        let before: Vec<Vec<u8>> = files_with_suffix(dir.path(), "")
            .iter()
            .map(|p| std::fs::read(p).unwrap())
            .collect();
        assert_eq!(before.len(), 4);

        let second = Arc::new(ScriptedSigner::new());
        run(second.clone());
        let after: Vec<Vec<u8>> = files_with_suffix(dir.path(), "")
            .iter()
            .map(|p| std::fs::read(p).unwrap())
            .collect();
        assert_eq!(before, after);
        assert!(second.calls().is_empty());
        assert!(logs_contain("Stream file already exists"));
    }

    #[traced_test]
    #[test]
    fn cancelled_start_hash_writes_nothing_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        let t = scenario_start();

        w.cancellation_token().cancel();
        for o in linked_objects(&mut chain, 2, 1, t) {
            w.add_object(o).unwrap();
        }
        assert!(!w.is_writing());
        assert!(files_with_suffix(dir.path(), "").is_empty());
        assert!(logs_contain(
            "beginNew :: Exception when getting startRunningHash"
        ));

        assert!(w.reset_cancellation());
        assert!(!w.reset_cancellation());
        for o in linked_objects(&mut chain, 2, 2, t.plus_seconds(2)) {
            w.add_object(o).unwrap();
        }
        w.close();
        let records = files_with_suffix(dir.path(), ".rcd");
        assert_eq!(records.len(), 1);
        assert!(RecordFile::read(&records[0]).unwrap().verify_chain().is_ok());
    }

    #[traced_test]
    #[test]
    fn cleared_running_hash_fails_once_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        w.set_running_hash(Hash::digest(b"h"));
        w.clear_running_hash();
        w.cancellation_token().cancel();
        let o = RecordStreamObject::new(b"tx".to_vec(), b"rec".to_vec(), scenario_start())
            .with_alignment(1);
        w.add_object(o).unwrap();
        assert!(!w.is_writing());
        assert!(logs_contain("beginNew :: Exception when getting startRunningHash"));
    }

    #[traced_test]
    #[test]
    fn cancelled_end_hash_discards_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        w.set_running_hash(Hash::digest(b"h"));
        let o = RecordStreamObject::new(b"tx".to_vec(), b"rec".to_vec(), scenario_start())
            .with_alignment(1);
        w.add_object(o).unwrap();
        assert!(w.is_writing());

        w.cancellation_token().cancel();
        w.close_and_sign();
        assert!(!w.is_writing());
        assert!(files_with_suffix(dir.path(), "").is_empty());
        assert!(w.last_written().is_none());
        assert!(logs_contain(
            "closeCurrentAndSign :: failed when getting endRunningHash"
        ));
    }

    #[test]
    fn end_hash_resolved_from_another_thread() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let o = RecordStreamObject::new(b"tx".to_vec(), b"rec".to_vec(), scenario_start())
            .with_alignment(1);
        let link = o.running_hash().clone();
        w.add_object(o).unwrap();

        let expected = RunningHashChain::compute(
            &initial,
            &RunningHashChain::object_hash(b"tx", b"rec"),
        );
        let resolver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            link.resolve(expected);
        });
        w.close_and_sign();
        resolver.join().unwrap();

        let written = w.last_written().unwrap();
        assert_eq!(written.end_running_hash, expected);
        assert!(written.signature_path.is_some());
    }

    #[traced_test]
    #[test]
    fn io_failure_on_end_hash_cancels_and_discards() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, storage) = faulty_writer(dir.path(), Arc::new(ScriptedSigner::new()));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        let t = scenario_start();
        for o in linked_objects(&mut chain, 2, 1, t) {
            w.add_object(o).unwrap();
        }
        let token = w.cancellation_token();
        storage.fail_writes.store(true, Ordering::SeqCst);
        for o in linked_objects(&mut chain, 1, 2, t.plus_seconds(2)) {
            w.add_object(o).unwrap();
        }

        assert!(token.is_cancelled());
        assert!(files_with_suffix(dir.path(), ".rcd").is_empty());
        assert!(files_with_suffix(dir.path(), ".part").is_empty());
        assert!(logs_contain(
            "closeCurrentAndSign :: IOException when serializing endRunningHash and block number"
        ));
    }

    #[traced_test]
    #[test]
    fn io_failure_on_start_hash_aborts_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, storage) = faulty_writer(dir.path(), Arc::new(ScriptedSigner::new()));
        w.set_running_hash(Hash::digest(b"h"));
        storage.fail_writes.store(true, Ordering::SeqCst);
        let o = RecordStreamObject::new(b"tx".to_vec(), b"rec".to_vec(), scenario_start())
            .with_alignment(1);
        w.add_object(o).unwrap();
        assert!(!w.is_writing());
        assert!(w.cancellation_token().is_cancelled());
        assert!(files_with_suffix(dir.path(), "").is_empty());
        assert!(logs_contain("beginNew :: Got IOException when writing startRunningHash"));
    }

    #[traced_test]
    #[test]
    fn existing_file_at_close_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let signer = Arc::new(ScriptedSigner::new());
        let mut w = writer(dir.path(), signer.clone());
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        for o in linked_objects(&mut chain, 2, 1, scenario_start()) {
            w.add_object(o).unwrap();
        }
        assert!(w.is_writing());

        let target = dir.path().join("2022-05-26T11_02_55Z.rcd");
        std::fs::write(&target, b"written by another run").unwrap();
        w.close_and_sign();

        assert!(!w.is_writing());
        assert!(!w.cancellation_token().is_cancelled());
        assert_eq!(std::fs::read(&target).unwrap(), b"written by another run");
        assert!(files_with_suffix(dir.path(), ".part").is_empty());
        assert!(files_with_suffix(dir.path(), ".rcd_sig").is_empty());
        assert!(signer.calls().is_empty());
        assert!(w.last_written().is_none());
        assert!(logs_contain("Stream file already exists"));
    }

    #[traced_test]
    #[test]
    fn close_failure_at_close_cancels_and_discards() {
        let dir = tempfile::tempdir().unwrap();
        let signer = Arc::new(ScriptedSigner::new());
        let (mut w, storage) = faulty_writer(dir.path(), signer.clone());
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        for o in linked_objects(&mut chain, 2, 1, scenario_start()) {
            w.add_object(o).unwrap();
        }
        storage.fail_close.store(true, Ordering::SeqCst);
        w.close_and_sign();

        assert!(!w.is_writing());
        assert!(w.cancellation_token().is_cancelled());
        assert!(files_with_suffix(dir.path(), "").is_empty());
        assert!(signer.calls().is_empty());
        assert!(w.last_written().is_none());
        assert!(logs_contain("closeCurrentAndSign :: failed to close stream file"));
    }

    #[traced_test]
    #[test]
    fn append_failure_aborts_the_rest_of_the_block() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, storage) = faulty_writer(dir.path(), Arc::new(ScriptedSigner::new()));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        let t = scenario_start();
        let mut block_1 = linked_objects(&mut chain, 3, 1, t).into_iter();
        w.add_object(block_1.next().unwrap()).unwrap();
        assert!(w.is_writing());

        storage.fail_writes.store(true, Ordering::SeqCst);
        w.add_object(block_1.next().unwrap()).unwrap();
        assert!(!w.is_writing());
        assert!(w.cancellation_token().is_cancelled());
        assert!(files_with_suffix(dir.path(), ".part").is_empty());
        assert!(logs_contain("failed to write object to stream file"));

        // The rest of block 1 is skipped even once writes succeed again.
        storage.fail_writes.store(false, Ordering::SeqCst);
        w.add_object(block_1.next().unwrap()).unwrap();
        assert!(!w.is_writing());
        assert!(files_with_suffix(dir.path(), "").is_empty());
    }

    #[traced_test]
    #[test]
    fn stale_partial_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("2022-05-26T11_02_55Z.rcd");
        let stale = in_progress_path(&target);
        std::fs::write(&stale, b"left over from a crash").unwrap();

        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        for o in linked_objects(&mut chain, 2, 1, scenario_start()) {
            w.add_object(o).unwrap();
        }
        w.close();

        assert!(!w.cancellation_token().is_cancelled());
        assert!(!stale.exists());
        let file = RecordFile::read(&target).unwrap();
        assert_eq!(file.items.len(), 2);
        assert!(file.verify_chain().is_ok());
        assert!(logs_contain("removing stale partial file"));
    }

    #[traced_test]
    #[test]
    fn create_failure_cancels_and_skips_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, storage) = faulty_writer(dir.path(), Arc::new(ScriptedSigner::new()));
        storage.fail_create.store(true, Ordering::SeqCst);
        w.set_running_hash(Hash::digest(b"h"));
        let o = RecordStreamObject::new(b"tx".to_vec(), b"rec".to_vec(), scenario_start())
            .with_alignment(1);
        w.add_object(o).unwrap();

        assert!(!w.is_writing());
        assert!(w.cancellation_token().is_cancelled());
        assert!(files_with_suffix(dir.path(), "").is_empty());
        assert!(logs_contain("beginNew :: failed to create stream file"));
    }

    #[traced_test]
    #[test]
    fn clear_discards_open_file_and_logs_close_failure() {
        let dir = tempfile::tempdir().unwrap();
        let signer = Arc::new(ScriptedSigner::new());
        let (mut w, storage) = faulty_writer(dir.path(), signer.clone());
        w.set_running_hash(Hash::digest(b"h"));
        let o = RecordStreamObject::new(b"tx".to_vec(), b"rec".to_vec(), scenario_start())
            .with_alignment(1);
        w.add_object(o).unwrap();
        storage.fail_close.store(true, Ordering::SeqCst);

        w.clear();
        assert!(!w.is_writing());
        assert!(files_with_suffix(dir.path(), "").is_empty());
        assert!(signer.calls().is_empty());
        assert!(w.last_written().is_none());
        assert!(logs_contain("StreamWriter::clear Exception in closing record stream"));
        assert!(logs_contain("StreamWriter::clear executed."));
    }

    #[traced_test]
    #[test]
    fn clear_when_idle_only_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        w.clear();
        assert!(logs_contain("StreamWriter::clear executed."));
        assert!(!w.is_stopped());
    }

    #[traced_test]
    #[test]
    fn missing_export_dir_cancels_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-there");
        let mut w = writer(&missing, Arc::new(ScriptedSigner::new()));
        w.set_running_hash(Hash::digest(b"h"));
        let o = RecordStreamObject::new(b"tx".to_vec(), b"rec".to_vec(), scenario_start())
            .with_alignment(1);
        w.add_object(o).unwrap();
        assert!(!w.is_writing());
        assert!(w.cancellation_token().is_cancelled());
        assert!(logs_contain("beginNew :: failed to create stream file"));
        assert!(!missing.exists());
    }

    #[traced_test]
    #[test]
    fn signer_failure_leaves_record_unsigned() {
        let dir = tempfile::tempdir().unwrap();
        let signer = Arc::new(ScriptedSigner::failing());
        let mut w = writer(dir.path(), signer);
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        for o in linked_objects(&mut chain, 2, 1, scenario_start()) {
            w.add_object(o).unwrap();
        }
        w.close();

        assert_eq!(files_with_suffix(dir.path(), ".rcd").len(), 1);
        assert!(files_with_suffix(dir.path(), ".rcd_sig").is_empty());
        assert!(w.cancellation_token().is_cancelled());
        assert_eq!(w.last_written().unwrap().signature_path, None);
        assert!(logs_contain("closeCurrentAndSign :: failed to sign hash"));
    }

    #[traced_test]
    #[test]
    fn signature_write_failure_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, storage) = faulty_writer(dir.path(), Arc::new(ScriptedSigner::new()));
        storage.fail_signature_create.store(true, Ordering::SeqCst);
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        for o in linked_objects(&mut chain, 2, 1, scenario_start()) {
            w.add_object(o).unwrap();
        }
        w.close();

        assert_eq!(files_with_suffix(dir.path(), ".rcd").len(), 1);
        assert!(files_with_suffix(dir.path(), ".rcd_sig").is_empty());
        assert!(files_with_suffix(dir.path(), ".part").is_empty());
        assert!(logs_contain("closeCurrentAndSign :: Fail to generate signature file"));
    }

    #[traced_test]
    #[test]
    fn close_stops_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), Arc::new(ScriptedSigner::new()));
        w.close();
        assert!(w.is_stopped());
        assert!(logs_contain("StreamWriter finished writing the last object, is stopped"));
        let o = RecordStreamObject::new(b"tx".to_vec(), b"rec".to_vec(), scenario_start());
        assert!(matches!(w.add_object(o), Err(WriterError::Stopped)));
    }

    #[test]
    fn ed25519_signed_files_verify() {
        let dir = tempfile::tempdir().unwrap();
        let key = SigningKey::generate();
        let verifying = key.verifying_key();
        let mut w = writer(dir.path(), Arc::new(key));
        let initial = Hash::digest(b"h");
        w.set_running_hash(initial);
        let mut chain = RunningHashChain::new(initial);
        for o in linked_objects(&mut chain, 3, 7, scenario_start()) {
            w.add_object(o).unwrap();
        }
        w.close();

        let written = w.last_written().unwrap().clone();
        let sig_path = written.signature_path.unwrap();
        let (record, _) = verify_signature_file(&written.record_path, &sig_path, 1, &verifying).unwrap();
        assert_eq!(record.metadata_hash(), written.metadata_hash);
        assert_eq!(
            record.metadata_hash(),
            crate::record_file::metadata_digest(
                6,
                recstream_types::SemanticVersion::new(0, 27, 0),
                &initial,
                &chain.current(),
                7
            )
        );
    }
}
