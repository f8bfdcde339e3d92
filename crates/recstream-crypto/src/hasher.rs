use std::io::{self, Read, Write};

use recstream_types::Hash;
use sha2::{Digest, Sha384};

/// Read buffer size used when digesting files.
const READ_CHUNK: usize = 64 * 1024;

/// `Write` adapter that feeds every byte through SHA-384.
///
/// Bytes are hashed and then forwarded to the inner writer. With
/// [`HashingWriter::digest_only`] the inner writer is a sink, which is how the
/// stream writer keeps a running metadata digest next to the file it writes.
pub struct HashingWriter<W = io::Sink> {
    inner: W,
    hasher: Sha384,
}

impl HashingWriter<io::Sink> {
    /// A writer that only digests.
    pub fn digest_only() -> Self {
        Self::new(io::sink())
    }
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha384::new(),
        }
    }

    /// Finish hashing, returning the inner writer and the digest.
    pub fn finish(self) -> (W, Hash) {
        (self.inner, Hash::from_digest_output(self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Digest everything a reader yields.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<Hash> {
    let mut hasher = Sha384::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Hash::from_digest_output(hasher.finalize()))
}
