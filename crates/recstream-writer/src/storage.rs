use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

/// A writable stream file that must be closed explicitly.
///
/// `close` flushes buffered bytes and makes them durable; dropping an output
/// without closing it may lose data.
pub trait StreamOutput: Write + Send {
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Filesystem operations the stream writer depends on.
///
/// [`LocalDisk`] is the production implementation; tests substitute
/// implementations that fail on demand.
pub trait StreamStorage: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Create a new file, failing if it already exists.
    fn create(&self, path: &Path) -> io::Result<Box<dyn StreamOutput>>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Read a whole file into memory.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open_read(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Files on the local filesystem.
///
/// Directories are never created implicitly; a missing export directory
/// surfaces as a `create` error.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalDisk;

struct LocalOutput(BufWriter<File>);

impl Write for LocalOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl StreamOutput for LocalOutput {
    fn close(self: Box<Self>) -> io::Result<()> {
        let file = self.0.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

impl StreamStorage for LocalDisk {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn StreamOutput>> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Box::new(LocalOutput(BufWriter::new(file))))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }
}
