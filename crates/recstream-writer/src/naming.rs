use std::ffi::OsString;
use std::path::{Path, PathBuf};

use recstream_types::{ConsensusTimestamp, TypeError};

use crate::config::StreamType;

/// Suffix of files that are still being written.
pub const IN_PROGRESS_SUFFIX: &str = ".part";

/// File name for a stream file whose first object has `timestamp`.
///
/// The ISO-8601 instant with `:` replaced by `_`, followed by `.` and
/// `extension`.
pub fn stream_file_name(
    timestamp: &ConsensusTimestamp,
    extension: &str,
) -> Result<String, TypeError> {
    let iso = timestamp.to_iso_instant()?;
    Ok(format!("{}.{extension}", iso.replace(':', "_")))
}

/// Full path of the record file starting at `timestamp`.
pub fn stream_file_path(
    dir: &Path,
    timestamp: &ConsensusTimestamp,
    stream_type: &StreamType,
) -> Result<PathBuf, TypeError> {
    Ok(dir.join(stream_file_name(timestamp, &stream_type.extension)?))
}

/// Signature file path paired with `record_path`.
pub fn signature_file_path(record_path: &Path, sig_extension: &str) -> PathBuf {
    record_path.with_extension(sig_extension)
}

/// Temporary path a file is written to before being renamed into place.
pub fn in_progress_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(IN_PROGRESS_SUFFIX);
    PathBuf::from(name)
}
