use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use recstream_types::SemanticVersion;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Record stream format version written by default.
pub const RECORD_STREAM_VERSION: i32 = 6;

/// Describes one kind of stream: file extensions and header values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamType {
    /// Human-readable name used in logs.
    pub description: String,
    /// Record file extension, without the dot.
    pub extension: String,
    /// Signature file extension, without the dot.
    pub sig_extension: String,
    /// `[version, hapi major, hapi minor, hapi patch]`.
    pub file_header: Vec<i32>,
    /// Bytes written at the start of every signature file; the first is the
    /// signature file version.
    pub sig_file_header: Vec<u8>,
}

impl StreamType {
    /// The record stream at format version 6, HAPI 0.27.0.
    pub fn records() -> Self {
        Self {
            description: "records".into(),
            extension: "rcd".into(),
            sig_extension: "rcd_sig".into(),
            file_header: vec![RECORD_STREAM_VERSION, 0, 27, 0],
            sig_file_header: vec![RECORD_STREAM_VERSION as u8],
        }
    }

    /// Record file format version (first header value).
    pub fn version(&self) -> i32 {
        self.file_header.first().copied().unwrap_or_default()
    }

    /// HAPI version triple from the header.
    pub fn hapi_version(&self) -> SemanticVersion {
        let at = |i: usize| self.file_header.get(i).copied().unwrap_or_default();
        SemanticVersion::new(at(1), at(2), at(3))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_header.len() != 4 {
            return Err(ConfigError::Invalid(format!(
                "file_header must hold 4 values, got {}",
                self.file_header.len()
            )));
        }
        if self.sig_file_header.is_empty() {
            return Err(ConfigError::Invalid("sig_file_header must not be empty".into()));
        }
        if self.extension.is_empty() || self.sig_extension.is_empty() {
            return Err(ConfigError::Invalid("extensions must not be empty".into()));
        }
        if self.extension == self.sig_extension {
            return Err(ConfigError::Invalid(
                "record and signature extensions must differ".into(),
            ));
        }
        Ok(())
    }
}

impl Default for StreamType {
    fn default() -> Self {
        Self::records()
    }
}

/// Configuration for a [`StreamWriter`](crate::StreamWriter).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Directory record and signature files are written to.
    pub export_dir: PathBuf,
    /// Length of one rollover period in milliseconds.
    pub log_period_ms: u64,
    /// Skip objects until the first period boundary has been crossed.
    pub start_write_at_complete_window: bool,
    pub stream_type: StreamType,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("record-streams"),
            log_period_ms: 2_000,
            start_write_at_complete_window: false,
            stream_type: StreamType::records(),
        }
    }
}

impl WriterConfig {
    /// Config for `export_dir` with every other field at its default.
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Rollover period, rejecting zero.
    pub fn period(&self) -> Result<NonZeroU64, ConfigError> {
        NonZeroU64::new(self.log_period_ms)
            .ok_or_else(|| ConfigError::Invalid("log_period_ms must be positive".into()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.period()?;
        self.stream_type.validate()
    }

    /// Create the export directory if it does not exist yet.
    pub fn ensure_export_dir(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_dir).map_err(|source| ConfigError::Io {
            path: self.export_dir.clone(),
            source,
        })
    }
}
