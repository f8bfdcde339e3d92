use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// Consensus time assigned to a transaction.
///
/// Seconds and nanoseconds since the UNIX epoch, ordered seconds first.
/// The stream delivers objects with non-decreasing timestamps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsensusTimestamp {
    /// Whole seconds since the UNIX epoch.
    pub seconds: i64,
    /// Nanosecond adjustment, always below one second.
    pub nanos: u32,
}

impl ConsensusTimestamp {
    /// Create a timestamp, carrying excess nanoseconds into the seconds field.
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self {
            seconds: seconds.saturating_add(i64::from(nanos / NANOS_PER_SECOND)),
            nanos: nanos % NANOS_PER_SECOND,
        }
    }

    /// The UNIX epoch.
    pub const fn epoch() -> Self {
        Self {
            seconds: 0,
            nanos: 0,
        }
    }

    /// Convert from a chrono UTC date-time.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::new(dt.timestamp(), dt.timestamp_subsec_nanos())
    }

    /// Convert to a chrono UTC date-time.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, TypeError> {
        DateTime::<Utc>::from_timestamp(self.seconds, self.nanos).ok_or(
            TypeError::TimestampOutOfRange {
                seconds: self.seconds,
                nanos: self.nanos,
            },
        )
    }

    /// Milliseconds since the UNIX epoch, floored.
    ///
    /// Computed in 128-bit arithmetic so that no representable timestamp
    /// overflows.
    pub fn epoch_millis(&self) -> i128 {
        i128::from(self.seconds) * 1_000 + i128::from(self.nanos / 1_000_000)
    }

    /// A timestamp `seconds` later.
    pub fn plus_seconds(&self, seconds: i64) -> Self {
        Self::new(self.seconds.saturating_add(seconds), self.nanos)
    }

    /// A timestamp `nanos` later.
    pub fn plus_nanos(&self, nanos: u32) -> Self {
        let total = u64::from(self.nanos) + u64::from(nanos);
        let carry = (total / u64::from(NANOS_PER_SECOND)) as i64;
        Self {
            seconds: self.seconds.saturating_add(carry),
            nanos: (total % u64::from(NANOS_PER_SECOND)) as u32,
        }
    }

    /// ISO-8601 rendering in UTC with a `Z` suffix.
    ///
    /// The fractional part is omitted when zero and otherwise printed with
    /// 3, 6 or 9 digits, whichever is the shortest exact form. File names are
    /// derived from this string, so the format is part of the wire contract.
    pub fn to_iso_instant(&self) -> Result<String, TypeError> {
        let dt = self.to_datetime()?;
        let mut out = dt.format("%Y-%m-%dT%H:%M:%S").to_string();
        let nanos = self.nanos;
        if nanos != 0 {
            if nanos % 1_000_000 == 0 {
                out.push_str(&format!(".{:03}", nanos / 1_000_000));
            } else if nanos % 1_000 == 0 {
                out.push_str(&format!(".{:06}", nanos / 1_000));
            } else {
                out.push_str(&format!(".{nanos:09}"));
            }
        }
        out.push('Z');
        Ok(out)
    }
}

impl fmt::Debug for ConsensusTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsensusTimestamp({}.{:09})", self.seconds, self.nanos)
    }
}

impl fmt::Display for ConsensusTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_iso_instant() {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{}.{:09}", self.seconds, self.nanos),
        }
    }
}

impl From<DateTime<Utc>> for ConsensusTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}
