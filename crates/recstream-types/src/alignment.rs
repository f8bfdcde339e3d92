use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire value written as the block number of a file whose objects carry no
/// block alignment.
pub const NO_ALIGNMENT: i64 = i64::MIN;

/// Logical block an object belongs to.
///
/// Objects that share a `Block` number are kept in one record file even when
/// they span several periods. `Unaligned` objects only ever roll over on
/// period boundaries, whatever number they may otherwise carry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamAlignment {
    Block(i64),
    Unaligned,
}

impl StreamAlignment {
    /// Decode from the on-disk block number.
    pub const fn from_wire(value: i64) -> Self {
        if value == NO_ALIGNMENT {
            Self::Unaligned
        } else {
            Self::Block(value)
        }
    }

    /// Encode as the on-disk block number.
    pub const fn to_wire(self) -> i64 {
        match self {
            Self::Block(n) => n,
            Self::Unaligned => NO_ALIGNMENT,
        }
    }

    /// Returns `true` when both sides name the same block.
    ///
    /// Two `Unaligned` values never match.
    pub fn same_block(self, other: Self) -> bool {
        matches!((self, other), (Self::Block(a), Self::Block(b)) if a == b)
    }
}

impl From<i64> for StreamAlignment {
    fn from(value: i64) -> Self {
        Self::from_wire(value)
    }
}

impl fmt::Debug for StreamAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(n) => write!(f, "Block({n})"),
            Self::Unaligned => f.write_str("Unaligned"),
        }
    }
}

impl fmt::Display for StreamAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}
