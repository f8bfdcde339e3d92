use std::num::NonZeroU64;

use recstream_types::ConsensusTimestamp;

/// Index of the period containing `timestamp`.
///
/// Periods are consecutive `period_ms` windows counted from the UNIX epoch;
/// timestamps before the epoch land in negative periods. The result is
/// clamped to the `i64` range.
pub fn period_of(timestamp: &ConsensusTimestamp, period_ms: NonZeroU64) -> i64 {
    let period = timestamp
        .epoch_millis()
        .div_euclid(i128::from(period_ms.get()));
    period.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Maps consensus timestamps onto rollover periods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodClock {
    period_ms: NonZeroU64,
}

impl PeriodClock {
    pub fn new(period_ms: NonZeroU64) -> Self {
        Self { period_ms }
    }

    /// Returns `None` for a zero period.
    pub fn from_millis(period_ms: u64) -> Option<Self> {
        NonZeroU64::new(period_ms).map(Self::new)
    }

    pub fn period_ms(&self) -> NonZeroU64 {
        self.period_ms
    }

    pub fn period_of(&self, timestamp: &ConsensusTimestamp) -> i64 {
        period_of(timestamp, self.period_ms)
    }

    pub fn same_period(&self, a: &ConsensusTimestamp, b: &ConsensusTimestamp) -> bool {
        self.period_of(a) == self.period_of(b)
    }
}
