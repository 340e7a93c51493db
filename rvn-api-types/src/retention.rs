use std::time::Duration as StdDuration;

/// A retention interval, with an explicit "forever" sentinel instead of
/// relying on `i64::MAX`-as-milliseconds arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDuration {
    Forever,
    Millis(u64),
}

impl RetentionDuration {
    pub fn from_std(d: StdDuration) -> Self {
        RetentionDuration::Millis(d.as_millis() as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        RetentionDuration::Millis(secs.saturating_mul(1000))
    }

    pub fn from_days(days: u64) -> Self {
        Self::from_secs(days.saturating_mul(86_400))
    }

    pub fn as_millis(self) -> Option<u64> {
        match self {
            RetentionDuration::Forever => None,
            RetentionDuration::Millis(ms) => Some(ms),
        }
    }

    pub fn is_forever(self) -> bool {
        matches!(self, RetentionDuration::Forever)
    }
}

/// A single cleanup rule: keep at most `max_versions` versions per
/// `time_frame`-sized bucket, with buckets spaced `min_interval` apart.
///
/// `max_versions == u32::MAX` means "keep every version in each interval"
/// (the policy never contributes a deletion candidate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub min_interval: RetentionDuration,
    pub time_frame: RetentionDuration,
    pub max_versions: u32,
    pub description: String,
}

impl CleanupPolicy {
    pub const KEEP_ALL: u32 = u32::MAX;

    pub fn new(
        min_interval: RetentionDuration,
        time_frame: RetentionDuration,
        max_versions: u32,
        description: impl Into<String>,
    ) -> Self {
        CleanupPolicy {
            min_interval,
            time_frame,
            max_versions,
            description: description.into(),
        }
    }

    /// Keep `n` versions per interval of `unit_millis`, over an unbounded
    /// time frame. E.g. "keep 7 daily" is `of_staggered(7, ONE_DAY_MS)`.
    pub fn of_staggered(n: u32, unit: RetentionDuration) -> Self {
        CleanupPolicy::new(
            unit,
            RetentionDuration::Forever,
            n,
            format!("keep {n} per interval"),
        )
    }

    /// Keep the newest `n` versions overall (single interval spanning the
    /// entire history).
    pub fn of_versions(n: u32) -> Self {
        CleanupPolicy::new(
            RetentionDuration::Forever,
            RetentionDuration::Forever,
            n,
            format!("keep last {n} versions"),
        )
    }

    /// Keep everything younger than `age`; nothing older survives this
    /// policy (max_versions of 0 within one interval beyond the frame).
    pub fn of_duration(age: RetentionDuration) -> Self {
        CleanupPolicy::new(age, age, CleanupPolicy::KEEP_ALL, "keep recent".to_string())
    }

    pub fn forever() -> Self {
        CleanupPolicy::new(
            RetentionDuration::Forever,
            RetentionDuration::Forever,
            CleanupPolicy::KEEP_ALL,
            "keep forever".to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_versions_keeps_everything_else_for_removal() {
        let p = CleanupPolicy::of_versions(5);
        assert_eq!(p.max_versions, 5);
        assert!(p.time_frame.is_forever());
    }

    #[test]
    fn keep_all_sentinel_round_trips() {
        let p = CleanupPolicy::forever();
        assert_eq!(p.max_versions, CleanupPolicy::KEEP_ALL);
    }
}
