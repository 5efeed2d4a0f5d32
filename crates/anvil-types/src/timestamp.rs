use std::fmt;

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Wall-clock instant plus the timezone offset it was recorded in.
///
/// Used for commit author/committer signatures and operation metadata.
/// Ordering compares the instant first, so two timestamps for the same
/// instant in different zones are adjacent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Milliseconds since the UNIX epoch (UTC).
    pub millis_since_epoch: i64,
    /// Offset from UTC in minutes at the time of recording.
    pub tz_offset_minutes: i32,
}

impl Timestamp {
    /// Create a timestamp with explicit values.
    pub const fn new(millis_since_epoch: i64, tz_offset_minutes: i32) -> Self {
        Self {
            millis_since_epoch,
            tz_offset_minutes,
        }
    }

    /// The current local time.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            millis_since_epoch: now.timestamp_millis(),
            tz_offset_minutes: now.offset().local_minus_utc() / 60,
        }
    }

    /// The epoch in UTC.
    pub const fn epoch() -> Self {
        Self::new(0, 0)
    }

    /// Convert to a `chrono` date-time in the recorded offset.
    pub fn to_datetime(&self) -> Result<DateTime<FixedOffset>, TypeError> {
        let offset =
            FixedOffset::east_opt(self.tz_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        let utc = Utc
            .timestamp_millis_opt(self.millis_since_epoch)
            .single()
            .ok_or(TypeError::TimestampOutOfRange(self.millis_since_epoch))?;
        Ok(utc.with_timezone(&offset))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timestamp({}ms{:+}m)",
            self.millis_since_epoch, self.tz_offset_minutes
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Ok(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f %:z")),
            Err(_) => write!(f, "{}ms", self.millis_since_epoch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_formats_in_utc() {
        assert_eq!(
            Timestamp::epoch().to_string(),
            "1970-01-01 00:00:00.000 +00:00"
        );
    }

    #[test]
    fn offset_is_applied_on_display() {
        let ts = Timestamp::new(0, 120);
        assert_eq!(ts.to_string(), "1970-01-01 02:00:00.000 +02:00");
    }

    #[test]
    fn now_is_after_epoch() {
        assert!(Timestamp::now() > Timestamp::epoch());
    }

    #[test]
    fn ordering_by_instant() {
        assert!(Timestamp::new(1000, 0) < Timestamp::new(2000, -300));
    }
}
