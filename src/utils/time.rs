use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Format of the `last_update` column
pub const LAST_UPDATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Civil clock at a fixed regional offset from UTC
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    /// Create a clock `hours` east of UTC. Out-of-range offsets fall back to UTC.
    pub fn from_utc_offset_hours(hours: i32) -> Self {
        let offset = FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Current time rendered for `last_update`
    pub fn timestamp(&self) -> String {
        format_timestamp(&self.now())
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::from_utc_offset_hours(7)
    }
}

pub fn format_timestamp(time: &DateTime<FixedOffset>) -> String {
    time.format(LAST_UPDATE_FORMAT).to_string()
}
