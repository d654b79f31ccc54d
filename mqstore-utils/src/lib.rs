//! Small helpers shared by every mqstore crate
//!
//! - Duration parsing from the human format used in configuration files (`"1h30m"`)
//! - Serde adapters for durations and socket addresses
//! - Wall-clock helpers producing the `YYYY-MM-DD HH:MM:SS` form the store persists
//!
//! ```
//! use mqstore_utils::{to_duration, format_datetime};
//!
//! assert_eq!(to_duration("1h30m15s").as_secs(), 5415);
//!
//! let t = chrono::NaiveDate::from_ymd_opt(2024, 3, 7).unwrap().and_hms_opt(8, 5, 0).unwrap();
//! assert_eq!(format_datetime(&t), "2024-03-07 08:05:00");
//! ```

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::de::{self, Deserialize, Deserializer};

/// Timestamp representation in seconds since Unix epoch
pub type Timestamp = i64;

/// Format of the `created` column, both stored and returned to API callers
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert human-readable duration string to Duration
///
/// # Supported units:
/// - ms: milliseconds
/// - s: seconds
/// - m: minutes
/// - h: hours
/// - d: days
/// - w: weeks
///
/// ```
/// let d = mqstore_utils::to_duration("2w3d12h");
/// assert_eq!(d.as_secs(), 1512000);
/// assert_eq!(mqstore_utils::to_duration("250ms").as_millis(), 250);
/// ```
#[inline]
pub fn to_duration(text: &str) -> Duration {
    let text = text.to_lowercase().replace("ms", "Y");
    let ms: u64 = text
        .split_inclusive(['s', 'm', 'h', 'd', 'w', 'Y'])
        .map(|x| {
            let mut chars = x.chars();
            let u = match chars.nth_back(0) {
                None => return 0,
                Some(u) => u,
            };
            let v = match chars.as_str().trim().parse::<u64>() {
                Err(_e) => return 0,
                Ok(v) => v,
            };
            match u {
                'Y' => v,
                's' => v.saturating_mul(1000),
                'm' => v.saturating_mul(60000),
                'h' => v.saturating_mul(3600000),
                'd' => v.saturating_mul(86400000),
                'w' => v.saturating_mul(604800000),
                _ => 0,
            }
        })
        .fold(0u64, u64::saturating_add);
    Duration::from_millis(ms)
}

/// Deserialize Duration from human-readable string format
#[inline]
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    Ok(to_duration(&v))
}

/// Deserialize SocketAddr with error handling
#[inline]
pub fn deserialize_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    let addr = String::deserialize(deserializer)?.parse::<SocketAddr>().map_err(de::Error::custom)?;
    Ok(addr)
}

/// Current local wall-clock time, truncated to whole seconds
#[inline]
pub fn now_local() -> NaiveDateTime {
    use chrono::Timelike;
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Format a datetime as `YYYY-MM-DD HH:MM:SS`
#[inline]
pub fn format_datetime(t: &NaiveDateTime) -> String {
    t.format(DATETIME_FORMAT).to_string()
}

/// Parse a datetime previously written with [`format_datetime`]
#[inline]
pub fn parse_datetime(s: &str) -> anyhow::Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)?)
}

/// Get current timestamp in seconds
#[inline]
pub fn timestamp_secs() -> Timestamp {
    chrono::Utc::now().timestamp()
}
