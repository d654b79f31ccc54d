//! Translation of relative windows and absolute ranges into [`StoreQuery`]
//!
//! ```
//! use mqstore::query::{relative, Order, Window};
//! use mqstore::topic::TopicPath;
//!
//! let path = TopicPath::parse("boiler1/temp").unwrap();
//! let now = mqstore_utils::parse_datetime("2024-03-07 12:00:00").unwrap();
//! let q = relative(&path, "last", "2", "hour", now).unwrap();
//! assert_eq!(q.order, Order::Desc);
//! assert_eq!(q.window, Window::Since(mqstore_utils::parse_datetime("2024-03-07 10:00:00").unwrap()));
//! ```

use std::str::FromStr;

use chrono::{Months, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::FormatError;
use crate::topic::TopicPath;

static DATE_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?: (\d{1,2}):(\d{1,2}):(\d{1,2}))?$")
        .unwrap_or_else(|e| unreachable!("date rule is a constant pattern, {e}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    First,
    Last,
}

impl FromStr for Direction {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, FormatError> {
        match s {
            "first" => Ok(Direction::First),
            "last" => Ok(Direction::Last),
            _ => Err(FormatError::Direction(s.into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    Record,
}

impl FromStr for Unit {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, FormatError> {
        Ok(match s {
            "second" => Unit::Second,
            "minute" => Unit::Minute,
            "hour" => Unit::Hour,
            "day" => Unit::Day,
            "week" => Unit::Week,
            "month" => Unit::Month,
            "quarter" => Unit::Quarter,
            "year" => Unit::Year,
            "record" => Unit::Record,
            _ => return Err(FormatError::Unit(s.into())),
        })
    }
}

/// `count` units of time. Calendar units keep month granularity so that
/// adding one month to Jan 31 yields the last day of February.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Seconds(u64),
    Months(u64),
}

impl Interval {
    /// `None` for the record unit, which is a row count and not a span of time
    pub fn of(count: u64, unit: Unit) -> Option<Self> {
        let secs = |per: u64| Some(Interval::Seconds(count.saturating_mul(per)));
        let months = |per: u64| Some(Interval::Months(count.saturating_mul(per)));
        match unit {
            Unit::Second => secs(1),
            Unit::Minute => secs(60),
            Unit::Hour => secs(3600),
            Unit::Day => secs(86400),
            Unit::Week => secs(7 * 86400),
            Unit::Month => months(1),
            Unit::Quarter => months(3),
            Unit::Year => months(12),
            Unit::Record => None,
        }
    }

    /// `t + self`, `None` when the result leaves the representable range
    pub fn checked_add(&self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        match *self {
            Interval::Seconds(s) => t.checked_add_signed(chrono::Duration::try_seconds(i64::try_from(s).ok()?)?),
            Interval::Months(m) => t.checked_add_months(Months::new(u32::try_from(m).ok()?)),
        }
    }

    /// `t - self`, `None` when the result leaves the representable range
    pub fn checked_sub(&self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        match *self {
            Interval::Seconds(s) => t.checked_sub_signed(chrono::Duration::try_seconds(i64::try_from(s).ok()?)?),
            Interval::Months(m) => t.checked_sub_months(Months::new(u32::try_from(m).ok()?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Window {
    /// No time bound
    All,
    /// `created >= t`
    Since(NaiveDateTime),
    /// `created <= MIN(created) + interval`, the minimum taken over the whole store
    FirstWithin(Interval),
    /// `from <= created <= to`
    Between(NaiveDateTime, NaiveDateTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    #[inline]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// A bounded, ordered retrieval over one `(tenant_id, source)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreQuery {
    pub tenant_id: String,
    pub source: String,
    pub window: Window,
    pub order: Order,
    pub limit: Option<u64>,
}

/// One retrieved store record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub record_id: i64,
    pub created: String,
    pub value: String,
}

/// Parse a strictly positive decimal count
pub fn parse_count(count: &str) -> Result<u64, FormatError> {
    if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FormatError::Count(count.into()));
    }
    match count.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(FormatError::Count(count.into())),
    }
}

/// Parse `YYYY-M-D` or `YYYY-M-D H:M:S`, a date alone means midnight
pub fn parse_date(s: &str) -> Result<NaiveDateTime, FormatError> {
    let err = || FormatError::Date(s.into());
    let caps = DATE_RULE.captures(s).ok_or_else(err)?;
    let num = |i: usize| -> Result<u32, FormatError> {
        match caps.get(i) {
            Some(m) => m.as_str().parse::<u32>().map_err(|_| err()),
            None => Ok(0),
        }
    };
    let year = i32::try_from(num(1)?).map_err(|_| err())?;
    let (hour, min, sec) = (num(4)?, num(5)?, num(6)?);
    NaiveDate::from_ymd_opt(year, num(2)?, num(3)?).and_then(|d| d.and_hms_opt(hour, min, sec)).ok_or_else(err)
}

/// `(direction, count, unit)` relative to `now`
pub fn relative(
    path: &TopicPath,
    direction: &str,
    count: &str,
    unit: &str,
    now: NaiveDateTime,
) -> Result<StoreQuery, FormatError> {
    let direction = Direction::from_str(direction)?;
    let count = parse_count(count)?;
    let unit = Unit::from_str(unit)?;

    let order = match direction {
        Direction::First => Order::Asc,
        Direction::Last => Order::Desc,
    };

    let (window, limit) = match Interval::of(count, unit) {
        None => (Window::All, Some(count)),
        Some(interval) => {
            let window = match direction {
                Direction::Last => interval.checked_sub(now).map(Window::Since).unwrap_or(Window::All),
                Direction::First => Window::FirstWithin(interval),
            };
            (window, None)
        }
    };

    Ok(StoreQuery { tenant_id: path.tenant_id.clone(), source: path.source.clone(), window, order, limit })
}

/// Inclusive `[from, to]` range in ascending record order
pub fn absolute(path: &TopicPath, from: &str, to: &str) -> Result<StoreQuery, FormatError> {
    let from = parse_date(from)?;
    let to = parse_date(to)?;
    Ok(StoreQuery {
        tenant_id: path.tenant_id.clone(),
        source: path.source.clone(),
        window: Window::Between(from, to),
        order: Order::Asc,
        limit: None,
    })
}
