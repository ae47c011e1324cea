use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Simple "YYYY-MM" utility with safe arithmetic and ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: u16,
    pub month: u8, // 1..=12
}

impl YearMonth {
    pub fn new(year: u16, month: u8) -> Self {
        assert!((1..=12).contains(&month), "Month must be 1..=12");
        Self { year, month }
    }

    fn time_month(self) -> Month {
        // Constructed values always hold 1..=12.
        Month::try_from(self.month).unwrap_or(Month::January)
    }

    pub fn first_day(self) -> Date {
        Date::from_calendar_date(self.year as i32, self.time_month(), 1).unwrap_or(Date::MIN)
    }

    pub fn last_day(self) -> Date {
        let n = time::util::days_in_year_month(self.year as i32, self.time_month());
        Date::from_calendar_date(self.year as i32, self.time_month(), n).unwrap_or(Date::MAX)
    }

    /// Every calendar day of this month, in order.
    pub fn days(self) -> Vec<Date> {
        let last = self.last_day();
        let mut out = Vec::with_capacity(31);
        let mut d = self.first_day();
        loop {
            out.push(d);
            if d >= last { break; }
            match d.next_day() {
                Some(n) => d = n,
                None => break,
            }
        }
        out
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split('-').collect();
        if parts.len() != 2 {
            return Err("expected YYYY-MM".into());
        }
        let year: u16 = parts[0].parse().map_err(|_| "invalid year")?;
        let month: u8 = parts[1].parse().map_err(|_| "invalid month")?;
        if !(1..=12).contains(&month) {
            return Err("month must be 01..12".into());
        }
        Ok(Self { year, month })
    }
}

/// Parse a `YYYY-MM-DD` header date.
pub fn parse_day(s: &str) -> Result<Date> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| anyhow!("invalid date '{}': {}", s, e))
}

pub fn format_day(d: Date) -> String {
    d.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| d.to_string())
}

/// Epoch second of `d` at 00:00:00 UTC.
pub fn day_start_utc(d: Date) -> i64 {
    d.midnight().assume_utc().unix_timestamp()
}

/// Epoch second of `d` at 23:59:59 UTC (inclusive day end).
pub fn day_end_utc(d: Date) -> i64 {
    day_start_utc(d) + SECONDS_PER_DAY - 1
}

/// Render an epoch second as `YYYY-MM-DD HH:MM:SS` for log lines.
pub fn fmt_epoch(ts: i64) -> String {
    match OffsetDateTime::from_unix_timestamp(ts) {
        Ok(dt) => dt
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
            .unwrap_or_else(|_| ts.to_string()),
        Err(_) => ts.to_string(),
    }
}
