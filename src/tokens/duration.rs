//! Token lifetimes: a date-only ISO 8601 period (`P1Y2M3D`, `P30D`, `P1M`).
//!
//! Week (`W`) and time (`T...`) designators are not accepted. Expiry is
//! calendar arithmetic on the issue instant. Years and months move the month
//! field and the day of month is kept; a day past the end of the target month
//! rolls over into the next one, so `P1M` from Jan 31 lands on Mar 3 (Mar 2 in
//! a leap year) and `P1Y` from Feb 29 lands on Mar 1.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};

use crate::errors::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarPeriod {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

impl CalendarPeriod {
    /// `start` with years, months and days added field-wise, then normalised.
    ///
    /// The day of month is not clamped: Jan 31 plus one month is "Feb 31",
    /// which normalises to early March.
    pub fn add_to(&self, start: DateTime<Utc>) -> Result<DateTime<Utc>, AuthError> {
        self.shift(start)
            .ok_or_else(|| AuthError::InvalidDurationFormat(format!("{} is out of range", self)))
    }

    fn shift(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let month_index = i64::from(start.year()) * 12
            + i64::from(start.month0())
            + i64::from(self.years) * 12
            + i64::from(self.months);
        let year = i32::try_from(month_index.div_euclid(12)).ok()?;
        let month = u32::try_from(month_index.rem_euclid(12)).ok()? + 1;

        // Day offsets from the first of the target month carry the overflow.
        let offset = u64::from(start.day0()) + u64::from(self.days);
        let date = NaiveDate::from_ymd_opt(year, month, 1)?.checked_add_days(Days::new(offset))?;
        Some(Utc.from_utc_datetime(&date.and_time(start.time())))
    }
}

impl fmt::Display for CalendarPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("P")?;
        if self.years > 0 {
            write!(f, "{}Y", self.years)?;
        }
        if self.months > 0 {
            write!(f, "{}M", self.months)?;
        }
        if self.days > 0 {
            write!(f, "{}D", self.days)?;
        }
        Ok(())
    }
}

impl FromStr for CalendarPeriod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s)
    }
}

pub fn parse_duration(input: &str) -> Result<CalendarPeriod, AuthError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AuthError::DurationRequired);
    }
    let invalid = |why: &str| AuthError::InvalidDurationFormat(format!("'{}': {}", input, why));

    let body = s
        .strip_prefix('P')
        .ok_or_else(|| invalid("must start with 'P'"))?;
    if body.is_empty() {
        return Err(invalid("no components"));
    }

    let mut period = CalendarPeriod::default();
    // Index into "YMD" of the last designator seen; enforces order and uniqueness.
    let mut last: Option<usize> = None;
    let mut digits = String::new();

    for c in body.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let slot = match c {
            'Y' => 0,
            'M' => 1,
            'D' => 2,
            'W' => return Err(invalid("week designator is not supported")),
            'T' => return Err(invalid("time components are not supported")),
            other => return Err(invalid(&format!("unexpected character '{}'", other))),
        };
        if digits.is_empty() {
            return Err(invalid(&format!("missing number before '{}'", c)));
        }
        if last.is_some_and(|prev| slot <= prev) {
            return Err(invalid("components must appear once each, in Y, M, D order"));
        }
        let value: u32 = digits
            .parse()
            .map_err(|_| invalid(&format!("number before '{}' is too large", c)))?;
        match slot {
            0 => period.years = value,
            1 => period.months = value,
            _ => period.days = value,
        }
        last = Some(slot);
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(invalid("trailing number without designator"));
    }
    if period == CalendarPeriod::default() {
        return Err(invalid("period must be longer than zero"));
    }
    Ok(period)
}

/// Expiry instant for a token issued at `issued_at` with lifetime `duration`.
pub fn expires_at(issued_at: DateTime<Utc>, duration: &str) -> Result<DateTime<Utc>, AuthError> {
    parse_duration(duration)?.add_to(issued_at)
}
