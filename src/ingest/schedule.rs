//! Five-field calendar expressions (`minute hour day-of-month month day-of-week`).
//!
//! Each field accepts `*`, single values, ranges `a-b`, lists `a,b`, and steps
//! `*/n` or `a-b/n`. Day-of-week runs 0 through 7 with both 0 and 7 meaning
//! Sunday. When both day fields are restricted a day matches if either does.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },
    #[error("{field} value {value} outside {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// How far ahead to search before concluding an expression never fires (e.g. `0 0 31 2 *`).
const SEARCH_DAYS: i64 = 366 * 5;

#[derive(Clone, PartialEq, Eq)]
pub struct CalendarSchedule {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl fmt::Debug for CalendarSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CalendarSchedule").field(&self.source).finish()
    }
}

impl fmt::Display for CalendarSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct FieldBounds {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldBounds = FieldBounds { name: "minute", min: 0, max: 59 };
const HOUR: FieldBounds = FieldBounds { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: FieldBounds = FieldBounds { name: "day-of-month", min: 1, max: 31 };
const MONTH: FieldBounds = FieldBounds { name: "month", min: 1, max: 12 };
const DAY_OF_WEEK: FieldBounds = FieldBounds { name: "day-of-week", min: 0, max: 7 };

/// Parse one field into a bitmask; also reports whether it was a bare `*`.
fn parse_field(text: &str, bounds: &FieldBounds) -> Result<(u64, bool), ScheduleError> {
    let invalid = || ScheduleError::InvalidField {
        field: bounds.name,
        value: text.to_string(),
    };
    let number = |s: &str| -> Result<u32, ScheduleError> {
        let value: u32 = s.parse().map_err(|_| invalid())?;
        if value < bounds.min || value > bounds.max {
            return Err(ScheduleError::OutOfRange {
                field: bounds.name,
                value,
                min: bounds.min,
                max: bounds.max,
            });
        }
        Ok(value)
    };

    let mut mask = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid())?;
                if step == 0 {
                    return Err(invalid());
                }
                (range, step)
            }
            None => (part, 1),
        };
        let (low, high) = match range {
            "*" => (bounds.min, bounds.max),
            _ => match range.split_once('-') {
                Some((a, b)) => (number(a)?, number(b)?),
                None if step > 1 => (number(range)?, bounds.max),
                None => {
                    let v = number(range)?;
                    (v, v)
                }
            },
        };
        if low > high {
            return Err(invalid());
        }
        for value in (low..=high).step_by(step as usize) {
            mask |= 1 << value;
        }
    }
    Ok((mask, text == "*"))
}

impl FromStr for CalendarSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields[..] else {
            return Err(ScheduleError::FieldCount(fields.len()));
        };

        let (minutes, _) = parse_field(minute, &MINUTE)?;
        let (hours, _) = parse_field(hour, &HOUR)?;
        let (days_of_month, dom_any) = parse_field(dom, &DAY_OF_MONTH)?;
        let (months, _) = parse_field(month, &MONTH)?;
        let (mut days_of_week, dow_any) = parse_field(dow, &DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week | 1) & !(1 << 7);
        }

        Ok(Self {
            source: fields.join(" "),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !dom_any,
            dow_restricted: !dow_any,
        })
    }
}

fn bit(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

impl CalendarSchedule {
    fn matches_day(&self, date: NaiveDate) -> bool {
        if !bit(self.months, date.month()) {
            return false;
        }
        let dom = bit(self.days_of_month, date.day());
        let dow = bit(self.days_of_week, date.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// Matching wall-clock times of one day, in order.
    fn times(&self) -> impl Iterator<Item = NaiveTime> + '_ {
        (0..24u32)
            .filter(|h| bit(self.hours, *h))
            .flat_map(move |h| {
                (0..60u32)
                    .filter(|m| bit(self.minutes, *m))
                    .filter_map(move |m| NaiveTime::from_hms_opt(h, m, 0))
            })
    }

    /// The first firing strictly after `after`, in `after`'s timezone.
    ///
    /// Local times skipped by a DST transition never fire; ambiguous ones
    /// fire at their earlier instant.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let local = after.naive_local();
        let start_day = local.date();

        for offset in 0..SEARCH_DAYS {
            let date = start_day + Duration::days(offset);
            if !self.matches_day(date) {
                continue;
            }
            for time in self.times() {
                if offset == 0 && time <= local.time().with_second(0).unwrap_or(time) {
                    continue;
                }
                if let Some(candidate) = tz.from_local_datetime(&date.and_time(time)).earliest()
                    && candidate > *after
                {
                    return Some(candidate);
                }
            }
        }
        None
    }
}
