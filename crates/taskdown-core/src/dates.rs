use chrono::{Datelike, Duration, NaiveDate};

/// An inclusive calendar-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Whether a task's stored `YYYY-MM-DD` value falls in the window.
    /// Unparsable values never match.
    pub fn contains_str(&self, value: &str) -> bool {
        parse_date(value).map(|day| self.contains(day)).unwrap_or(false)
    }
}

/// Parse a `YYYY-MM-DD` date value as stored in task metadata.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn week_of(day: NaiveDate) -> DateRange {
    let monday = day - Duration::days(day.weekday().num_days_from_monday() as i64);
    DateRange {
        start: monday,
        end: monday + Duration::days(6),
    }
}

/// Resolve a symbolic date spec against the evaluation date.
///
/// Accepted forms: `today`, `yesterday`, `tomorrow`, `this-week`,
/// `next-week`, `last-7d`, `last-30d`, an exact `YYYY-MM-DD`, or an
/// inclusive `YYYY-MM-DD..YYYY-MM-DD` range. Weeks run Monday through
/// Sunday; `last-Nd` covers the N days ending today. Anything else
/// resolves to `None` and the caller treats the predicate as a no-op.
pub fn resolve(spec: &str, today: NaiveDate) -> Option<DateRange> {
    match spec.trim() {
        "today" => Some(DateRange::single(today)),
        "yesterday" => Some(DateRange::single(today - Duration::days(1))),
        "tomorrow" => Some(DateRange::single(today + Duration::days(1))),
        "this-week" => Some(week_of(today)),
        "next-week" => Some(week_of(today + Duration::days(7))),
        "last-7d" => Some(DateRange {
            start: today - Duration::days(6),
            end: today,
        }),
        "last-30d" => Some(DateRange {
            start: today - Duration::days(29),
            end: today,
        }),
        other => {
            if let Some((from, to)) = other.split_once("..") {
                let start = parse_date(from)?;
                let end = parse_date(to)?;
                if start > end {
                    return None;
                }
                return Some(DateRange { start, end });
            }
            parse_date(other).map(DateRange::single)
        }
    }
}
