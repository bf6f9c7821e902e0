//! Day, week and month boundaries for the gym's canonical calendar.
//!
//! "Today" always means midnight-to-midnight in one zone: a configured fixed
//! UTC offset when present, otherwise the server's local zone. Instants are
//! stored in UTC; only windowing and bucket labels go through the calendar.

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, Months, NaiveDate, NaiveTime, SubsecRound,
    TimeZone, Utc,
};
use serde::Deserialize;
use utoipa::ToSchema;

/// Source of "now" for the engine.
pub trait Clock
where
    Self: Send + Sync,
{
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to the millisecond precision the ledger stores.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// Half-open interval `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    Local,
    Fixed(FixedOffset),
}

impl Calendar {
    pub fn new(offset: Option<FixedOffset>) -> Self {
        offset.map_or(Calendar::Local, Calendar::Fixed)
    }

    /// Calendar day an instant falls on.
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Calendar::Local => instant.with_timezone(&Local).date_naive(),
            Calendar::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// First instant of `day`.
    pub fn start_of(&self, day: NaiveDate) -> DateTime<Utc> {
        match self {
            Calendar::Local => first_instant(&Local, day),
            Calendar::Fixed(offset) => first_instant(offset, day),
        }
    }

    /// Whole days `first..=last`.
    pub fn days(&self, first: NaiveDate, last: NaiveDate) -> Window {
        Window {
            from: self.start_of(first),
            to: self.start_of(next_day(last)),
        }
    }

    pub fn today(&self, now: DateTime<Utc>) -> Window {
        let day = self.day_of(now);
        self.days(day, day)
    }

    /// ISO week (Monday start) containing `now`.
    pub fn this_week(&self, now: DateTime<Utc>) -> Window {
        let monday = week_start(self.day_of(now));
        let sunday = monday + Days::new(6);
        self.days(monday, sunday)
    }

    pub fn this_month(&self, now: DateTime<Utc>) -> Window {
        self.months_ending_with_this(now, 1)
    }

    /// The `count` calendar months up to and including the one containing `now`.
    pub fn months_ending_with_this(&self, now: DateTime<Utc>, count: u32) -> Window {
        let first = month_start(self.day_of(now));
        let earliest = first
            .checked_sub_months(Months::new(count.max(1) - 1))
            .unwrap_or(first);
        let next = first.checked_add_months(Months::new(1)).unwrap_or(first);
        Window {
            from: self.start_of(earliest),
            to: self.start_of(next),
        }
    }
}

// Midnight may not exist on DST transition days; fall back to the first hour
// that resolves, picking the earlier instant when ambiguous.
fn first_instant<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    (0..4)
        .filter_map(|hour| day.and_hms_opt(hour, 0, 0))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|instant| instant.with_timezone(&Utc))
        .unwrap_or_else(|| day.and_time(NaiveTime::MIN).and_utc())
}

fn next_day(day: NaiveDate) -> NaiveDate {
    day.succ_opt().unwrap_or(day)
}

fn week_start(day: NaiveDate) -> NaiveDate {
    day - Days::new(u64::from(day.weekday().num_days_from_monday()))
}

fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

/// Report grouping unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BucketUnit {
    #[default]
    Day,
    Week,
    Month,
}

impl BucketUnit {
    /// Sortable period label: `2026-10-19`, `2026-43` (ISO year and week) or `2026-10`.
    pub fn label(&self, day: NaiveDate) -> String {
        match self {
            BucketUnit::Day => day.format("%Y-%m-%d").to_string(),
            BucketUnit::Week => {
                let week = day.iso_week();
                format!("{}-{:02}", week.year(), week.week())
            }
            BucketUnit::Month => day.format("%Y-%m").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn offset_moves_the_day_boundary() {
        let at_utc = Calendar::new(FixedOffset::east_opt(0));
        let plus_two = Calendar::new(FixedOffset::east_opt(2 * 3600));
        let late_utc = utc(2026, 10, 19, 23, 30);

        assert_eq!(at_utc.day_of(late_utc), ymd(2026, 10, 19));
        assert_eq!(plus_two.day_of(late_utc), ymd(2026, 10, 20));
        assert_eq!(plus_two.start_of(ymd(2026, 10, 20)), utc(2026, 10, 19, 22, 0));
    }

    #[test]
    fn today_is_midnight_to_midnight() {
        let calendar = Calendar::new(FixedOffset::east_opt(0));
        let window = calendar.today(utc(2026, 10, 19, 15, 45));

        assert_eq!(window.from, utc(2026, 10, 19, 0, 0));
        assert_eq!(window.to, utc(2026, 10, 20, 0, 0));
        assert!(window.contains(utc(2026, 10, 19, 0, 0)));
        assert!(!window.contains(utc(2026, 10, 20, 0, 0)));
    }

    #[test]
    fn week_starts_on_monday() {
        let calendar = Calendar::new(FixedOffset::east_opt(0));
        // 2026-10-25 is a Sunday.
        let window = calendar.this_week(utc(2026, 10, 25, 12, 0));

        assert_eq!(window.from, utc(2026, 10, 19, 0, 0));
        assert_eq!(window.to, utc(2026, 10, 26, 0, 0));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let calendar = Calendar::new(FixedOffset::east_opt(0));
        let window = calendar.this_month(utc(2026, 12, 15, 8, 0));

        assert_eq!(window.from, utc(2026, 12, 1, 0, 0));
        assert_eq!(window.to, utc(2027, 1, 1, 0, 0));
    }

    #[test]
    fn twelve_months_span_back_across_the_year() {
        let calendar = Calendar::new(FixedOffset::east_opt(0));
        let now = utc(2026, 10, 19, 8, 0);
        let window = calendar.months_ending_with_this(now, 12);

        assert_eq!(window.from, utc(2025, 11, 1, 0, 0));
        assert_eq!(window.to, utc(2026, 11, 1, 0, 0));
        assert_eq!(calendar.months_ending_with_this(now, 0), calendar.this_month(now));
    }

    #[test]
    fn labels_sort_chronologically() {
        assert_eq!(BucketUnit::Day.label(ymd(2026, 3, 7)), "2026-03-07");
        assert_eq!(BucketUnit::Month.label(ymd(2026, 3, 7)), "2026-03");
        assert_eq!(BucketUnit::Week.label(ymd(2026, 3, 2)), "2026-10");
    }

    #[test]
    fn iso_week_label_uses_iso_year() {
        // 2026 starts on a Thursday, so it has a week 53 that spills into 2027.
        assert_eq!(BucketUnit::Week.label(ymd(2027, 1, 1)), "2026-53");
        assert_eq!(BucketUnit::Week.label(ymd(2027, 1, 4)), "2027-01");
    }
}
