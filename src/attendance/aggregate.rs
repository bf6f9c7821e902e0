//! Read-only aggregations over the ledger.
//!
//! Windows are computed from "now" at query time. Nothing here takes a lock;
//! a report racing a check-in may or may not include that visit.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    attendance::{
        AttendanceDesk,
        calendar::{BucketUnit, Calendar, Window},
        ledger::{MemberVisits, RecordFilter, VisitSample},
    },
    error::{AttendanceError, Result},
    model::member::ExpiringMembership,
};

/// Months of sign-ups in the membership report, this month included.
pub const JOIN_HISTORY_MONTHS: u32 = 12;
/// Days ahead, today included, that count as "expiring soon".
pub const EXPIRY_HORIZON_DAYS: u64 = 30;

pub const DEFAULT_FREQUENCY_DAYS: u32 = 30;
pub const DEFAULT_FREQUENCY_TOP: u32 = 10;
pub const MAX_FREQUENCY_TOP: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AttendanceStats {
    #[schema(example = 48)]
    pub today: i64,
    #[schema(example = 210)]
    pub this_week: i64,
    #[schema(example = 905)]
    pub this_month: i64,
    #[schema(example = 12)]
    pub currently_checked_in: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PeriodBucket {
    #[schema(example = "2026-10-19")]
    pub period: String,
    #[schema(example = 48)]
    pub count: i64,
    #[schema(example = 62.5)]
    pub avg_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MemberStats {
    #[schema(example = 42)]
    pub member_id: u64,
    #[schema(example = 120)]
    pub total_checkins: i64,
    #[schema(example = 3)]
    pub this_week: i64,
    #[schema(example = 11)]
    pub this_month: i64,
    #[schema(example = "2026-10-19T09:00:00Z", format = "date-time", value_type = String, nullable = true)]
    pub last_check_in: Option<DateTime<Utc>>,
    #[schema(example = 71.25)]
    pub average_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceSummary {
    #[schema(example = 350)]
    pub total_members: i64,
    #[schema(example = 310)]
    pub active_members: i64,
    #[schema(example = 905)]
    pub total_attendance: i64,
    #[schema(example = 64.0)]
    pub average_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PeriodCount {
    #[schema(example = "2026-10")]
    pub period: String,
    #[schema(example = 17)]
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MembershipReport {
    /// Sign-ups per month over the last twelve months, ascending
    pub new_members_over_time: Vec<PeriodCount>,
    /// Active memberships ending within the next 30 days, soonest first
    pub expiring_memberships: Vec<ExpiringMembership>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceFrequency {
    #[schema(example = 30)]
    pub days: u32,
    #[schema(example = 905)]
    pub total_checkins: i64,
    /// Check-ins divided by all members, active or not
    #[schema(example = 2.6)]
    pub avg_checkins_per_member: f64,
    pub top_members: Vec<MemberVisits>,
}

#[derive(Default)]
struct Tally {
    count: i64,
    closed: i64,
    minutes: i64,
}

/// Groups visits into calendar buckets, ascending by label. Buckets with no
/// visits are not emitted.
pub fn bucket_samples(
    samples: &[VisitSample],
    unit: BucketUnit,
    calendar: &Calendar,
) -> Vec<PeriodBucket> {
    let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();

    for sample in samples {
        let label = unit.label(calendar.day_of(sample.check_in_time));
        let tally = tallies.entry(label).or_default();

        tally.count += 1;
        if let Some(minutes) = sample.duration_minutes {
            tally.closed += 1;
            tally.minutes += minutes;
        }
    }

    tallies
        .into_iter()
        .map(|(period, tally)| PeriodBucket {
            period,
            count: tally.count,
            avg_duration: if tally.closed == 0 {
                0.0
            } else {
                tally.minutes as f64 / tally.closed as f64
            },
        })
        .collect()
}

/// Counts instants per calendar period, ascending by label.
pub fn count_by_period(
    instants: &[DateTime<Utc>],
    unit: BucketUnit,
    calendar: &Calendar,
) -> Vec<PeriodCount> {
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for &instant in instants {
        *counts.entry(unit.label(calendar.day_of(instant))).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(period, count)| PeriodCount { period, count })
        .collect()
}

impl AttendanceDesk {
    pub async fn count_in_window(&self, window: Window) -> Result<i64> {
        self.ledger.count(&RecordFilter::within(window)).await
    }

    pub async fn currently_present_count(&self) -> Result<i64> {
        let today = self.calendar.day_of(self.clock.now());
        self.ledger.count_open_on(today).await
    }

    /// Mean visit length in minutes over closed visits; 0 when none.
    pub async fn average_duration(&self, member_id: Option<u64>) -> Result<f64> {
        let filter = RecordFilter {
            member_id,
            ..RecordFilter::default()
        };
        self.ledger.average_duration(&filter).await
    }

    /// Buckets the visits matching `filter`; an unbounded filter covers the
    /// whole ledger.
    pub async fn period_bucketed_counts(
        &self,
        filter: &RecordFilter,
        unit: BucketUnit,
    ) -> Result<Vec<PeriodBucket>> {
        let samples = self.ledger.samples(filter).await?;
        Ok(bucket_samples(&samples, unit, &self.calendar))
    }

    pub async fn stats(&self) -> Result<AttendanceStats> {
        let now = self.clock.now();

        let (today, this_week, this_month, currently_checked_in) = futures::try_join!(
            self.count_in_window(self.calendar.today(now)),
            self.count_in_window(self.calendar.this_week(now)),
            self.count_in_window(self.calendar.this_month(now)),
            self.currently_present_count(),
        )?;

        Ok(AttendanceStats {
            today,
            this_week,
            this_month,
            currently_checked_in,
        })
    }

    pub async fn member_stats(&self, member_id: u64) -> Result<MemberStats> {
        if self.members.standing(member_id).await?.is_none() {
            return Err(AttendanceError::NotFound("Member"));
        }

        let now = self.clock.now();
        let all = RecordFilter::default().for_member(member_id);
        let week = RecordFilter::within(self.calendar.this_week(now)).for_member(member_id);
        let month = RecordFilter::within(self.calendar.this_month(now)).for_member(member_id);

        let (total_checkins, this_week, this_month, last_check_in, average_duration) = futures::try_join!(
            self.ledger.count(&all),
            self.ledger.count(&week),
            self.ledger.count(&month),
            self.ledger.last_check_in(member_id),
            self.ledger.average_duration(&all),
        )?;

        Ok(MemberStats {
            member_id,
            total_checkins,
            this_week,
            this_month,
            last_check_in,
            average_duration,
        })
    }

    /// Membership totals plus attendance matching `filter`.
    pub async fn summary(&self, filter: &RecordFilter) -> Result<AttendanceSummary> {
        let (members, total_attendance, average_duration) = futures::try_join!(
            self.members.counts(),
            self.ledger.count(filter),
            self.ledger.average_duration(filter),
        )?;

        Ok(AttendanceSummary {
            total_members: members.total,
            active_members: members.active,
            total_attendance,
            average_duration,
        })
    }

    pub async fn membership_report(&self) -> Result<MembershipReport> {
        let now = self.clock.now();
        let today = self.calendar.day_of(now);
        let horizon = today
            .checked_add_days(Days::new(EXPIRY_HORIZON_DAYS - 1))
            .unwrap_or(today);

        let (joined, expiring_memberships) = futures::try_join!(
            self.members
                .joined_within(self.calendar.months_ending_with_this(now, JOIN_HISTORY_MONTHS)),
            self.members.expiring_between(today, horizon),
        )?;

        Ok(MembershipReport {
            new_members_over_time: count_by_period(&joined, BucketUnit::Month, &self.calendar),
            expiring_memberships,
        })
    }

    /// Check-in frequency over the `days` calendar days ending today.
    pub async fn attendance_frequency(&self, days: u32, top: u32) -> Result<AttendanceFrequency> {
        if days == 0 {
            return Err(AttendanceError::InvalidRequest("days must be at least 1".into()));
        }

        let today = self.calendar.day_of(self.clock.now());
        let first = today
            .checked_sub_days(Days::new(u64::from(days) - 1))
            .unwrap_or(today);
        let filter = RecordFilter::within(self.calendar.days(first, today));

        let (total_checkins, members, top_members) = futures::try_join!(
            self.ledger.count(&filter),
            self.members.counts(),
            self.ledger.top_members(&filter, top.clamp(1, MAX_FREQUENCY_TOP)),
        )?;

        Ok(AttendanceFrequency {
            days,
            total_checkins,
            avg_checkins_per_member: total_checkins as f64 / members.total.max(1) as f64,
            top_members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attendance::memory::{FixedClock, MemberProfile, MemoryLedger, MemoryMembers},
        model::attendance::AttendanceRecord,
    };
    use chrono::{Duration, FixedOffset, NaiveDate, TimeZone};
    use std::sync::Arc;

    fn utc_calendar() -> Calendar {
        Calendar::new(FixedOffset::east_opt(0))
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn visit(id: u64, member_id: u64, check_in: DateTime<Utc>, minutes: Option<i64>) -> AttendanceRecord {
        AttendanceRecord {
            id,
            member_id,
            checked_in_by: None,
            check_in_time: check_in,
            check_in_day: check_in.date_naive(),
            check_out_time: minutes.map(|m| check_in + Duration::minutes(m)),
            duration_minutes: minutes,
            notes: None,
        }
    }

    fn desk_with(records: Vec<AttendanceRecord>, now: DateTime<Utc>) -> AttendanceDesk {
        let ledger = MemoryLedger::default();
        for record in records {
            ledger.seed(record);
        }

        AttendanceDesk::new(
            Arc::new(ledger),
            Arc::new(MemoryMembers::with(&[(1, true), (2, true), (3, true), (4, false)])),
            Arc::new(FixedClock::at(now)),
            utc_calendar(),
        )
    }

    #[actix_web::test]
    async fn three_in_one_out_leaves_two_present() {
        let now = at(2026, 10, 19, 12, 0);
        let desk = desk_with(
            vec![
                visit(1, 1, at(2026, 10, 19, 8, 0), Some(60)),
                visit(2, 2, at(2026, 10, 19, 9, 0), None),
                visit(3, 3, at(2026, 10, 19, 10, 0), None),
            ],
            now,
        );

        let stats = desk.stats().await.unwrap();

        assert_eq!(stats.today, 3);
        assert_eq!(stats.currently_checked_in, 2);
    }

    #[actix_web::test]
    async fn stats_windows_nest() {
        // Monday 2026-10-19; the 15th is the previous week, the 1st the same month.
        let now = at(2026, 10, 19, 12, 0);
        let desk = desk_with(
            vec![
                visit(1, 1, at(2026, 9, 30, 9, 0), Some(30)),
                visit(2, 1, at(2026, 10, 1, 9, 0), Some(30)),
                visit(3, 1, at(2026, 10, 15, 9, 0), Some(30)),
                visit(4, 1, at(2026, 10, 19, 7, 0), Some(30)),
                visit(5, 2, at(2026, 10, 19, 8, 0), None),
            ],
            now,
        );

        let stats = desk.stats().await.unwrap();

        assert_eq!(
            stats,
            AttendanceStats {
                today: 2,
                this_week: 2,
                this_month: 4,
                currently_checked_in: 1,
            }
        );
    }

    #[actix_web::test]
    async fn open_visit_from_yesterday_is_not_present_today() {
        let desk = desk_with(
            vec![visit(1, 1, at(2026, 10, 18, 20, 0), None)],
            at(2026, 10, 19, 9, 0),
        );

        assert_eq!(desk.currently_present_count().await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn average_duration_without_closed_visits_is_zero() {
        let desk = desk_with(vec![visit(1, 1, at(2026, 10, 19, 8, 0), None)], at(2026, 10, 19, 9, 0));

        let average = desk.average_duration(None).await.unwrap();
        assert_eq!(average, 0.0);
        assert!(!average.is_nan());
    }

    #[actix_web::test]
    async fn average_duration_filters_by_member() {
        let desk = desk_with(
            vec![
                visit(1, 1, at(2026, 10, 17, 8, 0), Some(60)),
                visit(2, 1, at(2026, 10, 18, 8, 0), Some(90)),
                visit(3, 2, at(2026, 10, 18, 8, 0), Some(30)),
                visit(4, 2, at(2026, 10, 19, 8, 0), None),
            ],
            at(2026, 10, 19, 9, 0),
        );

        assert_eq!(desk.average_duration(Some(1)).await.unwrap(), 75.0);
        assert_eq!(desk.average_duration(Some(2)).await.unwrap(), 30.0);
        assert_eq!(desk.average_duration(None).await.unwrap(), 60.0);
    }

    #[actix_web::test]
    async fn daily_buckets_are_sorted_and_skip_empty_days() {
        let calendar = utc_calendar();
        let desk = desk_with(
            vec![
                visit(1, 1, at(2026, 10, 19, 8, 0), Some(40)),
                visit(2, 2, at(2026, 10, 16, 8, 0), Some(60)),
                visit(3, 3, at(2026, 10, 19, 9, 0), Some(80)),
                visit(4, 1, at(2026, 10, 16, 18, 0), None),
                visit(5, 1, at(2026, 10, 10, 18, 0), Some(10)),
            ],
            at(2026, 10, 19, 12, 0),
        );
        let window = calendar.days(
            NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        );

        let buckets = desk
            .period_bucketed_counts(&RecordFilter::within(window), BucketUnit::Day)
            .await
            .unwrap();

        assert_eq!(
            buckets,
            vec![
                PeriodBucket {
                    period: "2026-10-16".into(),
                    count: 2,
                    avg_duration: 60.0,
                },
                PeriodBucket {
                    period: "2026-10-19".into(),
                    count: 2,
                    avg_duration: 60.0,
                },
            ]
        );
    }

    #[test]
    fn weekly_buckets_follow_iso_weeks() {
        let samples = [
            // Sunday of ISO week 42, then Monday of week 43.
            VisitSample {
                check_in_time: at(2026, 10, 18, 23, 0),
                duration_minutes: Some(20),
            },
            VisitSample {
                check_in_time: at(2026, 10, 19, 6, 0),
                duration_minutes: None,
            },
            VisitSample {
                check_in_time: at(2026, 10, 25, 6, 0),
                duration_minutes: Some(50),
            },
        ];

        let buckets = bucket_samples(&samples, BucketUnit::Week, &utc_calendar());

        assert_eq!(
            buckets
                .iter()
                .map(|b| (b.period.as_str(), b.count, b.avg_duration))
                .collect::<Vec<_>>(),
            vec![("2026-42", 1, 20.0), ("2026-43", 2, 50.0)]
        );
    }

    #[test]
    fn buckets_use_the_gym_calendar_zone() {
        let samples = [VisitSample {
            check_in_time: at(2026, 10, 31, 23, 30),
            duration_minutes: Some(45),
        }];

        let utc = bucket_samples(&samples, BucketUnit::Month, &utc_calendar());
        let plus_one = bucket_samples(
            &samples,
            BucketUnit::Month,
            &Calendar::new(FixedOffset::east_opt(3600)),
        );

        assert_eq!(utc[0].period, "2026-10");
        assert_eq!(plus_one[0].period, "2026-11");
    }

    #[actix_web::test]
    async fn unbounded_report_covers_all_history() {
        let desk = desk_with(
            vec![
                visit(1, 1, at(2024, 2, 10, 8, 0), Some(30)),
                visit(2, 2, at(2026, 10, 19, 8, 0), Some(50)),
            ],
            at(2026, 10, 19, 12, 0),
        );

        let all = desk
            .period_bucketed_counts(&RecordFilter::default(), BucketUnit::Month)
            .await
            .unwrap();
        assert_eq!(
            all.iter().map(|b| b.period.as_str()).collect::<Vec<_>>(),
            vec!["2024-02", "2026-10"]
        );

        // An end date alone keeps the start open.
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let until = desk.record_filter(None, None, Some(day(2026, 10, 18))).unwrap();
        let older = desk.period_bucketed_counts(&until, BucketUnit::Month).await.unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].period, "2024-02");
    }

    #[actix_web::test]
    async fn member_stats_cover_history() {
        let desk = desk_with(
            vec![
                visit(1, 1, at(2026, 9, 1, 8, 0), Some(30)),
                visit(2, 1, at(2026, 10, 5, 8, 0), Some(60)),
                visit(3, 1, at(2026, 10, 19, 8, 0), None),
                visit(4, 2, at(2026, 10, 19, 8, 0), Some(15)),
            ],
            at(2026, 10, 19, 12, 0),
        );

        let stats = desk.member_stats(1).await.unwrap();

        assert_eq!(stats.total_checkins, 3);
        assert_eq!(stats.this_week, 1);
        assert_eq!(stats.this_month, 2);
        assert_eq!(stats.last_check_in, Some(at(2026, 10, 19, 8, 0)));
        assert_eq!(stats.average_duration, 45.0);

        assert!(matches!(
            desk.member_stats(99).await,
            Err(AttendanceError::NotFound("Member"))
        ));
    }

    #[actix_web::test]
    async fn summary_combines_members_and_attendance() {
        let calendar = utc_calendar();
        let desk = desk_with(
            vec![
                visit(1, 1, at(2026, 10, 1, 8, 0), Some(30)),
                visit(2, 2, at(2026, 10, 19, 8, 0), Some(90)),
            ],
            at(2026, 10, 19, 12, 0),
        );

        let all_time = desk.summary(&RecordFilter::default()).await.unwrap();
        assert_eq!(all_time.total_members, 4);
        assert_eq!(all_time.active_members, 3);
        assert_eq!(all_time.total_attendance, 2);
        assert_eq!(all_time.average_duration, 60.0);

        let today = desk
            .summary(&RecordFilter::within(calendar.today(at(2026, 10, 19, 12, 0))))
            .await
            .unwrap();
        assert_eq!(today.total_attendance, 1);
        assert_eq!(today.average_duration, 90.0);
    }

    #[actix_web::test]
    async fn membership_report_groups_sign_ups_and_lists_expiring() {
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let members = MemoryMembers::from_profiles([
            // Thirteen months back falls outside the history.
            MemberProfile::new(1, true).joined(at(2025, 9, 30, 10, 0)),
            MemberProfile::new(2, true).joined(at(2025, 11, 1, 0, 0)).ending(day(2026, 10, 19)),
            MemberProfile::new(3, true).joined(at(2026, 10, 2, 9, 0)).ending(day(2026, 11, 17)),
            MemberProfile::new(4, true).joined(at(2026, 10, 5, 9, 0)).ending(day(2026, 11, 18)),
            MemberProfile::new(5, false).joined(at(2026, 10, 6, 9, 0)).ending(day(2026, 10, 25)),
            MemberProfile::new(6, true).ending(day(2026, 10, 18)),
        ]);
        let desk = AttendanceDesk::new(
            Arc::new(MemoryLedger::default()),
            Arc::new(members),
            Arc::new(FixedClock::at(at(2026, 10, 19, 12, 0))),
            utc_calendar(),
        );

        let report = desk.membership_report().await.unwrap();

        assert_eq!(
            report.new_members_over_time,
            vec![
                PeriodCount { period: "2025-11".into(), count: 1 },
                PeriodCount { period: "2026-10".into(), count: 3 },
            ]
        );
        // Today through today + 29; inactive and already ended are left out.
        assert_eq!(
            report
                .expiring_memberships
                .iter()
                .map(|m| (m.id, m.membership_end_date))
                .collect::<Vec<_>>(),
            vec![(2, day(2026, 10, 19)), (3, day(2026, 11, 17))]
        );
    }

    #[actix_web::test]
    async fn frequency_ranks_members_over_recent_days() {
        let ledger = MemoryLedger::default();
        ledger.name_member(1, "Ada", "ada@example.com");
        ledger.name_member(2, "Bo", "bo@example.com");
        for record in [
            visit(1, 1, at(2026, 10, 19, 8, 0), None),
            visit(2, 1, at(2026, 10, 18, 8, 0), Some(30)),
            visit(3, 2, at(2026, 10, 17, 8, 0), Some(30)),
            // The 7-day window starts on the 13th.
            visit(4, 2, at(2026, 10, 12, 23, 0), Some(30)),
            visit(5, 3, at(2026, 10, 18, 9, 0), Some(30)),
        ] {
            ledger.seed(record);
        }
        let desk = AttendanceDesk::new(
            Arc::new(ledger),
            Arc::new(MemoryMembers::with(&[(1, true), (2, true), (3, true), (4, false)])),
            Arc::new(FixedClock::at(at(2026, 10, 19, 12, 0))),
            utc_calendar(),
        );

        let week = desk.attendance_frequency(7, 2).await.unwrap();

        assert_eq!(week.total_checkins, 4);
        assert_eq!(week.avg_checkins_per_member, 1.0);
        assert_eq!(
            week.top_members,
            vec![
                MemberVisits { member_id: 1, member_name: "Ada".into(), checkins: 2 },
                MemberVisits { member_id: 2, member_name: "Bo".into(), checkins: 1 },
            ]
        );

        assert!(matches!(
            desk.attendance_frequency(0, 10).await,
            Err(AttendanceError::InvalidRequest(_))
        ));
    }
}
