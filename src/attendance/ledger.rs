use std::{future::Future, pin::Pin};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    attendance::calendar::Window,
    error::Result,
    model::{
        attendance::{AttendanceEntry, AttendanceRecord},
        member::ExpiringMembership,
    },
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// A visit about to be opened.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub member_id: u64,
    pub checked_in_by: Option<u64>,
    pub check_in_time: DateTime<Utc>,
    pub check_in_day: NaiveDate,
    pub notes: Option<String>,
}

/// Listing and counting filter. `to` is exclusive.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub member_id: Option<u64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn within(window: Window) -> Self {
        Self {
            member_id: None,
            from: Some(window.from),
            to: Some(window.to),
        }
    }

    pub fn for_member(mut self, member_id: u64) -> Self {
        self.member_id = Some(member_id);
        self
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.member_id.is_none_or(|id| record.member_id == id)
            && self.from.is_none_or(|from| record.check_in_time >= from)
            && self.to.is_none_or(|to| record.check_in_time < to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    /// 1-based page, limit clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    /// Everything on one page.
    pub fn all() -> Self {
        Self {
            page: 1,
            limit: u32::MAX,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn pages(&self, total: i64) -> i64 {
        let limit = i64::from(self.limit);
        (total + limit - 1) / limit
    }
}

/// The slice of a record the bucketed report needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisitSample {
    pub check_in_time: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
}

/// Check-ins per member, for frequency rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, ToSchema)]
pub struct MemberVisits {
    #[schema(example = 42)]
    pub member_id: u64,
    #[schema(example = "Jane Doe")]
    pub member_name: String,
    #[schema(example = 14)]
    pub checkins: i64,
}

/// Durable store of visits.
///
/// `open_visit` and `close_visit` carry the per-member guards: an
/// implementation must reject a second open visit for the same member and day
/// with [`AttendanceError::AlreadyPresent`](crate::error::AttendanceError),
/// and must only close a visit that is still open.
pub trait Ledger
where
    Self: Send + Sync,
{
    fn open_visit<'a>(&'a self, visit: NewVisit) -> BoxFuture<'a, Result<AttendanceRecord>>;

    fn find_open<'a>(
        &'a self,
        member_id: u64,
        day: NaiveDate,
    ) -> BoxFuture<'a, Result<Option<AttendanceRecord>>>;

    /// Returns false when the visit was already closed.
    fn close_visit<'a>(
        &'a self,
        id: u64,
        check_out_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> BoxFuture<'a, Result<bool>>;

    fn get<'a>(&'a self, id: u64) -> BoxFuture<'a, Result<Option<AttendanceRecord>>>;

    fn delete<'a>(&'a self, id: u64) -> BoxFuture<'a, Result<bool>>;

    /// Newest check-in first, each with its member's name and email, plus the
    /// total matching the filter.
    fn list<'a>(
        &'a self,
        filter: &'a RecordFilter,
        page: Page,
    ) -> BoxFuture<'a, Result<(Vec<AttendanceEntry>, i64)>>;

    fn count<'a>(&'a self, filter: &'a RecordFilter) -> BoxFuture<'a, Result<i64>>;

    fn count_open_on<'a>(&'a self, day: NaiveDate) -> BoxFuture<'a, Result<i64>>;

    /// Mean of closed visit durations; 0 when there are none.
    fn average_duration<'a>(&'a self, filter: &'a RecordFilter) -> BoxFuture<'a, Result<f64>>;

    fn samples<'a>(&'a self, filter: &'a RecordFilter) -> BoxFuture<'a, Result<Vec<VisitSample>>>;

    fn last_check_in<'a>(&'a self, member_id: u64)
    -> BoxFuture<'a, Result<Option<DateTime<Utc>>>>;

    /// Members with the most check-ins matching `filter`, most first, ties by
    /// member id.
    fn top_members<'a>(
        &'a self,
        filter: &'a RecordFilter,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<MemberVisits>>>;
}

/// What the attendance engine needs to know about a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberStanding {
    pub member_id: u64,
    pub eligible: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipCounts {
    pub total: i64,
    pub active: i64,
}

/// Member collaborator: resolves ids and reports eligibility.
pub trait MemberDirectory
where
    Self: Send + Sync,
{
    fn standing<'a>(&'a self, member_id: u64) -> BoxFuture<'a, Result<Option<MemberStanding>>>;

    fn counts<'a>(&'a self) -> BoxFuture<'a, Result<MembershipCounts>>;

    /// Creation times of members who joined within `window`.
    fn joined_within<'a>(&'a self, window: Window) -> BoxFuture<'a, Result<Vec<DateTime<Utc>>>>;

    /// Active memberships ending on a day in `first..=last`, soonest first.
    fn expiring_between<'a>(
        &'a self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> BoxFuture<'a, Result<Vec<ExpiringMembership>>>;
}
