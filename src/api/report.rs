use crate::{
    attendance::{
        AttendanceDesk,
        aggregate::{
            AttendanceFrequency, AttendanceSummary, DEFAULT_FREQUENCY_DAYS, DEFAULT_FREQUENCY_TOP,
            MembershipReport, PeriodBucket,
        },
        calendar::BucketUnit,
    },
    auth::auth::AuthUser,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

/// Either bound may be left out; a missing bound is open.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportQuery {
    /// First day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    /// Last day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
    /// Bucket size
    #[param(inline)]
    #[serde(default)]
    pub group_by: BucketUnit,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SummaryQuery {
    /// First day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    /// Last day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FrequencyQuery {
    /// Calendar days to look back, today included (default 30)
    pub days: Option<u32>,
    /// Members to rank, 1 to 100 (default 10)
    pub top: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceReport {
    /// Echoes the query; null when unbounded
    #[schema(example = "2026-09-20", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-10-19", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[schema(example = "day")]
    pub group_by: &'static str,
    pub data: Vec<PeriodBucket>,
}

#[derive(Serialize, ToSchema)]
pub struct SummaryReport {
    /// Absent when the summary covers all recorded attendance
    #[schema(example = "2026-10-01", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-10-19", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub summary: AttendanceSummary,
}

fn unit_name(unit: BucketUnit) -> &'static str {
    match unit {
        BucketUnit::Day => "day",
        BucketUnit::Week => "week",
        BucketUnit::Month => "month",
    }
}

/// Attendance grouped by day, ISO week or month
///
/// Periods without visits are omitted. Without dates the report covers
/// every recorded visit.
#[utoipa::path(
    get,
    path = "/api/reports/attendance",
    params(ReportQuery),
    responses(
        (status = 200, description = "Bucketed attendance, ascending by period", body = AttendanceReport),
        (status = 400, description = "Invalid date range or group_by"),
        (status = 403, description = "Staff/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Report"
)]
pub async fn attendance_report(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    query: web::Query<ReportQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let filter = desk.record_filter(None, query.start_date, query.end_date)?;

    debug!(
        start_date = ?query.start_date,
        end_date = ?query.end_date,
        group_by = unit_name(query.group_by),
        "Building attendance report"
    );

    let data = desk.period_bucketed_counts(&filter, query.group_by).await?;

    Ok(HttpResponse::Ok().json(AttendanceReport {
        start_date: query.start_date,
        end_date: query.end_date,
        group_by: unit_name(query.group_by),
        data,
    }))
}

/// Membership and attendance totals
///
/// Without dates, attendance figures cover all recorded visits. A single
/// bound leaves the other side open.
#[utoipa::path(
    get,
    path = "/api/reports/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Summary", body = SummaryReport),
        (status = 400, description = "Invalid date range"),
        (status = 403, description = "Staff/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Report"
)]
pub async fn summary(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    query: web::Query<SummaryQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let filter = desk.record_filter(None, query.start_date, query.end_date)?;

    let summary = desk.summary(&filter).await?;

    Ok(HttpResponse::Ok().json(SummaryReport {
        start_date: query.start_date,
        end_date: query.end_date,
        summary,
    }))
}

/// Sign-ups per month and memberships about to lapse
#[utoipa::path(
    get,
    path = "/api/reports/membership",
    responses(
        (status = 200, description = "New members over the last twelve months and active memberships ending within 30 days", body = MembershipReport),
        (status = 403, description = "Staff/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Report"
)]
pub async fn membership(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    Ok(HttpResponse::Ok().json(desk.membership_report().await?))
}

/// Most frequent visitors over recent days
#[utoipa::path(
    get,
    path = "/api/reports/attendance-frequency",
    params(FrequencyQuery),
    responses(
        (status = 200, description = "Check-in totals and the most frequent members", body = AttendanceFrequency),
        (status = 400, description = "days must be at least 1"),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Report"
)]
pub async fn attendance_frequency(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    query: web::Query<FrequencyQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let frequency = desk
        .attendance_frequency(
            query.days.unwrap_or(DEFAULT_FREQUENCY_DAYS),
            query.top.unwrap_or(DEFAULT_FREQUENCY_TOP),
        )
        .await?;

    Ok(HttpResponse::Ok().json(frequency))
}
