use crate::{
    attendance::{
        AttendanceDesk,
        aggregate::{AttendanceStats, MemberStats},
        ledger::{Page, RecordFilter},
    },
    auth::auth::AuthUser,
    error::AttendanceError,
    model::attendance::{AttendanceEntry, AttendanceRecord},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CheckInRequest {
    /// Required for staff; members may omit it.
    #[schema(example = 42)]
    pub member_id: Option<u64>,
    #[schema(example = "Leg day")]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CheckOutRequest {
    /// Required for staff; members may omit it.
    #[schema(example = 42)]
    pub member_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    /// Filter by member; members only ever see their own records
    pub member_id: Option<u64>,
    /// First day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    /// Last day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
    /// Page number, from 1
    pub page: Option<u32>,
    /// Items per page, at most 100
    pub limit: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceEntry>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub limit: u32,
    #[schema(example = 134)]
    pub total: i64,
    #[schema(example = 7)]
    pub pages: i64,
}

async fn list_page(
    desk: &AttendanceDesk,
    filter: RecordFilter,
    page: Page,
) -> actix_web::Result<HttpResponse> {
    let (data, total) = desk.list_records(&filter, page).await?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data,
        page: page.page,
        limit: page.limit,
        total,
        pages: page.pages(total),
    }))
}

/// Check a member in
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body = CheckInRequest,
    responses(
        (status = 201, description = "Checked in", body = AttendanceRecord),
        (status = 400, description = "Already checked in, membership not active or invalid notes", body = Object, example = json!({
            "message": "Member is already checked in"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Member not found"),
        (status = 503, description = "Storage unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    body: web::Json<CheckInRequest>,
) -> actix_web::Result<HttpResponse> {
    let body = body.into_inner();
    let member_id = auth.acting_for(body.member_id)?;

    let record = desk.check_in(member_id, Some(auth.user_id), body.notes).await?;

    Ok(HttpResponse::Created().json(record))
}

/// Check a member out
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body = CheckOutRequest,
    responses(
        (status = 200, description = "Checked out", body = AttendanceRecord),
        (status = 404, description = "No active check-in found for today", body = Object, example = json!({
            "message": "No active check-in found for today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 503, description = "Storage unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    body: web::Json<CheckOutRequest>,
) -> actix_web::Result<HttpResponse> {
    let member_id = auth.acting_for(body.member_id)?;

    let record = desk.check_out(member_id).await?;

    Ok(HttpResponse::Ok().json(record))
}

/// List attendance records
///
/// Newest check-in first. Members are restricted to their own records.
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance records", body = AttendanceListResponse),
        (status = 400, description = "start_date after end_date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<HttpResponse> {
    let member_id = if auth.role.is_staff_or_admin() {
        query.member_id
    } else {
        Some(auth.acting_for(query.member_id)?)
    };

    let filter = desk.record_filter(member_id, query.start_date, query.end_date)?;

    list_page(&desk, filter, Page::new(query.page, query.limit)).await
}

/// Caller's own attendance history
#[utoipa::path(
    get,
    path = "/api/attendance/me",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance records", body = AttendanceListResponse),
        (status = 403, description = "No member profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn my_attendance(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<HttpResponse> {
    let member_id = auth.own_member_id()?;
    let filter = desk.record_filter(Some(member_id), query.start_date, query.end_date)?;

    list_page(&desk, filter, Page::new(query.page, query.limit)).await
}

/// Visits that checked in today
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's records with member name and email, newest first", body = Vec<AttendanceEntry>),
        (status = 403, description = "Staff/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    Ok(HttpResponse::Ok().json(desk.todays_records().await?))
}

/// Gym-wide attendance counters
#[utoipa::path(
    get,
    path = "/api/attendance/stats",
    responses(
        (status = 200, description = "Counts for today, this ISO week and this month", body = AttendanceStats),
        (status = 403, description = "Staff/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn stats(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    Ok(HttpResponse::Ok().json(desk.stats().await?))
}

/// Attendance counters for one member
#[utoipa::path(
    get,
    path = "/api/attendance/stats/{member_id}",
    params(
        ("member_id", Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member attendance stats", body = MemberStats),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Member not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn member_stats(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let member_id = auth.acting_for(Some(path.into_inner()))?;

    Ok(HttpResponse::Ok().json(desk.member_stats(member_id).await?))
}

/// Get one attendance record
///
/// A member asking for someone else's record gets the same 404 as for a
/// missing one.
#[utoipa::path(
    get,
    path = "/api/attendance/{id}",
    params(
        ("id", Path, description = "Attendance record ID")
    ),
    responses(
        (status = 200, description = "Attendance record", body = AttendanceRecord),
        (status = 403, description = "No member profile"),
        (status = 404, description = "Attendance record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn get_attendance(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let own = if auth.role.is_staff_or_admin() {
        None
    } else {
        Some(auth.own_member_id()?)
    };

    let record = desk.record(path.into_inner()).await?;
    if own.is_some_and(|member_id| member_id != record.member_id) {
        return Err(AttendanceError::NotFound("Attendance record").into());
    }

    Ok(HttpResponse::Ok().json(record))
}

/// Delete an attendance record (admin override)
#[utoipa::path(
    delete,
    path = "/api/attendance/{id}",
    params(
        ("id", Path, description = "Attendance record ID")
    ),
    responses(
        (status = 200, description = "Deleted", body = Object, example = json!({
            "message": "Attendance record deleted"
        })),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Attendance record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn delete_attendance(
    auth: AuthUser,
    desk: web::Data<AttendanceDesk>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    desk.delete_record(path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Attendance record deleted"
    })))
}
