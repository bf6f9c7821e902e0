use crate::{
    attendance::{AttendanceDesk, ledger::Page},
    auth::auth::AuthUser,
    model::member::{Member, MembershipStatus, MembershipType},
    utils::db_utils::{Column, ColumnKind, build_update_sql, execute_update},
};
use actix_web::{
    HttpResponse,
    error::{ErrorBadRequest, ErrorInternalServerError},
    web,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

const MEMBER_COLUMNS: &str = "id, user_id, name, email, phone, membership_type, membership_status, \
                              membership_start_date, membership_end_date, emergency_contact_name, \
                              emergency_contact_phone, emergency_contact_relationship, notes, created_at";

const MEMBERSHIP_TYPES: &[&str] = &["basic", "premium", "vip"];
const MEMBERSHIP_STATUSES: &[&str] = &["active", "inactive", "expired", "suspended"];

/// Columns staff may change through `PUT /members/{id}`.
const UPDATABLE: &[Column] = &[
    Column { name: "name", kind: ColumnKind::Text, nullable: false },
    Column { name: "email", kind: ColumnKind::Text, nullable: false },
    Column { name: "phone", kind: ColumnKind::Text, nullable: true },
    Column { name: "membership_type", kind: ColumnKind::OneOf(MEMBERSHIP_TYPES), nullable: false },
    Column { name: "membership_status", kind: ColumnKind::OneOf(MEMBERSHIP_STATUSES), nullable: false },
    Column { name: "membership_start_date", kind: ColumnKind::Date, nullable: false },
    Column { name: "membership_end_date", kind: ColumnKind::Date, nullable: true },
    Column { name: "emergency_contact_name", kind: ColumnKind::Text, nullable: true },
    Column { name: "emergency_contact_phone", kind: ColumnKind::Text, nullable: true },
    Column { name: "emergency_contact_relationship", kind: ColumnKind::Text, nullable: true },
    Column { name: "notes", kind: ColumnKind::Text, nullable: true },
];

#[derive(Deserialize, ToSchema)]
pub struct CreateMember {
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[schema(example = "jane@example.com", format = "email")]
    pub email: String,
    #[schema(example = "+15551234567")]
    pub phone: Option<String>,
    pub membership_type: Option<MembershipType>,
    pub membership_status: Option<MembershipStatus>,
    /// Defaults to today on the gym calendar.
    #[schema(example = "2026-10-19", format = "date", value_type = Option<String>)]
    pub membership_start_date: Option<NaiveDate>,
    #[schema(example = "2027-10-19", format = "date", value_type = Option<String>)]
    pub membership_end_date: Option<NaiveDate>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_relationship: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AccountLink {
    /// User account to attach; null detaches the current one
    #[schema(example = 7, nullable = true)]
    pub user_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MemberQuery {
    /// Page number, from 1
    pub page: Option<u32>,
    /// Items per page, at most 100
    pub limit: Option<u32>,
    /// Filter by membership status
    pub status: Option<MembershipStatus>,
    /// Search by name, email or phone
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct MemberListResponse {
    pub data: Vec<Member>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub limit: u32,
    #[schema(example = 57)]
    pub total: i64,
    #[schema(example = 3)]
    pub pages: i64,
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> actix_web::Error {
    move |e| {
        error!(error = %e, "{context}");
        ErrorInternalServerError("Database error")
    }
}

fn push_member_filter(query: &mut QueryBuilder<'_, MySql>, filter: &MemberQuery) {
    query.push(" WHERE 1=1");

    if let Some(status) = filter.status {
        query.push(" AND membership_status = ").push_bind(status.as_str());
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let like = format!("%{search}%");
        query
            .push(" AND (name LIKE ")
            .push_bind(like.clone())
            .push(" OR email LIKE ")
            .push_bind(like.clone())
            .push(" OR phone LIKE ")
            .push_bind(like)
            .push(")");
    }
}

async fn fetch_member(pool: &MySqlPool, member_id: u64) -> actix_web::Result<Option<Member>> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?");

    sqlx::query_as::<_, Member>(&sql)
        .bind(member_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to fetch member"))
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "message": "Member not found"
    }))
}

/// Create Member
#[utoipa::path(
    post,
    path = "/api/members",
    request_body = CreateMember,
    responses(
        (status = 201, description = "Member created", body = Member),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Email already registered"),
        (status = 403, description = "Staff/Admin only")
    ),
    tag = "Member",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    desk: web::Data<AttendanceDesk>,
    payload: web::Json<CreateMember>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let payload = payload.into_inner();
    let name = payload.name.trim();
    let email = payload.email.trim().to_lowercase();

    if name.is_empty() {
        return Err(ErrorBadRequest("name must not be empty"));
    }
    if !email.contains('@') {
        return Err(ErrorBadRequest("email is invalid"));
    }

    let start_date = payload
        .membership_start_date
        .unwrap_or_else(|| desk.calendar().day_of(desk.now()));
    if payload.membership_end_date.is_some_and(|end| end < start_date) {
        return Err(ErrorBadRequest("membership_end_date is before membership_start_date"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO members
        (name, email, phone, membership_type, membership_status, membership_start_date,
         membership_end_date, emergency_contact_name, emergency_contact_phone,
         emergency_contact_relationship, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(&email)
    .bind(payload.phone.as_deref())
    .bind(payload.membership_type.unwrap_or(MembershipType::Basic).as_str())
    .bind(payload.membership_status.unwrap_or(MembershipStatus::Active).as_str())
    .bind(start_date)
    .bind(payload.membership_end_date)
    .bind(payload.emergency_contact_name.as_deref())
    .bind(payload.emergency_contact_phone.as_deref())
    .bind(payload.emergency_contact_relationship.as_deref())
    .bind(payload.notes.as_deref())
    .execute(pool.get_ref())
    .await;

    let member_id = match result {
        Ok(done) => done.last_insert_id(),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Ok(HttpResponse::Conflict().json(json!({
                "message": "Email already registered"
            })));
        }
        Err(e) => return Err(db_error("Failed to create member")(e)),
    };

    info!(member_id, created_by = auth.user_id, "Member created");

    match fetch_member(pool.get_ref(), member_id).await? {
        Some(member) => Ok(HttpResponse::Created().json(member)),
        None => Ok(not_found()),
    }
}

/// List Members
#[utoipa::path(
    get,
    path = "/api/members",
    params(MemberQuery),
    responses(
        (status = 200, description = "Paginated member list", body = MemberListResponse),
        (status = 403, description = "Staff/Admin only")
    ),
    tag = "Member",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_members(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MemberQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;

    let page = Page::new(query.page, query.limit);

    let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM members");
    push_member_filter(&mut count, &query);

    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count members"))?;

    let mut data = QueryBuilder::<MySql>::new(format!("SELECT {MEMBER_COLUMNS} FROM members"));
    push_member_filter(&mut data, &query);
    data.push(" ORDER BY id DESC LIMIT ")
        .push_bind(u64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset());

    debug!(sql = %data.sql(), page = page.page, limit = page.limit, "Fetching members");

    let members = data
        .build_query_as::<Member>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch members"))?;

    Ok(HttpResponse::Ok().json(MemberListResponse {
        data: members,
        page: page.page,
        limit: page.limit,
        total,
        pages: page.pages(total),
    }))
}

/// Get Member by ID
///
/// Members may read only their own profile.
#[utoipa::path(
    get,
    path = "/api/members/{member_id}",
    params(
        ("member_id", Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member found", body = Member),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Member not found", body = Object, example = json!({
            "message": "Member not found"
        }))
    ),
    tag = "Member",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let member_id = auth.acting_for(Some(path.into_inner()))?;

    match fetch_member(pool.get_ref(), member_id).await? {
        Some(member) => Ok(HttpResponse::Ok().json(member)),
        None => Ok(not_found()),
    }
}

/// Update Member
#[utoipa::path(
    put,
    path = "/api/members/{member_id}",
    params(
        ("member_id", Path, description = "Member ID")
    ),
    request_body(content = Object, description = "Any subset of the member's editable fields", example = json!({
        "membership_status": "suspended",
        "notes": "Card lost"
    })),
    responses(
        (status = 200, description = "Member updated", body = Member),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Member not found"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Member",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;
    let member_id = path.into_inner();

    let update = build_update_sql("members", UPDATABLE, &body, "id", member_id)?;

    match execute_update(pool.get_ref(), update).await {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Ok(HttpResponse::Conflict().json(json!({
                "message": "Email already registered"
            })));
        }
        Err(e) => return Err(db_error("Failed to update member")(e)),
    }

    info!(member_id, updated_by = auth.user_id, "Member updated");

    // MySQL reports zero affected rows for a no-op update, so re-read instead.
    match fetch_member(pool.get_ref(), member_id).await? {
        Some(member) => Ok(HttpResponse::Ok().json(member)),
        None => Ok(not_found()),
    }
}

/// Delete Member
///
/// Cascades to the member's attendance history.
#[utoipa::path(
    delete,
    path = "/api/members/{member_id}",
    params(
        ("member_id", Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Member not found")
    ),
    tag = "Member",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    let member_id = path.into_inner();

    let result = sqlx::query("DELETE FROM members WHERE id = ?")
        .bind(member_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to delete member"))?;

    if result.rows_affected() == 0 {
        return Ok(not_found());
    }

    info!(member_id, deleted_by = auth.user_id, "Member deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}

/// Link a login account to a member
///
/// Staff attach an account so its owner can act as this member. The account
/// sees the link in tokens issued afterwards, on its next login or refresh.
/// An account linked to another member must be detached there first.
#[utoipa::path(
    put,
    path = "/api/members/{member_id}/account",
    params(
        ("member_id", Path, description = "Member ID")
    ),
    request_body = AccountLink,
    responses(
        (status = 200, description = "Link updated", body = Member),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Staff/Admin only"),
        (status = 404, description = "Member or user not found"),
        (status = 409, description = "Account linked to another member", body = Object, example = json!({
            "message": "User account is linked to another member"
        }))
    ),
    tag = "Member",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn link_account(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<AccountLink>,
) -> actix_web::Result<HttpResponse> {
    auth.require_staff_or_admin()?;
    let member_id = path.into_inner();
    let user_id = body.user_id;

    // Dropping `tx` on an early return rolls it back.
    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;

    let previous = sqlx::query_scalar::<_, Option<u64>>(
        "SELECT user_id FROM members WHERE id = ? FOR UPDATE",
    )
    .bind(member_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error("Failed to lock member"))?;

    let Some(previous) = previous else {
        return Ok(not_found());
    };

    if let Some(user_id) = user_id {
        let linked = sqlx::query_scalar::<_, Option<u64>>(
            "SELECT member_id FROM users WHERE id = ? FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to lock user"))?;

        match linked {
            None => {
                return Ok(HttpResponse::NotFound().json(json!({
                    "message": "User not found"
                })));
            }
            Some(Some(other)) if other != member_id => {
                return Ok(HttpResponse::Conflict().json(json!({
                    "message": "User account is linked to another member"
                })));
            }
            Some(_) => {}
        }
    }

    sqlx::query("UPDATE users SET member_id = NULL WHERE member_id = ?")
        .bind(member_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to detach account"))?;

    if let Some(user_id) = user_id {
        sqlx::query("UPDATE users SET member_id = ? WHERE id = ?")
            .bind(member_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to attach account"))?;
    }

    let updated = sqlx::query("UPDATE members SET user_id = ? WHERE id = ?")
        .bind(user_id)
        .bind(member_id)
        .execute(&mut *tx)
        .await;

    match updated {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Ok(HttpResponse::Conflict().json(json!({
                "message": "User account is linked to another member"
            })));
        }
        Err(e) => return Err(db_error("Failed to link account")(e)),
    }

    tx.commit().await.map_err(db_error("Failed to commit account link"))?;

    info!(member_id, ?previous, ?user_id, linked_by = auth.user_id, "Member account link changed");

    match fetch_member(pool.get_ref(), member_id).await? {
        Some(member) => Ok(HttpResponse::Ok().json(member)),
        None => Ok(not_found()),
    }
}
