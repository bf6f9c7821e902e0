use crate::{
    attendance::{
        AttendanceDesk,
        ledger::{Page, RecordFilter},
    },
    auth::auth::AuthUser,
    model::workout::{
        Exercise, Intensity, MAX_NAME_LEN, MAX_NOTES_LEN, Workout, WorkoutType, validate_exercises,
    },
    utils::db_utils::{Column, ColumnKind, build_update_sql, execute_update},
};
use actix_web::{
    HttpResponse,
    error::{ErrorBadRequest, ErrorInternalServerError},
    web,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{MySql, MySqlPool, QueryBuilder, types::Json};
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

const WORKOUT_COLUMNS: &str = "id, user_id, member_id, workout_type, name, duration_minutes, calories, \
                               intensity, exercises, notes, performed_at, created_at";

const UPDATABLE: &[Column] = &[
    Column { name: "workout_type", kind: ColumnKind::OneOf(WorkoutType::NAMES), nullable: false },
    Column { name: "name", kind: ColumnKind::Text, nullable: true },
    Column { name: "duration_minutes", kind: ColumnKind::Count { min: 1 }, nullable: false },
    Column { name: "calories", kind: ColumnKind::Count { min: 0 }, nullable: true },
    Column { name: "intensity", kind: ColumnKind::OneOf(Intensity::NAMES), nullable: false },
    Column { name: "exercises", kind: ColumnKind::Json, nullable: false },
    Column { name: "notes", kind: ColumnKind::Text, nullable: true },
    Column { name: "performed_at", kind: ColumnKind::Timestamp, nullable: false },
];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWorkout {
    pub workout_type: WorkoutType,
    #[schema(example = "Lower body")]
    pub name: Option<String>,
    #[schema(example = 55, minimum = 1)]
    pub duration_minutes: i32,
    #[schema(example = 420, minimum = 0)]
    pub calories: Option<i32>,
    pub intensity: Option<Intensity>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    pub notes: Option<String>,
    /// Defaults to now.
    #[schema(example = "2026-10-19T07:30:00Z", format = "date-time", value_type = Option<String>)]
    pub performed_at: Option<DateTime<Utc>>,
}

impl CreateWorkout {
    fn validate(&self) -> Result<(), String> {
        if self.duration_minutes < 1 {
            return Err("Duration must be at least 1 minute".into());
        }
        if self.calories.is_some_and(|c| c < 0) {
            return Err("Calories cannot be negative".into());
        }
        check_len("name", self.name.as_deref(), MAX_NAME_LEN)?;
        check_len("notes", self.notes.as_deref(), MAX_NOTES_LEN)?;

        validate_exercises(&self.exercises)
    }
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), String> {
    match value {
        Some(v) if v.trim().chars().count() > max => {
            Err(format!("{field} cannot exceed {max} characters"))
        }
        _ => Ok(()),
    }
}

/// Field rules `build_update_sql` cannot express on its own.
fn validate_patch(body: &Value) -> Result<(), String> {
    check_len("name", body.get("name").and_then(Value::as_str), MAX_NAME_LEN)?;
    check_len("notes", body.get("notes").and_then(Value::as_str), MAX_NOTES_LEN)?;

    if let Some(exercises) = body.get("exercises") {
        let exercises: Vec<Exercise> = serde_json::from_value(exercises.clone())
            .map_err(|_| "Invalid value for exercises".to_string())?;
        validate_exercises(&exercises)?;
    }

    Ok(())
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WorkoutQuery {
    /// Filter by workout type
    #[param(inline)]
    #[serde(rename = "type")]
    pub workout_type: Option<WorkoutType>,
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
pub struct WorkoutListResponse {
    pub data: Vec<Workout>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub limit: u32,
    #[schema(example = 31)]
    pub total: i64,
    #[schema(example = 2)]
    pub pages: i64,
}

#[derive(Serialize, ToSchema)]
pub struct WorkoutTypeInfo {
    #[schema(example = "Strength Training")]
    pub name: &'static str,
    #[schema(example = "dumbbell")]
    pub icon: &'static str,
}

fn push_workout_filter(
    query: &mut QueryBuilder<'_, MySql>,
    user_id: u64,
    filter: &WorkoutQuery,
    range: &RecordFilter,
) {
    query.push(" WHERE user_id = ").push_bind(user_id);

    if let Some(kind) = filter.workout_type {
        query.push(" AND workout_type = ").push_bind(kind.as_str());
    }
    if let Some(from) = range.from {
        query.push(" AND performed_at >= ").push_bind(from);
    }
    if let Some(to) = range.to {
        query.push(" AND performed_at < ").push_bind(to);
    }
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> actix_web::Error {
    move |e| {
        error!(error = %e, "{context}");
        ErrorInternalServerError("Database error")
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "message": "Workout not found"
    }))
}

async fn fetch_workout(
    pool: &MySqlPool,
    workout_id: u64,
    user_id: u64,
) -> actix_web::Result<Option<Workout>> {
    let sql = format!("SELECT {WORKOUT_COLUMNS} FROM workouts WHERE id = ? AND user_id = ?");

    sqlx::query_as::<_, Workout>(&sql)
        .bind(workout_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to fetch workout"))
}

/// Workout types
#[utoipa::path(
    get,
    path = "/api/workouts/types",
    responses(
        (status = 200, description = "Every workout type with its icon", body = Vec<WorkoutTypeInfo>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Workout",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn workout_types(_auth: AuthUser) -> HttpResponse {
    let types: Vec<_> = WorkoutType::ALL
        .iter()
        .map(|kind| WorkoutTypeInfo {
            name: kind.as_str(),
            icon: kind.icon(),
        })
        .collect();

    HttpResponse::Ok().json(types)
}

/// Log a workout
///
/// The workout belongs to the calling account and, when the account is
/// linked to one, to its member profile.
#[utoipa::path(
    post,
    path = "/api/workouts",
    request_body = CreateWorkout,
    responses(
        (status = 201, description = "Workout logged", body = Workout),
        (status = 400, description = "Invalid payload", body = Object, example = json!({
            "message": "Duration must be at least 1 minute"
        })),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Workout",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_workout(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    desk: web::Data<AttendanceDesk>,
    payload: web::Json<CreateWorkout>,
) -> actix_web::Result<HttpResponse> {
    let payload = payload.into_inner();

    if let Err(message) = payload.validate() {
        return Ok(HttpResponse::BadRequest().json(json!({ "message": message })));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO workouts
        (user_id, member_id, workout_type, name, duration_minutes, calories, intensity,
         exercises, notes, performed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(auth.member_id)
    .bind(payload.workout_type.as_str())
    .bind(payload.name.as_deref().map(str::trim))
    .bind(payload.duration_minutes)
    .bind(payload.calories)
    .bind(payload.intensity.unwrap_or_default().as_str())
    .bind(Json(&payload.exercises))
    .bind(payload.notes.as_deref().map(str::trim))
    .bind(payload.performed_at.unwrap_or_else(|| desk.now()))
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to create workout"))?;

    let workout_id = result.last_insert_id();

    info!(workout_id, user_id = auth.user_id, "Workout logged");

    match fetch_workout(pool.get_ref(), workout_id, auth.user_id).await? {
        Some(workout) => Ok(HttpResponse::Created().json(workout)),
        None => Ok(not_found()),
    }
}

/// List own workouts
///
/// Newest first.
#[utoipa::path(
    get,
    path = "/api/workouts",
    params(WorkoutQuery),
    responses(
        (status = 200, description = "Paginated workouts", body = WorkoutListResponse),
        (status = 400, description = "start_date after end_date"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Workout",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_workouts(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    desk: web::Data<AttendanceDesk>,
    query: web::Query<WorkoutQuery>,
) -> actix_web::Result<HttpResponse> {
    let range = desk.record_filter(None, query.start_date, query.end_date)?;
    let page = Page::new(query.page, query.limit);

    let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM workouts");
    push_workout_filter(&mut count, auth.user_id, &query, &range);

    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count workouts"))?;

    let mut data = QueryBuilder::<MySql>::new(format!("SELECT {WORKOUT_COLUMNS} FROM workouts"));
    push_workout_filter(&mut data, auth.user_id, &query, &range);
    data.push(" ORDER BY performed_at DESC, id DESC LIMIT ")
        .push_bind(u64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset());

    debug!(sql = %data.sql(), page = page.page, limit = page.limit, "Fetching workouts");

    let workouts = data
        .build_query_as::<Workout>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to fetch workouts"))?;

    Ok(HttpResponse::Ok().json(WorkoutListResponse {
        data: workouts,
        page: page.page,
        limit: page.limit,
        total,
        pages: page.pages(total),
    }))
}

/// Get one of your workouts
#[utoipa::path(
    get,
    path = "/api/workouts/{id}",
    params(
        ("id", Path, description = "Workout ID")
    ),
    responses(
        (status = 200, description = "Workout", body = Workout),
        (status = 404, description = "Workout not found", body = Object, example = json!({
            "message": "Workout not found"
        }))
    ),
    tag = "Workout",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_workout(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    match fetch_workout(pool.get_ref(), path.into_inner(), auth.user_id).await? {
        Some(workout) => Ok(HttpResponse::Ok().json(workout)),
        None => Ok(not_found()),
    }
}

/// Update one of your workouts
#[utoipa::path(
    put,
    path = "/api/workouts/{id}",
    params(
        ("id", Path, description = "Workout ID")
    ),
    request_body(content = Object, description = "Any subset of the workout's fields", example = json!({
        "duration_minutes": 60,
        "intensity": "high"
    })),
    responses(
        (status = 200, description = "Workout updated", body = Workout),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Workout not found")
    ),
    tag = "Workout",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_workout(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> actix_web::Result<HttpResponse> {
    let workout_id = path.into_inner();

    let update = build_update_sql("workouts", UPDATABLE, &body, "id", workout_id)?;
    validate_patch(&body).map_err(ErrorBadRequest)?;

    if fetch_workout(pool.get_ref(), workout_id, auth.user_id).await?.is_none() {
        return Ok(not_found());
    }

    execute_update(pool.get_ref(), update)
        .await
        .map_err(db_error("Failed to update workout"))?;

    info!(workout_id, user_id = auth.user_id, "Workout updated");

    match fetch_workout(pool.get_ref(), workout_id, auth.user_id).await? {
        Some(workout) => Ok(HttpResponse::Ok().json(workout)),
        None => Ok(not_found()),
    }
}

/// Delete one of your workouts
#[utoipa::path(
    delete,
    path = "/api/workouts/{id}",
    params(
        ("id", Path, description = "Workout ID")
    ),
    responses(
        (status = 200, description = "Deleted", body = Object, example = json!({
            "message": "Workout deleted successfully"
        })),
        (status = 404, description = "Workout not found")
    ),
    tag = "Workout",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_workout(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let workout_id = path.into_inner();

    let result = sqlx::query("DELETE FROM workouts WHERE id = ? AND user_id = ?")
        .bind(workout_id)
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to delete workout"))?;

    if result.rows_affected() == 0 {
        return Ok(not_found());
    }

    info!(workout_id, user_id = auth.user_id, "Workout deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Workout deleted successfully"
    })))
}
