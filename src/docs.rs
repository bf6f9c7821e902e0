use crate::api::attendance::{AttendanceListResponse, CheckInRequest, CheckOutRequest};
use crate::api::member::{AccountLink, CreateMember, MemberListResponse};
use crate::api::report::{AttendanceReport, SummaryReport};
use crate::api::workout::{CreateWorkout, WorkoutListResponse, WorkoutTypeInfo};
use crate::attendance::aggregate::{
    AttendanceFrequency, AttendanceStats, AttendanceSummary, MemberStats, MembershipReport,
    PeriodBucket, PeriodCount,
};
use crate::attendance::calendar::BucketUnit;
use crate::attendance::ledger::MemberVisits;
use crate::model::attendance::{AttendanceEntry, AttendanceRecord};
use crate::model::member::{ExpiringMembership, Member, MembershipStatus, MembershipType};
use crate::model::workout::{Exercise, Intensity, Workout, WorkoutType};
use crate::models::{LoginReqDto, TokenPair, UserReq};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gymflow API",
        version = "0.1.0",
        description = r#"
## Gym attendance

Front desk check-in and check-out, visit history and attendance reporting
for a single gym.

### Key features
- **Attendance**: check members in and out, at most one open visit per member per day,
  visit duration recorded at check-out
- **Members**: membership profiles; only active memberships may check in.
  Staff link login accounts to profiles explicitly
- **Workouts**: each account logs its own training sessions
- **Reports**: daily, ISO-weekly or monthly buckets, a membership summary,
  sign-ups and expiring memberships, and check-in frequency

### Calendar
"Today", weeks (Monday start) and months follow the gym's canonical calendar:
`GYM_UTC_OFFSET` when configured, otherwise the server's local zone.
All timestamps are returned in UTC.

### Security
Endpoints under `/api` require a JWT bearer access token from `/auth/login`.
Members may act only on their own member record; staff and admins may act for any member.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::list_attendance,
        crate::api::attendance::my_attendance,
        crate::api::attendance::today,
        crate::api::attendance::stats,
        crate::api::attendance::member_stats,
        crate::api::attendance::get_attendance,
        crate::api::attendance::delete_attendance,

        crate::api::member::create_member,
        crate::api::member::list_members,
        crate::api::member::get_member,
        crate::api::member::update_member,
        crate::api::member::delete_member,
        crate::api::member::link_account,

        crate::api::workout::workout_types,
        crate::api::workout::create_workout,
        crate::api::workout::list_workouts,
        crate::api::workout::get_workout,
        crate::api::workout::update_workout,
        crate::api::workout::delete_workout,

        crate::api::report::attendance_report,
        crate::api::report::summary,
        crate::api::report::membership,
        crate::api::report::attendance_frequency
    ),
    components(
        schemas(
            UserReq,
            LoginReqDto,
            TokenPair,
            AttendanceRecord,
            AttendanceEntry,
            CheckInRequest,
            CheckOutRequest,
            AttendanceListResponse,
            AttendanceStats,
            MemberStats,
            PeriodBucket,
            AttendanceSummary,
            BucketUnit,
            AttendanceReport,
            SummaryReport,
            PeriodCount,
            MembershipReport,
            ExpiringMembership,
            AttendanceFrequency,
            MemberVisits,
            Member,
            MembershipType,
            MembershipStatus,
            CreateMember,
            MemberListResponse,
            AccountLink,
            Workout,
            WorkoutType,
            Intensity,
            Exercise,
            CreateWorkout,
            WorkoutListResponse,
            WorkoutTypeInfo
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token refresh"),
        (name = "Attendance", description = "Check-in, check-out and visit history"),
        (name = "Member", description = "Member profiles and account links"),
        (name = "Workout", description = "Workout log"),
        (name = "Report", description = "Attendance and membership reports"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route_group() {
        let doc = ApiDoc::openapi();

        for path in [
            "/auth/login",
            "/api/attendance/check-in",
            "/api/attendance/stats/{member_id}",
            "/api/members/{member_id}",
            "/api/members/{member_id}/account",
            "/api/workouts",
            "/api/workouts/types",
            "/api/workouts/{id}",
            "/api/reports/attendance",
            "/api/reports/membership",
            "/api/reports/attendance-frequency",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }

        // Registration no longer links a member profile by email.
        let register = serde_json::to_value(&doc.paths.paths["/auth/register"]).unwrap();
        let created = &register["post"]["responses"]["201"]["content"]["application/json"]["example"];
        assert!(created.get("user_id").is_some(), "{created}");
        assert!(created.get("member_id").is_none(), "{created}");

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
