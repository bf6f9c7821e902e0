use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One gym visit. Created at check-in, closed exactly once at check-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "member_id": 42,
        "checked_in_by": 3,
        "check_in_time": "2026-10-19T09:00:00Z",
        "check_in_day": "2026-10-19",
        "check_out_time": "2026-10-19T10:15:00Z",
        "duration_minutes": 75,
        "notes": "Leg day"
    })
)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 42)]
    pub member_id: u64,

    /// User account that recorded the visit
    #[schema(example = 3, nullable = true)]
    pub checked_in_by: Option<u64>,

    #[schema(example = "2026-10-19T09:00:00Z", format = "date-time", value_type = String)]
    pub check_in_time: DateTime<Utc>,

    /// Gym calendar day of `check_in_time`
    #[schema(example = "2026-10-19", format = "date", value_type = String)]
    pub check_in_day: NaiveDate,

    #[schema(example = "2026-10-19T10:15:00Z", format = "date-time", value_type = String, nullable = true)]
    pub check_out_time: Option<DateTime<Utc>>,

    #[schema(example = 75, nullable = true)]
    pub duration_minutes: Option<i64>,

    #[schema(example = "Leg day", nullable = true)]
    pub notes: Option<String>,
}

/// A visit as the front desk lists it, with the member it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceEntry {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: AttendanceRecord,

    #[schema(example = "Jane Doe")]
    pub member_name: String,

    #[schema(example = "jane@example.com")]
    pub member_email: String,
}

impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.check_out_time.is_none()
    }

    /// Closes the visit at `at`, clamped so the check-out never precedes the
    /// check-in. Returns the derived duration.
    pub fn close(&mut self, at: DateTime<Utc>) -> i64 {
        let check_out = at.max(self.check_in_time);
        let minutes = duration_minutes(self.check_in_time, check_out);

        self.check_out_time = Some(check_out);
        self.duration_minutes = Some(minutes);

        minutes
    }
}

/// Whole minutes between two instants, rounded half up.
pub fn duration_minutes(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> i64 {
    let millis = (check_out - check_in).num_milliseconds().max(0);

    (millis + 30_000) / 60_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, s).unwrap()
    }

    fn open_record() -> AttendanceRecord {
        AttendanceRecord {
            id: 1,
            member_id: 7,
            checked_in_by: None,
            check_in_time: at(9, 0, 0),
            check_in_day: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            check_out_time: None,
            duration_minutes: None,
            notes: None,
        }
    }

    #[test]
    fn nine_to_quarter_past_ten_is_75_minutes() {
        assert_eq!(duration_minutes(at(9, 0, 0), at(10, 15, 0)), 75);
    }

    #[test]
    fn rounds_to_the_nearest_minute() {
        let start = at(9, 0, 0);
        assert_eq!(duration_minutes(start, start + Duration::milliseconds(29_999)), 0);
        assert_eq!(duration_minutes(start, start + Duration::seconds(30)), 1);
        assert_eq!(duration_minutes(start, start + Duration::seconds(89)), 1);
        assert_eq!(duration_minutes(start, start + Duration::seconds(90)), 2);
    }

    #[test]
    fn close_sets_both_fields_together() {
        let mut record = open_record();
        assert!(record.is_open());

        let minutes = record.close(at(10, 15, 0));

        assert_eq!(minutes, 75);
        assert_eq!(record.check_out_time, Some(at(10, 15, 0)));
        assert_eq!(record.duration_minutes, Some(75));
        assert!(!record.is_open());
    }

    #[test]
    fn close_never_precedes_check_in() {
        let mut record = open_record();

        record.close(at(8, 59, 0));

        assert_eq!(record.check_out_time, Some(record.check_in_time));
        assert_eq!(record.duration_minutes, Some(0));
    }
}
