//! MySQL implementations of [`Ledger`] and [`MemberDirectory`].
//!
//! The one-open-visit rule is enforced by the `uq_attendance_open` unique key
//! over `(member_id, open_day)`, where `open_day` is a stored generated column
//! that holds `check_in_day` while the visit is open and NULL once it closes.
//! A racing second check-in therefore fails at insert time rather than
//! relying on a read-then-write.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{debug, error};

use crate::{
    attendance::{
        calendar::Window,
        ledger::{
            BoxFuture, Ledger, MemberDirectory, MemberStanding, MemberVisits, MembershipCounts,
            NewVisit, Page, RecordFilter, VisitSample,
        },
    },
    error::{AttendanceError, Result},
    model::{
        attendance::{AttendanceEntry, AttendanceRecord},
        member::{ExpiringMembership, MembershipStatus},
    },
};

const RECORD_COLUMNS: &str = "id, member_id, checked_in_by, check_in_time, check_in_day, \
                              check_out_time, duration_minutes, notes";

const ENTRY_COLUMNS: &str = "attendance.id, attendance.member_id, attendance.checked_in_by, \
                             attendance.check_in_time, attendance.check_in_day, \
                             attendance.check_out_time, attendance.duration_minutes, \
                             attendance.notes, members.name AS member_name, \
                             members.email AS member_email";

fn storage_error(action: &'static str) -> impl Fn(sqlx::Error) -> AttendanceError {
    move |e| {
        error!(error = %e, action, "Attendance store call failed");
        e.into()
    }
}

// Columns are qualified so the same filter works on the members join.
fn push_filter(query: &mut QueryBuilder<'_, MySql>, filter: &RecordFilter) {
    query.push(" WHERE 1=1");

    if let Some(member_id) = filter.member_id {
        query.push(" AND attendance.member_id = ").push_bind(member_id);
    }
    if let Some(from) = filter.from {
        query.push(" AND attendance.check_in_time >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND attendance.check_in_time < ").push_bind(to);
    }
}

#[derive(Clone)]
pub struct MySqlLedger {
    pool: MySqlPool,
}

impl MySqlLedger {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl Ledger for MySqlLedger {
    fn open_visit<'a>(&'a self, visit: NewVisit) -> BoxFuture<'a, Result<AttendanceRecord>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO attendance (member_id, checked_in_by, check_in_time, check_in_day, notes)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(visit.member_id)
            .bind(visit.checked_in_by)
            .bind(visit.check_in_time)
            .bind(visit.check_in_day)
            .bind(visit.notes.as_deref())
            .execute(&self.pool)
            .await;

            match result {
                Ok(done) => Ok(AttendanceRecord {
                    id: done.last_insert_id(),
                    member_id: visit.member_id,
                    checked_in_by: visit.checked_in_by,
                    check_in_time: visit.check_in_time,
                    check_in_day: visit.check_in_day,
                    check_out_time: None,
                    duration_minutes: None,
                    notes: visit.notes,
                }),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    debug!(member_id = visit.member_id, "Open visit already exists");
                    Err(AttendanceError::AlreadyPresent)
                }
                Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                    Err(AttendanceError::NotFound("Member"))
                }
                Err(e) => Err(storage_error("open_visit")(e)),
            }
        })
    }

    fn find_open<'a>(
        &'a self,
        member_id: u64,
        day: NaiveDate,
    ) -> BoxFuture<'a, Result<Option<AttendanceRecord>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM attendance \
                 WHERE member_id = ? AND check_in_day = ? AND check_out_time IS NULL \
                 LIMIT 1"
            );

            sqlx::query_as::<_, AttendanceRecord>(&sql)
                .bind(member_id)
                .bind(day)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error("find_open"))
        })
    }

    fn close_visit<'a>(
        &'a self,
        id: u64,
        check_out_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE attendance
                SET check_out_time = ?, duration_minutes = ?
                WHERE id = ?
                AND check_out_time IS NULL
                "#,
            )
            .bind(check_out_time)
            .bind(duration_minutes)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error("close_visit"))?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn get<'a>(&'a self, id: u64) -> BoxFuture<'a, Result<Option<AttendanceRecord>>> {
        Box::pin(async move {
            let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance WHERE id = ?");

            sqlx::query_as::<_, AttendanceRecord>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error("get"))
        })
    }

    fn delete<'a>(&'a self, id: u64) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM attendance WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(storage_error("delete"))?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn list<'a>(
        &'a self,
        filter: &'a RecordFilter,
        page: Page,
    ) -> BoxFuture<'a, Result<(Vec<AttendanceEntry>, i64)>> {
        Box::pin(async move {
            let total = self.count(filter).await?;

            let mut query = QueryBuilder::<MySql>::new(format!(
                "SELECT {ENTRY_COLUMNS} FROM attendance \
                 JOIN members ON members.id = attendance.member_id"
            ));
            push_filter(&mut query, filter);
            query
                .push(" ORDER BY attendance.check_in_time DESC, attendance.id DESC LIMIT ")
                .push_bind(u64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(page.offset());

            debug!(sql = %query.sql(), page = page.page, limit = page.limit, "Listing attendance");

            let records = query
                .build_query_as::<AttendanceEntry>()
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error("list"))?;

            Ok((records, total))
        })
    }

    fn count<'a>(&'a self, filter: &'a RecordFilter) -> BoxFuture<'a, Result<i64>> {
        Box::pin(async move {
            let mut query = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM attendance");
            push_filter(&mut query, filter);

            query
                .build_query_scalar::<i64>()
                .fetch_one(&self.pool)
                .await
                .map_err(storage_error("count"))
        })
    }

    fn count_open_on<'a>(&'a self, day: NaiveDate) -> BoxFuture<'a, Result<i64>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM attendance
                WHERE check_in_day = ?
                AND check_out_time IS NULL
                "#,
            )
            .bind(day)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("count_open_on"))
        })
    }

    fn average_duration<'a>(&'a self, filter: &'a RecordFilter) -> BoxFuture<'a, Result<f64>> {
        Box::pin(async move {
            // AVG yields DECIMAL; cast so it decodes as f64.
            let mut query = QueryBuilder::<MySql>::new(
                "SELECT CAST(COALESCE(AVG(duration_minutes), 0) AS DOUBLE) FROM attendance",
            );
            push_filter(&mut query, filter);
            query.push(" AND attendance.duration_minutes IS NOT NULL");

            query
                .build_query_scalar::<f64>()
                .fetch_one(&self.pool)
                .await
                .map_err(storage_error("average_duration"))
        })
    }

    fn samples<'a>(&'a self, filter: &'a RecordFilter) -> BoxFuture<'a, Result<Vec<VisitSample>>> {
        Box::pin(async move {
            let mut query = QueryBuilder::<MySql>::new(
                "SELECT check_in_time, duration_minutes FROM attendance",
            );
            push_filter(&mut query, filter);
            query.push(" ORDER BY attendance.check_in_time");

            let rows = query
                .build_query_as::<(DateTime<Utc>, Option<i64>)>()
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error("samples"))?;

            Ok(rows
                .into_iter()
                .map(|(check_in_time, duration_minutes)| VisitSample {
                    check_in_time,
                    duration_minutes,
                })
                .collect())
        })
    }

    fn last_check_in<'a>(
        &'a self,
        member_id: u64,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                "SELECT MAX(check_in_time) FROM attendance WHERE member_id = ?",
            )
            .bind(member_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("last_check_in"))
        })
    }

    fn top_members<'a>(
        &'a self,
        filter: &'a RecordFilter,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<MemberVisits>>> {
        Box::pin(async move {
            let mut query = QueryBuilder::<MySql>::new(
                "SELECT members.id AS member_id, members.name AS member_name, \
                 COUNT(attendance.id) AS checkins \
                 FROM attendance JOIN members ON members.id = attendance.member_id",
            );
            push_filter(&mut query, filter);
            query
                .push(" GROUP BY members.id, members.name ORDER BY checkins DESC, members.id LIMIT ")
                .push_bind(u64::from(limit));

            query
                .build_query_as::<MemberVisits>()
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error("top_members"))
        })
    }
}

#[derive(Clone)]
pub struct MySqlMembers {
    pool: MySqlPool,
}

impl MySqlMembers {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl MemberDirectory for MySqlMembers {
    fn standing<'a>(&'a self, member_id: u64) -> BoxFuture<'a, Result<Option<MemberStanding>>> {
        Box::pin(async move {
            let status = sqlx::query_scalar::<_, String>(
                "SELECT membership_status FROM members WHERE id = ?",
            )
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("member_standing"))?;

            Ok(status.map(|status| MemberStanding {
                member_id,
                eligible: MembershipStatus::parse(&status).is_some_and(|s| s.is_eligible()),
            }))
        })
    }

    fn counts<'a>(&'a self) -> BoxFuture<'a, Result<MembershipCounts>> {
        Box::pin(async move {
            let (total, active) = sqlx::query_as::<_, (i64, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    CAST(COALESCE(SUM(membership_status = 'active'), 0) AS SIGNED)
                FROM members
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("membership_counts"))?;

            Ok(MembershipCounts { total, active })
        })
    }

    fn joined_within<'a>(&'a self, window: Window) -> BoxFuture<'a, Result<Vec<DateTime<Utc>>>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, DateTime<Utc>>(
                r#"
                SELECT created_at
                FROM members
                WHERE created_at >= ?
                AND created_at < ?
                ORDER BY created_at
                "#,
            )
            .bind(window.from)
            .bind(window.to)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("members_joined"))
        })
    }

    fn expiring_between<'a>(
        &'a self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> BoxFuture<'a, Result<Vec<ExpiringMembership>>> {
        Box::pin(async move {
            sqlx::query_as::<_, ExpiringMembership>(
                r#"
                SELECT id, name, email, membership_type, membership_end_date
                FROM members
                WHERE membership_status = 'active'
                AND membership_end_date BETWEEN ? AND ?
                ORDER BY membership_end_date, id
                "#,
            )
            .bind(first)
            .bind(last)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("memberships_expiring"))
        })
    }
}
