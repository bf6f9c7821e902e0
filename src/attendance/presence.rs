//! Per-member presence: `ABSENT -> PRESENT -> ABSENT`.
//!
//! A member is PRESENT exactly when the ledger holds a visit for them that
//! checked in today and has not checked out.

use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::{
    attendance::{
        AttendanceDesk,
        ledger::{NewVisit, Page, RecordFilter},
    },
    error::{AttendanceError, Result},
    model::attendance::{AttendanceEntry, AttendanceRecord},
};

pub const MAX_NOTES_LEN: usize = 200;

fn clean_notes(notes: Option<String>) -> Result<Option<String>> {
    let notes = notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    match notes {
        Some(n) if n.chars().count() > MAX_NOTES_LEN => Err(AttendanceError::InvalidRequest(
            format!("notes cannot exceed {MAX_NOTES_LEN} characters"),
        )),
        other => Ok(other),
    }
}

impl AttendanceDesk {
    /// Opens a visit for an eligible, currently absent member.
    #[instrument(skip(self, notes))]
    pub async fn check_in(
        &self,
        member_id: u64,
        recorded_by: Option<u64>,
        notes: Option<String>,
    ) -> Result<AttendanceRecord> {
        let notes = clean_notes(notes)?;

        let standing = self
            .members
            .standing(member_id)
            .await?
            .ok_or(AttendanceError::NotFound("Member"))?;

        if !standing.eligible {
            info!("Check-in refused: membership not active");
            return Err(AttendanceError::NotEligible);
        }

        let now = self.clock.now();
        let record = self
            .ledger
            .open_visit(NewVisit {
                member_id,
                checked_in_by: recorded_by,
                check_in_time: now,
                check_in_day: self.calendar.day_of(now),
                notes,
            })
            .await?;

        info!(attendance_id = record.id, "Member checked in");

        Ok(record)
    }

    /// Closes today's open visit and derives its duration.
    #[instrument(skip(self))]
    pub async fn check_out(&self, member_id: u64) -> Result<AttendanceRecord> {
        let now = self.clock.now();
        let today = self.calendar.day_of(now);

        let mut record = self
            .ledger
            .find_open(member_id, today)
            .await?
            .ok_or(AttendanceError::NoOpenSession)?;

        let duration = record.close(now);
        let check_out_time = record.check_out_time.unwrap_or(now);

        // Another check-out may have closed it between the read and the update.
        if !self
            .ledger
            .close_visit(record.id, check_out_time, duration)
            .await?
        {
            return Err(AttendanceError::NoOpenSession);
        }

        info!(attendance_id = record.id, duration_minutes = duration, "Member checked out");

        Ok(record)
    }

    /// Listing filter over whole calendar days `start..=end`; either bound
    /// may be open.
    pub fn record_filter(
        &self,
        member_id: Option<u64>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<RecordFilter> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(AttendanceError::InvalidRequest(
                    "start_date must not be after end_date".into(),
                ));
            }
        }

        Ok(RecordFilter {
            member_id,
            from: start.map(|day| self.calendar.start_of(day)),
            to: end
                .and_then(|day| day.succ_opt())
                .map(|day| self.calendar.start_of(day)),
        })
    }

    pub async fn list_records(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<(Vec<AttendanceEntry>, i64)> {
        self.ledger.list(filter, page).await
    }

    /// Every visit that checked in today, newest first.
    pub async fn todays_records(&self) -> Result<Vec<AttendanceEntry>> {
        let filter = RecordFilter::within(self.calendar.today(self.clock.now()));
        let (records, _) = self.ledger.list(&filter, Page::all()).await?;

        Ok(records)
    }

    pub async fn record(&self, id: u64) -> Result<AttendanceRecord> {
        self.ledger
            .get(id)
            .await?
            .ok_or(AttendanceError::NotFound("Attendance record"))
    }

    /// Administrative override; not part of the normal visit lifecycle.
    #[instrument(skip(self))]
    pub async fn delete_record(&self, id: u64) -> Result<()> {
        if !self.ledger.delete(id).await? {
            return Err(AttendanceError::NotFound("Attendance record"));
        }

        info!("Attendance record deleted");

        Ok(())
    }
}
