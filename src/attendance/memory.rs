//! In-process ledger, member directory and clock for tests.
//!
//! Each ledger call takes the lock once, so the check-then-insert in
//! `open_visit` and the compare-and-swap in `close_visit` are atomic the same
//! way the unique key and conditional UPDATE are in MySQL.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::{
    attendance::{
        calendar::{Clock, Window},
        ledger::{
            BoxFuture, Ledger, MemberDirectory, MemberStanding, MemberVisits, MembershipCounts,
            NewVisit, Page, RecordFilter, VisitSample,
        },
    },
    error::{AttendanceError, Result},
    model::{
        attendance::{AttendanceEntry, AttendanceRecord},
        member::{ExpiringMembership, MembershipType},
    },
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<AttendanceRecord>>,
    // Stands in for the members join; unnamed members list with empty strings.
    names: Mutex<HashMap<u64, (String, String)>>,
}

impl MemoryLedger {
    fn records(&self) -> MutexGuard<'_, Vec<AttendanceRecord>> {
        lock(&self.records)
    }

    pub fn name_member(&self, member_id: u64, name: &str, email: &str) {
        lock(&self.names).insert(member_id, (name.to_string(), email.to_string()));
    }

    fn entry(&self, record: AttendanceRecord) -> AttendanceEntry {
        let (member_name, member_email) =
            lock(&self.names).get(&record.member_id).cloned().unwrap_or_default();

        AttendanceEntry {
            record,
            member_name,
            member_email,
        }
    }

    /// Inserts a record as-is, bypassing the open-visit guard.
    pub fn seed(&self, record: AttendanceRecord) {
        self.records().push(record);
    }

    pub fn snapshot(&self) -> Vec<AttendanceRecord> {
        self.records().clone()
    }
}

impl Ledger for MemoryLedger {
    fn open_visit<'a>(&'a self, visit: NewVisit) -> BoxFuture<'a, Result<AttendanceRecord>> {
        Box::pin(async move {
            let mut records = self.records();

            let open = records.iter().any(|r| {
                r.member_id == visit.member_id && r.check_in_day == visit.check_in_day && r.is_open()
            });
            if open {
                return Err(AttendanceError::AlreadyPresent);
            }

            let record = AttendanceRecord {
                id: records.iter().map(|r| r.id).max().unwrap_or(0) + 1,
                member_id: visit.member_id,
                checked_in_by: visit.checked_in_by,
                check_in_time: visit.check_in_time,
                check_in_day: visit.check_in_day,
                check_out_time: None,
                duration_minutes: None,
                notes: visit.notes,
            };
            records.push(record.clone());

            Ok(record)
        })
    }

    fn find_open<'a>(
        &'a self,
        member_id: u64,
        day: NaiveDate,
    ) -> BoxFuture<'a, Result<Option<AttendanceRecord>>> {
        Box::pin(async move {
            Ok(self
                .records()
                .iter()
                .find(|r| r.member_id == member_id && r.check_in_day == day && r.is_open())
                .cloned())
        })
    }

    fn close_visit<'a>(
        &'a self,
        id: u64,
        check_out_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut records = self.records();

            match records.iter_mut().find(|r| r.id == id && r.is_open()) {
                Some(record) => {
                    record.check_out_time = Some(check_out_time);
                    record.duration_minutes = Some(duration_minutes);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn get<'a>(&'a self, id: u64) -> BoxFuture<'a, Result<Option<AttendanceRecord>>> {
        Box::pin(async move { Ok(self.records().iter().find(|r| r.id == id).cloned()) })
    }

    fn delete<'a>(&'a self, id: u64) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut records = self.records();
            let before = records.len();
            records.retain(|r| r.id != id);

            Ok(records.len() < before)
        })
    }

    fn list<'a>(
        &'a self,
        filter: &'a RecordFilter,
        page: Page,
    ) -> BoxFuture<'a, Result<(Vec<AttendanceEntry>, i64)>> {
        Box::pin(async move {
            let mut matching: Vec<_> =
                self.records().iter().filter(|r| filter.matches(r)).cloned().collect();
            matching.sort_by(|a, b| b.check_in_time.cmp(&a.check_in_time).then(b.id.cmp(&a.id)));

            let total = matching.len() as i64;
            let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let data = matching
                .into_iter()
                .skip(offset)
                .take(page.limit as usize)
                .map(|record| self.entry(record))
                .collect();

            Ok((data, total))
        })
    }

    fn count<'a>(&'a self, filter: &'a RecordFilter) -> BoxFuture<'a, Result<i64>> {
        Box::pin(async move { Ok(self.records().iter().filter(|r| filter.matches(r)).count() as i64) })
    }

    fn count_open_on<'a>(&'a self, day: NaiveDate) -> BoxFuture<'a, Result<i64>> {
        Box::pin(async move {
            Ok(self.records().iter().filter(|r| r.check_in_day == day && r.is_open()).count() as i64)
        })
    }

    fn average_duration<'a>(&'a self, filter: &'a RecordFilter) -> BoxFuture<'a, Result<f64>> {
        Box::pin(async move {
            let durations: Vec<i64> = self
                .records()
                .iter()
                .filter(|r| filter.matches(r))
                .filter_map(|r| r.duration_minutes)
                .collect();

            if durations.is_empty() {
                return Ok(0.0);
            }

            Ok(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
        })
    }

    fn samples<'a>(&'a self, filter: &'a RecordFilter) -> BoxFuture<'a, Result<Vec<VisitSample>>> {
        Box::pin(async move {
            let mut samples: Vec<_> = self
                .records()
                .iter()
                .filter(|r| filter.matches(r))
                .map(|r| VisitSample {
                    check_in_time: r.check_in_time,
                    duration_minutes: r.duration_minutes,
                })
                .collect();
            samples.sort_by_key(|s| s.check_in_time);

            Ok(samples)
        })
    }

    fn last_check_in<'a>(
        &'a self,
        member_id: u64,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>>> {
        Box::pin(async move {
            Ok(self
                .records()
                .iter()
                .filter(|r| r.member_id == member_id)
                .map(|r| r.check_in_time)
                .max())
        })
    }

    fn top_members<'a>(
        &'a self,
        filter: &'a RecordFilter,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<MemberVisits>>> {
        Box::pin(async move {
            let mut counts: BTreeMap<u64, i64> = BTreeMap::new();
            for record in self.records().iter().filter(|r| filter.matches(r)) {
                *counts.entry(record.member_id).or_default() += 1;
            }

            let names = lock(&self.names);
            let mut ranked: Vec<_> = counts
                .into_iter()
                .map(|(member_id, checkins)| MemberVisits {
                    member_id,
                    member_name: names.get(&member_id).map(|(n, _)| n.clone()).unwrap_or_default(),
                    checkins,
                })
                .collect();
            ranked.sort_by(|a, b| b.checkins.cmp(&a.checkins).then(a.member_id.cmp(&b.member_id)));
            ranked.truncate(limit as usize);

            Ok(ranked)
        })
    }
}

/// A member as the in-memory directory knows it.
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub id: u64,
    pub eligible: bool,
    pub name: String,
    pub membership_type: MembershipType,
    pub joined_at: DateTime<Utc>,
    pub membership_end_date: Option<NaiveDate>,
}

impl MemberProfile {
    pub fn new(id: u64, eligible: bool) -> Self {
        Self {
            id,
            eligible,
            name: format!("Member {id}"),
            membership_type: MembershipType::Basic,
            joined_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            membership_end_date: None,
        }
    }

    pub fn joined(mut self, at: DateTime<Utc>) -> Self {
        self.joined_at = at;
        self
    }

    pub fn ending(mut self, day: NaiveDate) -> Self {
        self.membership_end_date = Some(day);
        self
    }

    fn email(&self) -> String {
        format!("member{}@example.com", self.id)
    }
}

#[derive(Default)]
pub struct MemoryMembers {
    members: Mutex<HashMap<u64, MemberProfile>>,
}

impl MemoryMembers {
    /// Members with default profiles, keyed by id and eligibility.
    pub fn with(members: &[(u64, bool)]) -> Self {
        Self::from_profiles(members.iter().map(|&(id, eligible)| MemberProfile::new(id, eligible)))
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = MemberProfile>) -> Self {
        Self {
            members: Mutex::new(profiles.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub fn set_eligible(&self, member_id: u64, eligible: bool) {
        lock(&self.members)
            .entry(member_id)
            .or_insert_with(|| MemberProfile::new(member_id, eligible))
            .eligible = eligible;
    }
}

impl MemberDirectory for MemoryMembers {
    fn standing<'a>(&'a self, member_id: u64) -> BoxFuture<'a, Result<Option<MemberStanding>>> {
        Box::pin(async move {
            Ok(lock(&self.members).get(&member_id).map(|p| MemberStanding {
                member_id,
                eligible: p.eligible,
            }))
        })
    }

    fn counts<'a>(&'a self) -> BoxFuture<'a, Result<MembershipCounts>> {
        Box::pin(async move {
            let members = lock(&self.members);

            Ok(MembershipCounts {
                total: members.len() as i64,
                active: members.values().filter(|p| p.eligible).count() as i64,
            })
        })
    }

    fn joined_within<'a>(&'a self, window: Window) -> BoxFuture<'a, Result<Vec<DateTime<Utc>>>> {
        Box::pin(async move {
            let mut joined: Vec<_> = lock(&self.members)
                .values()
                .map(|p| p.joined_at)
                .filter(|&at| window.contains(at))
                .collect();
            joined.sort();

            Ok(joined)
        })
    }

    fn expiring_between<'a>(
        &'a self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> BoxFuture<'a, Result<Vec<ExpiringMembership>>> {
        Box::pin(async move {
            let mut expiring: Vec<_> = lock(&self.members)
                .values()
                .filter(|p| p.eligible)
                .filter_map(|p| {
                    let end = p.membership_end_date.filter(|end| (first..=last).contains(end))?;
                    Some(ExpiringMembership {
                        id: p.id,
                        name: p.name.clone(),
                        email: p.email(),
                        membership_type: p.membership_type.as_str().to_string(),
                        membership_end_date: end,
                    })
                })
                .collect();
            expiring.sort_by_key(|m| (m.membership_end_date, m.id));

            Ok(expiring)
        })
    }
}

/// Settable clock.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.0) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.0)
    }
}
