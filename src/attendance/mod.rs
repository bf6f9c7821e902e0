//! Attendance engine: the visit ledger, the per-member presence state
//! machine and the read-only aggregations over it.
//!
//! Presence is never cached. Whether a member is in the gym is always
//! answered by asking the ledger for an open visit dated today.

use std::sync::Arc;

pub mod aggregate;
pub mod calendar;
pub mod ledger;
#[cfg(test)]
pub mod memory;
pub mod presence;
pub mod store;

use calendar::{Calendar, Clock};
use ledger::{Ledger, MemberDirectory};

/// Entry point shared by the HTTP handlers.
#[derive(Clone)]
pub struct AttendanceDesk {
    ledger: Arc<dyn Ledger>,
    members: Arc<dyn MemberDirectory>,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
}

impl AttendanceDesk {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        members: Arc<dyn MemberDirectory>,
        clock: Arc<dyn Clock>,
        calendar: Calendar,
    ) -> Self {
        Self {
            ledger,
            members,
            clock,
            calendar,
        }
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}
