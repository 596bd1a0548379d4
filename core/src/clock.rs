//! Engine clock — owns "today" for every calendar-day comparison.
//!
//! RULE: No engine code calls the system time directly. All date math runs
//! against the clock's day, at midnight granularity, so a reading taken at
//! 23:59 and one at 00:01 can never disagree about what is overdue.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanClock {
    today: NaiveDate,
}

impl PlanClock {
    /// Clock pinned to the local calendar day at construction time.
    pub fn system() -> Self {
        Self {
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Clock pinned to an arbitrary day. Used in tests and replay tooling.
    pub fn fixed(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Re-pin the clock. Long-lived sessions call this once per day change.
    pub fn set_today(&mut self, today: NaiveDate) {
        self.today = today;
    }
}
