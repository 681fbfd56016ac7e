//! Wall-clock abstraction
//!
//! Period classification and tier TTLs depend on today's date. Components
//! take an `Arc<dyn Clock>` so tests can pin the date.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use parking_lot::RwLock;

use crate::types::period::Period;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;

    /// Current UTC date
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// The period containing today
    fn current_period(&self) -> Period {
        Period::containing(self.today())
    }
}

/// System UTC clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually controlled clock
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Clock pinned to midnight UTC of `date`
    pub fn on(date: NaiveDate) -> Self {
        Self::new(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn set_date(&self, date: NaiveDate) {
        self.set(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
