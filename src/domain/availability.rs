use std::{collections::HashSet, sync::Arc};

use chrono::{NaiveDate, Utc};

use crate::domain::booking::BookingRepository;
use crate::domain::DataAccessError;

/// UTCでの「今日」
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// `[today, today + horizon_days)` のうち `booked` に含まれない日付を昇順で返す
pub fn open_dates(
    today: NaiveDate,
    horizon_days: u32,
    booked: &HashSet<NaiveDate>,
) -> Vec<NaiveDate> {
    today
        .iter_days()
        .take(horizon_days as usize)
        .filter(|date| !booked.contains(date))
        .collect()
}

/// 1日1件の予約。予約が入るまでその日は空いている
#[derive(Clone)]
pub struct Availability {
    bookings: Arc<dyn BookingRepository>,
    clock: Arc<dyn Clock>,
    horizon_days: u32,
}

impl Availability {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        clock: Arc<dyn Clock>,
        horizon_days: u32,
    ) -> Self {
        Self {
            bookings,
            clock,
            horizon_days,
        }
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    pub async fn available_dates(&self) -> Result<Vec<NaiveDate>, DataAccessError> {
        let booked = self.bookings.booked_dates().await?;
        Ok(open_dates(self.clock.today(), self.horizon_days, &booked))
    }
}
