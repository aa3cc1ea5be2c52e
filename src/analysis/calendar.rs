/// Calendar helpers: the daily grid and the seasonal encodings derived from it.
///
/// Everything here is a pure function of `NaiveDate`. No timezone or locale
/// is consulted, so the same date always encodes the same way.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{PipelineError, Result};

/// Mean tropical year used for the day-of-year angle.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// An inclusive, non-empty range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(PipelineError::EmptyDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days, both ends included.
    pub fn len_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Offset of `date` from the start, if it lies in the range.
    pub fn offset_of(&self, date: NaiveDate) -> Option<usize> {
        self.contains(date)
            .then(|| (date - self.start).num_days() as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// `date` shifted back by `days`, saturating at the earliest representable date.
pub fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// `date` shifted forward by `days`, saturating at the latest representable date.
pub fn days_after(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}

// ---------------------------------------------------------------------------
// Seasonal encodings
// ---------------------------------------------------------------------------

pub fn month(date: NaiveDate) -> f64 {
    f64::from(date.month())
}

/// (sin, cos) of the day-of-year angle 2π·doy/365.25, doy starting at 1.
pub fn day_of_year_cyclic(date: NaiveDate) -> (f64, f64) {
    let angle = 2.0 * std::f64::consts::PI * f64::from(date.ordinal()) / DAYS_PER_YEAR;
    (angle.sin(), angle.cos())
}

/// (sin, cos) of the month angle 2π·month/12.
pub fn month_cyclic(date: NaiveDate) -> (f64, f64) {
    let angle = 2.0 * std::f64::consts::PI * f64::from(date.month()) / 12.0;
    (angle.sin(), angle.cos())
}
