//! Calendar arithmetic used by the recurrence resolver.
//!
//! Pure functions over [`NaiveDate`]; the only state is [`MonthCycle`]'s
//! position in its month list.

use chrono::{Datelike, Month, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use thiserror::Error;

use crate::types::MonthDay;

/// Errors from calendar arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    /// A month rule asked for a day the month does not have.
    #[error("{year}-{month:02} has no day {day}")]
    NoSuchDay { year: i32, month: u32, day: u32 },

    /// Arithmetic left chrono's representable range.
    #[error("date out of range")]
    OutOfRange,

    /// No candidate month produced an occurrence.
    #[error("no occurrence found")]
    NoOccurrence,

    /// A month cycle needs at least one month in strictly ascending order.
    #[error("month cycle must list months in strictly ascending order")]
    BadCycle,
}

/// First date strictly after `date` that falls on `weekday`.
///
/// When `date` already is that weekday the result is one week later.
pub fn next_weekday_on_or_after(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let target = i64::from(weekday.num_days_from_monday());
    let current = i64::from(date.weekday().num_days_from_monday());
    let mut days_ahead = target - current;
    if days_ahead <= 0 {
        days_ahead += 7;
    }
    date + TimeDelta::days(days_ahead)
}

/// First day of the month `n` months after `date`'s month.
pub fn advance_months(date: NaiveDate, n: u32) -> Result<NaiveDate, CalendarError> {
    let total = date.month0() + n;
    let year = date
        .year()
        .checked_add(i32::try_from(total / 12).map_err(|_| CalendarError::OutOfRange)?)
        .ok_or(CalendarError::OutOfRange)?;
    first_of_month(year, total % 12 + 1)
}

/// First day of the next occurrence of `month`.
///
/// A date already in (or past) `month` moves to next year's.
pub fn advance_to_named_month(date: NaiveDate, month: Month) -> Result<NaiveDate, CalendarError> {
    let target = month.number_from_month();
    let year = if date.month() >= target {
        date.year().checked_add(1).ok_or(CalendarError::OutOfRange)?
    } else {
        date.year()
    };
    first_of_month(year, target)
}

/// Fix the day inside the month starting at `first`.
///
/// A weekday rule steps `each` times to the next matching weekday strictly
/// after the first of the month, so the 1st itself never counts. Counting may
/// run past the end of a short month.
pub fn day_in_month(first: NaiveDate, day: MonthDay) -> Result<NaiveDate, CalendarError> {
    match day {
        MonthDay::Date(d) => {
            NaiveDate::from_ymd_opt(first.year(), first.month(), d).ok_or(CalendarError::NoSuchDay {
                year: first.year(),
                month: first.month(),
                day: d,
            })
        }
        MonthDay::Weekday { weekday, each } => {
            let mut date = first;
            for _ in 0..each.max(1) {
                date = next_weekday_on_or_after(date, weekday);
            }
            Ok(date)
        }
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(CalendarError::OutOfRange)
}

/// Cyclic iterator over an ascending list of months.
///
/// Construction skips list months whose occurrence has already elapsed
/// relative to the anchor, so the first [`MonthCycle::next`] yields the
/// soonest occurrence that is not in the past.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthCycle {
    months: Vec<Month>,
    index: usize,
    year: i32,
}

impl MonthCycle {
    pub fn new(
        anchor: NaiveDateTime,
        months: Vec<Month>,
        day: MonthDay,
        time: NaiveTime,
    ) -> Result<Self, CalendarError> {
        let ascending = months
            .windows(2)
            .all(|w| w[0].number_from_month() < w[1].number_from_month());
        if months.is_empty() || !ascending {
            return Err(CalendarError::BadCycle);
        }

        let mut cycle = Self {
            months,
            index: 0,
            year: anchor.year(),
        };

        while cycle.index < cycle.months.len() {
            let first = first_of_month(cycle.year, cycle.current().number_from_month())?;
            let occurrence = day_in_month(first, day)?.and_time(time);
            if occurrence >= anchor {
                break;
            }
            cycle.index += 1;
        }
        if cycle.index == cycle.months.len() {
            cycle.index = 0;
            cycle.year = cycle.year.checked_add(1).ok_or(CalendarError::OutOfRange)?;
        }

        Ok(cycle)
    }

    /// First day of the current month, then step to the following one.
    pub fn next(&mut self) -> Result<NaiveDate, CalendarError> {
        let first = first_of_month(self.year, self.current().number_from_month())?;
        self.index += 1;
        if self.index == self.months.len() {
            self.index = 0;
            self.year = self.year.checked_add(1).ok_or(CalendarError::OutOfRange)?;
        }
        Ok(first)
    }

    /// Position of the month the next call will yield.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Year the next call will yield in.
    pub fn year(&self) -> i32 {
        self.year
    }

    fn current(&self) -> Month {
        self.months[self.index]
    }
}
