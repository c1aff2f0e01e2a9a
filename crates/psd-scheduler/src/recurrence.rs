//! Window computation: when does a job's window next open and close.
//!
//! The resolver works in local wall-clock time ([`NaiveDateTime`]). It is
//! stateful only through the month cursors of each edge, which keep a
//! cyclic month list's position across reopenings.

use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta};

use crate::calendar::{
    CalendarError, MonthCycle, advance_months, advance_to_named_month, day_in_month,
    next_weekday_on_or_after,
};
use crate::error::SchedulerError;
use crate::types::{DayRule, FinishEdge, MonthRule, MonthValues, Recurrence, Schedule, StartEdge};

/// Upper bound on month candidates inspected for one occurrence.
const MAX_MONTH_CANDIDATES: usize = 240;

/// When a window opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opening {
    /// Open as soon as the scheduler looks (a `now` start that has not fired).
    Immediate,
    At(NaiveDateTime),
    /// The window will not open again.
    Exhausted,
}

impl Opening {
    pub fn instant(&self) -> Option<NaiveDateTime> {
        match self {
            Self::At(at) => Some(*at),
            Self::Immediate | Self::Exhausted => None,
        }
    }
}

/// When a window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closing {
    Never,
    At(NaiveDateTime),
}

impl Closing {
    pub fn instant(&self) -> Option<NaiveDateTime> {
        match self {
            Self::At(at) => Some(*at),
            Self::Never => None,
        }
    }
}

/// A job's current `[opens, closes]` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub opens: Opening,
    pub closes: Closing,
}

impl Window {
    /// Whether `now` lies inside the window, both ends inclusive.
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let opened = match self.opens {
            Opening::Immediate => true,
            Opening::At(at) => at <= now,
            Opening::Exhausted => false,
        };
        opened
            && match self.closes {
                Closing::Never => true,
                Closing::At(at) => now <= at,
            }
    }

    /// The close has already passed although the window can still open:
    /// the daemon missed it (suspend, clock jump) and must re-resolve.
    pub fn is_stale(&self, now: NaiveDateTime) -> bool {
        !matches!(self.opens, Opening::Exhausted)
            && matches!(self.closes, Closing::At(at) if at < now)
    }
}

/// Candidate generator for a month rule.
#[derive(Debug, Clone)]
enum MonthCursor {
    Interval(u32),
    Named(chrono::Month),
    Cycle(MonthCycle),
}

impl MonthCursor {
    fn new(rule: &MonthRule, anchor: NaiveDateTime) -> Result<Self, CalendarError> {
        Ok(match &rule.values {
            MonthValues::Interval(n) => Self::Interval(*n),
            MonthValues::Named(month) => Self::Named(*month),
            MonthValues::Cycle(months) => {
                Self::Cycle(MonthCycle::new(anchor, months.clone(), rule.day, rule.time)?)
            }
        })
    }

    /// First occurrence after `anchor` (or at it, when `inclusive`).
    ///
    /// Interval and named rules start their search in `anchor`'s own month;
    /// a cycle continues from wherever it stopped last time.
    fn occurrence_after(
        &mut self,
        rule: &MonthRule,
        anchor: NaiveDateTime,
        inclusive: bool,
    ) -> Result<NaiveDateTime, CalendarError> {
        let accept = |occurrence: NaiveDateTime| {
            if inclusive {
                occurrence >= anchor
            } else {
                occurrence > anchor
            }
        };

        let mut first = match self {
            Self::Interval(_) => advance_months(anchor.date(), 0)?,
            Self::Named(month) if anchor.month() == month.number_from_month() => {
                advance_months(anchor.date(), 0)?
            }
            Self::Named(month) => advance_to_named_month(anchor.date(), *month)?,
            Self::Cycle(cycle) => cycle.next()?,
        };

        for _ in 0..MAX_MONTH_CANDIDATES {
            let occurrence = day_in_month(first, rule.day)?.and_time(rule.time);
            if accept(occurrence) {
                return Ok(occurrence);
            }
            first = match self {
                Self::Interval(n) => advance_months(first, *n)?,
                Self::Named(month) => advance_to_named_month(first, *month)?,
                Self::Cycle(cycle) => cycle.next()?,
            };
        }

        Err(CalendarError::NoOccurrence)
    }
}

/// Computes window instants for one job's schedule.
#[derive(Debug, Clone)]
pub struct RecurrenceResolver {
    job: String,
    schedule: Schedule,
    start_months: Option<MonthCursor>,
    finish_months: Option<MonthCursor>,
}

impl RecurrenceResolver {
    /// Create a resolver; month cycles are positioned relative to `now`.
    pub fn new(
        job: impl Into<String>,
        schedule: Schedule,
        now: NaiveDateTime,
    ) -> Result<Self, SchedulerError> {
        let job = job.into();
        let cursor = |recurrence: Option<&Recurrence>| match recurrence {
            Some(Recurrence::Months(rule)) => MonthCursor::new(rule, now)
                .map(Some)
                .map_err(|e| recurrence_error(&job, e)),
            _ => Ok(None),
        };

        let start_months = cursor(match &schedule.start {
            StartEdge::At { recurrence, .. } => Some(recurrence),
            StartEdge::Now => None,
        })?;
        let finish_months = cursor(match &schedule.finish {
            FinishEdge::At(recurrence) => Some(recurrence),
            FinishEdge::Never => None,
        })?;

        Ok(Self {
            job,
            schedule,
            start_months,
            finish_months,
        })
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// The first window relative to `now`.
    ///
    /// A day-based start uses today's window when `now` is inside it or
    /// before it and rolls to tomorrow otherwise, before the day rule is
    /// applied. A month-based start takes the soonest occurrence not in the
    /// past.
    pub fn first_window(&mut self, now: NaiveDateTime) -> Result<Window, SchedulerError> {
        let recurrence = match &self.schedule.start {
            StartEdge::Now => {
                let closes = self.stop_after(now)?;
                return Ok(Window {
                    opens: Opening::Immediate,
                    closes,
                });
            }
            StartEdge::At { recurrence, .. } => recurrence.clone(),
        };

        let start = match &recurrence {
            Recurrence::Days { time, day } => {
                let today = now.date();
                let candidate_start = today.and_time(*time);
                let mut candidate_finish = today.and_time(self.finish_time_of_day());
                if self.finish_time_of_day() <= *time {
                    candidate_finish += TimeDelta::days(1);
                }

                let inside = candidate_start <= now && now < candidate_finish;
                let before = now < candidate_start;
                let base = if inside || before {
                    today
                } else {
                    today + TimeDelta::days(1)
                };

                match day {
                    DayRule::Offset(n) => (base + days(*n)).and_time(*time),
                    DayRule::Weekday(weekday) => {
                        next_weekday_on_or_after(today, *weekday).and_time(*time)
                    }
                }
            }
            Recurrence::Months(rule) => self.start_month_after(rule, now, true)?,
        };

        let closes = self.stop_after(start)?;
        Ok(Window {
            opens: Opening::At(start),
            closes,
        })
    }

    /// The start that follows a window which opened at `opened`.
    ///
    /// With `when_finished`, a next start that would precede `closes` is
    /// re-anchored to the closing date plus the start edge's day rule.
    pub fn following_start(
        &mut self,
        opened: NaiveDateTime,
        closes: Closing,
    ) -> Result<Opening, SchedulerError> {
        let (recurrence, when_finished) = match &self.schedule.start {
            StartEdge::Now => return Ok(Opening::Exhausted),
            StartEdge::At {
                recurrence,
                when_finished,
            } => (recurrence.clone(), *when_finished),
        };

        let next = match &recurrence {
            Recurrence::Days { time, day } => match day {
                DayRule::Offset(n) => {
                    (opened.date() + TimeDelta::days(1) + days(*n)).and_time(*time)
                }
                DayRule::Weekday(weekday) => {
                    next_weekday_on_or_after(opened.date(), *weekday).and_time(*time)
                }
            },
            Recurrence::Months(rule) => self.start_month_after(rule, opened, false)?,
        };

        match closes {
            Closing::At(stop) if when_finished && next < stop => {
                self.reanchor(&recurrence, stop).map(Opening::At)
            }
            _ => Ok(Opening::At(next)),
        }
    }

    /// The finish edge's first occurrence after a window opening at `start`.
    ///
    /// Always strictly later than `start`; a same-day finish whose clock
    /// time is not after the start's moves to the following day.
    pub fn stop_after(&mut self, start: NaiveDateTime) -> Result<Closing, SchedulerError> {
        let recurrence = match &self.schedule.finish {
            FinishEdge::Never => return Ok(Closing::Never),
            FinishEdge::At(recurrence) => recurrence.clone(),
        };

        let stop = match &recurrence {
            Recurrence::Days { time, day } => match day {
                DayRule::Offset(n) => {
                    let candidate = (start.date() + days(*n)).and_time(*time);
                    if candidate <= start {
                        candidate + TimeDelta::days(1)
                    } else {
                        candidate
                    }
                }
                DayRule::Weekday(weekday) => {
                    next_weekday_on_or_after(start.date(), *weekday).and_time(*time)
                }
            },
            Recurrence::Months(rule) => {
                let job = &self.job;
                let cursor = self
                    .finish_months
                    .as_mut()
                    .ok_or_else(|| missing_cursor(job))?;
                cursor
                    .occurrence_after(rule, start, false)
                    .map_err(|e| recurrence_error(job, e))?
            }
        };

        Ok(Closing::At(stop))
    }

    /// Finish clock time; `never` counts as midnight.
    fn finish_time_of_day(&self) -> NaiveTime {
        match &self.schedule.finish {
            FinishEdge::Never => NaiveTime::MIN,
            FinishEdge::At(recurrence) => recurrence.time(),
        }
    }

    fn start_month_after(
        &mut self,
        rule: &MonthRule,
        anchor: NaiveDateTime,
        inclusive: bool,
    ) -> Result<NaiveDateTime, SchedulerError> {
        let job = &self.job;
        let cursor = self
            .start_months
            .as_mut()
            .ok_or_else(|| missing_cursor(job))?;
        cursor
            .occurrence_after(rule, anchor, inclusive)
            .map_err(|e| recurrence_error(job, e))
    }

    fn reanchor(
        &mut self,
        recurrence: &Recurrence,
        stop: NaiveDateTime,
    ) -> Result<NaiveDateTime, SchedulerError> {
        match recurrence {
            Recurrence::Days { time, day } => Ok(match day {
                DayRule::Offset(n) => {
                    let mut base = stop.date();
                    if base.and_time(*time) <= stop {
                        base += TimeDelta::days(1);
                    }
                    (base + days(*n)).and_time(*time)
                }
                DayRule::Weekday(weekday) => {
                    next_weekday_on_or_after(stop.date(), *weekday).and_time(*time)
                }
            }),
            Recurrence::Months(rule) => self.start_month_after(rule, stop, false),
        }
    }
}

fn days(n: u32) -> TimeDelta {
    TimeDelta::days(i64::from(n))
}

fn recurrence_error(job: &str, error: CalendarError) -> SchedulerError {
    SchedulerError::Recurrence {
        job: job.to_string(),
        reason: error.to_string(),
    }
}

fn missing_cursor(job: &str) -> SchedulerError {
    SchedulerError::Recurrence {
        job: job.to_string(),
        reason: "month rule has no cursor".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Month, NaiveDate, Weekday};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use crate::types::MonthDay;

    // 2026-10-19 is a Monday.
    fn dt(m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn ymd_hm(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn daily(start: NaiveTime, finish: NaiveTime) -> Schedule {
        Schedule::new(
            StartEdge::at(Recurrence::daily(start)),
            FinishEdge::At(Recurrence::daily(finish)),
        )
    }

    fn resolver(schedule: Schedule, now: NaiveDateTime) -> RecurrenceResolver {
        RecurrenceResolver::new("test", schedule, now).unwrap()
    }

    fn window(opens: NaiveDateTime, closes: NaiveDateTime) -> Window {
        Window {
            opens: Opening::At(opens),
            closes: Closing::At(closes),
        }
    }

    #[test]
    fn test_inside_todays_window() {
        let now = dt(10, 19, 10, 0);
        let mut r = resolver(daily(hm(9, 0), hm(17, 0)), now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w, window(dt(10, 19, 9, 0), dt(10, 19, 17, 0)));
        assert!(w.contains(now));

        // Opening rolls the start to tomorrow; the close stays today.
        let next = r.following_start(dt(10, 19, 9, 0), w.closes).unwrap();
        assert_eq!(next, Opening::At(dt(10, 20, 9, 0)));
    }

    #[test]
    fn test_before_todays_window() {
        let now = dt(10, 19, 7, 30);
        let mut r = resolver(daily(hm(9, 0), hm(17, 0)), now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w, window(dt(10, 19, 9, 0), dt(10, 19, 17, 0)));
        assert!(!w.contains(now));
    }

    #[test]
    fn test_past_todays_window_rolls_to_tomorrow() {
        let now = dt(10, 19, 18, 0);
        let mut r = resolver(daily(hm(9, 0), hm(17, 0)), now);
        assert_eq!(
            r.first_window(now).unwrap(),
            window(dt(10, 20, 9, 0), dt(10, 20, 17, 0))
        );
    }

    #[test]
    fn test_finish_before_start_wraps_midnight() {
        let now = dt(10, 19, 10, 0);
        let mut r = resolver(daily(hm(9, 0), hm(8, 0)), now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w, window(dt(10, 19, 9, 0), dt(10, 20, 8, 0)));
        let span = w.closes.instant().unwrap() - w.opens.instant().unwrap();
        assert_eq!(span, TimeDelta::hours(23));
    }

    #[test]
    fn test_start_day_offset() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::at(Recurrence::days(hm(9, 0), DayRule::Offset(2))),
            FinishEdge::At(Recurrence::daily(hm(17, 0))),
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w, window(dt(10, 21, 9, 0), dt(10, 21, 17, 0)));

        // Two idle days between windows.
        let next = r.following_start(dt(10, 21, 9, 0), w.closes).unwrap();
        assert_eq!(next, Opening::At(dt(10, 24, 9, 0)));
    }

    #[test]
    fn test_weekday_start_and_finish() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::at(Recurrence::days(hm(9, 0), DayRule::Weekday(Weekday::Wed))),
            FinishEdge::At(Recurrence::days(hm(17, 0), DayRule::Weekday(Weekday::Fri))),
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w, window(dt(10, 21, 9, 0), dt(10, 23, 17, 0)));

        let next = r.following_start(dt(10, 21, 9, 0), w.closes).unwrap();
        assert_eq!(next, Opening::At(dt(10, 28, 9, 0)));
        assert_eq!(r.stop_after(dt(10, 28, 9, 0)).unwrap(), Closing::At(dt(10, 30, 17, 0)));
    }

    #[test]
    fn test_weekday_start_never_same_day() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::at(Recurrence::days(hm(9, 0), DayRule::Weekday(Weekday::Mon))),
            FinishEdge::At(Recurrence::daily(hm(17, 0))),
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w.opens, Opening::At(dt(10, 26, 9, 0)));
    }

    #[test]
    fn test_finish_day_offset() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::at(Recurrence::daily(hm(9, 0))),
            FinishEdge::At(Recurrence::days(hm(12, 0), DayRule::Offset(1))),
        );
        let mut r = resolver(schedule, now);
        assert_eq!(
            r.first_window(now).unwrap(),
            window(dt(10, 19, 9, 0), dt(10, 20, 12, 0))
        );
    }

    #[test]
    fn test_never_finish() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::at(Recurrence::daily(hm(9, 0))),
            FinishEdge::Never,
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w.opens, Opening::At(dt(10, 19, 9, 0)));
        assert_eq!(w.closes, Closing::Never);
        assert!(w.contains(now));
        assert!(w.contains(dt(12, 31, 23, 59)));
    }

    #[test]
    fn test_now_start() {
        let schedule = Schedule::new(StartEdge::Now, FinishEdge::At(Recurrence::daily(hm(17, 0))));

        let morning = dt(10, 19, 10, 0);
        let mut r = resolver(schedule.clone(), morning);
        let w = r.first_window(morning).unwrap();
        assert_eq!(w.opens, Opening::Immediate);
        assert_eq!(w.closes, Closing::At(dt(10, 19, 17, 0)));
        assert_eq!(r.following_start(morning, w.closes).unwrap(), Opening::Exhausted);

        let evening = dt(10, 19, 18, 0);
        let mut r = resolver(schedule, evening);
        assert_eq!(
            r.first_window(evening).unwrap().closes,
            Closing::At(dt(10, 20, 17, 0))
        );
    }

    #[test]
    fn test_when_finished_reanchors_to_close() {
        let now = dt(10, 19, 10, 0);
        let finish = FinishEdge::At(Recurrence::days(hm(17, 0), DayRule::Offset(2)));

        let mut plain = resolver(
            Schedule::new(StartEdge::at(Recurrence::daily(hm(9, 0))), finish.clone()),
            now,
        );
        let w = plain.first_window(now).unwrap();
        assert_eq!(w, window(dt(10, 19, 9, 0), dt(10, 21, 17, 0)));
        assert_eq!(
            plain.following_start(dt(10, 19, 9, 0), w.closes).unwrap(),
            Opening::At(dt(10, 20, 9, 0))
        );

        let mut anchored = resolver(
            Schedule::new(StartEdge::when_finished(Recurrence::daily(hm(9, 0))), finish),
            now,
        );
        let w = anchored.first_window(now).unwrap();
        assert_eq!(
            anchored.following_start(dt(10, 19, 9, 0), w.closes).unwrap(),
            Opening::At(dt(10, 22, 9, 0))
        );
    }

    #[test]
    fn test_when_finished_keeps_later_start() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::when_finished(Recurrence::days(hm(9, 0), DayRule::Weekday(Weekday::Mon))),
            FinishEdge::At(Recurrence::days(hm(17, 0), DayRule::Weekday(Weekday::Wed))),
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w, window(dt(10, 26, 9, 0), dt(10, 28, 17, 0)));
        assert_eq!(
            r.following_start(dt(10, 26, 9, 0), w.closes).unwrap(),
            Opening::At(dt(11, 2, 9, 0))
        );
    }

    fn monthly(values: MonthValues, day: MonthDay, time: NaiveTime) -> Recurrence {
        Recurrence::Months(MonthRule { values, day, time })
    }

    #[test]
    fn test_month_interval_window() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::at(monthly(MonthValues::Interval(1), MonthDay::Date(1), hm(9, 0))),
            FinishEdge::At(monthly(MonthValues::Interval(1), MonthDay::Date(5), hm(17, 0))),
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w, window(dt(11, 1, 9, 0), dt(11, 5, 17, 0)));

        let next = r.following_start(dt(11, 1, 9, 0), w.closes).unwrap();
        assert_eq!(next, Opening::At(dt(12, 1, 9, 0)));
        assert_eq!(r.stop_after(dt(12, 1, 9, 0)).unwrap(), Closing::At(dt(12, 5, 17, 0)));
    }

    #[test]
    fn test_month_interval_uses_current_month_when_ahead() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::at(monthly(MonthValues::Interval(3), MonthDay::Date(25), hm(9, 0))),
            FinishEdge::At(Recurrence::daily(hm(17, 0))),
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w, window(dt(10, 25, 9, 0), dt(10, 25, 17, 0)));
        assert_eq!(
            r.following_start(dt(10, 25, 9, 0), w.closes).unwrap(),
            Opening::At(ymd_hm(2027, 1, 25, 9, 0))
        );
    }

    #[test]
    fn test_named_month_yearly() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::at(monthly(MonthValues::Named(Month::December), MonthDay::Date(24), hm(18, 0))),
            FinishEdge::At(Recurrence::days(hm(12, 0), DayRule::Offset(2))),
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w, window(dt(12, 24, 18, 0), dt(12, 26, 12, 0)));
        assert_eq!(
            r.following_start(dt(12, 24, 18, 0), w.closes).unwrap(),
            Opening::At(ymd_hm(2027, 12, 24, 18, 0))
        );
    }

    #[test]
    fn test_month_cycle_persists_position() {
        let now = dt(10, 19, 10, 0);
        let cycle = MonthValues::Cycle(vec![Month::January, Month::July]);
        let schedule = Schedule::new(
            StartEdge::at(monthly(cycle, MonthDay::Date(1), hm(8, 0))),
            FinishEdge::At(Recurrence::daily(hm(20, 0))),
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w.opens, Opening::At(ymd_hm(2027, 1, 1, 8, 0)));

        let mut opened = ymd_hm(2027, 1, 1, 8, 0);
        let mut seen = Vec::new();
        for _ in 0..3 {
            let closes = r.stop_after(opened).unwrap();
            let Opening::At(next) = r.following_start(opened, closes).unwrap() else {
                panic!("month cycle should never exhaust");
            };
            seen.push(next);
            opened = next;
        }
        assert_eq!(
            seen,
            vec![
                ymd_hm(2027, 7, 1, 8, 0),
                ymd_hm(2028, 1, 1, 8, 0),
                ymd_hm(2028, 7, 1, 8, 0),
            ]
        );
    }

    #[test]
    fn test_month_weekday_day() {
        let now = dt(10, 19, 10, 0);
        let rule = MonthDay::Weekday {
            weekday: Weekday::Mon,
            each: 2,
        };
        let schedule = Schedule::new(
            StartEdge::at(monthly(MonthValues::Interval(1), rule, hm(9, 0))),
            FinishEdge::At(Recurrence::daily(hm(17, 0))),
        );
        let mut r = resolver(schedule, now);
        // Second Monday of October (12th) is past; November's is the 9th.
        assert_eq!(r.first_window(now).unwrap().opens, Opening::At(dt(11, 9, 9, 0)));
    }

    #[test]
    fn test_unrepresentable_day_fails_loudly() {
        let now = dt(10, 19, 10, 0);
        let schedule = Schedule::new(
            StartEdge::at(monthly(MonthValues::Interval(1), MonthDay::Date(31), hm(9, 0))),
            FinishEdge::At(Recurrence::daily(hm(17, 0))),
        );
        let mut r = resolver(schedule, now);
        let w = r.first_window(now).unwrap();
        assert_eq!(w.opens, Opening::At(dt(10, 31, 9, 0)));

        let err = r.following_start(dt(10, 31, 9, 0), w.closes).unwrap_err();
        assert!(matches!(err, SchedulerError::Recurrence { ref job, .. } if job == "test"));
        assert!(err.to_string().contains("no day 31"));
    }

    #[test]
    fn test_stale_window() {
        let w = window(dt(10, 19, 9, 0), dt(10, 19, 17, 0));
        assert!(!w.is_stale(dt(10, 19, 17, 0)));
        assert!(w.is_stale(dt(10, 19, 17, 1)));

        let exhausted = Window {
            opens: Opening::Exhausted,
            closes: Closing::At(dt(10, 19, 17, 0)),
        };
        assert!(!exhausted.is_stale(dt(10, 20, 0, 0)));
    }

    proptest! {
        #[test]
        fn wrapped_finish_is_always_after_start(
            start_min in 0u32..1440,
            back in 0u32..1440,
            now_min in 0u32..1440,
            day_offset in 0i64..400,
        ) {
            let start = hm(start_min / 60, start_min % 60);
            let finish_min = start_min.saturating_sub(back);
            let finish = hm(finish_min / 60, finish_min % 60);
            prop_assume!(finish <= start);

            let now = dt(1, 1, 0, 0) + TimeDelta::days(day_offset) + TimeDelta::minutes(i64::from(now_min));
            let mut r = resolver(daily(start, finish), now);
            let w = r.first_window(now).unwrap();
            let opens = w.opens.instant().unwrap();
            let closes = w.closes.instant().unwrap();

            prop_assert!(closes > opens);
            prop_assert!(closes - opens <= TimeDelta::days(1));
            prop_assert!(closes >= now, "first window must not be already closed");
        }

        #[test]
        fn rolled_windows_keep_moving_forward(
            start_min in 0u32..1440,
            finish_min in 0u32..1440,
            offset in 0u32..4,
        ) {
            let now = dt(10, 19, 12, 0);
            let schedule = Schedule::new(
                StartEdge::at(Recurrence::days(hm(start_min / 60, start_min % 60), DayRule::Offset(offset))),
                FinishEdge::At(Recurrence::daily(hm(finish_min / 60, finish_min % 60))),
            );
            let mut r = resolver(schedule, now);
            let mut w = r.first_window(now).unwrap();
            for _ in 0..10 {
                let opened = w.opens.instant().unwrap();
                let next = r.following_start(opened, w.closes).unwrap().instant().unwrap();
                prop_assert!(next > opened);
                let closes = r.stop_after(next).unwrap();
                prop_assert!(closes.instant().unwrap() > next);
                w = Window { opens: Opening::At(next), closes };
            }
        }
    }
}
