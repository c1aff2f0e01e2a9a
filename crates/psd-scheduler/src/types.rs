//! Scheduler types.
//!
//! Everything here is immutable job description: what to run and when its
//! window opens and closes. Mutable bookkeeping lives in [`crate::runtime`].

use chrono::{Month, NaiveTime, TimeDelta, Weekday};

/// A validated job definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Unique, non-empty job name.
    pub name: String,
    /// What to execute when the window opens (and on every repeat).
    pub command: JobCommand,
    /// When the job's window opens and closes.
    pub schedule: Schedule,
    /// Re-invoke the command while the window is open.
    pub repeat: Option<RepeatSpec>,
}

/// How a job's command is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCommand {
    /// Interpreted by the platform shell (`sh -c` / `cmd /C`).
    Shell(String),
    /// Executed directly; the first element is the program.
    Argv(Vec<String>),
}

impl JobCommand {
    /// Human-readable form for logs.
    pub fn display(&self) -> String {
        match self {
            Self::Shell(line) => line.clone(),
            Self::Argv(argv) => argv.join(" "),
        }
    }
}

/// The two edges of a job's activity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub start: StartEdge,
    pub finish: FinishEdge,
}

impl Schedule {
    pub fn new(start: StartEdge, finish: FinishEdge) -> Self {
        Self { start, finish }
    }
}

/// When the window opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartEdge {
    /// Open immediately at startup, exactly once.
    Now,
    /// Open on every occurrence of `recurrence`.
    At {
        recurrence: Recurrence,
        /// Anchor the next start to the closing instant of the previous window
        /// instead of to the instant it opened.
        when_finished: bool,
    },
}

impl StartEdge {
    pub fn at(recurrence: Recurrence) -> Self {
        Self::At {
            recurrence,
            when_finished: false,
        }
    }

    pub fn when_finished(recurrence: Recurrence) -> Self {
        Self::At {
            recurrence,
            when_finished: true,
        }
    }

    pub fn is_now(&self) -> bool {
        matches!(self, Self::Now)
    }
}

/// When the window closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishEdge {
    /// The window never closes.
    Never,
    At(Recurrence),
}

impl FinishEdge {
    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }
}

/// A recurring point in time for one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    /// A clock time on a day picked by `day`.
    Days { time: NaiveTime, day: DayRule },
    /// A clock time on a day picked by a month rule.
    Months(MonthRule),
}

impl Recurrence {
    /// Every day at `time` (day offset 0).
    pub fn daily(time: NaiveTime) -> Self {
        Self::Days {
            time,
            day: DayRule::Offset(0),
        }
    }

    pub fn days(time: NaiveTime, day: DayRule) -> Self {
        Self::Days { time, day }
    }

    /// Clock time of this edge.
    pub fn time(&self) -> NaiveTime {
        match self {
            Self::Days { time, .. } => *time,
            Self::Months(rule) => rule.time,
        }
    }
}

/// Day selection for day-based recurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRule {
    /// Whole days to add; `0` means the same day.
    Offset(u32),
    /// The next matching weekday, never the same day.
    Weekday(Weekday),
}

impl Default for DayRule {
    fn default() -> Self {
        Self::Offset(0)
    }
}

/// Month-based recurrence for one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthRule {
    pub values: MonthValues,
    pub day: MonthDay,
    pub time: NaiveTime,
}

/// Which months a month rule fires in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthValues {
    /// Every `n` months.
    Interval(u32),
    /// Once a year, in this month.
    Named(Month),
    /// Walk the listed months (strictly ascending) forever, wrapping to the
    /// next year after the last one.
    Cycle(Vec<Month>),
}

/// Which day inside a selected month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthDay {
    /// A literal day of the month.
    Date(u32),
    /// The `each`-th `weekday` strictly after the first of the month.
    Weekday { weekday: Weekday, each: u32 },
}

/// Fixed-interval re-invocation while a window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatSpec {
    pub unit: RepeatUnit,
    pub value: u32,
    /// Skip a repeat while the previously spawned process is still alive.
    pub wait_finished: bool,
}

impl RepeatSpec {
    pub fn new(unit: RepeatUnit, value: u32, wait_finished: bool) -> Self {
        Self {
            unit,
            value,
            wait_finished,
        }
    }

    /// The interval as a duration.
    pub fn interval(&self) -> TimeDelta {
        let value = i64::from(self.value);
        match self.unit {
            RepeatUnit::Seconds => TimeDelta::seconds(value),
            RepeatUnit::Minutes => TimeDelta::minutes(value),
            RepeatUnit::Hours => TimeDelta::hours(value),
        }
    }
}

/// Unit of a repeat interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatUnit {
    Seconds,
    Minutes,
    Hours,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_interval_units() {
        assert_eq!(
            RepeatSpec::new(RepeatUnit::Seconds, 30, false).interval(),
            TimeDelta::seconds(30)
        );
        assert_eq!(
            RepeatSpec::new(RepeatUnit::Minutes, 5, false).interval(),
            TimeDelta::seconds(300)
        );
        assert_eq!(
            RepeatSpec::new(RepeatUnit::Hours, 2, true).interval(),
            TimeDelta::seconds(7200)
        );
    }

    #[test]
    fn test_recurrence_time() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(Recurrence::daily(nine).time(), nine);

        let rule = MonthRule {
            values: MonthValues::Interval(1),
            day: MonthDay::Date(1),
            time: nine,
        };
        assert_eq!(Recurrence::Months(rule).time(), nine);
    }

    #[test]
    fn test_command_display() {
        assert_eq!(JobCommand::Shell("echo hi".into()).display(), "echo hi");
        assert_eq!(
            JobCommand::Argv(vec!["ls".into(), "-la".into()]).display(),
            "ls -la"
        );
    }
}
