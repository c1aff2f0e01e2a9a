//! Window-based process scheduler.
//!
//! This crate provides the engine behind `psd`:
//! - Resolves recurring start/finish windows (daily, weekday, monthly rules)
//! - Starts a job's command when its window opens and kills it when it closes
//! - Re-invokes repeating jobs on a fixed interval while their window is open
//! - Shuts down cooperatively, optionally draining repeating jobs first

pub mod calendar;
mod clock;
mod error;
mod event;
mod process;
pub mod recurrence;
mod repeat;
mod runtime;
mod scheduler;
mod types;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SchedulerError;
pub use event::{EventKind, EventSink, LifecycleEvent, TracingSink};
pub use process::{Launcher, OsLauncher, OsProcess, ProcessHandle};
pub use recurrence::{Closing, Opening, RecurrenceResolver, Window};
pub use repeat::RepeatPolicy;
pub use runtime::{JobRuntime, RepeatingJobRuntime, TickContext};
pub use scheduler::{DEFAULT_TICK, Phase, Scheduler, SchedulerConfig};
pub use types::{
    DayRule, FinishEdge, JobCommand, JobSpec, MonthDay, MonthRule, MonthValues, Recurrence,
    RepeatSpec, RepeatUnit, Schedule, StartEdge,
};
