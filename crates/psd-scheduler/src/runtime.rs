//! Per-job state machines driven by the scheduler tick.
//!
//! A plain job owns its process for the whole window and kills it when the
//! window closes. A repeating job re-invokes its command on an interval while
//! the window is open and leaves its processes to finish on their own.

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;
use crate::event::{EventSink, LifecycleEvent};
use crate::process::{Launcher, ProcessHandle};
use crate::recurrence::{Closing, Opening, RecurrenceResolver, Window};
use crate::repeat::RepeatPolicy;
use crate::types::JobSpec;

/// Everything a runtime needs for one tick.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    pub now: NaiveDateTime,
    pub launcher: &'a dyn Launcher,
    pub events: &'a dyn EventSink,
}

/// A job's window and the resolver that moves it.
#[derive(Debug)]
struct WindowTracker {
    resolver: RecurrenceResolver,
    window: Window,
}

impl WindowTracker {
    fn new(spec: &JobSpec, now: NaiveDateTime) -> Result<Self, SchedulerError> {
        let mut resolver = RecurrenceResolver::new(&spec.name, spec.schedule.clone(), now)?;
        let window = resolver.first_window(now)?;
        Ok(Self { resolver, window })
    }

    /// Whether `now` is inside the window. A stale window is re-resolved first.
    fn is_open(&mut self, job: &str, now: NaiveDateTime) -> Result<bool, SchedulerError> {
        if self.window.is_stale(now) {
            debug!(job, closes = ?self.window.closes, "window end passed while idle, re-resolving");
            self.window = self.resolver.first_window(now)?;
        }
        Ok(self.window.contains(now))
    }

    /// Move the start past the window that was just entered.
    fn roll_open(&mut self, now: NaiveDateTime) -> Result<(), SchedulerError> {
        let opened = self.window.opens.instant().unwrap_or(now);
        match self.resolver.following_start(opened, self.window.closes) {
            Ok(next) => {
                self.window.opens = next;
                Ok(())
            }
            Err(e) => {
                self.window.opens = Opening::Exhausted;
                Err(e)
            }
        }
    }

    /// Roll the start once the job is running. The current window is kept
    /// when the next one cannot be computed; the job retires after it.
    fn roll_after_start(&mut self, job: &str, now: NaiveDateTime) {
        if let Err(e) = self.roll_open(now) {
            error!(job, closes = ?self.window.closes, error = %e, "cannot schedule next window, retiring job after this one");
        }
    }

    /// The window was entered but nothing ran: move straight to the next one.
    fn skip(&mut self) -> Result<(), SchedulerError> {
        self.roll_close().inspect_err(|_| self.window.opens = Opening::Exhausted)
    }

    fn has_closed(&self, now: NaiveDateTime) -> bool {
        matches!(self.window.closes, Closing::At(end) if now > end)
    }

    /// Point the close at the end of the already-rolled next window.
    fn roll_close(&mut self) -> Result<(), SchedulerError> {
        if let Opening::At(start) = self.window.opens {
            self.window.closes = self.resolver.stop_after(start)?;
        }
        Ok(())
    }

    fn started_event(&self, job: &str, now: NaiveDateTime) -> LifecycleEvent {
        if self.resolver.schedule().start.is_now() {
            LifecycleEvent::started(job, now, None, None)
        } else {
            LifecycleEvent::started(
                job,
                now,
                self.window.closes.instant(),
                self.window.opens.instant(),
            )
        }
    }
}

/// Entering a window whose spawn failed: skip the occurrence, keep the spawn
/// error as the one reported.
fn skip_after_failed_spawn(
    tracker: &mut WindowTracker,
    job: &str,
    now: NaiveDateTime,
    spawn_error: SchedulerError,
) -> SchedulerError {
    if let Err(e) = tracker.roll_open(now).and_then(|()| tracker.skip()) {
        error!(job, error = %e, "cannot schedule next window, retiring job");
    }
    spawn_error
}

/// Runtime for a job without a repeat rule.
#[derive(Debug)]
pub struct JobRuntime {
    spec: JobSpec,
    tracker: WindowTracker,
    process: Option<Box<dyn ProcessHandle>>,
}

impl JobRuntime {
    /// Resolve the first window relative to `now`.
    pub fn new(spec: JobSpec, now: NaiveDateTime) -> Result<Self, SchedulerError> {
        let tracker = WindowTracker::new(&spec, now)?;
        Ok(Self {
            spec,
            tracker,
            process: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn window(&self) -> Window {
        self.tracker.window
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    /// Start the job if its window is open. Returns whether it is running.
    pub fn try_start(&mut self, ctx: &TickContext<'_>) -> Result<bool, SchedulerError> {
        if self.process.is_some() {
            return Ok(true);
        }
        if !self.tracker.is_open(&self.spec.name, ctx.now)? {
            return Ok(false);
        }

        match ctx.launcher.launch(&self.spec.name, &self.spec.command) {
            Ok(process) => {
                info!(job = %self.spec.name, pid = ?process.id(), "started job");
                self.process = Some(process);
                self.tracker.roll_after_start(&self.spec.name, ctx.now);
                ctx.events
                    .emit(&self.tracker.started_event(&self.spec.name, ctx.now));
                Ok(true)
            }
            Err(e) => Err(skip_after_failed_spawn(&mut self.tracker, &self.spec.name, ctx.now, e)),
        }
    }

    /// Kill the job once its window has closed. Returns whether it finished.
    pub fn try_stop(&mut self, ctx: &TickContext<'_>) -> Result<bool, SchedulerError> {
        if !self.tracker.has_closed(ctx.now) {
            return Ok(false);
        }

        self.kill();
        self.tracker.roll_close().inspect_err(|_| {
            self.tracker.window.opens = Opening::Exhausted;
        })?;
        info!(job = %self.spec.name, next = ?self.tracker.window.opens, "finished job");
        ctx.events
            .emit(&LifecycleEvent::finished(&self.spec.name, ctx.now));
        Ok(true)
    }

    /// Kill the job regardless of its window. Safe to call repeatedly.
    pub fn stop_immediately(&mut self, now: NaiveDateTime, events: &dyn EventSink) {
        if self.process.is_none() {
            return;
        }
        self.kill();
        info!(job = %self.spec.name, "stopped job");
        events.emit(&LifecycleEvent::finished(&self.spec.name, now));
    }

    fn kill(&mut self) {
        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.terminate() {
                warn!(job = %self.spec.name, error = %e, "terminate failed, treating job as stopped");
            }
        }
    }
}

/// Runtime for a job with a repeat rule.
#[derive(Debug)]
pub struct RepeatingJobRuntime {
    spec: JobSpec,
    policy: RepeatPolicy,
    tracker: WindowTracker,
    active: bool,
    stopped: bool,
    next_repeat_at: Option<NaiveDateTime>,
    /// Last spawned process, kept only under `wait_finished`.
    process: Option<Box<dyn ProcessHandle>>,
}

impl RepeatingJobRuntime {
    pub fn new(spec: JobSpec, now: NaiveDateTime) -> Result<Self, SchedulerError> {
        let repeat = spec.repeat.ok_or_else(|| {
            SchedulerError::InvalidConfig(format!("job '{}' has no repeat rule", spec.name))
        })?;
        let tracker = WindowTracker::new(&spec, now)?;
        Ok(Self {
            policy: RepeatPolicy::new(repeat),
            spec,
            tracker,
            active: false,
            stopped: false,
            next_repeat_at: None,
            process: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn window(&self) -> Window {
        self.tracker.window
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn next_repeat_at(&self) -> Option<NaiveDateTime> {
        self.next_repeat_at
    }

    /// Enter the window if it is open. Returns whether the job is active.
    pub fn try_start(&mut self, ctx: &TickContext<'_>) -> Result<bool, SchedulerError> {
        if self.stopped {
            return Ok(false);
        }
        if self.active {
            return Ok(true);
        }
        if !self.tracker.is_open(&self.spec.name, ctx.now)? {
            return Ok(false);
        }

        match ctx.launcher.launch(&self.spec.name, &self.spec.command) {
            Ok(process) => {
                info!(job = %self.spec.name, pid = ?process.id(), "started repeating job");
                self.track(process);
                self.active = true;
                self.next_repeat_at = Some(self.policy.next_fire_after(ctx.now));
                self.tracker.roll_after_start(&self.spec.name, ctx.now);
                ctx.events
                    .emit(&self.tracker.started_event(&self.spec.name, ctx.now));
                Ok(true)
            }
            Err(e) => Err(skip_after_failed_spawn(&mut self.tracker, &self.spec.name, ctx.now, e)),
        }
    }

    /// Leave the window once it has closed. Processes are not killed.
    pub fn try_stop(&mut self, ctx: &TickContext<'_>) -> Result<bool, SchedulerError> {
        if self.stopped {
            return Ok(true);
        }
        if !self.tracker.has_closed(ctx.now) {
            return Ok(false);
        }

        self.active = false;
        self.next_repeat_at = None;
        self.tracker.roll_close().inspect_err(|_| {
            self.tracker.window.opens = Opening::Exhausted;
        })?;
        info!(job = %self.spec.name, next = ?self.tracker.window.opens, "finished repeating job");
        ctx.events
            .emit(&LifecycleEvent::finished(&self.spec.name, ctx.now));
        Ok(true)
    }

    /// Re-invoke the command when the repeat is due. Returns whether it spawned.
    ///
    /// Under `wait_finished` a due repeat waits, without being rescheduled,
    /// until the previous invocation exits.
    pub fn try_repeat(&mut self, ctx: &TickContext<'_>) -> Result<bool, SchedulerError> {
        if self.stopped || !self.active {
            return Ok(false);
        }
        let Some(due) = self.next_repeat_at else {
            return Ok(false);
        };
        if ctx.now <= due {
            return Ok(false);
        }
        if self.policy.wait_finished() && self.tracked_alive() {
            debug!(job = %self.spec.name, "previous invocation still running, holding repeat");
            return Ok(false);
        }

        self.next_repeat_at = Some(self.policy.next_fire_after(ctx.now));
        let process = ctx.launcher.launch(&self.spec.name, &self.spec.command)?;
        debug!(job = %self.spec.name, pid = ?process.id(), "repeated job");
        self.track(process);
        Ok(true)
    }

    /// Shutdown drain step. Returns whether the job has reached `stopped`.
    pub fn try_stop_immediately(&mut self, now: NaiveDateTime, events: &dyn EventSink) -> bool {
        if self.stopped {
            return true;
        }
        if !self.active {
            self.stopped = true;
            return true;
        }
        if self.tracked_alive() {
            return false;
        }

        self.stopped = true;
        self.active = false;
        self.next_repeat_at = None;
        self.process = None;
        info!(job = %self.spec.name, "stopped repeating job");
        events.emit(&LifecycleEvent::finished(&self.spec.name, now));
        true
    }

    fn track(&mut self, process: Box<dyn ProcessHandle>) {
        if self.policy.wait_finished() {
            self.process = Some(process);
        }
    }

    fn tracked_alive(&mut self) -> bool {
        self.process.as_mut().is_some_and(|p| !p.has_exited())
    }
}
