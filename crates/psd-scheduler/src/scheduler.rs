//! The tick loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::event::EventSink;
use crate::process::Launcher;
use crate::runtime::{JobRuntime, RepeatingJobRuntime, TickContext};
use crate::{JobSpec, SchedulerError};

/// Default period between ticks.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period of the tick loop.
    pub tick: Duration,
    /// On shutdown, wait for repeating jobs' last invocations to exit.
    pub wait_repeated: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            wait_repeated: false,
        }
    }
}

/// Where the scheduler is in its shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    /// Plain jobs are stopped; waiting on repeating jobs.
    Draining,
    Terminated,
}

/// Owns every job runtime and drives them from one loop.
pub struct Scheduler {
    jobs: Vec<JobRuntime>,
    repeating: Vec<RepeatingJobRuntime>,
    launcher: Arc<dyn Launcher>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    phase: Phase,
}

impl Scheduler {
    /// Build runtimes for `specs`, resolving each first window from the clock.
    ///
    /// Fails on duplicate names and on recurrences that cannot be resolved.
    pub fn new(
        specs: Vec<JobSpec>,
        config: SchedulerConfig,
        launcher: Arc<dyn Launcher>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        let now = clock.now();
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        let mut repeating = Vec::new();

        for spec in specs {
            if spec.name.is_empty() {
                return Err(SchedulerError::InvalidConfig("job name is empty".to_string()));
            }
            if !seen.insert(spec.name.clone()) {
                return Err(SchedulerError::JobExists(spec.name));
            }
            if spec.repeat.is_some() {
                repeating.push(RepeatingJobRuntime::new(spec, now)?);
            } else {
                jobs.push(JobRuntime::new(spec, now)?);
            }
        }

        Ok(Self {
            jobs,
            repeating,
            launcher,
            events,
            clock,
            config,
            phase: Phase::Running,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn jobs(&self) -> &[JobRuntime] {
        &self.jobs
    }

    pub fn repeating(&self) -> &[RepeatingJobRuntime] {
        &self.repeating
    }

    /// Evaluate every job once, in fixed order. Errors are logged per job.
    pub fn tick(&mut self, now: NaiveDateTime) {
        let ctx = TickContext {
            now,
            launcher: self.launcher.as_ref(),
            events: self.events.as_ref(),
        };

        for job in &mut self.jobs {
            let result = job
                .try_start(&ctx)
                .and_then(|running| if running { job.try_stop(&ctx) } else { Ok(false) });
            if let Err(e) = result {
                log_job_error(job.name(), &e);
            }
        }

        for job in &mut self.repeating {
            let result = job.try_start(&ctx).and_then(|active| {
                if active && !job.try_stop(&ctx)? {
                    job.try_repeat(&ctx)?;
                }
                Ok(())
            });
            if let Err(e) = result {
                log_job_error(job.name(), &e);
            }
        }
    }

    /// Stop plain jobs now and enter the drain (or finish) phase.
    pub fn request_shutdown(&mut self, now: NaiveDateTime) {
        if self.phase != Phase::Running {
            return;
        }
        info!("shutdown requested, stopping jobs");
        for job in &mut self.jobs {
            job.stop_immediately(now, self.events.as_ref());
        }

        self.phase = if self.config.wait_repeated && !self.repeating.is_empty() {
            info!(jobs = self.repeating.len(), "waiting for repeating jobs to finish");
            Phase::Draining
        } else {
            Phase::Terminated
        };
    }

    /// One drain step. Returns whether every repeating job has stopped.
    pub fn drain(&mut self, now: NaiveDateTime) -> bool {
        let mut all_stopped = true;
        for job in &mut self.repeating {
            if !job.try_stop_immediately(now, self.events.as_ref()) {
                debug!(job = %job.name(), "still waiting on last invocation");
                all_stopped = false;
            }
        }
        if all_stopped {
            self.phase = Phase::Terminated;
        }
        all_stopped
    }

    /// Tick until shutdown is requested through `shutdown` and completed.
    ///
    /// A dropped sender counts as a shutdown request.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            jobs = self.jobs.len(),
            repeating = self.repeating.len(),
            tick_ms = self.config.tick.as_millis() as u64,
            "scheduler started"
        );

        loop {
            if *shutdown.borrow() && self.phase == Phase::Running {
                self.request_shutdown(self.clock.now());
            }
            if self.phase == Phase::Terminated {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    let now = self.clock.now();
                    match self.phase {
                        Phase::Running => self.tick(now),
                        Phase::Draining => {
                            self.drain(now);
                        }
                        Phase::Terminated => {}
                    }
                }
                changed = shutdown.changed(), if self.phase == Phase::Running => {
                    if changed.is_err() {
                        warn!("shutdown channel closed");
                        self.request_shutdown(self.clock.now());
                    }
                }
            }
        }

        info!("scheduler stopped");
    }
}

fn log_job_error(job: &str, e: &SchedulerError) {
    match e {
        SchedulerError::Recurrence { .. } => {
            error!(job, error = %e, "cannot compute next window, job retired");
        }
        SchedulerError::Spawn { .. } => {
            error!(job, error = %e, "failed to start job, skipping this window");
        }
        _ => error!(job, error = %e, "job tick failed"),
    }
}
