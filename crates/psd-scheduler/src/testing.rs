//! Scripted launchers and recording sinks for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::SchedulerError;
use crate::event::{EventKind, EventSink, LifecycleEvent};
use crate::process::{Launcher, ProcessHandle};
use crate::types::JobCommand;

/// 2026-10-19 is a Monday.
pub fn dt(m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

/// Shared view of one fake process.
#[derive(Debug, Clone, Default)]
pub struct FakeState {
    pub exited: Arc<AtomicBool>,
    pub killed: Arc<AtomicBool>,
}

impl FakeState {
    pub fn exit(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct FakeProcess {
    id: u32,
    state: FakeState,
}

impl ProcessHandle for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.id)
    }

    fn has_exited(&mut self) -> bool {
        self.state.exited.load(Ordering::SeqCst)
    }

    fn terminate(&mut self) -> Result<(), SchedulerError> {
        self.state.killed.store(true, Ordering::SeqCst);
        self.state.exited.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher whose processes run until the test says otherwise.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    spawned: Mutex<Vec<(String, FakeState)>>,
    next_id: AtomicUsize,
    failing: AtomicBool,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following launch fail.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    pub fn count_for(&self, job: &str) -> usize {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == job)
            .count()
    }

    pub fn last(&self) -> FakeState {
        self.spawned.lock().unwrap().last().unwrap().1.clone()
    }

    pub fn all(&self) -> Vec<FakeState> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .map(|(_, state)| state.clone())
            .collect()
    }
}

impl Launcher for FakeLauncher {
    fn launch(
        &self,
        job: &str,
        _command: &JobCommand,
    ) -> Result<Box<dyn ProcessHandle>, SchedulerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SchedulerError::Spawn {
                job: job.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such program"),
            });
        }
        let state = FakeState::default();
        self.spawned
            .lock()
            .unwrap()
            .push((job.to_string(), state.clone()));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u32 + 100;
        Ok(Box::new(FakeProcess { id, state }))
    }
}

/// Sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<(String, EventKind)> {
        self.events()
            .into_iter()
            .map(|e| (e.job, e.kind))
            .collect()
    }

    pub fn finished_count(&self, job: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.job == job && e.kind == EventKind::Finished)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &LifecycleEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
