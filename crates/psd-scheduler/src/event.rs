//! Job lifecycle events.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

/// What happened to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Finished,
}

/// A window opened (and the command was spawned) or closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    pub job: String,
    pub kind: EventKind,
    pub at: NaiveDateTime,
    /// When the window that just opened will close.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_finish: Option<NaiveDateTime>,
    /// When the following window opens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_start: Option<NaiveDateTime>,
}

impl LifecycleEvent {
    pub fn started(
        job: impl Into<String>,
        at: NaiveDateTime,
        next_finish: Option<NaiveDateTime>,
        next_start: Option<NaiveDateTime>,
    ) -> Self {
        Self {
            job: job.into(),
            kind: EventKind::Started,
            at,
            next_finish,
            next_start,
        }
    }

    pub fn finished(job: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            job: job.into(),
            kind: EventKind::Finished,
            at,
            next_finish: None,
            next_start: None,
        }
    }
}

/// Receives lifecycle events as the scheduler produces them.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LifecycleEvent);
}

/// Emits events as `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LifecycleEvent) {
        match event.kind {
            EventKind::Started => info!(
                job = %event.job,
                at = %event.at,
                next_finish = ?event.next_finish,
                next_start = ?event.next_start,
                "job started"
            ),
            EventKind::Finished => info!(job = %event.job, at = %event.at, "job finished"),
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn emit(&self, event: &LifecycleEvent) {
        (**self).emit(event)
    }
}
